// Allocation tracking tests for the receive path
//
// Note: Tests using dhat are marked with #[serial_test::serial] because
// dhat only allows one profiler to run at a time. They will run sequentially.
//
// # Run all allocation tracking tests
// cargo test --test allocation_tracking -- --nocapture

use dmxp_shmlink::{QueueBuilder, RxBuffer};

#[global_allocator]
static ALLOC: dhat::Alloc = dhat::Alloc;

#[test]
#[serial_test::serial]
fn test_dequeue_is_allocation_free_with_dhat() {
    println!("\n--- Running receive path with dhat ---");
    let _dhat = dhat::Profiler::builder().testing().build();

    let (mut rx, mut peer, _doorbell) = QueueBuilder::new().with_pipe_size(4096).build_pair().unwrap();
    let pool: Vec<RxBuffer> = (0..8).map(|i| RxBuffer::new(i * 2048, 2048, i)).collect();
    let mut posted = Vec::with_capacity(pool.len());
    let mut bufs = Vec::with_capacity(pool.len());

    rx.post_buffers(&pool).unwrap();

    let mut round = |i: u32| {
        if posted.is_empty() {
            peer.take_posted(&mut posted);
        }
        let Some(mut buf) = posted.pop() else {
            panic!("peer ran out of posted buffers at {}", i);
        };
        buf.size = i % 2048;
        peer.complete(&[buf]).unwrap();

        bufs.clear();
        assert_eq!(rx.dequeue(&mut bufs), i % 2048);
        bufs[0].size = 2048;
        rx.post_buffers(&bufs).unwrap();
    };

    // First pass registers the log callsites.
    round(1);
    let before = dhat::HeapStats::get();
    for i in 0..1000u32 {
        round(i);
    }

    let after = dhat::HeapStats::get();
    println!(
        "Blocks allocated: before {}, after {}",
        before.total_blocks, after.total_blocks
    );
    assert_eq!(
        after.total_blocks, before.total_blocks,
        "post/complete/dequeue must not touch the heap once buffers are reserved"
    );
    println!("✓ Zero allocations detected during queue operations");
}

#[test]
#[serial_test::serial]
fn test_dropped_packets_do_not_allocate() {
    let _dhat = dhat::Profiler::builder().testing().build();

    let (mut rx, mut peer, _doorbell) = QueueBuilder::new().with_pipe_size(4096).build_pair().unwrap();
    let mut bufs: Vec<RxBuffer> = Vec::with_capacity(4);
    let mut round = || {
        peer.send_raw(&[0u8; 4]).unwrap();
        peer.complete_with_total(100, &[RxBuffer::new(0, 1, 1)]).unwrap();
        assert_eq!(rx.dequeue(&mut bufs), 0);
    };

    round();
    let before = dhat::HeapStats::get();
    for _ in 0..499 {
        round();
    }

    let after = dhat::HeapStats::get();
    assert_eq!(after.total_blocks, before.total_blocks);
    assert!(bufs.is_empty());
    assert_eq!(rx.stats().dropped_malformed, 500);
    assert_eq!(rx.stats().dropped_corrupt, 500);
}

#[test]
#[serial_test::serial]
fn test_receive_path_with_memory_stats() {
    println!("\n--- Running receive path with memory-stats ---");
    use memory_stats::memory_stats;

    let before = memory_stats();
    println!("Memory before: {:?}", before);

    let (mut rx, mut peer, _doorbell) = QueueBuilder::new().build_pair().unwrap();
    let pool: Vec<RxBuffer> = (0..64).map(|i| RxBuffer::new(i * 2048, 2048, i)).collect();
    let mut posted = Vec::with_capacity(pool.len());
    let mut bufs = Vec::with_capacity(pool.len());
    rx.post_buffers(&pool).unwrap();

    for i in 0..10_000u32 {
        if posted.is_empty() {
            peer.take_posted(&mut posted);
        }
        if let Some(buf) = posted.pop() {
            peer.complete(&[buf]).unwrap();
        }
        bufs.clear();
        if rx.dequeue(&mut bufs) > 0 {
            rx.post_buffers(&bufs).unwrap();
        }
        if i % 2000 == 0 {
            println!("  Processed {} packets", i);
        }
    }

    let after = memory_stats();
    println!("Memory after: {:?}", after);

    if let (Some(b), Some(a)) = (before, after) {
        let delta = a.physical_mem as i64 - b.physical_mem as i64;
        println!("Memory delta: {} bytes ({:.2} KB)", delta, delta as f64 / 1024.0);
        println!("  Note: includes the two 64 KiB pipes mapped for this queue");
    }
    assert_eq!(rx.stats().received, 10_000);
}
