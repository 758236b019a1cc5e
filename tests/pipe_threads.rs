use dmxp_shmlink::Core::Region;
use dmxp_shmlink::Pipe::layout::pipe_region_size;
use dmxp_shmlink::Pipe::{PipeRx, PipeTx, RingRx, RingTx};
use std::thread;
use std::time::Instant;

#[test]
fn spsc_ordered_variable_sizes() {
    let capacity = 1024;
    let region = Region::heap(pipe_region_size(capacity)).unwrap();
    let mut tx = RingTx::init(region.clone(), capacity).unwrap();
    let mut rx = RingRx::attach(region).unwrap();

    let total_msgs: u64 = 50_000;

    let producer = thread::spawn(move || {
        for seq in 0..total_msgs {
            // sizes cycle through 8..=71 so slots land on every alignment and wrap often
            let len = 8 + (seq % 64) as usize;
            loop {
                if let Some(window) = tx.reserve(len) {
                    window[..8].copy_from_slice(&seq.to_le_bytes());
                    for b in &mut window[8..] {
                        *b = seq as u8;
                    }
                    break;
                }
                thread::yield_now();
            }
            // publish in small batches
            if seq % 4 == 3 || seq + 1 == total_msgs {
                tx.publish();
            }
        }
    });

    let start = Instant::now();
    let mut expected = 0u64;
    while expected < total_msgs {
        let mut pulled = 0;
        while let Some(msg) = rx.pull() {
            assert_eq!(msg.len(), 8 + (expected % 64) as usize);
            let seq = u64::from_le_bytes(msg[..8].try_into().unwrap());
            assert_eq!(seq, expected, "messages must arrive in publish order");
            assert!(msg[8..].iter().all(|&b| b == seq as u8));
            expected += 1;
            pulled += 1;
        }
        if pulled > 0 {
            rx.acknowledge();
        } else {
            thread::yield_now();
        }
    }

    producer.join().unwrap();
    assert!(rx.pull().is_none());
    println!(
        "Transferred {} messages in {:?}",
        total_msgs,
        start.elapsed()
    );
}

#[test]
fn spsc_full_batches_never_tear() {
    // The producer reserves until the ring is full, then publishes; the
    // consumer must only ever see whole batches.
    let capacity = 256;
    let region = Region::heap(pipe_region_size(capacity)).unwrap();
    let mut tx = RingTx::init(region.clone(), capacity).unwrap();
    let mut rx = RingRx::attach(region).unwrap();

    let batches: u32 = 2_000;

    let producer = thread::spawn(move || {
        for batch in 0..batches {
            let mut n = 0u32;
            while let Some(window) = tx.reserve(8) {
                window[..4].copy_from_slice(&batch.to_le_bytes());
                window[4..].copy_from_slice(&n.to_le_bytes());
                n += 1;
                if n == 4 {
                    break;
                }
            }
            if n < 4 {
                tx.abort();
                thread::yield_now();
                continue;
            }
            tx.publish();
        }
    });

    let mut last_batch: Option<u32> = None;
    let mut seen_in_batch = 0u32;
    let mut finished = false;
    while !finished {
        while let Some(msg) = rx.pull() {
            let batch = u32::from_le_bytes(msg[..4].try_into().unwrap());
            let n = u32::from_le_bytes(msg[4..8].try_into().unwrap());
            if Some(batch) != last_batch {
                assert_eq!(seen_in_batch % 4, 0, "batch {:?} was torn", last_batch);
                seen_in_batch = 0;
                last_batch = Some(batch);
            }
            assert_eq!(n, seen_in_batch);
            seen_in_batch += 1;
        }
        rx.acknowledge();
        finished = producer.is_finished() && rx.is_empty();
        thread::yield_now();
    }

    producer.join().unwrap();
    assert_eq!(seen_in_batch, 4);
}
