// Queue builder tests: region layout, attach checks, both ends talking.
// Named regions live in /dev/shm, so these run serially.
use dmxp_shmlink::Core::{attach_shared_memory, unlink_shared_memory};
use dmxp_shmlink::Queue::layout::{control_size, QUEUE_MAGIC};
use dmxp_shmlink::Structs::NotificationState;
use dmxp_shmlink::Queue::MIN_QUEUE_PIPE_SIZE;
use dmxp_shmlink::{QueueBuilder, RxBuffer};
use serial_test::serial;
use std::io::ErrorKind;

fn cleanup_shared_memory(name: &str) {
    let _ = unlink_shared_memory(name);
}

#[test]
fn test_builder_defaults() {
    let builder = QueueBuilder::new();
    assert_eq!(builder.name(), "dmxp_rxq");
    assert!(builder.region_size() > 2 * 64 * 1024);

    let custom = QueueBuilder::new().with_name("custom").with_pipe_size(4096);
    assert_eq!(custom.name(), "custom");
    assert!(custom.region_size() < builder.region_size());
}

#[test]
fn test_invalid_pipe_sizes() {
    for size in [0, 32, 64, 1000, 4097] {
        let err = QueueBuilder::new()
            .with_pipe_size(size)
            .build_pair()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput, "pipe size {}", size);
    }
}

#[test]
#[serial]
fn test_build_queue_and_attach_peer() {
    let name = "dmxp_test_builder_rxq";
    cleanup_shared_memory(name);

    let (mut rx, doorbell) = QueueBuilder::new()
        .with_name(name)
        .with_pipe_size(4096)
        .build_queue()
        .unwrap();
    let mut peer = QueueBuilder::new().with_name(name).attach_peer().unwrap();

    // Setup leaves the word for the owner to set.
    assert_eq!(
        peer.notification().state(),
        Some(NotificationState::Uninitialized)
    );

    let posted: Vec<RxBuffer> = (0..8).map(|i| RxBuffer::new(i * 512, 512, i)).collect();
    rx.post_buffers(&posted).unwrap();

    let mut taken = Vec::new();
    assert_eq!(peer.take_posted(&mut taken), 8);
    assert_eq!(taken, posted);

    let mut filled = taken[2];
    filled.size = 100;
    peer.complete(&[filled]).unwrap();

    let seen = doorbell.sequence();
    let mut bufs = Vec::new();
    assert_eq!(rx.dequeue(&mut bufs), 100);
    assert_eq!(bufs, vec![RxBuffer::new(1024, 100, 2)]);
    assert_eq!(doorbell.sequence(), seen, "notifications were never enabled");

    cleanup_shared_memory(name);
}

#[test]
#[serial]
fn test_attach_missing_queue() {
    let name = "dmxp_test_builder_missing";
    cleanup_shared_memory(name);
    let err = QueueBuilder::new().with_name(name).attach_peer().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
#[serial]
fn test_attach_rejects_bad_magic() {
    let name = "dmxp_test_builder_magic";
    let (_rx, _doorbell) = QueueBuilder::new()
        .with_name(name)
        .with_pipe_size(1024)
        .build_queue()
        .unwrap();

    // Corrupt the magic through a second mapping.
    let shm = attach_shared_memory(name, control_size()).unwrap();
    unsafe {
        let magic = shm.as_ptr() as *mut u64;
        assert_eq!(magic.read(), QUEUE_MAGIC);
        magic.write(0xBAD);
    }

    let err = QueueBuilder::new().with_name(name).attach_peer().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidData);
    cleanup_shared_memory(name);
}

#[test]
#[serial]
fn test_attach_rejects_truncated_region() {
    let name = "dmxp_test_builder_trunc";
    let _shm = dmxp_shmlink::Core::create_shared_memory(64, Some(name)).unwrap();
    let err = QueueBuilder::new().with_name(name).attach_peer().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidData);
    cleanup_shared_memory(name);
}

#[test]
fn test_build_pair_shares_notification() {
    let (rx, peer, _doorbell) = QueueBuilder::new().with_pipe_size(256).build_pair().unwrap();

    rx.enable_notification();
    assert!(peer.notification().is_enabled());
    rx.disable_notification();
    assert_eq!(peer.notification().state(), Some(NotificationState::Disabled));
}

#[test]
#[serial]
fn test_attach_rejects_unpublished_queue() {
    let name = "dmxp_test_builder_unpublished";
    let (_rx, _doorbell) = QueueBuilder::new()
        .with_name(name)
        .with_pipe_size(1024)
        .build_queue()
        .unwrap();

    // A creator still laying out the region has not stored the magic yet.
    let shm = attach_shared_memory(name, control_size()).unwrap();
    unsafe {
        let magic = &*(shm.as_ptr() as *const std::sync::atomic::AtomicU64);
        magic.store(0, std::sync::atomic::Ordering::Release);
    }

    let err = QueueBuilder::new().with_name(name).attach_peer().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidData);
    cleanup_shared_memory(name);
}

#[test]
fn test_smallest_pipe_carries_a_posted_buffer() {
    let (mut rx, mut peer, _doorbell) = QueueBuilder::new()
        .with_pipe_size(MIN_QUEUE_PIPE_SIZE)
        .build_pair()
        .unwrap();
    let buf = RxBuffer::new(0, 512, 3);

    for _ in 0..10 {
        rx.post_buffers(&[buf]).unwrap();
        let mut posted = Vec::new();
        assert_eq!(peer.take_posted(&mut posted), 1);
        peer.complete(&posted).unwrap();

        let mut bufs = Vec::new();
        assert_eq!(rx.dequeue(&mut bufs), 512);
        assert_eq!(bufs, vec![buf]);
    }
}
