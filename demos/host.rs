// Receiving side: creates the queue and a buffer pool in /dev/shm, posts
// buffers, and prints a SHA-256 of every payload the peer hands back.
// Run `cargo run --example host` first, then `cargo run --example peer 100`.
use dmxp_shmlink::Core::{create_shared_memory, unlink_shared_memory};
use dmxp_shmlink::{QueueBuilder, RxBuffer};
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

const QUEUE_NAME: &str = "dmxp_demo_rxq";
const POOL_NAME: &str = "dmxp_demo_pool";
const BUFFER_SIZE: u32 = 2048;
const BUFFER_COUNT: u64 = 64;

fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = running.clone();
        ctrlc::set_handler(move || running.store(false, Ordering::SeqCst))
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
    }

    let (mut rx, doorbell) = QueueBuilder::new().with_name(QUEUE_NAME).build_queue()?;
    let pool = create_shared_memory(
        (BUFFER_SIZE as u64 * BUFFER_COUNT) as usize,
        Some(POOL_NAME),
    )?;
    println!("Host: queue and pool ready, waiting for peer...");

    let initial: Vec<RxBuffer> = (0..BUFFER_COUNT)
        .map(|id| RxBuffer::new(id * BUFFER_SIZE as u64, BUFFER_SIZE, id))
        .collect();
    rx.post_buffers(&initial)?;

    let mut bufs = Vec::with_capacity(BUFFER_COUNT as usize);
    let mut packets = 0u64;
    println!("\n{:<8} {:<6} {}", "Packet", "Bytes", "Hash");
    println!("{}", "=".repeat(80));

    while running.load(Ordering::SeqCst) {
        // Sleeps on the doorbell with notifications enabled when idle.
        let Some(total) = rx.wait_dequeue(&mut bufs, &doorbell, Some(Duration::from_millis(200)))
        else {
            continue;
        };

        let mut hasher = Sha256::new();
        for buf in &bufs {
            let end = buf.offset.saturating_add(buf.size as u64);
            if end > pool.size() as u64 {
                eprintln!("Host: peer returned buffer {} outside the pool", buf.id);
                continue;
            }
            let data = unsafe {
                std::slice::from_raw_parts(pool.as_ptr().add(buf.offset as usize), buf.size as usize)
            };
            hasher.update(data);
        }
        packets += 1;
        println!("{:<8} {:<6} {:x}", packets, total, hasher.finalize());

        // Hand the same buffers back at full size.
        for buf in bufs.iter_mut() {
            buf.size = BUFFER_SIZE;
        }
        while let Err(e) = rx.post_buffers(&bufs) {
            if e.kind() != std::io::ErrorKind::WouldBlock || !running.load(Ordering::SeqCst) {
                break;
            }
            std::thread::yield_now();
        }
        bufs.clear();
    }

    println!("\n{}", "=".repeat(80));
    println!("Host: received {} packets, stats: {:?}", packets, rx.stats());

    let _ = unlink_shared_memory(QUEUE_NAME);
    let _ = unlink_shared_memory(POOL_NAME);
    Ok(())
}
