// Filling side: attaches to the host's queue and pool, writes a message into
// each posted buffer and hands it back as a one-buffer packet.
use dmxp_shmlink::Core::attach_shared_memory;
use dmxp_shmlink::{QueueBuilder, RxBuffer};
use sha2::{Digest, Sha256};
use std::env;
use std::time::{Duration, Instant};

const QUEUE_NAME: &str = "dmxp_demo_rxq";
const POOL_NAME: &str = "dmxp_demo_pool";
const BUFFER_SIZE: u32 = 2048;
const BUFFER_COUNT: u64 = 64;

fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <packets>", args[0]);
        std::process::exit(1);
    }
    let packets: u64 = match args[1].parse() {
        Ok(n) => n,
        Err(e) => {
            eprintln!("Invalid number of packets: {}", e);
            std::process::exit(1);
        }
    };

    let mut peer = QueueBuilder::new().with_name(QUEUE_NAME).attach_peer()?;
    let pool = attach_shared_memory(POOL_NAME, (BUFFER_SIZE as u64 * BUFFER_COUNT) as usize)?;
    println!("Peer: attached to {}", QUEUE_NAME);

    let mut available: Vec<RxBuffer> = Vec::new();
    let mut sent = 0u64;
    let start = Instant::now();

    while sent < packets {
        if available.is_empty() && peer.take_posted(&mut available) == 0 {
            if start.elapsed() > Duration::from_secs(10) {
                eprintln!("Timeout waiting for posted buffers");
                break;
            }
            std::thread::sleep(Duration::from_millis(1));
            continue;
        }
        let Some(mut buf) = available.pop() else {
            continue;
        };

        let message = format!("packet {} from pid {}", sent, std::process::id());
        let len = message.len().min(buf.size as usize);
        if buf.offset as usize + len > pool.size() {
            eprintln!("Peer: posted buffer {} lies outside the pool", buf.id);
            continue;
        }
        unsafe {
            std::ptr::copy_nonoverlapping(
                message.as_ptr(),
                pool.as_ptr().add(buf.offset as usize),
                len,
            );
        }
        buf.size = len as u32;

        while let Err(e) = peer.complete(&[buf]) {
            if e.kind() != std::io::ErrorKind::WouldBlock {
                return Err(e);
            }
            std::thread::yield_now();
        }

        println!("{:<8} {:x}", sent, Sha256::digest(&message.as_bytes()[..len]));
        sent += 1;
    }

    let elapsed = start.elapsed();
    println!(
        "Peer: completed {} packets in {:.2?} ({:.2} packets/second)",
        sent,
        elapsed,
        sent as f64 / elapsed.as_secs_f64()
    );
    Ok(())
}
