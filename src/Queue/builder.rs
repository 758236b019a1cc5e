use std::io;
use std::mem::size_of;
use std::ptr;
use std::sync::atomic::Ordering::{Acquire, Release};
use std::sync::atomic::{AtomicU32, AtomicU64};
use std::sync::Arc;

use super::layout::{
    completed_pipe_offset, control_size, posted_pipe_offset, queue_region_size, ControlBlock,
    DOORBELL_OFFSET, NOTIFICATION_OFFSET, QUEUE_MAGIC, QUEUE_VERSION,
};
use super::notify::{Doorbell, NotificationFlag};
use super::{Rx, RxPeer};
use crate::Core::{attach_shared_memory, create_shared_memory, Region};
use crate::Pipe::layout::{is_valid_capacity, pipe_region_size};
use crate::Pipe::{RingRx, RingTx};
use crate::Structs::NotificationState;

/// Smallest pipe whose message limit (half the ring) still fits a posted
/// buffer record.
pub const MIN_QUEUE_PIPE_SIZE: usize = 128;

/// Lays out a receive queue (control block + two pipes) in one region.
///
/// The receiving side creates the region with `build_queue`; the peer process
/// attaches to it by name with `attach_peer`. `build_pair` puts both ends in
/// process-local memory.
pub struct QueueBuilder {
    pipe_size: usize,
    name: String,
}

impl Default for QueueBuilder {
    fn default() -> Self {
        Self {
            pipe_size: 64 * 1024, // 64KB per pipe
            name: "dmxp_rxq".to_string(),
        }
    }
}

impl QueueBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Data-area size of each pipe. Must be a power of two of at least 128 bytes.
    pub fn with_pipe_size(mut self, size: usize) -> Self {
        self.pipe_size = size;
        self
    }

    /// Name of the region under /dev/shm.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Total bytes of the queue region this builder lays out.
    pub fn region_size(&self) -> usize {
        queue_region_size(self.pipe_size)
    }

    fn validate(&self) -> io::Result<()> {
        if !is_valid_capacity(self.pipe_size)
            || self.pipe_size < MIN_QUEUE_PIPE_SIZE
            || self.pipe_size > u32::MAX as usize
        {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "Pipe size must be a power of two between {} and 2^31, got {}",
                    MIN_QUEUE_PIPE_SIZE, self.pipe_size
                ),
            ));
        }
        Ok(())
    }

    /// Create the named shared region and return the receive queue plus the
    /// doorbell its owner can sleep on.
    pub fn build_queue(self) -> io::Result<(Rx, Doorbell)> {
        self.validate()?;
        let shm = create_shared_memory(self.region_size(), Some(&self.name))?;
        let region = Region::new(Arc::from(shm));
        init_region(&region, self.pipe_size)
    }

    /// Attach to a region created by `build_queue` in another process.
    pub fn attach_peer(self) -> io::Result<RxPeer> {
        let shm = attach_shared_memory(&self.name, control_size())?;
        attach_region(&Region::new(Arc::from(shm)))
    }

    /// Both ends in process-local memory.
    pub fn build_pair(self) -> io::Result<(Rx, RxPeer, Doorbell)> {
        self.validate()?;
        let region = Region::heap(self.region_size())?;
        let (rx, doorbell) = init_region(&region, self.pipe_size)?;
        let peer = attach_region(&region)?;
        Ok((rx, peer, doorbell))
    }
}

fn word(region: &Region, offset: usize) -> io::Result<Region> {
    region.sub_region(offset, size_of::<AtomicU32>())
}

/// Initialize a queue region. This should ONLY be called by the creator.
fn init_region(region: &Region, pipe_size: usize) -> io::Result<(Rx, Doorbell)> {
    let needed = queue_region_size(pipe_size);
    if region.len() < needed {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!(
                "Queue region too small: need {} bytes, have {}",
                needed,
                region.len()
            ),
        ));
    }

    let region_len = pipe_region_size(pipe_size);
    let tx = RingTx::init(region.sub_region(posted_pipe_offset(), region_len)?, pipe_size)?;
    let rx = RingRx::init(
        region.sub_region(completed_pipe_offset(pipe_size), region_len)?,
        pipe_size,
    )?;

    unsafe {
        ptr::write(
            region.as_ptr() as *mut ControlBlock,
            ControlBlock {
                magic: AtomicU64::new(0),
                version: QUEUE_VERSION,
                pipe_size: pipe_size as u32,
                notification: AtomicU32::new(NotificationState::Uninitialized as u32),
                doorbell: AtomicU32::new(0),
            },
        );
    }

    // Publish: everything above happens-before a peer's Acquire load of the magic.
    let control: &ControlBlock = unsafe { region.get(0) };
    control.magic.store(QUEUE_MAGIC, Release);

    let notification = NotificationFlag::from_region(word(region, NOTIFICATION_OFFSET)?)?;
    let doorbell = Doorbell::from_region(word(region, DOORBELL_OFFSET)?)?;

    tracing::debug!(pipe_size, region_size = needed, "receive queue region initialized");
    Ok((Rx::init(tx, rx, notification), doorbell))
}

fn attach_region(region: &Region) -> io::Result<RxPeer> {
    if region.len() < control_size() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "Shared memory too small for queue control block",
        ));
    }

    let control: &ControlBlock = unsafe { region.get(0) };
    if control.magic.load(Acquire) != QUEUE_MAGIC {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "Invalid magic number - queue region not properly initialized",
        ));
    }
    if control.version != QUEUE_VERSION {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "Unsupported queue layout version {} (expected {})",
                control.version, QUEUE_VERSION
            ),
        ));
    }

    let pipe_size = control.pipe_size as usize;
    if !is_valid_capacity(pipe_size) || region.len() < queue_region_size(pipe_size) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "Queue region of {} bytes cannot hold pipes of {} bytes",
                region.len(),
                pipe_size
            ),
        ));
    }

    let region_len = pipe_region_size(pipe_size);
    let posted = RingRx::attach(region.sub_region(posted_pipe_offset(), region_len)?)?;
    let completed = RingTx::attach(region.sub_region(completed_pipe_offset(pipe_size), region_len)?)?;
    let notification = NotificationFlag::from_region(word(region, NOTIFICATION_OFFSET)?)?;
    let doorbell = Doorbell::from_region(word(region, DOORBELL_OFFSET)?)?;

    Ok(RxPeer::new(posted, completed, notification, Some(doorbell)))
}
