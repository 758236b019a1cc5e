use std::mem::size_of;
use std::sync::atomic::{AtomicU32, AtomicU64};

use crate::Pipe::layout::pipe_region_size;

/// A "magic number" to identify a region as a DMXP receive queue ("DMXP_RXQ").
pub const QUEUE_MAGIC: u64 = 0x5158_525F_5058_4D44;

/// The version of the queue region layout.
pub const QUEUE_VERSION: u32 = 1;

/// Sub-regions inside a queue region start on this boundary.
pub const QUEUE_ALIGN: usize = 128;

/// The control block located at the very beginning of a queue region.
///
/// Region layout:
/// ```text
/// [ControlBlock][posted pipe: header + data][completed pipe: header + data]
/// ```
/// The posted pipe carries empty buffers from the queue to the peer, the
/// completed pipe carries filled packets back.
#[repr(C, align(128))]
pub struct ControlBlock {
    /// `QUEUE_MAGIC` once the region is fully initialized. Stored last with
    /// Release; attachers load it with Acquire.
    pub magic: AtomicU64,

    pub version: u32,

    /// Data-area size of each of the two pipes, in bytes.
    pub pipe_size: u32,

    /// Notification word (see `NotificationState`). The queue writes it, the
    /// peer reads it before deciding whether to ring the doorbell.
    pub notification: AtomicU32,

    /// Futex word bumped by the peer to wake a sleeping receiver.
    pub doorbell: AtomicU32,
}

#[inline]
const fn align_up(n: usize) -> usize {
    (n + QUEUE_ALIGN - 1) & !(QUEUE_ALIGN - 1)
}

#[inline]
pub const fn control_size() -> usize {
    align_up(size_of::<ControlBlock>())
}

/// Byte offset of the notification word.
pub const NOTIFICATION_OFFSET: usize = 16;

/// Byte offset of the doorbell word.
pub const DOORBELL_OFFSET: usize = 20;

#[inline]
pub const fn posted_pipe_offset() -> usize {
    control_size()
}

#[inline]
pub const fn completed_pipe_offset(pipe_size: usize) -> usize {
    posted_pipe_offset() + align_up(pipe_region_size(pipe_size))
}

/// Total bytes a queue region needs for two pipes of `pipe_size` bytes each.
#[inline]
pub const fn queue_region_size(pipe_size: usize) -> usize {
    completed_pipe_offset(pipe_size) + align_up(pipe_region_size(pipe_size))
}
