use std::fmt;
use std::sync::atomic::Ordering;

use crate::Core::Region;
use crate::Pipe::layout::PipeHeader;
use crate::Pipe::{PipeRx, PipeTx, RingRx, RingTx};
use crate::Queue::Rx;

/// Debug function for Region
///
/// Shows the window without dereferencing the shared bytes
pub fn debug_region(region: &Region, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Region")
        .field("base", &format_args!("{:p}", region.as_ptr()))
        .field("len", &region.len())
        .field("handle", &region.backend().raw_handle())
        .finish()
}

/// Debug function for RingTx
///
/// Shows:
/// - Capacity of the data area
/// - Published head and released tail from the shared header
/// - Producer-local head (includes unpublished reservations)
pub fn debug_ring_tx(tx: &RingTx, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let header: &PipeHeader = unsafe { tx.region.get(0) };
    f.debug_struct("RingTx")
        .field("capacity", &tx.capacity)
        .field("head", &header.head.load(Ordering::Relaxed))
        .field("tail", &header.tail.load(Ordering::Relaxed))
        .field("local_head", &tx.local_head)
        .finish()
}

/// Debug function for RingRx
pub fn debug_ring_rx(rx: &RingRx, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let header: &PipeHeader = unsafe { rx.region.get(0) };
    f.debug_struct("RingRx")
        .field("capacity", &rx.capacity)
        .field("head", &header.head.load(Ordering::Relaxed))
        .field("tail", &header.tail.load(Ordering::Relaxed))
        .field("local_tail", &rx.local_tail)
        .finish()
}

/// Debug function for the receive queue
pub fn debug_rx_queue<T, R>(queue: &Rx<T, R>, f: &mut fmt::Formatter<'_>) -> fmt::Result
where
    T: PipeTx + fmt::Debug,
    R: PipeRx + fmt::Debug,
{
    f.debug_struct("Rx")
        .field("outbound", &queue.tx)
        .field("inbound", &queue.rx)
        .field("notification", &queue.notification)
        .field("stats", &queue.stats)
        .finish()
}
