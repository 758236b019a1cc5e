use std::fmt;
use std::io;
use std::time::Duration;

use super::codec::{
    decode_consumed_buffer, decode_packet_header, encode_posted_buffer, CONSUMED_BUFFER_SIZE,
    PACKET_HEADER_SIZE, POSTED_BUFFER_SIZE,
};
use super::notify::{Doorbell, NotificationFlag};
use crate::Pipe::{PipeRx, PipeTx, RingRx, RingTx};
use crate::Structs::RxBuffer;

/// Why an inbound packet was discarded.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DropReason {
    /// The message cannot even hold a packet header.
    ShortHeader { len: usize },
    /// The descriptors account for fewer bytes than the header declares.
    SizeMismatch { declared: u32, actual: u32 },
    /// The descriptor sizes do not fit in 32 bits.
    SizeOverflow { declared: u32 },
}

/// Verdict on one inbound message.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Packet {
    Accepted { total_data_size: u32, count: usize },
    Dropped(DropReason),
}

/// Validate a consumed packet without keeping its descriptors.
///
/// The record count is `(len - 8) / 28`; trailing bytes that do not form a
/// whole record are ignored. A packet is accepted when its descriptor sizes
/// add up to at least the declared total.
pub fn inspect_packet(msg: &[u8]) -> Packet {
    check_packet(msg, |_| {})
}

/// Decode `msg` into `bufs`, reading every field of the message exactly once.
///
/// The bytes live in memory the peer can still write, so the sizes that are
/// validated must be the sizes that are returned. On a drop `bufs` is cut
/// back to its original length.
fn decode_packet(msg: &[u8], bufs: &mut Vec<RxBuffer>) -> Packet {
    let start = bufs.len();
    let packet = check_packet(msg, |buf| bufs.push(buf));
    if let Packet::Dropped(_) = packet {
        bufs.truncate(start);
    }
    packet
}

/// Shared validation pass. Each record is decoded once and the decoded copy
/// is both summed and handed to `keep`.
fn check_packet(msg: &[u8], mut keep: impl FnMut(RxBuffer)) -> Packet {
    if msg.len() < PACKET_HEADER_SIZE {
        return Packet::Dropped(DropReason::ShortHeader { len: msg.len() });
    }
    let (header, records) = msg.split_at(PACKET_HEADER_SIZE);
    let declared = decode_packet_header(header).total_data_size;

    let mut buffers_size = 0u32;
    let mut count = 0usize;
    for record in records.chunks_exact(CONSUMED_BUFFER_SIZE) {
        let buf = decode_consumed_buffer(record);
        buffers_size = match buffers_size.checked_add(buf.size) {
            Some(sum) => sum,
            None => return Packet::Dropped(DropReason::SizeOverflow { declared }),
        };
        keep(buf);
        count += 1;
    }

    if buffers_size < declared {
        return Packet::Dropped(DropReason::SizeMismatch {
            declared,
            actual: buffers_size,
        });
    }

    Packet::Accepted {
        total_data_size: declared,
        count,
    }
}

/// Counters kept by a receive queue.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct RxStats {
    /// Buffers made visible to the peer.
    pub posted: u64,
    /// Packets accepted by `dequeue`.
    pub received: u64,
    /// Messages too short to hold a header.
    pub dropped_malformed: u64,
    /// Packets whose sizes did not add up.
    pub dropped_corrupt: u64,
}

/// A receive queue.
///
/// Built from two pipes: the outbound pipe is used to "post" empty buffers to
/// the peer, the inbound pipe delivers packets whose contents the peer has
/// written into previously posted buffers.
///
/// `post_buffers` and `dequeue` take `&mut self`; callers that share a queue
/// across threads must serialize those calls themselves. The notification
/// flag is separate shared state and can be flipped from anywhere through
/// `notifier()`.
pub struct Rx<T: PipeTx = RingTx, R: PipeRx = RingRx> {
    pub(crate) tx: T,
    pub(crate) rx: R,
    pub(crate) notification: NotificationFlag,
    pub(crate) stats: RxStats,
}

impl<T: PipeTx, R: PipeRx> Rx<T, R> {
    /// Bind a queue to an outbound pipe (for posting), an inbound pipe (for
    /// receiving) and the notification word shared with the peer.
    pub fn init(tx: T, rx: R, notification: NotificationFlag) -> Self {
        Self {
            tx,
            rx,
            notification,
            stats: RxStats::default(),
        }
    }

    /// Have the peer signal when there are packets to be dequeued.
    pub fn enable_notification(&self) {
        self.notification.enable();
    }

    /// Have the peer stop signalling; the owner will poll.
    pub fn disable_notification(&self) {
        self.notification.disable();
    }

    /// A handle to the notification word that can be moved to other threads.
    pub fn notifier(&self) -> NotificationFlag {
        self.notification.clone()
    }

    /// Make `buffers` available to the peer for receiving data.
    ///
    /// Either every buffer becomes visible to the peer in one step, or none
    /// does: if the outbound pipe runs out of space part-way, the
    /// reservations made so far are aborted and `WouldBlock` is returned so
    /// the caller can retry later.
    pub fn post_buffers(&mut self, buffers: &[RxBuffer]) -> io::Result<()> {
        if buffers.is_empty() {
            return Ok(());
        }
        if POSTED_BUFFER_SIZE > self.tx.max_message_len() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "Outbound pipe cannot carry {}-byte posted buffer records",
                    POSTED_BUFFER_SIZE
                ),
            ));
        }

        for (i, buf) in buffers.iter().enumerate() {
            let Some(window) = self.tx.reserve(POSTED_BUFFER_SIZE) else {
                self.tx.abort();
                tracing::debug!(
                    reserved = i,
                    batch = buffers.len(),
                    "outbound pipe full, batch aborted"
                );
                return Err(io::Error::new(
                    io::ErrorKind::WouldBlock,
                    format!(
                        "Outbound pipe full after {} of {} buffers",
                        i,
                        buffers.len()
                    ),
                ));
            };
            encode_posted_buffer(buf, window);
        }

        self.tx.publish();
        self.stats.posted += buffers.len() as u64;
        tracing::trace!(count = buffers.len(), "posted receive buffers");
        Ok(())
    }

    /// Receive the buffers of the next well-formed packet.
    ///
    /// Like `Vec::extend`, descriptors are appended to `bufs`; it only
    /// reallocates when it lacks capacity. Returns the packet's declared data
    /// size, or 0 with `bufs` untouched when no packet is available.
    /// Malformed or corrupt packets are logged, released and skipped.
    pub fn dequeue(&mut self, bufs: &mut Vec<RxBuffer>) -> u32 {
        self.next_packet(bufs).unwrap_or(0)
    }

    /// Like `dequeue`, but sleeps on `doorbell` for up to `timeout` when the
    /// inbound pipe is empty.
    ///
    /// Notifications are enabled only while sleeping, and the pipe is checked
    /// again after enabling them so a packet published in between is not
    /// missed. Returns the declared size of the one packet received, or `None`
    /// if nothing arrived in time.
    pub fn wait_dequeue(
        &mut self,
        bufs: &mut Vec<RxBuffer>,
        doorbell: &Doorbell,
        timeout: Option<Duration>,
    ) -> Option<u32> {
        if let Some(total) = self.next_packet(bufs) {
            return Some(total);
        }

        let seen = doorbell.sequence();
        self.enable_notification();
        let mut received = self.next_packet(bufs);
        if received.is_none() && doorbell.wait(seen, timeout) {
            received = self.next_packet(bufs);
        }
        self.disable_notification();
        received
    }

    fn next_packet(&mut self, bufs: &mut Vec<RxBuffer>) -> Option<u32> {
        loop {
            let msg = self.rx.pull()?;
            let packet = decode_packet(msg, bufs);

            // The ring space is released whatever the verdict.
            self.rx.acknowledge();

            match packet {
                Packet::Accepted {
                    total_data_size,
                    count,
                } => {
                    self.stats.received += 1;
                    tracing::trace!(total_data_size, buffers = count, "dequeued packet");
                    return Some(total_data_size);
                }
                Packet::Dropped(reason) => self.record_drop(reason),
            }
        }
    }

    fn record_drop(&mut self, reason: DropReason) {
        match reason {
            DropReason::ShortHeader { len } => {
                self.stats.dropped_malformed += 1;
                tracing::warn!(
                    len,
                    header_size = PACKET_HEADER_SIZE,
                    "ignoring packet: size is less than header size"
                );
            }
            DropReason::SizeMismatch { declared, actual } => {
                self.stats.dropped_corrupt += 1;
                tracing::warn!(
                    actual,
                    declared,
                    "ignoring packet: actual data size less than expected size"
                );
            }
            DropReason::SizeOverflow { declared } => {
                self.stats.dropped_corrupt += 1;
                tracing::warn!(declared, "ignoring packet: buffer sizes overflow 32 bits");
            }
        }
    }

    pub fn stats(&self) -> RxStats {
        self.stats
    }

    /// The outbound pipe, for diagnostics.
    pub fn outbound(&self) -> &T {
        &self.tx
    }

    /// The inbound pipe, for diagnostics.
    pub fn inbound(&self) -> &R {
        &self.rx
    }
}

impl<T: PipeTx + fmt::Debug, R: PipeRx + fmt::Debug> fmt::Debug for Rx<T, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        crate::Debug::StructDebug::debug_rx_queue(self, f)
    }
}
