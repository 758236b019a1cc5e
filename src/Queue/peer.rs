use std::io;

use super::codec::{
    decode_posted_buffer, encode_consumed_buffer, encode_packet_header, packet_len,
    CONSUMED_BUFFER_SIZE, PACKET_HEADER_SIZE, POSTED_BUFFER_SIZE,
};
use super::notify::{Doorbell, NotificationFlag};
use crate::Pipe::{PipeRx, PipeTx, RingRx, RingTx};
use crate::Structs::RxBuffer;

/// The far end of a receive queue: takes posted buffers, fills them, and
/// hands them back as packets.
///
/// After publishing a packet it rings the doorbell, but only while the
/// receiver has notifications enabled.
#[derive(Debug)]
pub struct RxPeer<R: PipeRx = RingRx, T: PipeTx = RingTx> {
    posted: R,
    completed: T,
    notification: NotificationFlag,
    doorbell: Option<Doorbell>,
}

impl<R: PipeRx, T: PipeTx> RxPeer<R, T> {
    pub fn new(
        posted: R,
        completed: T,
        notification: NotificationFlag,
        doorbell: Option<Doorbell>,
    ) -> Self {
        Self {
            posted,
            completed,
            notification,
            doorbell,
        }
    }

    /// Append every posted buffer currently visible to `out`, returning how
    /// many were taken.
    pub fn take_posted(&mut self, out: &mut Vec<RxBuffer>) -> usize {
        let mut taken = 0;
        while let Some(msg) = self.posted.pull() {
            if msg.len() < POSTED_BUFFER_SIZE {
                tracing::warn!(len = msg.len(), "ignoring short posted buffer record");
                continue;
            }
            out.push(decode_posted_buffer(msg));
            taken += 1;
        }
        self.posted.acknowledge();
        taken
    }

    /// Publish one packet made of `buffers`, declaring the sum of their sizes.
    pub fn complete(&mut self, buffers: &[RxBuffer]) -> io::Result<()> {
        let total = buffers
            .iter()
            .try_fold(0u32, |acc, b| acc.checked_add(b.size))
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "Packet data size overflows 32 bits",
                )
            })?;
        self.complete_with_total(total, buffers)
    }

    /// Publish one packet with an explicit header total, which need not
    /// match the buffers.
    pub fn complete_with_total(&mut self, total: u32, buffers: &[RxBuffer]) -> io::Result<()> {
        let len = packet_len(buffers.len());
        self.check_len(len)?;
        let Some(window) = self.completed.reserve(len) else {
            self.completed.abort();
            return Err(io::Error::new(
                io::ErrorKind::WouldBlock,
                "Completion pipe full",
            ));
        };

        let (header, records) = window.split_at_mut(PACKET_HEADER_SIZE);
        encode_packet_header(total, header);
        for (record, buf) in records.chunks_exact_mut(CONSUMED_BUFFER_SIZE).zip(buffers) {
            encode_consumed_buffer(buf, record);
        }

        self.completed.publish();
        self.notify();
        Ok(())
    }

    /// Publish `bytes` as one message on the completion pipe, framing
    /// unchecked.
    pub fn send_raw(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.check_len(bytes.len())?;
        let Some(window) = self.completed.reserve(bytes.len()) else {
            self.completed.abort();
            return Err(io::Error::new(
                io::ErrorKind::WouldBlock,
                "Completion pipe full",
            ));
        };
        window.copy_from_slice(bytes);
        self.completed.publish();
        self.notify();
        Ok(())
    }

    fn check_len(&self, len: usize) -> io::Result<()> {
        let max = self.completed.max_message_len();
        if len > max {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("Packet of {} bytes exceeds the {}-byte pipe limit", len, max),
            ));
        }
        Ok(())
    }

    fn notify(&self) {
        if !self.notification.is_enabled() {
            return;
        }
        if let Some(doorbell) = &self.doorbell {
            doorbell.ring();
        }
    }

    pub fn notification(&self) -> &NotificationFlag {
        &self.notification
    }
}
