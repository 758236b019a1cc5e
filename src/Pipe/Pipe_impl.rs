use std::fmt;
use std::io;
use std::ptr;
use std::slice;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering::{Acquire, Relaxed, Release};

use crossbeam_utils::CachePadded;

use super::layout::{
    header_size, is_valid_capacity, pipe_region_size, slot_size, PipeHeader, PIPE_MAGIC,
    SLOT_FLAG_WRAP, SLOT_HEADER_SIZE,
};
use super::Pipe::{PipeRx, PipeTx};
use crate::Core::Region;

/// Initialize a pipe header at the start of `region`.
/// This should ONLY be called by the process that creates the pipe, before
/// either end is attached.
fn init_header(region: &Region, capacity: usize) -> io::Result<()> {
    if !is_valid_capacity(capacity) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("Pipe capacity must be a power of two >= 64, got {}", capacity),
        ));
    }
    if region.len() < pipe_region_size(capacity) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!(
                "Region too small for pipe: need {} bytes, have {}",
                pipe_region_size(capacity),
                region.len()
            ),
        ));
    }
    if (region.as_ptr() as usize) % std::mem::align_of::<PipeHeader>() != 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "Pipe region not properly aligned",
        ));
    }

    unsafe {
        ptr::write(
            region.as_ptr() as *mut PipeHeader,
            PipeHeader {
                head: CachePadded::new(AtomicU64::new(0)),
                tail: CachePadded::new(AtomicU64::new(0)),
                capacity: capacity as u64,
                magic: PIPE_MAGIC,
            },
        );
    }
    Ok(())
}

/// Validate an existing header and return its capacity.
fn attach_header(region: &Region) -> io::Result<u64> {
    if region.len() < header_size() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "Region too small for pipe header",
        ));
    }
    let header: &PipeHeader = unsafe { region.get(0) };
    if header.magic != PIPE_MAGIC {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "Invalid pipe magic - pipe not initialized",
        ));
    }
    let capacity = header.capacity as usize;
    if !is_valid_capacity(capacity) || region.len() < pipe_region_size(capacity) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "Pipe header declares capacity {} which does not fit a {}-byte region",
                capacity,
                region.len()
            ),
        ));
    }
    Ok(header.capacity)
}

/// Producer end of a ring pipe.
///
/// Reservations advance a producer-local head; `publish` is the only point
/// where the shared head moves, which is what makes a batch of reservations
/// visible to the consumer all at once.
pub struct RingTx {
    pub(crate) region: Region,
    pub(crate) capacity: u64,
    pub(crate) local_head: u64,
}

/// Consumer end of a ring pipe.
pub struct RingRx {
    pub(crate) region: Region,
    pub(crate) capacity: u64,
    pub(crate) local_tail: u64,
}

impl RingTx {
    /// Initialize a fresh pipe in `region` and return its producer end.
    pub fn init(region: Region, capacity: usize) -> io::Result<Self> {
        init_header(&region, capacity)?;
        Self::attach(region)
    }

    /// Attach as producer to a pipe initialized by someone else.
    pub fn attach(region: Region) -> io::Result<Self> {
        let capacity = attach_header(&region)?;
        let mut tx = Self {
            region,
            capacity,
            local_head: 0,
        };
        tx.local_head = tx.header().head.load(Acquire);
        Ok(tx)
    }

    #[inline]
    fn header(&self) -> &PipeHeader {
        unsafe { self.region.get(0) }
    }

    #[inline]
    fn data(&self) -> *mut u8 {
        self.region.offset(header_size())
    }

    fn write_slot_header(&mut self, pos: u64, len: u32, flags: u32) {
        let mut raw = [0u8; SLOT_HEADER_SIZE];
        raw[..4].copy_from_slice(&len.to_le_bytes());
        raw[4..].copy_from_slice(&flags.to_le_bytes());
        unsafe {
            ptr::copy_nonoverlapping(raw.as_ptr(), self.data().add(pos as usize), SLOT_HEADER_SIZE);
        }
    }

    /// Size of the data area in bytes.
    pub fn capacity(&self) -> usize {
        self.capacity as usize
    }

    /// Bytes reserved but not yet published.
    pub fn pending(&self) -> usize {
        self.local_head.wrapping_sub(self.header().head.load(Relaxed)) as usize
    }

    /// Free bytes from the producer's point of view (ignores wrap waste).
    pub fn available(&self) -> usize {
        let tail = self.header().tail.load(Acquire);
        self.capacity
            .saturating_sub(self.local_head.wrapping_sub(tail)) as usize
    }
}

impl PipeTx for RingTx {
    /// Messages are limited to `max_message_len()`: a slot of at most half
    /// the ring fits at every position, wrap marker included, once the
    /// consumer has caught up.
    fn reserve(&mut self, len: usize) -> Option<&mut [u8]> {
        if len > self.max_message_len() {
            return None;
        }
        let slot = slot_size(len)? as u64;
        let cap = self.capacity;

        let mask = cap - 1;
        let pos = self.local_head & mask;
        let to_end = cap - pos;
        let wraps = slot > to_end;
        let need = if wraps { to_end + slot } else { slot };

        let tail = self.header().tail.load(Acquire);
        if self.local_head.wrapping_sub(tail).saturating_add(need) > cap {
            return None;
        }

        if wraps {
            // positions are 8-aligned, so at least one slot header fits before the end
            self.write_slot_header(pos, 0, SLOT_FLAG_WRAP);
            self.local_head += to_end;
        }

        let pos = self.local_head & mask;
        self.write_slot_header(pos, len as u32, 0);
        self.local_head += slot;

        let start = pos as usize + SLOT_HEADER_SIZE;
        Some(unsafe { slice::from_raw_parts_mut(self.data().add(start), len) })
    }

    fn publish(&mut self) {
        self.header().head.store(self.local_head, Release);
    }

    fn abort(&mut self) {
        self.local_head = self.header().head.load(Relaxed);
    }

    fn max_message_len(&self) -> usize {
        (self.capacity / 2) as usize - SLOT_HEADER_SIZE
    }
}

impl RingRx {
    /// Initialize a fresh pipe in `region` and return its consumer end.
    pub fn init(region: Region, capacity: usize) -> io::Result<Self> {
        init_header(&region, capacity)?;
        Self::attach(region)
    }

    /// Attach as consumer to a pipe initialized by someone else.
    pub fn attach(region: Region) -> io::Result<Self> {
        let capacity = attach_header(&region)?;
        let mut rx = Self {
            region,
            capacity,
            local_tail: 0,
        };
        rx.local_tail = rx.header().tail.load(Acquire);
        Ok(rx)
    }

    #[inline]
    fn header(&self) -> &PipeHeader {
        unsafe { self.region.get(0) }
    }

    #[inline]
    fn data(&self) -> *mut u8 {
        self.region.offset(header_size())
    }

    fn read_slot_header(&self, pos: u64) -> (u32, u32) {
        let mut raw = [0u8; SLOT_HEADER_SIZE];
        unsafe {
            ptr::copy_nonoverlapping(self.data().add(pos as usize), raw.as_mut_ptr(), SLOT_HEADER_SIZE);
        }
        let len = u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]);
        let flags = u32::from_le_bytes([raw[4], raw[5], raw[6], raw[7]]);
        (len, flags)
    }

    /// Size of the data area in bytes.
    pub fn capacity(&self) -> usize {
        self.capacity as usize
    }

    /// True if every published message has been pulled.
    pub fn is_empty(&self) -> bool {
        self.header().head.load(Acquire) == self.local_tail
    }

    /// Skip everything the producer has published so far. Used when the
    /// framing written by the peer cannot be trusted any more.
    fn resync(&mut self, head: u64, pos: u64, reason: &'static str) {
        tracing::warn!(
            position = pos,
            skipped = head.wrapping_sub(self.local_tail),
            reason,
            "corrupt pipe framing, resynchronizing at producer head"
        );
        self.local_tail = head;
    }
}

impl PipeRx for RingRx {
    fn pull(&mut self) -> Option<&[u8]> {
        let head = self.header().head.load(Acquire);
        let cap = self.capacity;
        let mask = cap - 1;

        loop {
            let avail = head.wrapping_sub(self.local_tail);
            if avail == 0 {
                return None;
            }

            let pos = self.local_tail & mask;
            let to_end = cap - pos;
            if avail > cap || avail < SLOT_HEADER_SIZE as u64 || pos % SLOT_HEADER_SIZE as u64 != 0 {
                self.resync(head, pos, "published range is not slot aligned");
                return Some(&[]);
            }

            let (len, flags) = self.read_slot_header(pos);
            if flags & SLOT_FLAG_WRAP != 0 {
                if to_end > avail {
                    self.resync(head, pos, "wrap marker past published head");
                    return Some(&[]);
                }
                self.local_tail += to_end;
                continue;
            }

            let slot = match slot_size(len as usize) {
                Some(slot) if slot as u64 <= to_end && slot as u64 <= avail => slot as u64,
                _ => {
                    self.resync(head, pos, "slot length exceeds published bytes");
                    return Some(&[]);
                }
            };

            self.local_tail += slot;
            let start = pos as usize + SLOT_HEADER_SIZE;
            return Some(unsafe { slice::from_raw_parts(self.data().add(start), len as usize) });
        }
    }

    fn acknowledge(&mut self) {
        self.header().tail.store(self.local_tail, Release);
    }
}

impl fmt::Debug for RingTx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        crate::Debug::StructDebug::debug_ring_tx(self, f)
    }
}

impl fmt::Debug for RingRx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        crate::Debug::StructDebug::debug_ring_rx(self, f)
    }
}
