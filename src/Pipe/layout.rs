use crossbeam_utils::CachePadded;
use std::mem::size_of;
use std::sync::atomic::AtomicU64;

/// Identifies an initialized pipe header ("DMXPPIPE").
pub const PIPE_MAGIC: u64 = 0x4550_4950_5058_4D44;

/// Smallest data area a pipe may be created with.
pub const MIN_PIPE_CAPACITY: usize = 64;

/// Every message starts with an 8-byte slot header: `len: u32`, `flags: u32`,
/// both little-endian.
pub const SLOT_HEADER_SIZE: usize = 8;

/// Slots (and therefore positions in the ring) are kept 8-byte aligned.
pub const SLOT_ALIGN: usize = 8;

/// Set in a slot header that carries no message: the reader skips to the
/// start of the ring.
pub const SLOT_FLAG_WRAP: u32 = 1;

/// Control block at the start of every pipe region.
///
/// `head` and `tail` are free-running byte positions; the position inside the
/// data area is `pos & (capacity - 1)`. The producer owns `head`, the consumer
/// owns `tail`, and each only ever reads the other's cursor.
#[repr(C, align(128))]
pub struct PipeHeader {
    /// Published write position. Stored with Release by the producer.
    pub head: CachePadded<AtomicU64>,

    /// Released read position. Stored with Release by the consumer.
    pub tail: CachePadded<AtomicU64>,

    /// Size of the data area in bytes (power of two, immutable after init).
    pub capacity: u64,

    /// `PIPE_MAGIC` once the creator has initialized the header.
    pub magic: u64,
}

/// Size of the header, which is also the offset of the data area.
#[inline]
pub const fn header_size() -> usize {
    size_of::<PipeHeader>()
}

/// Bytes a pipe region needs for a data area of `capacity` bytes.
#[inline]
pub const fn pipe_region_size(capacity: usize) -> usize {
    header_size() + capacity
}

/// Bytes a message of `payload` bytes occupies in the ring, or `None` if the
/// payload cannot be described by a slot header.
#[inline]
pub fn slot_size(payload: usize) -> Option<usize> {
    if payload > u32::MAX as usize {
        return None;
    }
    let padded = payload.checked_add(SLOT_ALIGN - 1)? & !(SLOT_ALIGN - 1);
    padded.checked_add(SLOT_HEADER_SIZE)
}

/// Pipe capacities must be a power of two and at least `MIN_PIPE_CAPACITY`.
#[inline]
pub fn is_valid_capacity(capacity: usize) -> bool {
    capacity >= MIN_PIPE_CAPACITY && capacity.is_power_of_two()
}
