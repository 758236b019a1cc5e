//! Wire formats shared with the peer.
//!
//! Every record has a fixed size and all integers are little-endian. The
//! offsets below must match the peer byte for byte.
//!
//! The encoders and decoders take slices and check the window length before
//! touching any field. The queue only ever hands in windows of the exact
//! record size, so a short window is a programming error and panics.

use crate::Structs::RxBuffer;

// Offsets within a posted buffer.
const POSTED_OFFSET: usize = 0;
const POSTED_SIZE: usize = 8;
const POSTED_REMAINING_IN_GROUP: usize = 12;
const POSTED_USER_DATA: usize = 16;
const POSTED_ID: usize = 24;

/// Size of a posted-buffer record.
pub const POSTED_BUFFER_SIZE: usize = 32;

// Offsets within a consumed packet header.
const PACKET_TOTAL_SIZE: usize = 0;
const PACKET_RESERVED: usize = 4;

/// Size of the header that starts every consumed packet.
pub const PACKET_HEADER_SIZE: usize = 8;

// Offsets within a consumed buffer.
const CONSUMED_OFFSET: usize = 0;
const CONSUMED_SIZE: usize = 8;
const CONSUMED_USER_DATA: usize = 12;
const CONSUMED_ID: usize = 20;

/// Size of a consumed-buffer record.
pub const CONSUMED_BUFFER_SIZE: usize = 28;

/// Decoded consumed-packet header.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct PacketHeader {
    /// Sum of payload bytes across the packet, as declared by the peer.
    pub total_data_size: u32,
    pub reserved: u32,
}

#[inline]
fn check_window(window: &[u8], need: usize, what: &str) {
    assert!(
        window.len() >= need,
        "{what} window too short: {} < {need}",
        window.len()
    );
}

#[inline]
fn put_u32(b: &mut [u8], off: usize, v: u32) {
    b[off..off + 4].copy_from_slice(&v.to_le_bytes());
}

#[inline]
fn put_u64(b: &mut [u8], off: usize, v: u64) {
    b[off..off + 8].copy_from_slice(&v.to_le_bytes());
}

#[inline]
fn get_u32(b: &[u8], off: usize) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&b[off..off + 4]);
    u32::from_le_bytes(raw)
}

#[inline]
fn get_u64(b: &[u8], off: usize) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&b[off..off + 8]);
    u64::from_le_bytes(raw)
}

/// Encode `buf` as a posted-buffer record. Grouping and user data are unused
/// on post and written as zero.
pub fn encode_posted_buffer(buf: &RxBuffer, window: &mut [u8]) {
    check_window(window, POSTED_BUFFER_SIZE, "posted buffer");
    put_u64(window, POSTED_OFFSET, buf.offset);
    put_u32(window, POSTED_SIZE, buf.size);
    put_u32(window, POSTED_REMAINING_IN_GROUP, 0);
    put_u64(window, POSTED_USER_DATA, 0);
    put_u64(window, POSTED_ID, buf.id);
}

/// Decode a posted-buffer record (peer side).
pub fn decode_posted_buffer(window: &[u8]) -> RxBuffer {
    check_window(window, POSTED_BUFFER_SIZE, "posted buffer");
    RxBuffer {
        offset: get_u64(window, POSTED_OFFSET),
        size: get_u32(window, POSTED_SIZE),
        id: get_u64(window, POSTED_ID),
    }
}

/// Encode a consumed-packet header (peer side). The reserved word is zeroed.
pub fn encode_packet_header(total_data_size: u32, window: &mut [u8]) {
    check_window(window, PACKET_HEADER_SIZE, "packet header");
    put_u32(window, PACKET_TOTAL_SIZE, total_data_size);
    put_u32(window, PACKET_RESERVED, 0);
}

pub fn decode_packet_header(window: &[u8]) -> PacketHeader {
    check_window(window, PACKET_HEADER_SIZE, "packet header");
    PacketHeader {
        total_data_size: get_u32(window, PACKET_TOTAL_SIZE),
        reserved: get_u32(window, PACKET_RESERVED),
    }
}

/// Encode a consumed-buffer record (peer side). User data is zeroed.
pub fn encode_consumed_buffer(buf: &RxBuffer, window: &mut [u8]) {
    check_window(window, CONSUMED_BUFFER_SIZE, "consumed buffer");
    put_u64(window, CONSUMED_OFFSET, buf.offset);
    put_u32(window, CONSUMED_SIZE, buf.size);
    put_u64(window, CONSUMED_USER_DATA, 0);
    put_u64(window, CONSUMED_ID, buf.id);
}

/// Decode a consumed-buffer record. User data is ignored.
pub fn decode_consumed_buffer(window: &[u8]) -> RxBuffer {
    check_window(window, CONSUMED_BUFFER_SIZE, "consumed buffer");
    RxBuffer {
        offset: get_u64(window, CONSUMED_OFFSET),
        size: get_u32(window, CONSUMED_SIZE),
        id: get_u64(window, CONSUMED_ID),
    }
}

/// Only the size field of a consumed-buffer record, for validation passes
/// that do not need the whole descriptor.
#[inline]
pub fn consumed_buffer_size(window: &[u8]) -> u32 {
    check_window(window, CONSUMED_BUFFER_SIZE, "consumed buffer");
    get_u32(window, CONSUMED_SIZE)
}

/// Length of a consumed packet carrying `count` buffer records.
#[inline]
pub const fn packet_len(count: usize) -> usize {
    PACKET_HEADER_SIZE + count * CONSUMED_BUFFER_SIZE
}
