// Descriptors exchanged across the receive queue API

/// The descriptor of one receive buffer.
///
/// `offset` names a region inside a buffer pool owned by the caller; the queue
/// never touches the memory it refers to. `id` is chosen by the caller and is
/// echoed back unchanged by the peer.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct RxBuffer {
    pub offset: u64,
    pub size: u32,
    pub id: u64,
}

impl RxBuffer {
    pub fn new(offset: u64, size: u32, id: u64) -> Self {
        Self { offset, size, id }
    }
}

/// States of the shared notification word.
///
/// The numeric values are part of the protocol with the peer.
#[repr(u32)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum NotificationState {
    /// Written by setup code before the handshake; never written by the queue.
    Uninitialized = 0,
    Disabled = 1,
    Enabled = 2,
}

impl NotificationState {
    /// Decode a raw word read from shared memory. Unknown values are reported
    /// as `None` rather than guessed at.
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(Self::Uninitialized),
            1 => Some(Self::Disabled),
            2 => Some(Self::Enabled),
            _ => None,
        }
    }
}
