use std::fmt;
use std::io;
use std::mem::{align_of, size_of};
use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering::{Acquire, Release};
use std::time::Duration;

use crate::Core::futex::{futex_wait, futex_wake};
use crate::Core::Region;
use crate::Structs::NotificationState;

fn word_at(region: &Region, what: &str) -> io::Result<()> {
    if region.len() < size_of::<AtomicU32>() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{what} region smaller than a 32-bit word"),
        ));
    }
    if (region.as_ptr() as usize) % align_of::<AtomicU32>() != 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{what} word not 4-byte aligned"),
        ));
    }
    Ok(())
}

/// Handle to the notification word shared with the peer.
///
/// Clones refer to the same word, so one clone can live in the receive queue
/// while others are flipped from any thread. Every operation is a single
/// atomic access; there is no locking.
#[derive(Clone)]
pub struct NotificationFlag {
    region: Region,
}

impl NotificationFlag {
    /// A flag in process-local memory, starting out `Uninitialized`.
    pub fn new() -> io::Result<Self> {
        Self::from_region(Region::heap(size_of::<AtomicU32>())?)
    }

    /// Use the first four bytes of `region` as the notification word.
    pub fn from_region(region: Region) -> io::Result<Self> {
        word_at(&region, "notification")?;
        Ok(Self { region })
    }

    #[inline]
    fn word(&self) -> &AtomicU32 {
        unsafe { self.region.get(0) }
    }

    /// Ask the peer to signal when it publishes packets.
    #[inline]
    pub fn enable(&self) {
        self.word().store(NotificationState::Enabled as u32, Release);
    }

    /// Ask the peer not to signal; the owner is polling.
    #[inline]
    pub fn disable(&self) {
        self.word().store(NotificationState::Disabled as u32, Release);
    }

    /// Current state, as the peer sees it. `None` if the word holds a value
    /// outside the protocol.
    pub fn state(&self) -> Option<NotificationState> {
        NotificationState::from_raw(self.word().load(Acquire))
    }

    pub fn is_enabled(&self) -> bool {
        self.state() == Some(NotificationState::Enabled)
    }
}

impl fmt::Debug for NotificationFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationFlag")
            .field("state", &self.state())
            .finish()
    }
}

/// Out-of-band wake-up signal from the peer to the receiver.
///
/// A 32-bit sequence word: `ring` bumps it and wakes every waiter, `wait`
/// sleeps until it moves.
#[derive(Clone)]
pub struct Doorbell {
    region: Region,
}

impl Doorbell {
    pub fn new() -> io::Result<Self> {
        Self::from_region(Region::heap(size_of::<AtomicU32>())?)
    }

    pub fn from_region(region: Region) -> io::Result<Self> {
        word_at(&region, "doorbell")?;
        Ok(Self { region })
    }

    #[inline]
    fn word(&self) -> &AtomicU32 {
        unsafe { self.region.get(0) }
    }

    /// Current sequence value. Pass it to `wait` to sleep until the next ring.
    pub fn sequence(&self) -> u32 {
        self.word().load(Acquire)
    }

    pub fn ring(&self) {
        let word = self.word();
        word.fetch_add(1, Release);
        futex_wake(word);
    }

    /// Sleep until the sequence differs from `seen` or `timeout` elapses.
    /// Returns true if the doorbell was rung. Spurious wake-ups are absorbed.
    pub fn wait(&self, seen: u32, timeout: Option<Duration>) -> bool {
        // A timeout too large to represent as an instant waits forever.
        let deadline = timeout.and_then(|t| std::time::Instant::now().checked_add(t));
        loop {
            if self.sequence() != seen {
                return true;
            }
            let remaining = match deadline {
                Some(deadline) => {
                    let now = std::time::Instant::now();
                    if now >= deadline {
                        return false;
                    }
                    Some(deadline - now)
                }
                None => None,
            };
            futex_wait(self.word(), seen, remaining);
        }
    }
}

impl fmt::Debug for Doorbell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Doorbell")
            .field("sequence", &self.sequence())
            .finish()
    }
}
