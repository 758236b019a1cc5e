use std::fmt;
use std::io;
use std::mem::{align_of, size_of};
use std::sync::Arc;

use super::SharedMemory::{HeapMemory, SharedMemoryBackend};

/// A byte window into a mapped backend, addressed by offset.
///
/// The window keeps the backend alive through an `Arc`, so pipes and flags
/// carved out of the same mapping can be handed to different owners and the
/// memory is unmapped only when the last of them is dropped.
#[derive(Clone)]
pub struct Region {
    shm: Arc<dyn SharedMemoryBackend>,
    start: usize,
    len: usize,
}

impl Region {
    /// Wrap a whole backend mapping.
    pub fn new(shm: Arc<dyn SharedMemoryBackend>) -> Self {
        let len = shm.size();
        Self { shm, start: 0, len }
    }

    /// Allocate a zeroed, process-local region of `size` bytes.
    pub fn heap(size: usize) -> io::Result<Self> {
        Ok(Self::new(Arc::new(HeapMemory::new(size)?)))
    }

    /// Returns the base pointer of the region.
    #[inline]
    pub fn as_ptr(&self) -> *mut u8 {
        // start is bounded by the backend size at construction
        unsafe { self.shm.as_ptr().add(self.start) }
    }

    /// Returns the size of the region in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the backing mapping.
    pub fn backend(&self) -> &Arc<dyn SharedMemoryBackend> {
        &self.shm
    }

    /// Returns a pointer to offset `off` within the region.
    #[inline]
    pub fn offset(&self, off: usize) -> *mut u8 {
        assert!(
            off < self.len,
            "offset {off} out of bounds (len={})",
            self.len
        );
        unsafe { self.as_ptr().add(off) }
    }

    /// Returns a reference to a `T` at the given byte offset.
    ///
    /// # Safety
    ///
    /// The bytes at `off` must hold a valid `T` (any bit pattern for the
    /// atomics and integers used in this crate). Bounds and alignment are
    /// checked here.
    #[inline]
    pub unsafe fn get<T>(&self, off: usize) -> &T {
        assert!(off + size_of::<T>() <= self.len, "typed access out of bounds");
        let ptr = self.offset(off);
        assert!(
            (ptr as usize) % align_of::<T>() == 0,
            "typed access misaligned"
        );
        &*(ptr as *const T)
    }

    /// Carve a sub-window `[off, off + len)` out of this region.
    pub fn sub_region(&self, off: usize, len: usize) -> io::Result<Self> {
        match off.checked_add(len) {
            Some(end) if end <= self.len => Ok(Self {
                shm: self.shm.clone(),
                start: self.start + off,
                len,
            }),
            _ => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "sub-region [{}, {}+{}) exceeds region of {} bytes",
                    off, off, len, self.len
                ),
            )),
        }
    }
}

impl fmt::Debug for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        crate::Debug::StructDebug::debug_region(self, f)
    }
}
