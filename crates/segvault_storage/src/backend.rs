//! Frame storage trait definition.

use crate::error::StorageResult;

/// Exclusive handle to one allocated frame.
///
/// A frame is owned by exactly one holder at a time. It is intentionally not
/// `Clone`: the only way to end its life is to move it back into
/// [`FrameStorage::free`].
#[derive(Debug, PartialEq, Eq)]
pub struct Frame {
    index: usize,
    capacity: usize,
}

impl Frame {
    /// Creates a handle for slot `index` of a backend whose frames hold
    /// `capacity` bytes.
    ///
    /// Only backend implementations should mint frames.
    #[must_use]
    pub const fn new(index: usize, capacity: usize) -> Self {
        Self { index, capacity }
    }

    /// Returns the slot index of this frame within its backend.
    #[must_use]
    pub const fn index(&self) -> usize {
        self.index
    }

    /// Returns the number of bytes this frame can hold.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }
}

/// A backend holding a fixed number of fixed-capacity frames.
///
/// # Invariants
///
/// - `allocate` never hands out a frame that is still allocated
/// - `load` returns exactly `frame_size()` bytes, reflecting every completed
///   `write` to that frame
/// - `free` returns the slot to the pool; the handle is consumed
/// - Backends must be `Send + Sync` so worker threads can share them
///
/// # Implementors
///
/// - [`super::InMemoryStorage`] - For testing
/// - [`super::FileStorage`] - For persistent storage
pub trait FrameStorage: Send + Sync {
    /// Returns the capacity of every frame in bytes.
    fn frame_size(&self) -> usize;

    /// Returns the number of frames currently free.
    fn free_frames(&self) -> usize;

    /// Reserves a frame.
    ///
    /// # Errors
    ///
    /// Returns [`super::StorageError::OutOfFrames`] when every frame is in use,
    /// or an I/O error from the underlying medium.
    fn allocate(&self) -> StorageResult<Frame>;

    /// Writes `data` into `frame` starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns an error if the write would cross the end of the frame, the
    /// frame is not allocated, or an I/O error occurs.
    fn write(&self, frame: &Frame, offset: usize, data: &[u8]) -> StorageResult<()>;

    /// Loads the full content of `frame`.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame is not allocated or an I/O error occurs.
    fn load(&self, frame: &Frame) -> StorageResult<Vec<u8>>;

    /// Releases `frame` back to the backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame does not belong to this backend.
    fn free(&self, frame: Frame) -> StorageResult<()>;

    /// Makes every completed write durable.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync operation fails.
    fn sync(&self) -> StorageResult<()> {
        Ok(())
    }
}

/// Checks that `[offset, offset + len)` lies inside a frame of `frame_size`.
pub(crate) fn check_bounds(
    frame: &Frame,
    offset: usize,
    len: usize,
    frame_size: usize,
) -> StorageResult<()> {
    let end = offset.checked_add(len);
    match end {
        Some(end) if end <= frame_size => Ok(()),
        _ => Err(crate::StorageError::OutOfBounds {
            frame: frame.index(),
            offset,
            len,
            frame_size,
        }),
    }
}
