//! In-memory frame storage for testing.

use crate::backend::{check_bounds, Frame, FrameStorage};
use crate::error::{StorageError, StorageResult};
use parking_lot::Mutex;

/// An in-memory frame store.
///
/// This backend keeps every frame in memory and is suitable for:
/// - Unit tests
/// - Integration tests
/// - Ephemeral backups that don't need persistence
///
/// Frames are zero-filled when they are allocated.
///
/// # Thread Safety
///
/// This backend is thread-safe and can be shared across threads.
///
/// # Example
///
/// ```rust
/// use segvault_storage::{FrameStorage, InMemoryStorage};
///
/// let storage = InMemoryStorage::new(64, 1);
/// let frame = storage.allocate().unwrap();
/// assert_eq!(storage.free_frames(), 0);
/// storage.free(frame).unwrap();
/// assert_eq!(storage.free_frames(), 1);
/// ```
#[derive(Debug)]
pub struct InMemoryStorage {
    frame_size: usize,
    /// `Some` while the slot is allocated.
    slots: Mutex<Vec<Option<Vec<u8>>>>,
}

impl InMemoryStorage {
    /// Creates a store of `frame_count` frames of `frame_size` bytes each.
    #[must_use]
    pub fn new(frame_size: usize, frame_count: usize) -> Self {
        Self {
            frame_size,
            slots: Mutex::new(vec![None; frame_count]),
        }
    }

    /// Returns a copy of the content of slot `index`, if it is allocated.
    ///
    /// Useful for testing and debugging.
    #[must_use]
    pub fn read_slot(&self, index: usize) -> Option<Vec<u8>> {
        self.slots.lock().get(index).and_then(Clone::clone)
    }

    /// Returns the total number of frames.
    #[must_use]
    pub fn frame_count(&self) -> usize {
        self.slots.lock().len()
    }
}

impl FrameStorage for InMemoryStorage {
    fn frame_size(&self) -> usize {
        self.frame_size
    }

    fn free_frames(&self) -> usize {
        self.slots.lock().iter().filter(|slot| slot.is_none()).count()
    }

    fn allocate(&self) -> StorageResult<Frame> {
        let mut slots = self.slots.lock();
        let frame_count = slots.len();
        let index = slots
            .iter()
            .position(Option::is_none)
            .ok_or(StorageError::OutOfFrames { frame_count })?;
        slots[index] = Some(vec![0u8; self.frame_size]);
        Ok(Frame::new(index, self.frame_size))
    }

    fn write(&self, frame: &Frame, offset: usize, data: &[u8]) -> StorageResult<()> {
        check_bounds(frame, offset, data.len(), self.frame_size)?;
        let mut slots = self.slots.lock();
        let slot = slots
            .get_mut(frame.index())
            .and_then(Option::as_mut)
            .ok_or(StorageError::UnknownFrame(frame.index()))?;
        slot[offset..offset + data.len()].copy_from_slice(data);
        Ok(())
    }

    fn load(&self, frame: &Frame) -> StorageResult<Vec<u8>> {
        self.read_slot(frame.index())
            .ok_or(StorageError::UnknownFrame(frame.index()))
    }

    fn free(&self, frame: Frame) -> StorageResult<()> {
        let mut slots = self.slots.lock();
        match slots.get_mut(frame.index()) {
            Some(slot) if slot.is_some() => {
                *slot = None;
                Ok(())
            }
            _ => Err(StorageError::UnknownFrame(frame.index())),
        }
    }
}
