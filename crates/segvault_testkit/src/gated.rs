//! Storage whose operations can be held back by the test.

use parking_lot::{Condvar, Mutex};
use segvault_storage::{Frame, FrameStorage, InMemoryStorage, StorageError, StorageResult};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// In-memory storage with a gate in front of `write` and `load`.
///
/// While the gate is closed, writes and loads block. Allocation and
/// release never block. Loads can also be made to fail.
#[derive(Debug)]
pub struct GatedStorage {
    inner: InMemoryStorage,
    open: Mutex<bool>,
    opened: Condvar,
    writes: AtomicUsize,
    loads: AtomicUsize,
    fail_loads: AtomicBool,
}

impl GatedStorage {
    /// Creates gated storage with the gate open.
    pub fn new(frame_size: usize, frame_count: usize) -> Self {
        Self {
            inner: InMemoryStorage::new(frame_size, frame_count),
            open: Mutex::new(true),
            opened: Condvar::new(),
            writes: AtomicUsize::new(0),
            loads: AtomicUsize::new(0),
            fail_loads: AtomicBool::new(false),
        }
    }

    /// Holds back writes and loads until [`GatedStorage::open_gate`].
    pub fn close_gate(&self) {
        *self.open.lock() = false;
    }

    /// Lets held back and future operations through.
    pub fn open_gate(&self) {
        *self.open.lock() = true;
        self.opened.notify_all();
    }

    /// Makes every later load fail with an I/O error.
    pub fn fail_loads(&self, fail: bool) {
        self.fail_loads.store(fail, Ordering::Release);
    }

    /// Returns the number of writes that completed.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::Acquire)
    }

    /// Returns the number of loads attempted past the gate.
    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::Acquire)
    }

    /// Returns the underlying storage.
    pub fn inner(&self) -> &InMemoryStorage {
        &self.inner
    }

    fn pass(&self) {
        let mut open = self.open.lock();
        while !*open {
            self.opened.wait(&mut open);
        }
    }
}

impl FrameStorage for GatedStorage {
    fn frame_size(&self) -> usize {
        self.inner.frame_size()
    }

    fn free_frames(&self) -> usize {
        self.inner.free_frames()
    }

    fn allocate(&self) -> StorageResult<Frame> {
        self.inner.allocate()
    }

    fn write(&self, frame: &Frame, offset: usize, data: &[u8]) -> StorageResult<()> {
        self.pass();
        self.inner.write(frame, offset, data)?;
        self.writes.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    fn load(&self, frame: &Frame) -> StorageResult<Vec<u8>> {
        self.pass();
        self.loads.fetch_add(1, Ordering::AcqRel);
        if self.fail_loads.load(Ordering::Acquire) {
            return Err(StorageError::Io(io::Error::new(
                io::ErrorKind::Other,
                "injected load failure",
            )));
        }
        self.inner.load(frame)
    }

    fn free(&self, frame: Frame) -> StorageResult<()> {
        self.inner.free(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn closed_gate_holds_writes() {
        let storage = Arc::new(GatedStorage::new(16, 1));
        let frame = storage.allocate().unwrap();
        storage.close_gate();

        let writer = {
            let storage = Arc::clone(&storage);
            thread::spawn(move || storage.write(&frame, 0, b"abc").map(|()| frame))
        };
        thread::sleep(Duration::from_millis(20));
        assert_eq!(storage.writes(), 0);

        storage.open_gate();
        let frame = writer.join().unwrap().unwrap();
        assert_eq!(storage.writes(), 1);
        assert_eq!(&storage.load(&frame).unwrap()[..3], b"abc");
    }

    #[test]
    fn injected_load_failure() {
        let storage = GatedStorage::new(16, 1);
        let frame = storage.allocate().unwrap();
        storage.fail_loads(true);
        assert!(matches!(storage.load(&frame), Err(StorageError::Io(_))));
        assert_eq!(storage.loads(), 1);
    }
}
