//! File-based frame storage for persistent backups.

use crate::backend::{check_bounds, Frame, FrameStorage};
use crate::error::{StorageError, StorageResult};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// A frame store backed by a single preallocated file.
///
/// Frame `i` occupies bytes `[i * frame_size, (i + 1) * frame_size)` of the
/// file. The allocation map lives in memory only; frame contents survive
/// process restarts and can be inspected with [`FileStorage::read_slot`].
///
/// # Durability
///
/// - `write()` pushes data to the OS
/// - `sync()` calls `File::sync_data()` to ensure data is on disk
///
/// # Example
///
/// ```no_run
/// use segvault_storage::{FileStorage, FrameStorage};
/// use std::path::Path;
///
/// let storage = FileStorage::open(Path::new("frames.img"), 8 * 1024 * 1024, 16).unwrap();
/// let frame = storage.allocate().unwrap();
/// storage.write(&frame, 0, b"persistent data").unwrap();
/// storage.sync().unwrap();
/// ```
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    frame_size: usize,
    file: Mutex<File>,
    allocated: Mutex<Vec<bool>>,
}

impl FileStorage {
    /// Opens or creates a frame file at `path` holding `frame_count` frames.
    ///
    /// A new file is extended to its full size up front. An existing file
    /// smaller than the requested geometry is extended; its existing frames
    /// keep their content.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened, created or resized, or
    /// if `frame_size` is zero.
    pub fn open(path: &Path, frame_size: usize, frame_count: usize) -> StorageResult<Self> {
        if frame_size == 0 {
            return Err(StorageError::InvalidLayout(
                "frame size must be non-zero".to_string(),
            ));
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        let wanted = (frame_size as u64)
            .checked_mul(frame_count as u64)
            .ok_or_else(|| {
                StorageError::InvalidLayout(format!(
                    "{frame_count} frames of {frame_size} bytes overflow the file size"
                ))
            })?;
        if file.metadata()?.len() < wanted {
            file.set_len(wanted)?;
        }

        Ok(Self {
            path: path.to_path_buf(),
            frame_size,
            file: Mutex::new(file),
            allocated: Mutex::new(vec![false; frame_count]),
        })
    }

    /// Opens an existing frame file without write access.
    ///
    /// The frame count is the number of whole frames in the file. Slots are
    /// read with [`FileStorage::read_slot`]; writes fail.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or if `frame_size` is
    /// zero.
    pub fn open_read_only(path: &Path, frame_size: usize) -> StorageResult<Self> {
        if frame_size == 0 {
            return Err(StorageError::InvalidLayout(
                "frame size must be non-zero".to_string(),
            ));
        }
        let file = OpenOptions::new().read(true).open(path)?;
        let frame_count = usize::try_from(file.metadata()?.len() / frame_size as u64)
            .map_err(|_| {
                StorageError::InvalidLayout(format!("{path:?} holds too many frames to address"))
            })?;

        Ok(Self {
            path: path.to_path_buf(),
            frame_size,
            file: Mutex::new(file),
            allocated: Mutex::new(vec![false; frame_count]),
        })
    }

    /// Opens or creates a frame file, creating parent directories if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if directories cannot be created or the file cannot
    /// be opened.
    pub fn open_with_create_dirs(
        path: &Path,
        frame_size: usize,
        frame_count: usize,
    ) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::open(path, frame_size, frame_count)
    }

    /// Returns the path to the underlying file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the number of frames in the file.
    #[must_use]
    pub fn frame_count(&self) -> usize {
        self.allocated.lock().len()
    }

    /// Reads slot `index` regardless of whether it is allocated.
    ///
    /// This is how offline tools look at frames written by an earlier process.
    ///
    /// # Errors
    ///
    /// Returns an error if `index` is outside the file or the read fails.
    pub fn read_slot(&self, index: usize) -> StorageResult<Vec<u8>> {
        if index >= self.allocated.lock().len() {
            return Err(StorageError::UnknownFrame(index));
        }
        self.read_raw(index)
    }

    fn slot_offset(&self, index: usize) -> u64 {
        index as u64 * self.frame_size as u64
    }

    fn read_raw(&self, index: usize) -> StorageResult<Vec<u8>> {
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(self.slot_offset(index)))?;
        let mut buffer = vec![0u8; self.frame_size];
        file.read_exact(&mut buffer)?;
        Ok(buffer)
    }

    fn ensure_allocated(&self, frame: &Frame) -> StorageResult<()> {
        match self.allocated.lock().get(frame.index()) {
            Some(true) => Ok(()),
            _ => Err(StorageError::UnknownFrame(frame.index())),
        }
    }
}

impl FrameStorage for FileStorage {
    fn frame_size(&self) -> usize {
        self.frame_size
    }

    fn free_frames(&self) -> usize {
        self.allocated.lock().iter().filter(|used| !**used).count()
    }

    fn allocate(&self) -> StorageResult<Frame> {
        let mut allocated = self.allocated.lock();
        let frame_count = allocated.len();
        let index = allocated
            .iter()
            .position(|used| !used)
            .ok_or(StorageError::OutOfFrames { frame_count })?;
        allocated[index] = true;
        Ok(Frame::new(index, self.frame_size))
    }

    fn write(&self, frame: &Frame, offset: usize, data: &[u8]) -> StorageResult<()> {
        check_bounds(frame, offset, data.len(), self.frame_size)?;
        self.ensure_allocated(frame)?;
        if data.is_empty() {
            return Ok(());
        }

        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(self.slot_offset(frame.index()) + offset as u64))?;
        file.write_all(data)?;
        file.flush()?;
        Ok(())
    }

    fn load(&self, frame: &Frame) -> StorageResult<Vec<u8>> {
        self.ensure_allocated(frame)?;
        self.read_raw(frame.index())
    }

    fn free(&self, frame: Frame) -> StorageResult<()> {
        let mut allocated = self.allocated.lock();
        match allocated.get_mut(frame.index()) {
            Some(used) if *used => {
                *used = false;
                Ok(())
            }
            _ => Err(StorageError::UnknownFrame(frame.index())),
        }
    }

    fn sync(&self) -> StorageResult<()> {
        self.file.lock().sync_data()?;
        Ok(())
    }
}
