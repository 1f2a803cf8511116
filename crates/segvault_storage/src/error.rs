//! Error types for storage operations.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Every frame of the backend is in use.
    #[error("no free frames: all {frame_count} frames are allocated")]
    OutOfFrames {
        /// Total number of frames the backend manages.
        frame_count: usize,
    },

    /// A write or read would cross the end of a frame.
    #[error("access beyond end of frame {frame}: offset {offset}, len {len}, frame size {frame_size}")]
    OutOfBounds {
        /// Index of the frame.
        frame: usize,
        /// Requested offset within the frame.
        offset: usize,
        /// Requested length.
        len: usize,
        /// Capacity of each frame.
        frame_size: usize,
    },

    /// The frame is not currently allocated by this backend.
    #[error("frame {0} is not allocated")]
    UnknownFrame(usize),

    /// The storage file does not match the requested geometry.
    #[error("invalid storage layout: {0}")]
    InvalidLayout(String),
}
