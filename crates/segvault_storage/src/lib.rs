//! # segvault storage
//!
//! Frame storage for segvault backups.
//!
//! A backup keeps every replica it holds in one fixed-capacity *frame*. This
//! crate provides the lowest-level abstraction over those frames. Backends are
//! **opaque byte stores** - they do not interpret the segments written into
//! them.
//!
//! ## Design Principles
//!
//! - A [`Frame`] is an exclusive handle: it is not `Clone`, it is handed out
//!   by [`FrameStorage::allocate`] and given back by [`FrameStorage::free`]
//! - All operations are synchronous; callers that want asynchrony run them on
//!   their own workers
//! - Backends must be `Send + Sync` so they can be shared by those workers
//!
//! ## Available Backends
//!
//! - [`InMemoryStorage`] - For testing and ephemeral backups
//! - [`FileStorage`] - One preallocated file holding every frame
//!
//! ## Example
//!
//! ```rust
//! use segvault_storage::{FrameStorage, InMemoryStorage};
//!
//! let storage = InMemoryStorage::new(1024, 2);
//! let frame = storage.allocate().unwrap();
//! storage.write(&frame, 0, b"hello").unwrap();
//! assert_eq!(&storage.load(&frame).unwrap()[..5], b"hello");
//! storage.free(frame).unwrap();
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::{Frame, FrameStorage};
pub use error::{StorageError, StorageResult};
pub use file::FileStorage;
pub use memory::InMemoryStorage;
