//! # segvault testkit
//!
//! Test utilities for segvault.
//!
//! This crate provides:
//! - Replica environments over in-memory, gated and file storage
//! - Segment and tablet fixtures
//! - Log capture for asserting on emitted messages
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust
//! use segvault_testkit::prelude::*;
//!
//! let env = TestEnv::inline(2);
//! let segment = SegmentFixture::new(99, 88).object(123, "10");
//! let replica = env.closed_replica(88, &segment);
//! assert_eq!(replica.state(), segvault_core::ReplicaState::Closed);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod gated;
pub mod generators;
pub mod logs;
pub mod segments;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::gated::*;
    pub use crate::generators::*;
    pub use crate::logs::*;
    pub use crate::segments::*;
}

pub use fixtures::*;
pub use gated::*;
pub use generators::*;
pub use logs::*;
pub use segments::*;
