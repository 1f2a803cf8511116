//! CLI command implementations.

pub mod image;
pub mod inspect;
pub mod partition;
