//! Error types for the codec crate.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur while encoding or decoding segments.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The certificate claims more bytes than are available.
    #[error("certificate declares {declared} bytes but only {available} are available")]
    CertificateOutOfRange {
        /// Length declared by the certificate.
        declared: u32,
        /// Number of bytes actually supplied.
        available: usize,
    },

    /// Checksum mismatch detected.
    #[error("checksum mismatch: expected {expected:08x}, got {actual:08x}")]
    ChecksumMismatch {
        /// Checksum recorded in the certificate or entry.
        expected: u32,
        /// Checksum computed over the bytes.
        actual: u32,
    },

    /// An entry header or payload runs past the end of the data.
    #[error("truncated entry at offset {offset}: needs {needed} bytes, {available} available")]
    Truncated {
        /// Offset of the entry within the segment.
        offset: u32,
        /// Bytes the entry requires.
        needed: usize,
        /// Bytes remaining.
        available: usize,
    },

    /// Unknown or invalid entry type.
    #[error("invalid entry type {type_byte} at offset {offset}")]
    InvalidEntryType {
        /// The raw type bits.
        type_byte: u8,
        /// Offset of the entry within the segment.
        offset: u32,
    },

    /// The entry would not fit in the segment.
    #[error("segment full: entry of {needed} bytes does not fit in {remaining} remaining bytes")]
    SegmentFull {
        /// Encoded size of the rejected entry.
        needed: usize,
        /// Bytes still available.
        remaining: usize,
    },

    /// An entry payload does not match its type's layout.
    #[error("malformed {kind}: {message}")]
    Malformed {
        /// The kind of entry being parsed.
        kind: &'static str,
        /// Description of the problem.
        message: String,
    },
}

impl CodecError {
    /// Creates a malformed payload error.
    pub fn malformed(kind: &'static str, message: impl Into<String>) -> Self {
        Self::Malformed {
            kind,
            message: message.into(),
        }
    }
}
