//! # segvault codec
//!
//! Byte-level layout of segvault segments.
//!
//! A segment is a sequence of typed, length-delimited entries. A
//! [`Certificate`] records how many bytes of a segment are valid together
//! with a checksum over them, so a reader can check a whole segment as a
//! unit before trusting any entry in it.
//!
//! ## Contents
//!
//! - Entry framing and [`EntryType`]
//! - [`Segment`], an append-only accumulator with a running certificate
//! - [`SegmentIterator`], which validates a segment and walks its entries
//! - Payload layouts for [`Object`], [`ObjectTombstone`], [`SegmentHeader`]
//!   and [`LogDigest`]
//! - [`key_hash`], the hash tablets partition their key space by
//!
//! ## Usage
//!
//! ```
//! use segvault_codec::{EntryType, Object, Segment, SegmentIterator};
//!
//! let mut segment = Segment::new();
//! let payload = Object::new(123, "10", "").encode().unwrap();
//! segment.append(EntryType::Object, &payload).unwrap();
//! let (bytes, certificate) = segment.freeze();
//! assert_eq!(certificate.segment_length, 30);
//!
//! let entry = SegmentIterator::new(&bytes, &certificate)
//!     .unwrap()
//!     .next()
//!     .unwrap()
//!     .unwrap();
//! assert_eq!(entry.key().unwrap().unwrap().table_id, 123);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod certificate;
mod entry;
mod error;
mod iterator;
mod object;
mod segment;

pub use certificate::{Certificate, CERTIFICATE_SIZE};
pub use entry::{
    decode_header, encode_header, encoded_len, length_bytes, EntryHeader, EntryType, LogPosition,
    MAX_ENTRY_PAYLOAD,
};
pub use error::{CodecError, CodecResult};
pub use iterator::{find_footer, Entry, Footer, SegmentIterator};
pub use object::{
    key_hash, KeyRef, LogDigest, Object, ObjectTombstone, ObjectView, SegmentHeader,
    INVALID_SEGMENT_ID, OBJECT_HEADER_SIZE, SEGMENT_HEADER_SIZE, TOMBSTONE_HEADER_SIZE,
};
pub use segment::Segment;
