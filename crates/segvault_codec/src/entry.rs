//! Entry types, entry framing and log positions.
//!
//! Every entry in a segment is framed as:
//!
//! ```text
//! [ type:6 | length_bytes-1:2 ][ length: 1..=4 bytes LE ][ payload ]
//! ```
//!
//! The length field uses the fewest bytes able to hold the payload length,
//! so a small entry costs two bytes of framing.

use crate::error::{CodecError, CodecResult};
use std::fmt;

/// Largest payload a single entry can carry.
pub const MAX_ENTRY_PAYLOAD: usize = u32::MAX as usize;

/// Type of a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EntryType {
    /// Zeroed bytes; never written deliberately.
    Invalid = 0,
    /// First entry of every segment.
    SegmentHeader = 1,
    /// A live object.
    Object = 2,
    /// Marks an object as deleted.
    ObjectTombstone = 3,
    /// List of the segments making up the log.
    LogDigest = 4,
    /// Seals a closed segment with its certificate.
    SegmentFooter = 5,
}

impl EntryType {
    /// Converts the low six header bits to an entry type.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(Self::Invalid),
            1 => Some(Self::SegmentHeader),
            2 => Some(Self::Object),
            3 => Some(Self::ObjectTombstone),
            4 => Some(Self::LogDigest),
            5 => Some(Self::SegmentFooter),
            _ => None,
        }
    }

    /// Converts the entry type to its header bits.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }

    /// Returns true for entries that describe the log itself rather than
    /// table data. These are never handed to recovering masters.
    #[must_use]
    pub const fn is_structural(self) -> bool {
        matches!(
            self,
            Self::Invalid | Self::SegmentHeader | Self::LogDigest | Self::SegmentFooter
        )
    }

    /// Returns true for entries that belong to a table and carry a key.
    #[must_use]
    pub const fn is_keyed(self) -> bool {
        matches!(self, Self::Object | Self::ObjectTombstone)
    }
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Invalid => "invalid",
            Self::SegmentHeader => "segment-header",
            Self::Object => "object",
            Self::ObjectTombstone => "tombstone",
            Self::LogDigest => "log-digest",
            Self::SegmentFooter => "segment-footer",
        };
        f.write_str(name)
    }
}

/// A position in a master's log: segment id first, byte offset second.
///
/// Positions order lexicographically, which is the order in which the master
/// appended the entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct LogPosition {
    /// Segment the entry was appended to.
    pub segment_id: u64,
    /// Byte offset of the entry within that segment.
    pub offset: u32,
}

impl LogPosition {
    /// Creates a new log position.
    #[must_use]
    pub const fn new(segment_id: u64, offset: u32) -> Self {
        Self { segment_id, offset }
    }
}

impl fmt::Display for LogPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.segment_id, self.offset)
    }
}

/// Number of bytes needed to store `len` in the length field.
#[must_use]
pub const fn length_bytes(len: u32) -> usize {
    if len < 1 << 8 {
        1
    } else if len < 1 << 16 {
        2
    } else if len < 1 << 24 {
        3
    } else {
        4
    }
}

/// Total encoded size of an entry with a payload of `payload_len` bytes.
#[must_use]
pub const fn encoded_len(payload_len: u32) -> usize {
    1 + length_bytes(payload_len) + payload_len as usize
}

/// Appends the framing for an entry of `entry_type` and `payload_len` to `out`.
pub fn encode_header(entry_type: EntryType, payload_len: u32, out: &mut Vec<u8>) {
    let width = length_bytes(payload_len);
    out.push(((width as u8 - 1) << 6) | entry_type.as_byte());
    out.extend_from_slice(&payload_len.to_le_bytes()[..width]);
}

/// Decoded entry framing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryHeader {
    /// Type of the entry.
    pub entry_type: EntryType,
    /// Size of the framing (type byte plus length field).
    pub header_len: usize,
    /// Length of the payload that follows.
    pub payload_len: u32,
}

impl EntryHeader {
    /// Total encoded size of the entry.
    #[must_use]
    pub const fn total_len(&self) -> usize {
        self.header_len + self.payload_len as usize
    }
}

/// Decodes the framing of the entry starting at `data[0]`.
///
/// `offset` is only used to describe errors.
pub fn decode_header(data: &[u8], offset: u32) -> CodecResult<EntryHeader> {
    let Some(&first) = data.first() else {
        return Err(CodecError::Truncated {
            offset,
            needed: 1,
            available: 0,
        });
    };
    let type_bits = first & 0x3f;
    let entry_type = EntryType::from_byte(type_bits).ok_or(CodecError::InvalidEntryType {
        type_byte: type_bits,
        offset,
    })?;
    let width = usize::from(first >> 6) + 1;
    if data.len() < 1 + width {
        return Err(CodecError::Truncated {
            offset,
            needed: 1 + width,
            available: data.len(),
        });
    }
    let mut len_bytes = [0u8; 4];
    len_bytes[..width].copy_from_slice(&data[1..1 + width]);
    Ok(EntryHeader {
        entry_type,
        header_len: 1 + width,
        payload_len: u32::from_le_bytes(len_bytes),
    })
}

/// Little-endian cursor over an entry payload.
pub(crate) struct PayloadReader<'a> {
    kind: &'static str,
    data: &'a [u8],
    pos: usize,
}

impl<'a> PayloadReader<'a> {
    pub(crate) fn new(kind: &'static str, data: &'a [u8]) -> Self {
        Self { kind, data, pos: 0 }
    }

    pub(crate) fn take(&mut self, n: usize) -> CodecResult<&'a [u8]> {
        if self.data.len() - self.pos < n {
            return Err(CodecError::malformed(
                self.kind,
                format!(
                    "unexpected end of payload: needs {} bytes at {}, {} available",
                    n,
                    self.pos,
                    self.data.len() - self.pos
                ),
            ));
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub(crate) fn read_u16(&mut self) -> CodecResult<u16> {
        let bytes = self.take(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    pub(crate) fn read_u32(&mut self) -> CodecResult<u32> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub(crate) fn read_u64(&mut self) -> CodecResult<u64> {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(self.take(8)?);
        Ok(u64::from_le_bytes(buf))
    }

    pub(crate) fn rest(&mut self) -> &'a [u8] {
        let slice = &self.data[self.pos..];
        self.pos = self.data.len();
        slice
    }

    /// Fails if any bytes remain unread.
    pub(crate) fn finish(&self) -> CodecResult<()> {
        if self.pos != self.data.len() {
            return Err(CodecError::malformed(
                self.kind,
                format!(
                    "trailing bytes: expected {} bytes, got {}",
                    self.pos,
                    self.data.len()
                ),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_type_roundtrip() {
        for t in [
            EntryType::Invalid,
            EntryType::SegmentHeader,
            EntryType::Object,
            EntryType::ObjectTombstone,
            EntryType::LogDigest,
            EntryType::SegmentFooter,
        ] {
            assert_eq!(EntryType::from_byte(t.as_byte()), Some(t));
        }
        assert_eq!(EntryType::from_byte(6), None);
    }

    #[test]
    fn structural_and_keyed_are_disjoint() {
        assert!(EntryType::SegmentHeader.is_structural());
        assert!(EntryType::SegmentFooter.is_structural());
        assert!(!EntryType::Object.is_structural());
        assert!(EntryType::Object.is_keyed());
        assert!(EntryType::ObjectTombstone.is_keyed());
        assert!(!EntryType::LogDigest.is_keyed());
    }

    #[test]
    fn length_field_width() {
        assert_eq!(length_bytes(0), 1);
        assert_eq!(length_bytes(255), 1);
        assert_eq!(length_bytes(256), 2);
        assert_eq!(length_bytes(65_536), 3);
        assert_eq!(length_bytes(1 << 24), 4);
        assert_eq!(encoded_len(28), 30);
    }

    #[test]
    fn header_encoding_is_minimal() {
        let mut out = Vec::new();
        encode_header(EntryType::Object, 28, &mut out);
        assert_eq!(out, vec![0x02, 28]);

        out.clear();
        encode_header(EntryType::LogDigest, 300, &mut out);
        assert_eq!(out, vec![0x44, 0x2c, 0x01]);
    }

    #[test]
    fn header_decoding() {
        let header = decode_header(&[0x44, 0x2c, 0x01, 0xff], 0).unwrap();
        assert_eq!(header.entry_type, EntryType::LogDigest);
        assert_eq!(header.header_len, 3);
        assert_eq!(header.payload_len, 300);
        assert_eq!(header.total_len(), 303);
    }

    #[test]
    fn header_decoding_rejects_unknown_type() {
        let result = decode_header(&[0x3f, 0], 12);
        assert_eq!(
            result,
            Err(CodecError::InvalidEntryType {
                type_byte: 0x3f,
                offset: 12
            })
        );
    }

    #[test]
    fn header_decoding_rejects_short_length_field() {
        let result = decode_header(&[0xc2, 1, 2], 0);
        assert!(matches!(result, Err(CodecError::Truncated { needed: 5, .. })));
        assert!(matches!(
            decode_header(&[], 7),
            Err(CodecError::Truncated { offset: 7, .. })
        ));
    }

    #[test]
    fn log_position_ordering() {
        let watermark = LogPosition::new(12741, 57273);
        assert!(LogPosition::new(12741, 57274) > watermark);
        assert!(LogPosition::new(12742, 0) > watermark);
        assert!(LogPosition::new(12740, u32::MAX) < watermark);
        assert_eq!(format!("{watermark}"), "(12741, 57273)");
    }

    #[test]
    fn payload_reader_detects_trailing_bytes() {
        let data = [1u8, 0, 9];
        let mut reader = PayloadReader::new("test", &data);
        assert_eq!(reader.read_u16().unwrap(), 1);
        assert!(reader.finish().is_err());
        assert!(reader.read_u32().is_err());
    }
}
