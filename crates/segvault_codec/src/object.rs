//! Payload layouts for the entry types.
//!
//! All integers are little-endian.
//!
//! ```text
//! object:    table_id u64 | key_len u16 | version u64 | timestamp u32 | checksum u32 | key | value
//! tombstone: table_id u64 | key_len u16 | segment_id u64 | version u64 | timestamp u32 | checksum u32 | key
//! header:    log_id u64 | segment_id u64 | capacity u32 | head_segment_id_during_cleaning u64
//! digest:    count u32 | segment_id u64 * count
//! ```
//!
//! Object and tombstone checksums are CRC32C over the payload with the
//! checksum field itself left out.

use crate::entry::PayloadReader;
use crate::error::{CodecError, CodecResult};
use std::fmt;

/// Segment id used where no segment is meant.
pub const INVALID_SEGMENT_ID: u64 = u64::MAX;

/// Size of the fixed part of an object payload.
pub const OBJECT_HEADER_SIZE: usize = 26;

/// Size of the fixed part of a tombstone payload.
pub const TOMBSTONE_HEADER_SIZE: usize = 34;

/// Size of a segment header payload.
pub const SEGMENT_HEADER_SIZE: usize = 28;

/// Hashes a key within its table.
///
/// This is the hash tablets partition their key space by.
#[must_use]
pub fn key_hash(table_id: u64, key: &[u8]) -> u64 {
    xxhash_rust::xxh3::xxh3_64_with_seed(key, table_id)
}

/// A key borrowed from an entry payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyRef<'a> {
    /// Table the key belongs to.
    pub table_id: u64,
    /// Raw key bytes.
    pub key: &'a [u8],
}

impl KeyRef<'_> {
    /// Returns the key hash used for tablet routing.
    #[must_use]
    pub fn hash(&self) -> u64 {
        key_hash(self.table_id, self.key)
    }
}

impl fmt::Display for KeyRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{},{}>", self.table_id, String::from_utf8_lossy(self.key))
    }
}

fn key_len_u16(kind: &'static str, key: &[u8]) -> CodecResult<u16> {
    u16::try_from(key.len())
        .map_err(|_| CodecError::malformed(kind, format!("key of {} bytes exceeds 64 KiB", key.len())))
}

/// An object written by a master.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Object {
    /// Table the object belongs to.
    pub table_id: u64,
    /// Key bytes.
    pub key: Vec<u8>,
    /// Version assigned by the master.
    pub version: u64,
    /// Write time in seconds.
    pub timestamp: u32,
    /// Value bytes.
    pub value: Vec<u8>,
}

impl Object {
    /// Creates an object with version and timestamp zero.
    pub fn new(table_id: u64, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            table_id,
            key: key.into(),
            version: 0,
            timestamp: 0,
            value: value.into(),
        }
    }

    /// Serializes the object into an entry payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is longer than 64 KiB.
    pub fn encode(&self) -> CodecResult<Vec<u8>> {
        let key_len = key_len_u16("object", &self.key)?;
        let mut buf = Vec::with_capacity(OBJECT_HEADER_SIZE + self.key.len() + self.value.len());
        buf.extend_from_slice(&self.table_id.to_le_bytes());
        buf.extend_from_slice(&key_len.to_le_bytes());
        buf.extend_from_slice(&self.version.to_le_bytes());
        buf.extend_from_slice(&self.timestamp.to_le_bytes());
        let checksum = object_checksum(&buf, &self.key, &self.value);
        buf.extend_from_slice(&checksum.to_le_bytes());
        buf.extend_from_slice(&self.key);
        buf.extend_from_slice(&self.value);
        Ok(buf)
    }

    /// Parses and verifies an object payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is too short or its checksum is wrong.
    pub fn decode(payload: &[u8]) -> CodecResult<Self> {
        let view = ObjectView::parse(payload)?;
        Ok(Self {
            table_id: view.table_id,
            key: view.key.to_vec(),
            version: view.version,
            timestamp: view.timestamp,
            value: view.value.to_vec(),
        })
    }
}

fn object_checksum(fixed: &[u8], key: &[u8], value: &[u8]) -> u32 {
    let crc = crc32c::crc32c(fixed);
    let crc = crc32c::crc32c_append(crc, key);
    crc32c::crc32c_append(crc, value)
}

/// A zero-copy view of an object payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectView<'a> {
    /// Table the object belongs to.
    pub table_id: u64,
    /// Version assigned by the master.
    pub version: u64,
    /// Write time in seconds.
    pub timestamp: u32,
    /// Key bytes.
    pub key: &'a [u8],
    /// Value bytes.
    pub value: &'a [u8],
}

impl<'a> ObjectView<'a> {
    /// Parses and verifies an object payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is too short or its checksum is wrong.
    pub fn parse(payload: &'a [u8]) -> CodecResult<Self> {
        let mut reader = PayloadReader::new("object", payload);
        let table_id = reader.read_u64()?;
        let key_len = usize::from(reader.read_u16()?);
        let version = reader.read_u64()?;
        let timestamp = reader.read_u32()?;
        let checksum = reader.read_u32()?;
        let key = reader.take(key_len)?;
        let value = reader.rest();

        let actual = object_checksum(&payload[..OBJECT_HEADER_SIZE - 4], key, value);
        if actual != checksum {
            return Err(CodecError::ChecksumMismatch {
                expected: checksum,
                actual,
            });
        }
        Ok(Self {
            table_id,
            version,
            timestamp,
            key,
            value,
        })
    }

    /// Returns the object's key.
    #[must_use]
    pub const fn key_ref(&self) -> KeyRef<'a> {
        KeyRef {
            table_id: self.table_id,
            key: self.key,
        }
    }
}

/// Records that an object was deleted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectTombstone {
    /// Table the deleted object belonged to.
    pub table_id: u64,
    /// Key of the deleted object.
    pub key: Vec<u8>,
    /// Segment that held the deleted object.
    pub segment_id: u64,
    /// Version of the deleted object.
    pub object_version: u64,
    /// Deletion time in seconds.
    pub timestamp: u32,
}

impl ObjectTombstone {
    /// Serializes the tombstone into an entry payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is longer than 64 KiB.
    pub fn encode(&self) -> CodecResult<Vec<u8>> {
        let key_len = key_len_u16("tombstone", &self.key)?;
        let mut buf = Vec::with_capacity(TOMBSTONE_HEADER_SIZE + self.key.len());
        buf.extend_from_slice(&self.table_id.to_le_bytes());
        buf.extend_from_slice(&key_len.to_le_bytes());
        buf.extend_from_slice(&self.segment_id.to_le_bytes());
        buf.extend_from_slice(&self.object_version.to_le_bytes());
        buf.extend_from_slice(&self.timestamp.to_le_bytes());
        let checksum = object_checksum(&buf, &self.key, &[]);
        buf.extend_from_slice(&checksum.to_le_bytes());
        buf.extend_from_slice(&self.key);
        Ok(buf)
    }

    /// Parses and verifies a tombstone payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is malformed or its checksum is wrong.
    pub fn decode(payload: &[u8]) -> CodecResult<Self> {
        let (key_ref, rest) = parse_tombstone(payload)?;
        Ok(Self {
            table_id: key_ref.table_id,
            key: key_ref.key.to_vec(),
            segment_id: rest.0,
            object_version: rest.1,
            timestamp: rest.2,
        })
    }
}

/// Parses a tombstone, returning its key and `(segment_id, version, timestamp)`.
pub(crate) fn parse_tombstone(payload: &[u8]) -> CodecResult<(KeyRef<'_>, (u64, u64, u32))> {
    let mut reader = PayloadReader::new("tombstone", payload);
    let table_id = reader.read_u64()?;
    let key_len = usize::from(reader.read_u16()?);
    let segment_id = reader.read_u64()?;
    let object_version = reader.read_u64()?;
    let timestamp = reader.read_u32()?;
    let checksum = reader.read_u32()?;
    let key = reader.take(key_len)?;
    reader.finish()?;

    let actual = object_checksum(&payload[..TOMBSTONE_HEADER_SIZE - 4], key, &[]);
    if actual != checksum {
        return Err(CodecError::ChecksumMismatch {
            expected: checksum,
            actual,
        });
    }
    Ok((KeyRef { table_id, key }, (segment_id, object_version, timestamp)))
}

/// First entry of every segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentHeader {
    /// Id of the master whose log this segment belongs to.
    pub log_id: u64,
    /// Id of this segment.
    pub segment_id: u64,
    /// Capacity the segment was created with.
    pub capacity: u32,
    /// Head segment at the time a cleaner produced this segment, or
    /// [`INVALID_SEGMENT_ID`] for segments written at the log head.
    /// Encoded for layout compatibility; entry liveness does not read it.
    pub head_segment_id_during_cleaning: u64,
}

impl SegmentHeader {
    /// Creates a header for a segment written at the log head.
    #[must_use]
    pub const fn new(log_id: u64, segment_id: u64, capacity: u32) -> Self {
        Self {
            log_id,
            segment_id,
            capacity,
            head_segment_id_during_cleaning: INVALID_SEGMENT_ID,
        }
    }

    /// Serializes the header.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(SEGMENT_HEADER_SIZE);
        buf.extend_from_slice(&self.log_id.to_le_bytes());
        buf.extend_from_slice(&self.segment_id.to_le_bytes());
        buf.extend_from_slice(&self.capacity.to_le_bytes());
        buf.extend_from_slice(&self.head_segment_id_during_cleaning.to_le_bytes());
        buf
    }

    /// Parses a header payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is not exactly [`SEGMENT_HEADER_SIZE`] bytes.
    pub fn decode(payload: &[u8]) -> CodecResult<Self> {
        let mut reader = PayloadReader::new("segment header", payload);
        let header = Self {
            log_id: reader.read_u64()?,
            segment_id: reader.read_u64()?,
            capacity: reader.read_u32()?,
            head_segment_id_during_cleaning: reader.read_u64()?,
        };
        reader.finish()?;
        Ok(header)
    }
}

/// The set of segments making up a log at the time it was written.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LogDigest {
    /// Segment ids in log order.
    pub segment_ids: Vec<u64>,
}

impl LogDigest {
    /// Serializes the digest.
    ///
    /// # Errors
    ///
    /// Returns an error if the digest lists more than `u32::MAX` segments.
    pub fn encode(&self) -> CodecResult<Vec<u8>> {
        let count = u32::try_from(self.segment_ids.len())
            .map_err(|_| CodecError::malformed("log digest", "too many segments"))?;
        let mut buf = Vec::with_capacity(4 + 8 * self.segment_ids.len());
        buf.extend_from_slice(&count.to_le_bytes());
        for id in &self.segment_ids {
            buf.extend_from_slice(&id.to_le_bytes());
        }
        Ok(buf)
    }

    /// Parses a digest payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload length does not match its count.
    pub fn decode(payload: &[u8]) -> CodecResult<Self> {
        let mut reader = PayloadReader::new("log digest", payload);
        let count = reader.read_u32()? as usize;
        if payload.len() != 4 + count.saturating_mul(8) {
            return Err(CodecError::malformed(
                "log digest",
                format!("{count} segments need {} bytes", 4 + count.saturating_mul(8)),
            ));
        }
        let segment_ids = (0..count)
            .map(|_| reader.read_u64())
            .collect::<CodecResult<Vec<_>>>()?;
        Ok(Self { segment_ids })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_is_header_plus_key() {
        let payload = Object::new(123, "10", Vec::new()).encode().unwrap();
        assert_eq!(payload.len(), 28);
        assert_eq!(payload.len(), OBJECT_HEADER_SIZE + 2);
    }

    #[test]
    fn object_decode_verifies_checksum() {
        let object = Object {
            table_id: 7,
            key: b"key".to_vec(),
            version: 3,
            timestamp: 99,
            value: b"value".to_vec(),
        };
        let mut payload = object.encode().unwrap();
        assert_eq!(Object::decode(&payload).unwrap(), object);

        let last = payload.len() - 1;
        payload[last] ^= 0xff;
        assert!(matches!(
            Object::decode(&payload),
            Err(CodecError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn object_view_exposes_key() {
        let payload = Object::new(123, "XX", "v").encode().unwrap();
        let view = ObjectView::parse(&payload).unwrap();
        assert_eq!(view.key_ref().table_id, 123);
        assert_eq!(view.key, b"XX");
        assert_eq!(view.value, b"v");
        assert_eq!(view.key_ref().hash(), key_hash(123, b"XX"));
    }

    #[test]
    fn object_with_short_payload_is_malformed() {
        assert!(matches!(
            ObjectView::parse(&[0u8; 10]),
            Err(CodecError::Malformed { kind: "object", .. })
        ));
    }

    #[test]
    fn tombstone_decode() {
        let tombstone = ObjectTombstone {
            table_id: 1,
            key: b"gone".to_vec(),
            segment_id: 44,
            object_version: 2,
            timestamp: 5,
        };
        let payload = tombstone.encode().unwrap();
        assert_eq!(payload.len(), TOMBSTONE_HEADER_SIZE + 4);
        assert_eq!(ObjectTombstone::decode(&payload).unwrap(), tombstone);
    }

    #[test]
    fn key_hash_depends_on_table() {
        assert_eq!(key_hash(123, b"10"), key_hash(123, b"10"));
        assert_ne!(key_hash(123, b"10"), key_hash(124, b"10"));
        assert_ne!(key_hash(123, b"10"), key_hash(123, b"30"));
    }

    #[test]
    fn segment_header_layout() {
        let header = SegmentHeader::new(99, 88, 65_536);
        let payload = header.encode();
        assert_eq!(payload.len(), SEGMENT_HEADER_SIZE);
        assert_eq!(SegmentHeader::decode(&payload).unwrap(), header);
        assert_eq!(header.head_segment_id_during_cleaning, INVALID_SEGMENT_ID);
        assert!(SegmentHeader::decode(&payload[..20]).is_err());
    }

    #[test]
    fn log_digest_decode() {
        let digest = LogDigest {
            segment_ids: vec![1, 5, 88],
        };
        let payload = digest.encode().unwrap();
        assert_eq!(LogDigest::decode(&payload).unwrap(), digest);
        assert!(LogDigest::decode(&payload[..payload.len() - 1]).is_err());
    }

    #[test]
    fn key_ref_display() {
        let key = KeyRef {
            table_id: 123,
            key: b"10",
        };
        assert_eq!(key.to_string(), "<123,10>");
    }
}
