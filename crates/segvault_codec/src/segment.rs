//! Append-only segment accumulator.

use crate::certificate::Certificate;
use crate::entry::{decode_header, encode_header, EntryType};
use crate::error::{CodecError, CodecResult};
use bytes::{Bytes, BytesMut};

/// An in-memory segment that entries are appended to.
///
/// The segment keeps a running CRC32C over everything appended so far, so
/// producing a certificate never rescans the bytes.
///
/// # Example
///
/// ```rust
/// use segvault_codec::{EntryType, Segment, SegmentIterator};
///
/// let mut segment = Segment::new();
/// segment.append(EntryType::LogDigest, &[0, 0, 0, 0]).unwrap();
/// let (bytes, certificate) = segment.freeze();
///
/// let entries: Vec<_> = SegmentIterator::new(&bytes, &certificate).unwrap().collect();
/// assert_eq!(entries.len(), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Segment {
    buf: BytesMut,
    running: u32,
    capacity: Option<usize>,
}

impl Segment {
    /// Creates an unbounded, empty segment.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty segment that refuses to grow past `capacity` bytes.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
            running: 0,
            capacity: Some(capacity),
        }
    }

    /// Appends an entry and returns the offset it was written at.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::SegmentFull`] if the entry does not fit, or an
    /// error if the payload is longer than `u32::MAX` bytes.
    pub fn append(&mut self, entry_type: EntryType, payload: &[u8]) -> CodecResult<u32> {
        let payload_len = u32::try_from(payload.len())
            .map_err(|_| CodecError::malformed("entry", "payload longer than 4 GiB"))?;
        let mut framed = Vec::with_capacity(5 + payload.len());
        encode_header(entry_type, payload_len, &mut framed);
        framed.extend_from_slice(payload);
        self.push(&framed)
    }

    /// Appends an already framed entry verbatim and returns its offset.
    ///
    /// # Errors
    ///
    /// Returns an error if `raw` is not exactly one well-formed entry or if
    /// it does not fit.
    pub fn append_raw(&mut self, raw: &[u8]) -> CodecResult<u32> {
        let header = decode_header(raw, 0)?;
        if header.total_len() != raw.len() {
            return Err(CodecError::malformed(
                "entry",
                format!(
                    "framing describes {} bytes but {} were supplied",
                    header.total_len(),
                    raw.len()
                ),
            ));
        }
        self.push(raw)
    }

    fn push(&mut self, bytes: &[u8]) -> CodecResult<u32> {
        if let Some(capacity) = self.capacity {
            let remaining = capacity.saturating_sub(self.buf.len());
            if bytes.len() > remaining {
                return Err(CodecError::SegmentFull {
                    needed: bytes.len(),
                    remaining,
                });
            }
        }
        let offset = u32::try_from(self.buf.len())
            .map_err(|_| CodecError::malformed("segment", "segment longer than 4 GiB"))?;
        if u32::try_from(self.buf.len() + bytes.len()).is_err() {
            return Err(CodecError::malformed("segment", "segment longer than 4 GiB"));
        }
        self.buf.extend_from_slice(bytes);
        self.running = crc32c::crc32c_append(self.running, bytes);
        Ok(offset)
    }

    /// Returns the certificate covering everything appended so far.
    #[must_use]
    pub fn certificate(&self) -> Certificate {
        // push() keeps the length within u32.
        Certificate::from_running(self.buf.len() as u32, self.running)
    }

    /// Returns the number of bytes appended.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Returns true if nothing has been appended.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Returns the bytes appended so far.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Finishes the segment, returning its immutable bytes and certificate.
    #[must_use]
    pub fn freeze(self) -> (Bytes, Certificate) {
        let certificate = self.certificate();
        (self.buf.freeze(), certificate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_segment_certificate() {
        let segment = Segment::new();
        assert!(segment.is_empty());
        assert_eq!(segment.certificate(), Certificate::compute(b"").unwrap());
    }

    #[test]
    fn append_returns_offsets() {
        let mut segment = Segment::new();
        assert_eq!(segment.append(EntryType::Object, &[1, 2, 3]).unwrap(), 0);
        assert_eq!(segment.append(EntryType::Object, &[4]).unwrap(), 5);
        assert_eq!(segment.len(), 8);
        assert_eq!(segment.as_bytes(), &[0x02, 3, 1, 2, 3, 0x02, 1, 4]);
    }

    #[test]
    fn running_certificate_matches_full_scan() {
        let mut segment = Segment::new();
        segment.append(EntryType::Object, b"first").unwrap();
        segment.append(EntryType::ObjectTombstone, b"second").unwrap();
        let expected = Certificate::compute(segment.as_bytes()).unwrap();
        assert_eq!(segment.certificate(), expected);

        let (bytes, certificate) = segment.freeze();
        assert_eq!(certificate, expected);
        assert!(certificate.verify(&bytes).is_ok());
    }

    #[test]
    fn bounded_segment_rejects_overflow() {
        let mut segment = Segment::with_capacity(6);
        segment.append(EntryType::Object, &[0; 3]).unwrap();
        let result = segment.append(EntryType::Object, &[0; 1]);
        assert_eq!(
            result,
            Err(CodecError::SegmentFull {
                needed: 3,
                remaining: 1
            })
        );
        assert_eq!(segment.len(), 5);
    }

    #[test]
    fn append_raw_copies_framing() {
        let mut source = Segment::new();
        source.append(EntryType::Object, b"payload").unwrap();

        let mut copy = Segment::new();
        copy.append_raw(source.as_bytes()).unwrap();
        assert_eq!(copy.as_bytes(), source.as_bytes());
        assert_eq!(copy.certificate(), source.certificate());
    }

    #[test]
    fn append_raw_rejects_partial_entries() {
        let mut segment = Segment::new();
        assert!(segment.append_raw(&[0x02, 5, 1, 2]).is_err());
        assert!(segment.append_raw(&[0x02, 1, 1, 2]).is_err());
        assert!(segment.is_empty());
    }
}
