//! Iteration over the entries of a certified segment.

use crate::certificate::{Certificate, CERTIFICATE_SIZE};
use crate::entry::{decode_header, EntryType, LogPosition};
use crate::error::{CodecError, CodecResult};
use crate::object::{parse_tombstone, KeyRef, ObjectView, SegmentHeader, INVALID_SEGMENT_ID};

/// One entry of a segment, borrowed from the segment bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Entry<'a> {
    /// Type of the entry.
    pub entry_type: EntryType,
    /// Byte offset of the entry within the segment.
    pub offset: u32,
    /// Where the master appended this entry.
    pub position: LogPosition,
    /// Payload bytes.
    pub payload: &'a [u8],
    /// Framing plus payload, exactly as stored.
    pub raw: &'a [u8],
}

impl<'a> Entry<'a> {
    /// Length of the payload.
    #[must_use]
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }

    /// Returns the key of an object or tombstone, `None` for other entries.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is malformed or fails its checksum.
    pub fn key(&self) -> CodecResult<Option<KeyRef<'a>>> {
        match self.entry_type {
            EntryType::Object => Ok(Some(ObjectView::parse(self.payload)?.key_ref())),
            EntryType::ObjectTombstone => Ok(Some(parse_tombstone(self.payload)?.0)),
            _ => Ok(None),
        }
    }
}

/// Walks the entries of a segment in the order they were appended.
///
/// Only the bytes covered by the certificate are visited, and those bytes
/// are checked against the certificate before the iterator is handed out.
/// Positions take their segment id from the segment header entry when one
/// is present and from [`SegmentIterator::with_segment_id`] otherwise.
///
/// The iterator yields `Err` at most once and then stops.
///
/// # Example
///
/// ```rust
/// use segvault_codec::{EntryType, Object, Segment, SegmentIterator};
///
/// let mut segment = Segment::new();
/// segment.append(EntryType::Object, &Object::new(1, "k", "v").encode().unwrap()).unwrap();
/// let certificate = segment.certificate();
///
/// for entry in SegmentIterator::new(segment.as_bytes(), &certificate).unwrap() {
///     let entry = entry.unwrap();
///     assert_eq!(entry.entry_type, EntryType::Object);
/// }
/// ```
#[derive(Debug, Clone)]
pub struct SegmentIterator<'a> {
    data: &'a [u8],
    pos: usize,
    default_segment_id: u64,
    segment_id: u64,
    finished: bool,
}

impl<'a> SegmentIterator<'a> {
    /// Validates `data` against `certificate` and positions at the first entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the certificate claims more bytes than `data`
    /// holds or the checksum does not match.
    pub fn new(data: &'a [u8], certificate: &Certificate) -> CodecResult<Self> {
        certificate.verify(data)?;
        Ok(Self {
            data: &data[..certificate.segment_length as usize],
            pos: 0,
            default_segment_id: INVALID_SEGMENT_ID,
            segment_id: INVALID_SEGMENT_ID,
            finished: false,
        })
    }

    /// Sets the segment id used for positions until a segment header is seen.
    #[must_use]
    pub fn with_segment_id(mut self, segment_id: u64) -> Self {
        self.default_segment_id = segment_id;
        self.segment_id = segment_id;
        self
    }

    /// Rewinds to the first entry.
    pub fn restart(&mut self) {
        self.pos = 0;
        self.segment_id = self.default_segment_id;
        self.finished = false;
    }

    /// Returns the number of certified bytes.
    #[must_use]
    pub fn certified_len(&self) -> usize {
        self.data.len()
    }

    fn next_entry(&mut self) -> CodecResult<Entry<'a>> {
        // new() bounds data by a u32 length.
        let offset = self.pos as u32;
        let rest = &self.data[self.pos..];
        let header = decode_header(rest, offset)?;
        if header.entry_type == EntryType::Invalid {
            return Err(CodecError::InvalidEntryType {
                type_byte: 0,
                offset,
            });
        }
        if rest.len() < header.total_len() {
            return Err(CodecError::Truncated {
                offset,
                needed: header.total_len(),
                available: rest.len(),
            });
        }
        let raw = &rest[..header.total_len()];
        let payload = &raw[header.header_len..];

        if header.entry_type == EntryType::SegmentHeader {
            self.segment_id = SegmentHeader::decode(payload)?.segment_id;
        }
        self.pos += header.total_len();

        Ok(Entry {
            entry_type: header.entry_type,
            offset,
            position: LogPosition::new(self.segment_id, offset),
            payload,
            raw,
        })
    }
}

impl<'a> Iterator for SegmentIterator<'a> {
    type Item = CodecResult<Entry<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished || self.pos >= self.data.len() {
            return None;
        }
        let result = self.next_entry();
        if result.is_err() {
            self.finished = true;
        }
        Some(result)
    }
}

/// Location and content of a segment footer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Footer {
    /// Offset of the footer entry.
    pub offset: u32,
    /// Certificate sealed into the footer.
    pub certificate: Certificate,
}

/// Walks the framing of `data` from the start until a segment footer.
///
/// Returns `Ok(None)` if the walk reaches zeroed space or the end of `data`
/// without finding a footer. No checksums are verified; callers validate
/// the returned certificate with [`SegmentIterator::new`].
///
/// # Errors
///
/// Returns an error if the framing is corrupt or the footer payload is not
/// a certificate.
pub fn find_footer(data: &[u8]) -> CodecResult<Option<Footer>> {
    let mut pos = 0usize;
    while pos < data.len() {
        let offset = u32::try_from(pos)
            .map_err(|_| CodecError::malformed("segment", "segment longer than 4 GiB"))?;
        let header = decode_header(&data[pos..], offset)?;
        match header.entry_type {
            EntryType::Invalid => return Ok(None),
            EntryType::SegmentFooter => {
                let start = pos + header.header_len;
                let end = start + CERTIFICATE_SIZE;
                if header.payload_len as usize != CERTIFICATE_SIZE || end > data.len() {
                    return Err(CodecError::malformed(
                        "segment footer",
                        format!("footer at {offset} does not hold a certificate"),
                    ));
                }
                let certificate = Certificate::from_bytes(&data[start..end])?;
                return Ok(Some(Footer {
                    offset,
                    certificate,
                }));
            }
            _ => pos += header.total_len(),
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{Object, ObjectTombstone};
    use crate::segment::Segment;

    fn sealed(segment: &mut Segment) -> Certificate {
        let certificate = segment.certificate();
        segment
            .append(EntryType::SegmentFooter, &certificate.to_bytes())
            .unwrap();
        certificate
    }

    #[test]
    fn iterates_entries_in_order() {
        let mut segment = Segment::new();
        segment
            .append(EntryType::SegmentHeader, &SegmentHeader::new(99, 88, 1024).encode())
            .unwrap();
        let object_offset = segment
            .append(EntryType::Object, &Object::new(123, "10", "").encode().unwrap())
            .unwrap();
        let certificate = segment.certificate();

        let entries: Vec<_> = SegmentIterator::new(segment.as_bytes(), &certificate)
            .unwrap()
            .collect::<CodecResult<_>>()
            .unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].entry_type, EntryType::SegmentHeader);
        assert_eq!(entries[1].offset, object_offset);
        assert_eq!(entries[1].position, LogPosition::new(88, object_offset));
        assert_eq!(entries[1].raw.len(), 30);
        assert_eq!(entries[1].payload_len(), 28);
    }

    #[test]
    fn caller_segment_id_used_without_header() {
        let mut segment = Segment::new();
        segment
            .append(EntryType::Object, &Object::new(1, "a", "").encode().unwrap())
            .unwrap();
        let certificate = segment.certificate();

        let mut iter = SegmentIterator::new(segment.as_bytes(), &certificate)
            .unwrap()
            .with_segment_id(12741);
        let entry = iter.next().unwrap().unwrap();
        assert_eq!(entry.position, LogPosition::new(12741, 0));
        assert!(iter.next().is_none());

        iter.restart();
        assert!(iter.next().is_some());
    }

    #[test]
    fn stops_at_certified_length() {
        let mut segment = Segment::new();
        segment.append(EntryType::LogDigest, &[0; 4]).unwrap();
        let certificate = sealed(&mut segment);

        let iter = SegmentIterator::new(segment.as_bytes(), &certificate).unwrap();
        assert_eq!(iter.certified_len(), 6);
        assert_eq!(iter.count(), 1);
    }

    #[test]
    fn rejects_bad_checksum() {
        let mut segment = Segment::new();
        segment.append(EntryType::LogDigest, &[0; 4]).unwrap();
        let certificate = segment.certificate();
        let mut bytes = segment.as_bytes().to_vec();
        bytes[3] = 1;

        assert!(matches!(
            SegmentIterator::new(&bytes, &certificate),
            Err(CodecError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn truncated_entry_is_reported_once() {
        // Framing claims 9 payload bytes, only 2 follow.
        let bytes = [0x02u8, 9, 1, 2];
        let certificate = Certificate::compute(&bytes).unwrap();

        let mut iter = SegmentIterator::new(&bytes, &certificate).unwrap();
        assert!(matches!(
            iter.next(),
            Some(Err(CodecError::Truncated { offset: 0, .. }))
        ));
        assert!(iter.next().is_none());
    }

    #[test]
    fn zeroed_entry_is_invalid() {
        let bytes = [0u8; 4];
        let certificate = Certificate::compute(&bytes).unwrap();
        let mut iter = SegmentIterator::new(&bytes, &certificate).unwrap();
        assert!(matches!(
            iter.next(),
            Some(Err(CodecError::InvalidEntryType { type_byte: 0, .. }))
        ));
    }

    #[test]
    fn entry_keys() {
        let mut segment = Segment::new();
        segment
            .append(EntryType::Object, &Object::new(5, "obj", "v").encode().unwrap())
            .unwrap();
        let tombstone = ObjectTombstone {
            table_id: 6,
            key: b"dead".to_vec(),
            segment_id: 1,
            object_version: 1,
            timestamp: 0,
        };
        segment
            .append(EntryType::ObjectTombstone, &tombstone.encode().unwrap())
            .unwrap();
        segment.append(EntryType::LogDigest, &[0; 4]).unwrap();
        let certificate = segment.certificate();

        let keys: Vec<_> = SegmentIterator::new(segment.as_bytes(), &certificate)
            .unwrap()
            .map(|entry| entry.unwrap().key().unwrap())
            .collect();
        assert_eq!(keys[0].unwrap().key, b"obj");
        assert_eq!(keys[1].unwrap().table_id, 6);
        assert!(keys[2].is_none());
    }

    #[test]
    fn find_footer_in_zero_padded_frame() {
        let mut segment = Segment::new();
        segment
            .append(EntryType::Object, &Object::new(1, "k", "v").encode().unwrap())
            .unwrap();
        let certificate = sealed(&mut segment);
        let mut frame = segment.as_bytes().to_vec();
        frame.resize(256, 0);

        let footer = find_footer(&frame).unwrap().unwrap();
        assert_eq!(footer.certificate, certificate);
        assert_eq!(footer.offset, certificate.segment_length);
        assert!(SegmentIterator::new(&frame, &footer.certificate).is_ok());
    }

    #[test]
    fn find_footer_absent() {
        assert_eq!(find_footer(&[0u8; 64]).unwrap(), None);
        assert_eq!(find_footer(&[]).unwrap(), None);

        let mut segment = Segment::new();
        segment.append(EntryType::LogDigest, &[0; 4]).unwrap();
        assert_eq!(find_footer(segment.as_bytes()).unwrap(), None);
    }
}
