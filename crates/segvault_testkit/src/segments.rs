//! Segment and tablet fixtures.

use segvault_codec::{
    key_hash, Certificate, EntryType, LogDigest, Object, ObjectTombstone, Segment, SegmentHeader,
};
use segvault_core::{PartitionList, TabletDescriptor};

/// Table every fixture object lives in unless told otherwise.
pub const TEST_TABLE: u64 = 123;

/// Capacity recorded in fixture segment headers.
pub const FIXTURE_CAPACITY: u32 = 64 * 1024;

/// A certified segment built entry by entry.
///
/// # Example
///
/// ```rust
/// use segvault_testkit::SegmentFixture;
///
/// let segment = SegmentFixture::new(99, 88).object(123, "10").object(123, "30");
/// assert_eq!(segment.certificate().segment_length as usize, segment.len());
/// ```
#[derive(Debug, Clone, Default)]
pub struct SegmentFixture {
    segment: Segment,
}

impl SegmentFixture {
    /// Starts a segment of `log_id`'s log with a header entry.
    pub fn new(log_id: u64, segment_id: u64) -> Self {
        Self::headerless().entry(
            EntryType::SegmentHeader,
            &SegmentHeader::new(log_id, segment_id, FIXTURE_CAPACITY).encode(),
        )
    }

    /// Starts a segment with no header entry.
    pub fn headerless() -> Self {
        Self::default()
    }

    /// Appends an object with an empty value.
    pub fn object(self, table_id: u64, key: &str) -> Self {
        self.object_with_value(table_id, key, "")
    }

    /// Appends an object.
    pub fn object_with_value(self, table_id: u64, key: &str, value: &str) -> Self {
        let payload = Object::new(table_id, key, value)
            .encode()
            .expect("fixture object encodes");
        self.entry(EntryType::Object, &payload)
    }

    /// Appends a tombstone for an object that lived in `segment_id`.
    pub fn tombstone(self, table_id: u64, key: &str, segment_id: u64) -> Self {
        let payload = ObjectTombstone {
            table_id,
            key: key.as_bytes().to_vec(),
            segment_id,
            object_version: 1,
            timestamp: 0,
        }
        .encode()
        .expect("fixture tombstone encodes");
        self.entry(EntryType::ObjectTombstone, &payload)
    }

    /// Appends a log digest.
    pub fn digest(self, segment_ids: &[u64]) -> Self {
        let payload = LogDigest {
            segment_ids: segment_ids.to_vec(),
        }
        .encode()
        .expect("fixture digest encodes");
        self.entry(EntryType::LogDigest, &payload)
    }

    /// Appends an arbitrary entry.
    pub fn entry(mut self, entry_type: EntryType, payload: &[u8]) -> Self {
        self.segment
            .append(entry_type, payload)
            .expect("fixture entry fits");
        self
    }

    /// Returns the bytes appended so far.
    pub fn bytes(&self) -> &[u8] {
        self.segment.as_bytes()
    }

    /// Returns the length in bytes.
    pub fn len(&self) -> usize {
        self.segment.len()
    }

    /// Returns true if nothing was appended.
    pub fn is_empty(&self) -> bool {
        self.segment.is_empty()
    }

    /// Returns the certificate covering everything appended.
    pub fn certificate(&self) -> Certificate {
        self.segment.certificate()
    }

    /// Returns the certificate paired with the offset its footer goes at,
    /// right after the last entry.
    pub fn sealed(&self) -> (u32, Certificate) {
        let certificate = self.certificate();
        (certificate.segment_length, certificate)
    }
}

/// Returns a tablet covering exactly the hash of `key` in `table_id`.
pub fn tablet_for_key(table_id: u64, key: &str, partition_id: u64) -> TabletDescriptor {
    let hash = key_hash(table_id, key.as_bytes());
    TabletDescriptor::new(table_id, hash, hash, partition_id)
}

/// Returns the standard recovery partitioning used across the tests.
///
/// Three tablets of [`TEST_TABLE`], each covering a single key:
///
/// | key    | partition | created at       |
/// |--------|-----------|------------------|
/// | `"10"` | 0         |                  |
/// | `"30"` | 1         |                  |
/// | `"XX"` | 0         | `(12741, 57273)` |
pub fn sample_tablets() -> PartitionList {
    PartitionList::from_tablets(vec![
        tablet_for_key(TEST_TABLE, "10", 0),
        tablet_for_key(TEST_TABLE, "30", 1),
        tablet_for_key(TEST_TABLE, "XX", 0).with_ctime(12741, 57273),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use segvault_codec::SegmentIterator;

    #[test]
    fn fixture_entries_iterate_in_order() {
        let segment = SegmentFixture::new(99, 88)
            .object(TEST_TABLE, "10")
            .tombstone(TEST_TABLE, "30", 87)
            .digest(&[86, 87, 88]);
        let types: Vec<EntryType> = SegmentIterator::new(segment.bytes(), &segment.certificate())
            .unwrap()
            .map(|entry| entry.unwrap().entry_type)
            .collect();
        assert_eq!(
            types,
            vec![
                EntryType::SegmentHeader,
                EntryType::Object,
                EntryType::ObjectTombstone,
                EntryType::LogDigest,
            ]
        );
    }

    #[test]
    fn sample_tablets_have_two_partitions() {
        let tablets = sample_tablets();
        assert_eq!(tablets.len(), 3);
        assert_eq!(tablets.partition_ids(), vec![0, 1]);
    }
}
