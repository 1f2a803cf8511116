//! Tablet descriptors and the partition list used during recovery.
//!
//! A recovering master's share of the data is described as a list of
//! tablets. Each tablet covers an inclusive key-hash range of one table and
//! names the partition it is recovered into. Several tablets may map to the
//! same partition.
//!
//! The list is usually supplied by the coordinator, and offline tools read
//! it as JSON:
//!
//! ```json
//! {"tablets": [
//!   {"table_id": 123, "start_key_hash": 0, "end_key_hash": 18446744073709551615,
//!    "partition_id": 0, "ctime": {"segment_id": 12741, "offset": 57273}}
//! ]}
//! ```

use segvault_codec::LogPosition;
use serde::{Deserialize, Serialize};

/// Log head position at the time a tablet was created.
///
/// Entries at or before this position belong to an earlier incarnation of
/// the key range and are never recovered into the tablet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Watermark {
    /// Head segment id when the tablet was created.
    pub segment_id: u64,
    /// Head segment offset when the tablet was created.
    pub offset: u32,
}

impl Watermark {
    /// Creates a watermark.
    #[must_use]
    pub const fn new(segment_id: u64, offset: u32) -> Self {
        Self { segment_id, offset }
    }

    /// Returns the watermark as a log position.
    #[must_use]
    pub const fn position(&self) -> LogPosition {
        LogPosition::new(self.segment_id, self.offset)
    }
}

/// A contiguous key-hash range of one table, assigned to a partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabletDescriptor {
    /// Table the tablet belongs to.
    pub table_id: u64,
    /// First key hash covered (inclusive).
    pub start_key_hash: u64,
    /// Last key hash covered (inclusive).
    pub end_key_hash: u64,
    /// Partition the tablet is recovered into.
    pub partition_id: u64,
    /// Log head position when the tablet was created, if recorded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ctime: Option<Watermark>,
}

impl TabletDescriptor {
    /// Creates a tablet without a creation watermark.
    #[must_use]
    pub const fn new(table_id: u64, start_key_hash: u64, end_key_hash: u64, partition_id: u64) -> Self {
        Self {
            table_id,
            start_key_hash,
            end_key_hash,
            partition_id,
            ctime: None,
        }
    }

    /// Sets the creation watermark.
    #[must_use]
    pub const fn with_ctime(mut self, segment_id: u64, offset: u32) -> Self {
        self.ctime = Some(Watermark::new(segment_id, offset));
        self
    }

    /// Returns true if the tablet covers `key_hash` of `table_id`.
    #[must_use]
    pub const fn contains(&self, table_id: u64, key_hash: u64) -> bool {
        self.table_id == table_id
            && self.start_key_hash <= key_hash
            && key_hash <= self.end_key_hash
    }
}

/// An ordered list of tablets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionList {
    tablets: Vec<TabletDescriptor>,
}

impl PartitionList {
    /// Creates an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a list from tablets, keeping their order.
    #[must_use]
    pub fn from_tablets(tablets: Vec<TabletDescriptor>) -> Self {
        Self { tablets }
    }

    /// Appends a tablet.
    pub fn push(&mut self, tablet: TabletDescriptor) {
        self.tablets.push(tablet);
    }

    /// Returns the tablets in order.
    #[must_use]
    pub fn tablets(&self) -> &[TabletDescriptor] {
        &self.tablets
    }

    /// Returns the number of tablets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tablets.len()
    }

    /// Returns true if the list holds no tablets.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tablets.is_empty()
    }

    /// Returns the distinct partition ids in the order they first appear.
    ///
    /// The position of an id in this list is its partition index.
    #[must_use]
    pub fn partition_ids(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = Vec::new();
        for tablet in &self.tablets {
            if !ids.contains(&tablet.partition_id) {
                ids.push(tablet.partition_id);
            }
        }
        ids
    }

    /// Returns the number of distinct partitions.
    #[must_use]
    pub fn partition_count(&self) -> usize {
        self.partition_ids().len()
    }

    /// Returns the first tablet covering `key_hash` of `table_id`.
    #[must_use]
    pub fn find_tablet(&self, table_id: u64, key_hash: u64) -> Option<&TabletDescriptor> {
        self.tablets
            .iter()
            .find(|tablet| tablet.contains(table_id, key_hash))
    }
}

impl FromIterator<TabletDescriptor> for PartitionList {
    fn from_iter<I: IntoIterator<Item = TabletDescriptor>>(iter: I) -> Self {
        Self::from_tablets(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contains_is_inclusive() {
        let tablet = TabletDescriptor::new(1, 10, 20, 0);
        assert!(tablet.contains(1, 10));
        assert!(tablet.contains(1, 20));
        assert!(!tablet.contains(1, 21));
        assert!(!tablet.contains(2, 15));
    }

    #[test]
    fn partition_ids_in_first_seen_order() {
        let list: PartitionList = [
            TabletDescriptor::new(1, 0, 0, 7),
            TabletDescriptor::new(1, 1, 1, 3),
            TabletDescriptor::new(1, 2, 2, 7),
            TabletDescriptor::new(2, 0, 0, 5),
        ]
        .into_iter()
        .collect();
        assert_eq!(list.partition_ids(), vec![7, 3, 5]);
        assert_eq!(list.partition_count(), 3);
        assert_eq!(list.len(), 4);
    }

    #[test]
    fn empty_list_has_no_partitions() {
        let list = PartitionList::new();
        assert!(list.is_empty());
        assert_eq!(list.partition_count(), 0);
        assert!(list.find_tablet(1, 1).is_none());
    }

    #[test]
    fn find_tablet_returns_first_match() {
        let mut list = PartitionList::new();
        list.push(TabletDescriptor::new(1, 0, 100, 0));
        list.push(TabletDescriptor::new(1, 50, 150, 1));
        assert_eq!(list.find_tablet(1, 75).unwrap().partition_id, 0);
        assert_eq!(list.find_tablet(1, 120).unwrap().partition_id, 1);
        assert!(list.find_tablet(1, 151).is_none());
    }

    #[test]
    fn watermark_position() {
        let tablet = TabletDescriptor::new(123, 0, 0, 0).with_ctime(12741, 57273);
        assert_eq!(
            tablet.ctime.unwrap().position(),
            LogPosition::new(12741, 57273)
        );
    }

    #[test]
    fn parses_json_tablet_list() {
        let json = r#"{"tablets": [
            {"table_id": 123, "start_key_hash": 0, "end_key_hash": 18446744073709551615,
             "partition_id": 0, "ctime": {"segment_id": 12741, "offset": 57273}},
            {"table_id": 124, "start_key_hash": 5, "end_key_hash": 9, "partition_id": 1}
        ]}"#;
        let list: PartitionList = serde_json::from_str(json).unwrap();

        assert_eq!(list.len(), 2);
        assert_eq!(list.tablets()[0].ctime, Some(Watermark::new(12741, 57273)));
        assert_eq!(list.tablets()[1].ctime, None);
        assert_eq!(list.find_tablet(124, 9).unwrap().partition_id, 1);

        let encoded = serde_json::to_string(&list.tablets()[1]).unwrap();
        assert!(!encoded.contains("ctime"));
    }
}
