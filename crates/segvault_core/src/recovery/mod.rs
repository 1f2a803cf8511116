//! Recovery segments.
//!
//! When a master crashes, every backup holding one of its replicas splits
//! that replica into one *recovery segment* per partition of the master's
//! data. Each recovering master then fetches its partition's recovery
//! segment from every replica.
//!
//! [`partition_segment`] is the scan itself. It works on raw bytes and has
//! no lifecycle, so offline tools can run it directly; replicas run it
//! through [`BackupReplica::build_recovery_segments`](crate::BackupReplica::build_recovery_segments).

mod filter;

pub use filter::{is_entry_alive, which_partition};

use crate::partition::PartitionList;
use bytes::Bytes;
use segvault_codec::{Certificate, CodecResult, Segment, SegmentIterator};

/// The entries of one replica destined for one partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoverySegment {
    bytes: Bytes,
    certificate: Certificate,
}

impl RecoverySegment {
    /// Returns the segment bytes.
    #[must_use]
    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    /// Returns the certificate covering the bytes.
    #[must_use]
    pub const fn certificate(&self) -> Certificate {
        self.certificate
    }

    /// Returns the length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns true if no entry was routed to this partition.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Returns an iterator over the entries.
    ///
    /// # Errors
    ///
    /// Never fails for segments produced by [`partition_segment`].
    pub fn entries(&self) -> CodecResult<SegmentIterator<'_>> {
        SegmentIterator::new(&self.bytes, &self.certificate)
    }
}

/// State of a replica's recovery segments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RecoveryOutcome {
    /// No build has finished.
    #[default]
    NotBuilt,
    /// One recovery segment per partition, in partition index order.
    Built(Vec<RecoverySegment>),
    /// The replica's content could not be partitioned.
    Poisoned(String),
}

impl RecoveryOutcome {
    /// Returns true once a build has finished, successfully or not.
    #[must_use]
    pub const fn is_settled(&self) -> bool {
        !matches!(self, Self::NotBuilt)
    }
}

/// Splits a certified segment into one recovery segment per partition.
///
/// `segment_id` is the id positions are reported under when the segment
/// carries no header entry. Structural entries are skipped; objects and
/// tombstones are copied, framing and all, into the recovery segment of the
/// partition [`which_partition`] picks. Entries keep their relative order.
/// Partition indexes follow [`PartitionList::partition_ids`].
///
/// # Errors
///
/// Returns an error if the content does not match the certificate or an
/// entry is malformed. Nothing is returned for the partitions in that case.
pub fn partition_segment(
    segment_id: u64,
    content: &[u8],
    certificate: &Certificate,
    partitions: &PartitionList,
) -> CodecResult<Vec<RecoverySegment>> {
    let partition_ids = partitions.partition_ids();
    let mut accumulators: Vec<Segment> = partition_ids.iter().map(|_| Segment::new()).collect();

    for entry in SegmentIterator::new(content, certificate)?.with_segment_id(segment_id) {
        let entry = entry?;
        if entry.entry_type.is_structural() {
            continue;
        }
        let Some(key) = entry.key()? else {
            continue;
        };
        let Some(tablet) = which_partition(&key, entry.position, partitions) else {
            continue;
        };
        let Some(index) = partition_ids
            .iter()
            .position(|id| *id == tablet.partition_id)
        else {
            continue;
        };
        accumulators[index].append_raw(entry.raw)?;
    }

    Ok(accumulators
        .into_iter()
        .map(|accumulator| {
            let (bytes, certificate) = accumulator.freeze();
            RecoverySegment { bytes, certificate }
        })
        .collect())
}
