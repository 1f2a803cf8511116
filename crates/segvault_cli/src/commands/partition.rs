//! Partition command implementation.

use super::image::{read_frame, sealed_certificate};
use segvault_codec::INVALID_SEGMENT_ID;
use segvault_core::{partition_segment, PartitionList};
use serde::Serialize;
use std::path::Path;

/// Result of partitioning one frame.
#[derive(Debug, Serialize)]
pub struct PartitionResult {
    /// Bytes of the source segment.
    pub source_length: u32,
    /// Number of tablets in the partition list.
    pub tablet_count: usize,
    /// One entry per partition, in partition index order.
    pub partitions: Vec<PartitionStats>,
}

/// Statistics for a single recovery segment.
#[derive(Debug, Serialize)]
pub struct PartitionStats {
    /// Index recovering masters ask for.
    pub index: usize,
    /// Partition id from the tablet list.
    pub partition_id: u64,
    /// Length in bytes.
    pub length: u32,
    /// Certificate checksum.
    pub checksum: u32,
    /// Number of entries.
    pub entry_count: usize,
}

/// Runs the partition command.
pub fn run(
    image: &Path,
    frame_size: usize,
    frame: usize,
    tablets: &Path,
    segment_id: Option<u64>,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let partitions: PartitionList = serde_json::from_str(&std::fs::read_to_string(tablets)?)?;
    let result = partition(image, frame_size, frame, &partitions, segment_id)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            println!(
                "{} bytes split over {} partitions ({} tablets)",
                result.source_length,
                result.partitions.len(),
                result.tablet_count
            );
            println!();
            for stats in &result.partitions {
                println!(
                    "  [{}] partition {:<6} {:>8} bytes  {:>6} entries  checksum {:#010x}",
                    stats.index, stats.partition_id, stats.length, stats.entry_count, stats.checksum
                );
            }
        }
    }

    Ok(())
}

/// Reads one frame and splits it by `partitions`.
pub fn partition(
    image: &Path,
    frame_size: usize,
    frame: usize,
    partitions: &PartitionList,
    segment_id: Option<u64>,
) -> Result<PartitionResult, Box<dyn std::error::Error>> {
    let data = read_frame(image, frame_size, frame)?;
    let certificate = sealed_certificate(&data)?;
    let segments = partition_segment(
        segment_id.unwrap_or(INVALID_SEGMENT_ID),
        &data,
        &certificate,
        partitions,
    )?;

    let mut result = PartitionResult {
        source_length: certificate.segment_length,
        tablet_count: partitions.len(),
        partitions: Vec::with_capacity(segments.len()),
    };
    for ((index, segment), partition_id) in segments
        .iter()
        .enumerate()
        .zip(partitions.partition_ids())
    {
        result.partitions.push(PartitionStats {
            index,
            partition_id,
            length: segment.certificate().segment_length,
            checksum: segment.certificate().checksum,
            entry_count: segment.entries()?.count(),
        });
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::image::tests::{write_image, FRAME_SIZE};
    use tempfile::TempDir;

    #[test]
    fn splits_frame_by_tablets() {
        let dir = TempDir::new().unwrap();
        let path = write_image(&dir, &["10", "30", "10"]);
        let tablets: PartitionList = serde_json::from_str(&format!(
            r#"{{"tablets": [
                {{"table_id": 123, "start_key_hash": {h10}, "end_key_hash": {h10}, "partition_id": 7}},
                {{"table_id": 123, "start_key_hash": {h30}, "end_key_hash": {h30}, "partition_id": 3}}
            ]}}"#,
            h10 = segvault_codec::key_hash(123, b"10"),
            h30 = segvault_codec::key_hash(123, b"30"),
        ))
        .unwrap();

        let result = partition(&path, FRAME_SIZE, 1, &tablets, None).unwrap();
        assert_eq!(result.source_length, 120);
        assert_eq!(result.partitions.len(), 2);
        assert_eq!(result.partitions[0].partition_id, 7);
        assert_eq!(result.partitions[0].entry_count, 2);
        assert_eq!(result.partitions[0].length, 60);
        assert_eq!(result.partitions[1].partition_id, 3);
        assert_eq!(result.partitions[1].entry_count, 1);
    }
}
