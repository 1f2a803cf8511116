//! Inspect command implementation.

use super::image::{read_frame, sealed_certificate};
use segvault_codec::{EntryType, SegmentHeader, SegmentIterator};
use serde::Serialize;
use std::path::Path;

/// Frame inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Image path.
    pub image: String,
    /// Frame index.
    pub frame: usize,
    /// Bytes covered by the footer's certificate.
    pub segment_length: u32,
    /// Certificate checksum.
    pub checksum: u32,
    /// Segment id from the segment header, if the frame has one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub segment_id: Option<u64>,
    /// Entries in append order.
    pub entries: Vec<EntryInfo>,
}

/// A single entry of the frame.
#[derive(Debug, Serialize)]
pub struct EntryInfo {
    /// Entry type name.
    pub entry_type: String,
    /// Offset of the entry's framing.
    pub offset: u32,
    /// Payload length in bytes.
    pub length: usize,
    /// Table of an object or tombstone.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table_id: Option<u64>,
    /// Key hash of an object or tombstone.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_hash: Option<u64>,
}

/// Runs the inspect command.
pub fn run(
    image: &Path,
    frame_size: usize,
    frame: usize,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let result = inspect(image, frame_size, frame)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }

    Ok(())
}

/// Reads and walks one frame.
pub fn inspect(
    image: &Path,
    frame_size: usize,
    frame: usize,
) -> Result<InspectResult, Box<dyn std::error::Error>> {
    let data = read_frame(image, frame_size, frame)?;
    let certificate = sealed_certificate(&data)?;

    let mut result = InspectResult {
        image: image.display().to_string(),
        frame,
        segment_length: certificate.segment_length,
        checksum: certificate.checksum,
        segment_id: None,
        entries: Vec::new(),
    };

    for entry in SegmentIterator::new(&data, &certificate)? {
        let entry = entry?;
        if entry.entry_type == EntryType::SegmentHeader {
            result.segment_id = Some(SegmentHeader::decode(entry.payload)?.segment_id);
        }
        let key = entry.key()?;
        result.entries.push(EntryInfo {
            entry_type: entry.entry_type.to_string(),
            offset: entry.offset,
            length: entry.payload_len(),
            table_id: key.map(|key| key.table_id),
            key_hash: key.map(|key| key.hash()),
        });
    }

    Ok(result)
}

fn print_text_output(result: &InspectResult) {
    println!("segvault Frame Inspection");
    println!("=========================");
    println!();
    println!("Image: {}", result.image);
    println!("Frame: {}", result.frame);
    if let Some(segment_id) = result.segment_id {
        println!("Segment: {segment_id}");
    }
    println!();
    println!("Certificate:");
    println!("  Length:   {} bytes", result.segment_length);
    println!("  Checksum: {:#010x}", result.checksum);
    println!();
    println!("Entries ({}):", result.entries.len());
    for entry in &result.entries {
        match (entry.table_id, entry.key_hash) {
            (Some(table_id), Some(key_hash)) => println!(
                "  {:>8}  {:<16} {:>6} bytes  table {table_id} hash {key_hash:#018x}",
                entry.offset, entry.entry_type, entry.length
            ),
            _ => println!(
                "  {:>8}  {:<16} {:>6} bytes",
                entry.offset, entry.entry_type, entry.length
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::image::tests::{write_image, FRAME_SIZE};
    use tempfile::TempDir;

    #[test]
    fn lists_entries_with_keys() {
        let dir = TempDir::new().unwrap();
        let path = write_image(&dir, &["10", "30"]);
        let result = inspect(&path, FRAME_SIZE, 1).unwrap();

        assert_eq!(result.segment_id, Some(88));
        assert_eq!(result.segment_length, 90);
        assert_eq!(result.entries.len(), 3);
        assert_eq!(result.entries[0].table_id, None);
        assert_eq!(result.entries[1].offset, 30);
        assert_eq!(result.entries[1].table_id, Some(123));
        assert_eq!(
            result.entries[2].key_hash,
            Some(segvault_codec::key_hash(123, b"30"))
        );
    }
}
