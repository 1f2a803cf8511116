//! Reading frames out of an image file.

use segvault_codec::{find_footer, Certificate};
use segvault_storage::FileStorage;
use std::path::Path;

/// Reads frame `frame` of the image at `path`.
pub fn read_frame(
    path: &Path,
    frame_size: usize,
    frame: usize,
) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    if !path.exists() {
        return Err(format!("No image found at {:?}", path).into());
    }
    if frame_size == 0 {
        return Err("Frame size must be non-zero".into());
    }
    let storage = FileStorage::open_read_only(path, frame_size)?;
    let frame_count = storage.frame_count();
    if frame >= frame_count {
        return Err(format!(
            "Frame {frame} is past the end of {:?}, which holds {frame_count} frames of {frame_size} bytes",
            path
        )
        .into());
    }
    Ok(storage.read_slot(frame)?)
}

/// Finds the footer of a sealed frame and checks the frame against it.
pub fn sealed_certificate(data: &[u8]) -> Result<Certificate, Box<dyn std::error::Error>> {
    let footer = find_footer(data)?.ok_or("No segment footer in frame; was it closed?")?;
    footer.certificate.verify(data)?;
    tracing::debug!(
        "Found footer at offset {} sealing {} bytes",
        footer.offset,
        footer.certificate.segment_length
    );
    Ok(footer.certificate)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use segvault_codec::{encode_header, EntryType, Object, Segment, SegmentHeader};
    use segvault_storage::FrameStorage;
    use tempfile::TempDir;

    pub(crate) const FRAME_SIZE: usize = 4096;

    /// Writes an image of two frames; frame 1 holds a sealed segment of
    /// objects with `keys` in table 123.
    pub(crate) fn write_image(dir: &TempDir, keys: &[&str]) -> std::path::PathBuf {
        let path = dir.path().join("replicas.dat");
        let storage = FileStorage::open(&path, FRAME_SIZE, 2).unwrap();
        let _empty = storage.allocate().unwrap();
        let frame = storage.allocate().unwrap();

        let mut segment = Segment::new();
        segment
            .append(EntryType::SegmentHeader, &SegmentHeader::new(99, 88, 4096).encode())
            .unwrap();
        for key in keys {
            segment
                .append(EntryType::Object, &Object::new(123, *key, "").encode().unwrap())
                .unwrap();
        }
        let certificate = segment.certificate();
        let mut bytes = segment.as_bytes().to_vec();
        encode_header(EntryType::SegmentFooter, 8, &mut bytes);
        bytes.extend_from_slice(&certificate.to_bytes());
        storage.write(&frame, 0, &bytes).unwrap();
        storage.sync().unwrap();
        path
    }

    #[test]
    fn reads_sealed_frame() {
        let dir = TempDir::new().unwrap();
        let path = write_image(&dir, &["10"]);
        let data = read_frame(&path, FRAME_SIZE, 1).unwrap();
        let certificate = sealed_certificate(&data).unwrap();
        assert_eq!(certificate.segment_length, 30 + 30);
    }

    #[test]
    fn empty_frame_has_no_footer() {
        let dir = TempDir::new().unwrap();
        let path = write_image(&dir, &[]);
        let data = read_frame(&path, FRAME_SIZE, 0).unwrap();
        assert!(sealed_certificate(&data).is_err());
    }

    #[test]
    fn reading_leaves_image_untouched() {
        let dir = TempDir::new().unwrap();
        let path = write_image(&dir, &["10"]);
        let before = std::fs::read(&path).unwrap();
        let mut permissions = std::fs::metadata(&path).unwrap().permissions();
        permissions.set_readonly(true);
        std::fs::set_permissions(&path, permissions).unwrap();

        let data = read_frame(&path, FRAME_SIZE, 1).unwrap();
        assert!(sealed_certificate(&data).is_ok());
        assert_eq!(std::fs::read(&path).unwrap(), before);
    }

    #[test]
    fn frame_past_end_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = write_image(&dir, &[]);
        assert!(read_frame(&path, FRAME_SIZE, 2).is_err());
    }
}
