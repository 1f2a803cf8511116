//! Segment certificates.

use crate::error::{CodecError, CodecResult};
use std::fmt;

/// Serialized size of a certificate.
pub const CERTIFICATE_SIZE: usize = 8;

/// The `(valid length, checksum)` pair that bounds and validates a segment.
///
/// The checksum is CRC32C over the first `segment_length` bytes, continued
/// over `segment_length` itself as four little-endian bytes. Folding the
/// length in means a truncated prefix of a segment never validates against
/// the certificate of the whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Certificate {
    /// Number of bytes covered by the certificate.
    pub segment_length: u32,
    /// Checksum over those bytes and the length.
    pub checksum: u32,
}

impl Certificate {
    /// Creates a certificate from its parts.
    #[must_use]
    pub const fn new(segment_length: u32, checksum: u32) -> Self {
        Self {
            segment_length,
            checksum,
        }
    }

    /// Computes the certificate for `data`.
    ///
    /// # Errors
    ///
    /// Returns an error if `data` is longer than `u32::MAX` bytes.
    pub fn compute(data: &[u8]) -> CodecResult<Self> {
        let segment_length = u32::try_from(data.len())
            .map_err(|_| CodecError::malformed("certificate", "segment longer than 4 GiB"))?;
        Ok(Self::from_running(segment_length, crc32c::crc32c(data)))
    }

    /// Seals a running CRC32C over `segment_length` bytes into a certificate.
    #[must_use]
    pub fn from_running(segment_length: u32, running: u32) -> Self {
        Self {
            segment_length,
            checksum: crc32c::crc32c_append(running, &segment_length.to_le_bytes()),
        }
    }

    /// Checks `data[..segment_length]` against this certificate.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::CertificateOutOfRange`] if `data` is shorter than
    /// the certified length and [`CodecError::ChecksumMismatch`] if the bytes
    /// do not match.
    pub fn verify(&self, data: &[u8]) -> CodecResult<()> {
        let len = self.segment_length as usize;
        if data.len() < len {
            return Err(CodecError::CertificateOutOfRange {
                declared: self.segment_length,
                available: data.len(),
            });
        }
        let actual = Self::compute(&data[..len])?.checksum;
        if actual != self.checksum {
            return Err(CodecError::ChecksumMismatch {
                expected: self.checksum,
                actual,
            });
        }
        Ok(())
    }

    /// Serializes the certificate.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; CERTIFICATE_SIZE] {
        let mut out = [0u8; CERTIFICATE_SIZE];
        out[..4].copy_from_slice(&self.segment_length.to_le_bytes());
        out[4..].copy_from_slice(&self.checksum.to_le_bytes());
        out
    }

    /// Deserializes a certificate.
    ///
    /// # Errors
    ///
    /// Returns an error unless `bytes` is exactly [`CERTIFICATE_SIZE`] long.
    pub fn from_bytes(bytes: &[u8]) -> CodecResult<Self> {
        if bytes.len() != CERTIFICATE_SIZE {
            return Err(CodecError::malformed(
                "certificate",
                format!("expected {CERTIFICATE_SIZE} bytes, got {}", bytes.len()),
            ));
        }
        Ok(Self {
            segment_length: u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            checksum: u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
        })
    }
}

impl fmt::Display for Certificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} bytes, crc {:#010x}", self.segment_length, self.checksum)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compute_matches_running_form() {
        let data = b"some segment bytes";
        let direct = Certificate::compute(data).unwrap();
        let mut running = crc32c::crc32c(&data[..4]);
        running = crc32c::crc32c_append(running, &data[4..]);
        assert_eq!(direct, Certificate::from_running(data.len() as u32, running));
    }

    #[test]
    fn length_is_part_of_checksum() {
        let empty = Certificate::compute(b"").unwrap();
        assert_eq!(empty.segment_length, 0);
        assert_ne!(empty.checksum, 0);
    }

    #[test]
    fn verify_accepts_trailing_bytes() {
        let cert = Certificate::compute(b"abc").unwrap();
        assert!(cert.verify(b"abcdef").is_ok());
    }

    #[test]
    fn verify_rejects_corruption() {
        let cert = Certificate::compute(b"abc").unwrap();
        assert!(matches!(
            cert.verify(b"abd"),
            Err(CodecError::ChecksumMismatch { .. })
        ));
        assert!(matches!(
            cert.verify(b"ab"),
            Err(CodecError::CertificateOutOfRange {
                declared: 3,
                available: 2
            })
        ));
    }

    #[test]
    fn bytes_roundtrip() {
        let cert = Certificate::new(30, 0x1234_abcd);
        assert_eq!(Certificate::from_bytes(&cert.to_bytes()).unwrap(), cert);
        assert!(Certificate::from_bytes(&[0u8; 7]).is_err());
    }
}
