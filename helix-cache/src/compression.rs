//! Gzip compression contract (§4.E): bit-for-bit round-trip, and never
//! attempt to decompress a payload whose first byte is not the gzip magic.

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use helix_core::{HelixError, Result};
use std::io::{Read, Write};

const GZIP_MAGIC: u8 = 0x1f;

pub fn is_gzip(payload: &[u8]) -> bool {
    payload.first() == Some(&GZIP_MAGIC)
}

pub fn compress(payload: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(payload).map_err(|e| HelixError::Internal(e.to_string()))?;
    encoder.finish().map_err(|e| HelixError::Internal(e.to_string()))
}

pub fn decompress(payload: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(payload);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out).map_err(|e| HelixError::SchemaMismatch(e.to_string()))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_arbitrary_payload() {
        let payload = b"the quick brown fox jumps over the lazy dog".repeat(20);
        let compressed = compress(&payload).unwrap();
        assert!(is_gzip(&compressed));
        let decompressed = decompress(&compressed).unwrap();
        assert_eq!(decompressed, payload);
    }

    #[test]
    fn refuses_to_treat_plain_json_as_gzip() {
        let plain = br#"{"a":1}"#;
        assert!(!is_gzip(plain));
    }
}
