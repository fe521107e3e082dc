//! Canonical payload encoding and content addressing.
//!
//! An observation is serialized to JSON (struct field order is fixed, so
//! identical logical content always yields identical bytes) and compressed
//! with zlib at a pinned level. The blake3 digest of the compressed bytes,
//! in hex, is the content key and doubles as the storage identifier.

use crate::error::{ObsError, Result};
use crate::record::Observation;
use bytes::Bytes;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::io::{Read, Write};

/// File extension for encoded observation blobs.
pub const OBS_EXT: &str = "json.zz";

/// Key prefix under which observation blobs are stored.
pub const OBS_PREFIX: &str = "obs";

/// Compression level is pinned: the content key is computed over the
/// compressed bytes, so the encoder must be deterministic across runs.
const ZLIB_LEVEL: u32 = 6;

/// Encode an observation into its canonical compressed form.
pub fn encode_observation(obs: &Observation) -> Result<Bytes> {
    let json = serde_json::to_vec(obs)?;

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::new(ZLIB_LEVEL));
    encoder
        .write_all(&json)
        .map_err(|e| ObsError::Encode(format!("zlib compression failed: {}", e)))?;
    let compressed = encoder
        .finish()
        .map_err(|e| ObsError::Encode(format!("zlib compression failed: {}", e)))?;

    Ok(Bytes::from(compressed))
}

/// Decode a canonical blob back into an observation.
pub fn decode_observation(data: &[u8]) -> Result<Observation> {
    let mut decoder = ZlibDecoder::new(data);
    let mut json = Vec::new();
    decoder
        .read_to_end(&mut json)
        .map_err(|e| ObsError::Encode(format!("zlib decompression failed: {}", e)))?;

    Ok(serde_json::from_slice(&json)?)
}

/// Compute the content key (blake3 hex digest) for encoded payload bytes.
pub fn content_key(data: &[u8]) -> String {
    blake3::hash(data).to_hex().to_string()
}

/// Object name for a content key: `obs/<key>.json.zz`.
pub fn blob_name(key: &str) -> String {
    format!("{}/{}.{}", OBS_PREFIX, key, OBS_EXT)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_obs() -> Observation {
        Observation::new(vec![2, 2, 3], vec![0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11])
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let a = encode_observation(&sample_obs()).unwrap();
        let b = encode_observation(&sample_obs()).unwrap();
        assert_eq!(a, b);
        assert_eq!(content_key(&a), content_key(&b));
    }

    #[test]
    fn test_different_payloads_get_different_keys() {
        let a = encode_observation(&sample_obs()).unwrap();
        let other = Observation::new(vec![2, 2, 3], vec![9; 12]);
        let b = encode_observation(&other).unwrap();
        assert_ne!(content_key(&a), content_key(&b));
    }

    #[test]
    fn test_roundtrip() {
        let obs = sample_obs();
        let encoded = encode_observation(&obs).unwrap();
        let decoded = decode_observation(&encoded).unwrap();
        assert_eq!(decoded, obs);
    }

    #[test]
    fn test_content_key_shape() {
        let key = content_key(b"hello world");
        assert_eq!(key.len(), 64); // blake3 hex string is 64 chars
    }

    #[test]
    fn test_blob_name() {
        let name = blob_name("abc123");
        assert_eq!(name, "obs/abc123.json.zz");
    }
}
