//! Value encoding at the storage boundary
//!
//! Cached values are opaque byte blobs. The first byte describes how the
//! rest was produced, so a blob stays decodable after its cache type's
//! format or compression settings change:
//!
//! ```text
//! bit 0    : 1 = gzip-compressed payload
//! bits 1-7 : serialization format (0 = JSON, 1 = bincode)
//! ```

use crate::cache::config::{CacheConfig, SerializationFormat};
use crate::error::{CacheError, Result};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::{Read, Write};

const COMPRESSED_FLAG: u8 = 0b0000_0001;
const FORMAT_JSON: u8 = 0;
const FORMAT_BINCODE: u8 = 1;

/// Encoding settings derived from a cache type's config
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Codec {
    pub format: SerializationFormat,
    /// Compress payloads larger than this many bytes; `None` disables compression
    pub compress_above: Option<usize>,
}

impl Default for Codec {
    fn default() -> Self {
        Self {
            format: SerializationFormat::Json,
            compress_above: None,
        }
    }
}

impl Codec {
    pub fn from_config(config: &CacheConfig) -> Self {
        Self {
            format: config.serialization_format,
            compress_above: config
                .compression_enabled
                .then_some(config.compression_threshold_bytes),
        }
    }

    /// Serialize a value into a self-describing blob
    pub fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>> {
        let (format_bits, payload) = match self.format {
            SerializationFormat::Json => (FORMAT_JSON, serde_json::to_vec(value)?),
            SerializationFormat::Bincode => (FORMAT_BINCODE, bincode::serialize(value)?),
        };

        let compress = matches!(self.compress_above, Some(threshold) if payload.len() > threshold);
        let mut header = format_bits << 1;

        let body = if compress {
            header |= COMPRESSED_FLAG;
            let mut encoder =
                GzEncoder::new(Vec::with_capacity(payload.len() / 2), Compression::fast());
            encoder.write_all(&payload)?;
            encoder.finish()?
        } else {
            payload
        };

        let mut blob = Vec::with_capacity(body.len() + 1);
        blob.push(header);
        blob.extend_from_slice(&body);
        Ok(blob)
    }
}

/// Decode a blob produced by [`Codec::encode`]
pub fn decode<T: DeserializeOwned>(blob: &[u8]) -> Result<T> {
    let (&header, body) = blob
        .split_first()
        .ok_or_else(|| CacheError::Serialization("empty cache blob".to_string()))?;

    let inflated;
    let payload = if header & COMPRESSED_FLAG != 0 {
        let mut decoder = GzDecoder::new(body);
        let mut out = Vec::with_capacity(body.len() * 2);
        decoder.read_to_end(&mut out)?;
        inflated = out;
        inflated.as_slice()
    } else {
        body
    };

    match header >> 1 {
        FORMAT_JSON => Ok(serde_json::from_slice(payload)?),
        FORMAT_BINCODE => Ok(bincode::deserialize(payload)?),
        other => Err(CacheError::Serialization(format!(
            "unknown serialization format tag {}",
            other
        ))),
    }
}

/// Whether a blob carries a compressed payload
pub fn is_compressed(blob: &[u8]) -> bool {
    blob.first().map_or(false, |h| h & COMPRESSED_FLAG != 0)
}
