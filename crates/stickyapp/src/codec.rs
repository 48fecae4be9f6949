//! # Serialization Codec
//!
//! Converts documents to and from durable bytes. A codec works in two layers:
//!
//! 1. **Record layer** ([`Codec::encode_value`] / [`Codec::decode_value`]):
//!    bytes <-> an untyped JSON record. Loading stops here so the migration
//!    engine can upgrade old shapes before anything is typed.
//! 2. **Document layer** ([`Codec::encode`] / [`Codec::decode`]): a typed
//!    [`Document`] on top of the record layer.
//!
//! Decoding either returns a complete value or fails with
//! [`StickyError::Deserialization`]; it never leaves anything half-built.
//!
//! Every codec must satisfy the round-trip law: for every document the store
//! can produce, `decode(encode(d)) == d`.

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde_json::Value;
use std::io::{Read, Write};

use crate::error::{Result, StickyError};
use crate::model::Document;

pub trait Codec: Send + Sync {
    fn name(&self) -> &'static str;

    fn encode_value(&self, value: &Value) -> Result<Vec<u8>>;

    /// Must fail unless the bytes hold a single well-formed record (object).
    fn decode_value(&self, bytes: &[u8]) -> Result<Value>;

    fn encode(&self, document: &Document) -> Result<Vec<u8>> {
        let value = document.to_value()?;
        self.encode_value(&value)
    }

    fn decode(&self, bytes: &[u8]) -> Result<Document> {
        let value = self.decode_value(bytes)?;
        Document::from_value(value)
    }
}

/// Plain JSON text.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec {
    pretty: bool,
}

impl JsonCodec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pretty() -> Self {
        Self { pretty: true }
    }
}

impl Codec for JsonCodec {
    fn name(&self) -> &'static str {
        "json"
    }

    fn encode_value(&self, value: &Value) -> Result<Vec<u8>> {
        let encoded = if self.pretty {
            serde_json::to_vec_pretty(value)
        } else {
            serde_json::to_vec(value)
        };
        encoded.map_err(|e| StickyError::Serialization(e.to_string()))
    }

    fn decode_value(&self, bytes: &[u8]) -> Result<Value> {
        let value: Value = serde_json::from_slice(bytes)
            .map_err(|e| StickyError::Deserialization(e.to_string()))?;
        if !value.is_object() {
            return Err(StickyError::Deserialization(
                "document is not a record".to_string(),
            ));
        }
        Ok(value)
    }
}

/// Gzip-compressed wrapper around another codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct GzipCodec<C: Codec = JsonCodec> {
    inner: C,
}

impl<C: Codec> GzipCodec<C> {
    pub fn new(inner: C) -> Self {
        Self { inner }
    }
}

impl<C: Codec> Codec for GzipCodec<C> {
    fn name(&self) -> &'static str {
        "json-gzip"
    }

    fn encode_value(&self, value: &Value) -> Result<Vec<u8>> {
        let raw = self.inner.encode_value(value)?;
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(&raw)
            .map_err(|e| StickyError::Serialization(e.to_string()))?;
        encoder
            .finish()
            .map_err(|e| StickyError::Serialization(e.to_string()))
    }

    fn decode_value(&self, bytes: &[u8]) -> Result<Value> {
        let mut raw = Vec::new();
        GzDecoder::new(bytes)
            .read_to_end(&mut raw)
            .map_err(|e| StickyError::Deserialization(format!("corrupt gzip stream: {}", e)))?;
        self.inner.decode_value(&raw)
    }
}
