#![forbid(unsafe_code)]

//! Binary encoding of [`Value`] and [`ArrayStorage`], and content
//! fingerprints over that encoding.
//!
//! Only resolved values encode. Storage kind is not part of the format: a
//! decoded array always owns its buffer.

mod codec;
mod error;

use fa_core::{ArrayStorage, Element, Value};
use sha2::{Digest, Sha256};

pub use codec::{MAGIC, MAX_DEPTH, VERSION};
pub use error::SerializeError;

pub fn encode_value(value: &Value) -> Result<Vec<u8>, SerializeError> {
    let mut out = Vec::new();
    codec::put_header(&mut out);
    codec::put_value(&mut out, value)?;
    Ok(out)
}

pub fn decode_value(bytes: &[u8]) -> Result<Value, SerializeError> {
    let mut reader = codec::Reader::new(bytes);
    reader.header()?;
    let value = reader.value(0)?;
    reader.finish()?;
    Ok(value)
}

/// Encode a bare array: header, then the array body without a value tag.
#[must_use]
pub fn encode_array<T: Element>(storage: &ArrayStorage<T>) -> Vec<u8> {
    let mut out = Vec::new();
    codec::put_header(&mut out);
    codec::put_storage(&mut out, storage);
    out
}

pub fn decode_array<T: Element>(bytes: &[u8]) -> Result<ArrayStorage<T>, SerializeError> {
    let mut reader = codec::Reader::new(bytes);
    reader.header()?;
    let storage = reader.storage()?;
    reader.finish()?;
    Ok(storage)
}

/// SHA-256 over the encoding, as lowercase hex.
pub fn fingerprint(value: &Value) -> Result<String, SerializeError> {
    let digest = Sha256::digest(encode_value(value)?);
    Ok(digest.iter().map(|byte| format!("{byte:02x}")).collect())
}
