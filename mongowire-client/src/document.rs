//! Document codec glue and lenient field readers.
//!
//! Servers are loose about numeric types: `ok` may arrive as a double, `n`
//! as an int32 or int64. The readers here accept any numeric representation.

use crate::error::ClientError;
use bson::{Bson, Document};
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Serializes `value` into a raw length-prefixed document.
pub fn encode_document<T: Serialize>(value: &T) -> Result<Bytes, ClientError> {
    Ok(Bytes::from(bson::to_vec(value)?))
}

/// Parses a raw document.
pub fn decode_document(raw: &[u8]) -> Result<Document, ClientError> {
    Ok(bson::from_slice(raw)?)
}

/// Deserializes a raw document into `T`.
pub fn decode<T: DeserializeOwned>(raw: &[u8]) -> Result<T, ClientError> {
    Ok(bson::from_slice(raw)?)
}

/// Reads `key` as a float from any numeric or boolean value.
pub fn lenient_f64(doc: &Document, key: &str) -> Option<f64> {
    match doc.get(key)? {
        Bson::Double(v) => Some(*v),
        Bson::Int32(v) => Some(*v as f64),
        Bson::Int64(v) => Some(*v as f64),
        Bson::Boolean(v) => Some(if *v { 1.0 } else { 0.0 }),
        _ => None,
    }
}

/// Reads `key` as an integer from any numeric value. Doubles are truncated.
pub fn lenient_i64(doc: &Document, key: &str) -> Option<i64> {
    match doc.get(key)? {
        Bson::Int32(v) => Some(*v as i64),
        Bson::Int64(v) => Some(*v),
        Bson::Double(v) if v.is_finite() => Some(*v as i64),
        _ => None,
    }
}

/// Reads `key` as a boolean; numbers are true when non-zero.
pub fn lenient_bool(doc: &Document, key: &str) -> Option<bool> {
    match doc.get(key)? {
        Bson::Boolean(v) => Some(*v),
        Bson::Int32(v) => Some(*v != 0),
        Bson::Int64(v) => Some(*v != 0),
        Bson::Double(v) => Some(*v != 0.0),
        _ => None,
    }
}

/// Whether the reply's `ok` field equals 1.
pub fn is_ok(doc: &Document) -> bool {
    lenient_f64(doc, "ok") == Some(1.0)
}
