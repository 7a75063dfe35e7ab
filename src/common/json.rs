//! Lenient accessors for IPED payloads.
//!
//! IPED is inconsistent about scalar types: ids, hours and percentages show up
//! as JSON numbers in some endpoints and as strings in others. These helpers
//! accept both and report the dotted path of anything missing.

use crate::common::error::{IntegratorError, Result};
use serde_json::Value;

/// Look up `key` in `value`, failing with the path if it is absent or null.
pub fn require<'a>(value: &'a Value, key: &str, path: &str) -> Result<&'a Value> {
    match value.get(key) {
        Some(Value::Null) | None => Err(IntegratorError::MissingField(format!("{path}.{key}"))),
        Some(v) => Ok(v),
    }
}

pub fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().replace(',', ".").parse().ok(),
        _ => None,
    }
}

/// Strings pass through; numbers and booleans are rendered; null is `None`.
pub fn as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

pub fn require_i64(value: &Value, key: &str, path: &str) -> Result<i64> {
    let v = require(value, key, path)?;
    as_i64(v).ok_or_else(|| {
        IntegratorError::MissingField(format!("{path}.{key} is not an integer: {v}"))
    })
}

pub fn require_f64(value: &Value, key: &str, path: &str) -> Result<f64> {
    let v = require(value, key, path)?;
    as_f64(v)
        .ok_or_else(|| IntegratorError::MissingField(format!("{path}.{key} is not a number: {v}")))
}

pub fn require_string(value: &Value, key: &str, path: &str) -> Result<String> {
    let v = require(value, key, path)?;
    as_string(v)
        .ok_or_else(|| IntegratorError::MissingField(format!("{path}.{key} is not a scalar: {v}")))
}

/// Like [`require_string`], but a missing or null field becomes `None`.
pub fn optional_string(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(as_string)
}

/// The array stored under `key`. IPED sends `{}` or `null` instead of `[]`
/// for empty listings, so both are read as an empty slice.
pub fn array_field<'a>(value: &'a Value, key: &str, path: &str) -> Result<&'a [Value]> {
    match value.get(key) {
        Some(Value::Array(items)) => Ok(items.as_slice()),
        Some(Value::Null) => Ok(&[]),
        Some(Value::Object(map)) if map.is_empty() => Ok(&[]),
        Some(other) => Err(IntegratorError::MissingField(format!(
            "{path}.{key} is not a list: {other}"
        ))),
        None => Err(IntegratorError::MissingField(format!("{path}.{key}"))),
    }
}
