//! Deterministic cache keys.
//!
//! Parameters are rendered to a canonical JSON form with object fields sorted
//! at every depth, then hashed with SHA-256. Two parameter objects that differ
//! only in field order always produce the same key, regardless of how the
//! `serde_json` map type orders its fields.

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Render `params` as canonical JSON (sorted object keys, no whitespace).
pub fn canonical_form(params: &Value) -> String {
    let mut out = String::new();
    write_canonical(params, &mut out);
    out
}

/// Compute the hex-encoded SHA-256 key for `params`.
pub fn cache_key(params: &Value) -> String {
    let canonical = canonical_form(params);
    hex::encode(Sha256::digest(canonical.as_bytes()))
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut fields: Vec<(&String, &Value)> = map.iter().collect();
            fields.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (idx, (key, field)) in fields.into_iter().enumerate() {
                if idx > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(field, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (idx, item) in items.iter().enumerate() {
                if idx > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}
