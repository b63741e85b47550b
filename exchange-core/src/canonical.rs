//! Canonical JSON serialization for cryptographic hashing
//!
//! Ensures a deterministic byte representation for signing and
//! verification: object keys sorted lexicographically, no insignificant
//! whitespace (RFC 8785 semantics for the value shapes this protocol
//! uses). The SHA-256 digest of the canonical bytes is what gets
//! signed, never the raw wire text.

use crate::Result;
use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Canonical SHA-256 digest of `{ "metadata": .., "data": .. }`
pub fn digest_of<M: Serialize, D: Serialize>(metadata: &M, data: &D) -> Result<[u8; 32]> {
    let mut envelope = Map::new();
    envelope.insert("metadata".to_string(), serde_json::to_value(metadata)?);
    envelope.insert("data".to_string(), serde_json::to_value(data)?);

    let canonical = canonical_string(&Value::Object(envelope));
    Ok(hash_bytes(canonical.as_bytes()))
}

/// Render a JSON value canonically: sorted keys, compact separators
pub fn canonical_string(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

/// SHA-256 of arbitrary bytes
pub fn hash_bytes(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort_unstable();

            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_json_string(key, out);
                out.push(':');
                write_canonical(&map[key.as_str()], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        Value::String(s) => write_json_string(s, out),
        // Numbers, booleans, and null already have a single compact form.
        other => out.push_str(&other.to_string()),
    }
}

fn write_json_string(s: &str, out: &mut String) {
    // serde_json's escaping is deterministic; reuse it.
    out.push_str(&serde_json::to_string(s).expect("string serialization is infallible"));
}
