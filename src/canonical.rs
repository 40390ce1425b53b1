//! Canonical byte form of a document.
//!
//! Property order: keys are compared by remapping a leading `_` to U+FFFF
//! (so reserved keys sort after everything else), then code-point-wise.
//! Output is 2-space indented UTF-8 JSON with LF line endings; arrays keep
//! their input order; nested objects recurse through the same rule.
//!
//! Values that cannot round-trip through JSON (functions, symbols,
//! `undefined`) have no representation in [`serde_json::Value`] to begin
//! with, so the "silently dropped" case from the wire format never arises
//! here; [`crate::Error::InvalidJsonObject`] is reserved for malformed input
//! arriving from outside Rust's type system (e.g. a foreign wire decoder).

use serde_json::{Map, Value};

use crate::document::Document;
use crate::error::Error;

fn sort_key(key: &str) -> String {
    if let Some(rest) = key.strip_prefix('_') {
        format!("\u{ffff}{rest}")
    } else {
        key.to_owned()
    }
}

fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|(a, _), (b, _)| sort_key(a).cmp(&sort_key(b)));
            let mut sorted = Map::new();
            for (k, v) in entries {
                sorted.insert(k, canonicalize(v));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        other => other,
    }
}

/// Produce the canonical byte form of a document: 2-space indented JSON,
/// keys sorted per the rule above, in-document `_id` set to `full_id`
/// (the collection-prefixed id, not the short form presented at the API).
///
/// # Errors
/// Returns [`Error::Json`] if the document's body contains a value that
/// `serde_json` itself cannot serialize (this should not normally happen
/// for values already held in a [`serde_json::Value`]).
pub fn to_canonical_bytes(doc: &Document, full_id: &str) -> Result<Vec<u8>, Error> {
    let mut doc = doc.clone();
    doc.id = full_id.to_owned();
    let value = canonicalize(doc.to_json_value());
    let mut out = serde_json::to_vec_pretty(&value)?;
    out.push(b'\n');
    Ok(out)
}
