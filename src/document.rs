//! The document type and its wire/fat-doc conventions.
//!
//! A document is a JSON mapping with exactly one required reserved key
//! (`_id`) and one optional reserved key (`_deleted`). Internally it is
//! represented as a tagged record so the engine never has to special-case
//! the reserved keys while walking arbitrary user data.

use serde_json::{Map, Value};

use crate::error::Error;

/// Internal representation of a document: `_id`/`_deleted` pulled out of the
/// bag, everything else left untouched in `body`.
#[derive(Clone, Debug, PartialEq)]
pub struct Document {
    /// The document id. Collection-prefixed when stored, short-form at the API surface.
    pub id: String,
    /// Tombstone marker. Never written to a committed tree — presence of the
    /// file in the tree *is* the non-deleted signal.
    pub deleted: bool,
    /// All keys other than `_id`/`_deleted`.
    pub body: Map<String, Value>,
}

impl Document {
    /// Build a document from a short id and a body map (no `_id`/`_deleted` keys expected).
    #[must_use]
    pub fn new(id: impl Into<String>, body: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            deleted: false,
            body,
        }
    }

    /// Parse a wire-format JSON object into a `Document`, extracting `_id` and `_deleted`.
    ///
    /// # Errors
    /// Returns [`Error::UndefinedDocumentId`] if `_id` is absent or empty, and
    /// [`Error::InvalidPropertyNameInDocument`] if any other key starts with `_`.
    pub fn from_json_value(value: Value) -> Result<Self, Error> {
        let Value::Object(mut map) = value else {
            return Err(Error::InvalidJsonObject {
                reason: "document must be a JSON object".to_owned(),
            });
        };

        let id = match map.remove("_id") {
            Some(Value::String(s)) if !s.is_empty() => s,
            Some(Value::String(_)) | None => return Err(Error::UndefinedDocumentId),
            Some(_) => {
                return Err(Error::InvalidJsonObject {
                    reason: "_id must be a string".to_owned(),
                })
            }
        };

        let deleted = match map.remove("_deleted") {
            Some(Value::Bool(b)) => b,
            Some(_) => {
                return Err(Error::InvalidJsonObject {
                    reason: "_deleted must be a boolean".to_owned(),
                })
            }
            None => false,
        };

        for key in map.keys() {
            if key.starts_with('_') {
                return Err(Error::InvalidPropertyNameInDocument { name: key.clone() });
            }
        }

        Ok(Self {
            id,
            deleted,
            body: map,
        })
    }

    /// Build a document from an already-resolved `id` and a wire-format JSON
    /// value, discarding any `_id` the value itself carries (the put/insert
    /// precedence rule is resolved by the caller before this is reached).
    ///
    /// # Errors
    /// Returns [`Error::InvalidPropertyNameInDocument`] if any key other than
    /// `_id`/`_deleted` starts with `_`.
    pub fn from_json_value_with_id(id: impl Into<String>, value: Value) -> Result<Self, Error> {
        let Value::Object(mut map) = value else {
            return Err(Error::InvalidJsonObject {
                reason: "document must be a JSON object".to_owned(),
            });
        };
        map.remove("_id");

        let deleted = match map.remove("_deleted") {
            Some(Value::Bool(b)) => b,
            Some(_) => {
                return Err(Error::InvalidJsonObject {
                    reason: "_deleted must be a boolean".to_owned(),
                })
            }
            None => false,
        };

        for key in map.keys() {
            if key.starts_with('_') {
                return Err(Error::InvalidPropertyNameInDocument { name: key.clone() });
            }
        }

        Ok(Self {
            id: id.into(),
            deleted,
            body: map,
        })
    }

    /// Serialize back to a wire-format JSON object, reinserting `_id` (and
    /// `_deleted` when set).
    #[must_use]
    pub fn to_json_value(&self) -> Value {
        let mut map = self.body.clone();
        map.insert("_id".to_owned(), Value::String(self.id.clone()));
        if self.deleted {
            map.insert("_deleted".to_owned(), Value::Bool(true));
        }
        Value::Object(map)
    }
}

/// File extension used for the default `json` serialization.
pub const JSON_EXT: &str = ".json";

/// Compute the fat-doc filename (`<shortId><ext>`) for a short id.
#[must_use]
pub fn fat_doc_name(short_id: &str, ext: &str) -> String {
    format!("{short_id}{ext}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn roundtrip_preserves_body() {
        let value = json!({"_id": "1", "name": "a"});
        let doc = Document::from_json_value(value.clone()).unwrap();
        assert_eq!(doc.id, "1");
        assert!(!doc.deleted);
        assert_eq!(doc.to_json_value(), value);
    }

    #[test]
    fn missing_id_is_error() {
        let value = json!({"name": "a"});
        assert!(matches!(
            Document::from_json_value(value),
            Err(Error::UndefinedDocumentId)
        ));
    }

    #[test]
    fn reserved_key_is_rejected() {
        let value = json!({"_id": "1", "_secret": "x"});
        assert!(matches!(
            Document::from_json_value(value),
            Err(Error::InvalidPropertyNameInDocument { .. })
        ));
    }

    #[test]
    fn deleted_flag_roundtrips() {
        let value = json!({"_id": "1", "_deleted": true});
        let doc = Document::from_json_value(value.clone()).unwrap();
        assert!(doc.deleted);
        assert_eq!(doc.to_json_value(), value);
    }
}
