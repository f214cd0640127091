//! Dynamic JSON document model.
//!
//! A `Value` is the opaque JSON document callers put and get. Internally it
//! is a thin wrapper over `serde_json::Value` that enforces the ingress rule
//! and exposes the nested
//! string-keyed mapping view that `Function`/`Condition` operators see.

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::error::{ErrorCode, ErrorMessage};

/// A validated JSON document: object or array at the root, nothing else.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Value(Json);

impl Value {
    /// Parse and validate a JSON document from raw bytes.
    pub fn parse(bytes: &[u8]) -> Result<Self, ErrorMessage> {
        let json: Json = serde_json::from_slice(bytes).map_err(|e| {
            ErrorMessage::new(ErrorCode::BadRequest, format!("malformed JSON: {e}"))
        })?;
        Self::from_json(json)
    }

    /// Validate an already-parsed `serde_json::Value`.
    pub fn from_json(json: Json) -> Result<Self, ErrorMessage> {
        match &json {
            Json::Object(_) | Json::Array(_) => Ok(Value(json)),
            _ => Err(ErrorMessage::new(
                ErrorCode::BadRequest,
                "document root must be an object or array",
            )),
        }
    }

    /// Borrow the underlying JSON tree.
    pub fn as_json(&self) -> &Json {
        &self.0
    }

    pub fn into_json(self) -> Json {
        self.0
    }

    /// Look up a top-level field; returns `None` for non-object roots or a
    /// missing field. This is the nested mapping view operators rely on.
    pub fn get(&self, field: &str) -> Option<&Json> {
        self.0.get(field)
    }
}

impl From<Value> for Json {
    fn from(v: Value) -> Json {
        v.0
    }
}

impl TryFrom<Json> for Value {
    type Error = ErrorMessage;

    fn try_from(json: Json) -> Result<Self, Self::Error> {
        Value::from_json(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_object_root() {
        assert!(Value::parse(br#"{"v":1}"#).is_ok());
    }

    #[test]
    fn accepts_array_root() {
        assert!(Value::parse(b"[1,2,3]").is_ok());
    }

    #[test]
    fn rejects_scalar_root() {
        assert!(Value::parse(b"42").is_err());
        assert!(Value::parse(b"\"hi\"").is_err());
        assert!(Value::parse(b"null").is_err());
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(Value::parse(b"{not json").is_err());
    }

    #[test]
    fn field_lookup() {
        let v = Value::parse(br#"{"v":1}"#).unwrap();
        assert_eq!(v.get("v"), Some(&serde_json::json!(1)));
        assert_eq!(v.get("missing"), None);
    }
}
