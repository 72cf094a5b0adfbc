//! Negotiable response envelope
//!
//! Handlers return an [`Envelope`]: a keyed body plus the name of the root
//! element used when the client asks for XML. The root name is metadata
//! only and never appears in JSON or YAML output.

use axum::{
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{AppError, Result};

/// Root element name used when a body does not name one
pub const DEFAULT_ROOT: &str = "response";

/// Key that may carry the root name inside a raw JSON object
const ROOT_KEY: &str = "root";

#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    root: String,
    body: Value,
}

impl Envelope {
    pub fn new(root: impl Into<String>, body: Value) -> Self {
        Self {
            root: root.into(),
            body,
        }
    }

    /// Envelope for any serializable body
    pub fn from_serialize<T: Serialize>(root: impl Into<String>, body: &T) -> Result<Self> {
        let body = serde_json::to_value(body).map_err(|e| AppError::Internal(e.into()))?;
        Ok(Self::new(root, body))
    }

    /// Envelope for a raw object, taking its root name from a `root` key
    /// when present.
    pub fn from_value(mut value: Value) -> Self {
        let root = match value.as_object_mut().and_then(|m| m.remove(ROOT_KEY)) {
            Some(Value::String(root)) if !root.is_empty() => root,
            _ => DEFAULT_ROOT.to_string(),
        };
        Self { root, body: value }
    }

    /// `{ data: <value> }` under the given root
    pub fn data<T: Serialize>(root: impl Into<String>, data: &T) -> Result<Self> {
        let data = serde_json::to_value(data).map_err(|e| AppError::Internal(e.into()))?;
        let mut body = Map::new();
        body.insert("data".to_string(), data);
        Ok(Self::new(root, Value::Object(body)))
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn body(&self) -> &Value {
        &self.body
    }
}

/// Renders as JSON until the negotiation stage picks a representation.
impl IntoResponse for Envelope {
    fn into_response(self) -> Response {
        let mut response = Json(&self.body).into_response();
        response.extensions_mut().insert(self);
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_value_strips_root_key() {
        let envelope = Envelope::from_value(json!({ "message": "hi", "root": "error" }));

        assert_eq!(envelope.root(), "error");
        assert_eq!(envelope.body(), &json!({ "message": "hi" }));
    }

    #[test]
    fn test_from_value_defaults_root() {
        let envelope = Envelope::from_value(json!({ "a": 1 }));
        assert_eq!(envelope.root(), DEFAULT_ROOT);

        let envelope = Envelope::from_value(json!({ "a": 1, "root": 5 }));
        assert_eq!(envelope.root(), DEFAULT_ROOT);
        assert!(envelope.body().get("root").is_none());
    }

    #[test]
    fn test_data_wraps_value() {
        let envelope = Envelope::data("auth", &"token").unwrap();
        assert_eq!(envelope.body(), &json!({ "data": "token" }));
    }

    #[tokio::test]
    async fn test_into_response_is_json_and_keeps_envelope() {
        let response = Envelope::new("api", json!({ "x": 1 })).into_response();

        assert_eq!(response.headers()["content-type"], "application/json");
        assert_eq!(response.extensions().get::<Envelope>().unwrap().root(), "api");

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&bytes[..], br#"{"x":1}"#);
    }
}
