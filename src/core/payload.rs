//! Assistant payload decoding.

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use workspace_protocol::FileTree;

/// Decoded assistant message: narrative text plus an optional tree patch.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StructuredPayload {
    pub text: String,
    #[serde(default, rename = "fileTree")]
    pub file_tree: Option<FileTree>,
}

#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("assistant payload is not a valid document: {0}")]
    Json(#[source] serde_json::Error),

    #[error("assistant payload must be a string or an object, got {0}")]
    UnexpectedBody(&'static str),
}

impl StructuredPayload {
    /// Decodes a channel message body.
    ///
    /// String bodies are parsed as JSON documents; object bodies are decoded
    /// in place.
    pub fn decode(body: &Value) -> Result<Self, PayloadError> {
        match body {
            Value::String(encoded) => serde_json::from_str(encoded).map_err(PayloadError::Json),
            Value::Object(_) => Self::deserialize(body).map_err(PayloadError::Json),
            other => Err(PayloadError::UnexpectedBody(value_type_name(other))),
        }
    }
}

/// Renders a message body as display text without interpreting it.
pub fn raw_body_text(body: &Value) -> String {
    match body {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
