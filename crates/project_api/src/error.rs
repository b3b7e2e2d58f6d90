use std::fmt;

use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Error as JsonError;
use workspace_protocol::StoreError;

#[derive(Debug)]
pub enum ProjectApiError {
    InvalidBaseUrl(String),
    InvalidHeader(String),
    Request(reqwest::Error),
    Status(StatusCode, String),
    Serde(JsonError),
}

/// Error bodies seen from the API: `{ "error": "..." }`,
/// `{ "error": { "message": "..." } }`, `{ "message": "..." }`, or a
/// validation list `{ "errors": [{ "msg": "..." }] }`.
#[derive(Debug, Deserialize)]
struct ErrorPayload {
    error: Option<ErrorValue>,
    message: Option<String>,
    #[serde(default)]
    errors: Vec<ValidationError>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ErrorValue {
    Text(String),
    Object { message: Option<String> },
}

#[derive(Debug, Deserialize)]
struct ValidationError {
    msg: Option<String>,
}

impl ErrorPayload {
    fn message(&self) -> Option<String> {
        let explicit = match &self.error {
            Some(ErrorValue::Text(text)) => non_empty_string(text),
            Some(ErrorValue::Object { message }) => message.as_deref().and_then(non_empty_string),
            None => None,
        };
        if let Some(message) = explicit.or_else(|| self.message.as_deref().and_then(non_empty_string)) {
            return Some(message.to_owned());
        }

        let validation: Vec<&str> = self
            .errors
            .iter()
            .filter_map(|error| error.msg.as_deref().and_then(non_empty_string))
            .collect();
        if validation.is_empty() {
            None
        } else {
            Some(validation.join("; "))
        }
    }
}

impl fmt::Display for ProjectApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidBaseUrl(value) => write!(f, "invalid base URL: {value}"),
            Self::InvalidHeader(message) => write!(f, "invalid header: {message}"),
            Self::Request(error) => write!(f, "request error: {error}"),
            Self::Status(status, message) => write!(f, "HTTP {status} {message}"),
            Self::Serde(error) => write!(f, "serialization error: {error}"),
        }
    }
}

impl std::error::Error for ProjectApiError {}

impl From<reqwest::Error> for ProjectApiError {
    fn from(error: reqwest::Error) -> Self {
        Self::Request(error)
    }
}

impl From<JsonError> for ProjectApiError {
    fn from(error: JsonError) -> Self {
        Self::Serde(error)
    }
}

impl From<ProjectApiError> for StoreError {
    fn from(error: ProjectApiError) -> Self {
        StoreError::new(error.to_string())
    }
}

/// Extracts a human-readable message from an error response body.
pub fn parse_error_message(status: StatusCode, body: &str) -> String {
    if let Some(message) = serde_json::from_str::<ErrorPayload>(body)
        .ok()
        .and_then(|payload| payload.message())
    {
        return message;
    }

    if body.trim().is_empty() {
        status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string()
    } else {
        body.to_string()
    }
}

fn non_empty_string(value: &str) -> Option<&str> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}
