use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Error payload attached by the server to a failed method call or
/// subscription.
///
/// `error` is whatever code the server chose: usually a number (`403`,
/// `409`) or a short string (`"not-authorized"`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteError {
    #[serde(default)]
    pub error: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
}

impl RemoteError {
    pub fn new(error: impl Into<Value>, reason: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            reason: Some(reason.into()),
            message: None,
            details: None,
            error_type: None,
        }
    }

    /// The numeric error code, when the server sent one.
    pub fn code(&self) -> Option<i64> {
        self.error.as_i64()
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(message) = &self.message {
            return f.write_str(message);
        }
        let code = match &self.error {
            Value::String(s) => s.clone(),
            Value::Null => "error".to_string(),
            other => other.to_string(),
        };
        match &self.reason {
            Some(reason) => write!(f, "{reason} [{code}]"),
            None => write!(f, "[{code}]"),
        }
    }
}

impl std::error::Error for RemoteError {}

/// Failure to decode or encode a frame.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unknown message type: {0}")]
    UnknownMessage(String),
}

pub type ProtocolResult<T> = Result<T, ProtocolError>;
