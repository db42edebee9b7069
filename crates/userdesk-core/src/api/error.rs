use std::time::Duration;

use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;

use super::transport::TransportError;

/// Fallback when the server gives no usable message.
pub const GENERIC_ERROR_MESSAGE: &str = "An unexpected error occurred";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("Network error: {0}")]
    Network(String),

    /// 401 that will not be renewed: the refresh call itself, or a request
    /// that was already replayed once.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Session expired: {0}")]
    SessionExpired(String),

    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    /// Pull a human-readable message out of an error body: the `error`
    /// field, then `message`, then a generic string.
    pub fn extract_message(body: &str) -> String {
        let Ok(value) = serde_json::from_str::<Value>(body) else {
            return GENERIC_ERROR_MESSAGE.to_string();
        };
        ["error", "message"]
            .iter()
            .filter_map(|key| value.get(*key).and_then(Value::as_str))
            .find(|s| !s.trim().is_empty())
            .map(Self::truncate_body)
            .unwrap_or_else(|| GENERIC_ERROR_MESSAGE.to_string())
    }

    pub fn from_status(status: StatusCode, body: &str) -> Self {
        Self::from_status_message(status.as_u16(), Self::extract_message(body))
    }

    /// Classify an already-extracted message by status code.
    pub fn from_status_message(status: u16, message: String) -> Self {
        match status {
            401 => ApiError::Unauthorized(message),
            _ => ApiError::Server { status, message },
        }
    }

    /// True for failures that ended the session and require a new login.
    pub fn is_session_expired(&self) -> bool {
        matches!(self, ApiError::SessionExpired(_))
    }

    /// HTTP status carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Unauthorized(_) => Some(401),
            ApiError::Server { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<TransportError> for ApiError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Network(msg) => ApiError::Network(msg),
            TransportError::Status { status, body } => ApiError::from_status(status, &body),
        }
    }
}
