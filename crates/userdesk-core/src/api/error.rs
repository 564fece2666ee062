use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;

use crate::auth::StorageError;
use crate::models::ValidationError;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("Session expired - please log in again")]
    SessionExpired,

    #[error("Network unavailable: {0}")]
    NetworkUnavailable(String),

    #[error("Request rejected: {0}")]
    RemoteRejected(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Unexpected server response: {0}")]
    UnexpectedServer(String),

    #[error("Storage failure: {0}")]
    StorageFailure(#[from] StorageError),
}

/// Whether the request went out with the session token attached
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Public,
    Authenticated,
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// Shown when a login or registration is rejected without a server message
const DEFAULT_REJECTION_MESSAGE: &str = "Invalid username or password";

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

    /// Pull the human-readable message out of a structured error body.
    /// The backend uses `message` on most routes and `error` on some.
    pub fn server_message(body: &str) -> Option<String> {
        let value: Value = serde_json::from_str(body).ok()?;
        ["message", "error", "msg"]
            .iter()
            .filter_map(|key| value.get(*key))
            .find_map(|v| match v {
                Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
                _ => None,
            })
    }

    /// Classify a non-success response.
    pub fn from_status(status: StatusCode, body: &str, access: Access) -> Self {
        let message = Self::server_message(body);
        match (access, status.as_u16()) {
            (Access::Public, 400..=499) => ApiError::InvalidCredentials(
                message.unwrap_or_else(|| DEFAULT_REJECTION_MESSAGE.to_string()),
            ),
            (Access::Authenticated, 401) => ApiError::SessionExpired,
            (Access::Authenticated, 404) => {
                ApiError::NotFound(message.unwrap_or_else(|| Self::truncate_body(body)))
            }
            _ => match message {
                Some(message) => ApiError::RemoteRejected(message),
                None => ApiError::UnexpectedServer(format!(
                    "Status {}: {}",
                    status,
                    Self::truncate_body(body)
                )),
            },
        }
    }

    /// Classify a request that produced no usable reply.
    pub fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() || err.is_request() {
            ApiError::NetworkUnavailable(err.to_string())
        } else {
            ApiError::UnexpectedServer(err.to_string())
        }
    }

    pub fn is_session_expired(&self) -> bool {
        matches!(self, ApiError::SessionExpired)
    }

    /// Alert text for the front end
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Validation(e) => e.to_string(),
            ApiError::InvalidCredentials(message) | ApiError::RemoteRejected(message) => {
                message.clone()
            }
            ApiError::SessionExpired => "Session expired. Please login again to continue.".to_string(),
            ApiError::NetworkUnavailable(_) => {
                "Network error. Please check your connection.".to_string()
            }
            ApiError::NotFound(_) => "That user no longer exists.".to_string(),
            ApiError::UnexpectedServer(_) => "An unexpected error occurred.".to_string(),
            ApiError::StorageFailure(e) => format!("Could not access saved session: {}", e),
        }
    }
}
