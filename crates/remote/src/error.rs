//! Error types for the remote client.

use thiserror::Error;

use mizanflow_core::errors::RemoteStoreError;
use mizanflow_core::sync::{classify_http_status, SyncRetryClass};

/// Result type alias for remote client operations.
pub type Result<T> = std::result::Result<T, RemoteError>;

#[derive(Debug, Error)]
pub enum RemoteError {
    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Error response from the REST API
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Authentication error (missing or malformed credentials)
    #[error("Authentication error: {0}")]
    Auth(String),
}

impl RemoteError {
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth(message.into())
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Classify error for retry policy.
    pub fn retry_class(&self) -> SyncRetryClass {
        match self {
            Self::Api { status, .. } => classify_http_status(*status),
            Self::Http(err) if err.is_decode() => SyncRetryClass::Permanent,
            Self::Http(_) => SyncRetryClass::Retryable,
            Self::Json(_) | Self::InvalidRequest(_) => SyncRetryClass::Permanent,
            Self::Auth(_) => SyncRetryClass::ReauthRequired,
        }
    }
}

impl From<RemoteError> for RemoteStoreError {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::Http(err) if err.is_decode() => RemoteStoreError::Decode(err.to_string()),
            RemoteError::Http(err) => RemoteStoreError::Transport(err.to_string()),
            RemoteError::Json(err) => RemoteStoreError::Decode(err.to_string()),
            RemoteError::Api { status, message } => RemoteStoreError::Api { status, message },
            RemoteError::InvalidRequest(message) => RemoteStoreError::InvalidRequest(message),
            RemoteError::Auth(message) => RemoteStoreError::Auth(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_class_for_auth_error_is_reauth() {
        let err = RemoteError::api(401, "JWT expired");
        assert_eq!(err.retry_class(), SyncRetryClass::ReauthRequired);
        assert_eq!(
            RemoteStoreError::from(err).retry_class(),
            SyncRetryClass::ReauthRequired
        );
    }

    #[test]
    fn conversion_keeps_status_and_message() {
        let converted = RemoteStoreError::from(RemoteError::api(409, "duplicate key"));
        assert_eq!(converted, RemoteStoreError::api(409, "duplicate key"));
        assert_eq!(converted.retry_class(), SyncRetryClass::Retryable);

        let converted = RemoteStoreError::from(RemoteError::invalid_request("record has no id"));
        assert_eq!(converted.retry_class(), SyncRetryClass::Permanent);
    }
}
