//! Error types shared across the MizanFlow crates.

use thiserror::Error;

use crate::sync::{classify_http_status, SyncRetryClass};

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by core services.
#[derive(Debug, Error)]
pub enum Error {
    /// Local key-value store failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Remote record store failure
    #[error("Remote store error: {0}")]
    Remote(#[from] RemoteStoreError),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Input rejected before reaching any store
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Operation requires a signed-in (or anonymous) session
    #[error("No active session")]
    Unauthenticated,

    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }
}

/// Errors returned by a [`crate::sync::RemoteStore`] implementation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteStoreError {
    /// Network-level failure (connect, timeout, dropped body)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Non-success response from the remote service
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Missing or rejected credentials
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Request could not be built (bad table, bad payload, ...)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Response body could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),
}

impl RemoteStoreError {
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    /// HTTP status if this is an API error.
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
            Self::Transport(_) => SyncRetryClass::Retryable,
            Self::Auth(_) => SyncRetryClass::ReauthRequired,
            Self::InvalidRequest(_) | Self::Decode(_) => SyncRetryClass::Permanent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_errors_are_retryable() {
        let err = RemoteStoreError::transport("connection refused");
        assert_eq!(err.retry_class(), SyncRetryClass::Retryable);
    }

    #[test]
    fn constraint_violation_is_permanent() {
        let err = RemoteStoreError::api(400, "violates foreign key constraint");
        assert_eq!(err.retry_class(), SyncRetryClass::Permanent);
        assert_eq!(err.status_code(), Some(400));
    }

    #[test]
    fn auth_failures_require_reauth() {
        assert_eq!(
            RemoteStoreError::api(401, "jwt expired").retry_class(),
            SyncRetryClass::ReauthRequired
        );
        assert_eq!(
            RemoteStoreError::Auth("missing token".to_string()).retry_class(),
            SyncRetryClass::ReauthRequired
        );
    }
}
