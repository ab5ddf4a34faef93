//! Error types for platform API operations.

use skymount_common::FsError;
use thiserror::Error;

/// Errors that can occur while talking to the platform.
#[derive(Debug, Error, Clone)]
pub enum ClientError {
    /// The object or project does not exist (HTTP 404).
    #[error("not found: {id}")]
    NotFound { id: String },

    /// The credentials do not grant access (HTTP 401/403).
    #[error("permission denied for {id}: {message}")]
    PermissionDenied { id: String, message: String },

    /// Any other 4xx from the platform. Download URLs surface their
    /// expiry this way.
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// Transport-level failure or 5xx; retried inside the facade.
    #[error("network error: {message}")]
    Network { message: String, retryable: bool },

    /// The platform answered with a body we could not interpret.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Local I/O while staging an upload.
    #[error("I/O error for {path}: {message}")]
    Io { path: String, message: String },

    /// Missing or malformed environment configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl ClientError {
    /// Whether the facade's retry loop should try again.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Network { retryable, .. } => *retryable,
            _ => false,
        }
    }

    /// Whether this is a 4xx that signals an expired download URL.
    pub fn is_url_expiry(&self) -> bool {
        matches!(self, ClientError::Http { status, .. } if (400..500).contains(status))
    }

    /// Collapse into the filesystem error taxonomy for the FUSE layer.
    pub fn into_fs_error(self) -> FsError {
        match self {
            ClientError::NotFound { id } => FsError::NotFound(id),
            ClientError::PermissionDenied { id, .. } => FsError::PermissionDenied(id),
            other => FsError::Io(other.to_string()),
        }
    }
}
