//! Cloud storage error types.

use syncserver_types::CloudStorageType;
use thiserror::Error;

/// Result type for cloud storage operations.
pub type CloudResult<T> = Result<T, CloudError>;

/// Errors that can occur talking to a cloud storage provider.
#[derive(Debug, Error)]
pub enum CloudError {
    #[error("access token revoked or expired")]
    AccessTokenRevokedOrExpired,

    #[error("file not found: {0}")]
    FileNotFound(String),

    #[error("cloud storage failure: {0}")]
    Failure(String),

    #[error("invalid upload state: {0}")]
    InvalidUploadState(String),

    #[error("no connector registered for {0}")]
    UnsupportedStorage(CloudStorageType),

    #[error("credentials unavailable: {0}")]
    Credentials(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl CloudError {
    /// True when the caller must re-authenticate rather than retry.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, CloudError::AccessTokenRevokedOrExpired)
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, CloudError::FileNotFound(_))
    }
}
