//! Endpoint-facing error taxonomy.
//!
//! Every failure a client can see maps to one of three reactions:
//! retry as-is (`ServerBusy`), fix the request (4xx), or give up (5xx).
//! A stale master version is not an error; it travels in the success
//! response as `masterVersionUpdate`.

use serde::{Deserialize, Serialize};
use std::fmt;
use syncserver_cloud::CloudError;
use syncserver_storage::StorageError;
use syncserver_types::SharingGroupId;
use thiserror::Error;

pub type ServerResult<T> = Result<T, ServerError>;

/// Why a resource answered `410 Gone`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum GoneReason {
    /// The file is marked deleted in the index.
    FileDeleted,
    /// The blob is missing from the owner's cloud storage.
    FileRemovedOrRenamed,
    /// The owner's cloud storage rejected their token.
    AuthTokenExpiredOrRevoked,
    /// The invitation is unknown, expired or used up.
    InvitationUnavailable,
}

impl GoneReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            GoneReason::FileDeleted => "fileDeleted",
            GoneReason::FileRemovedOrRenamed => "fileRemovedOrRenamed",
            GoneReason::AuthTokenExpiredOrRevoked => "authTokenExpiredOrRevoked",
            GoneReason::InvitationUnavailable => "invitationUnavailable",
        }
    }
}

impl fmt::Display for GoneReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("gone: {0}")]
    Gone(GoneReason),

    #[error("sharing group {0} is busy, retry later")]
    ServerBusy(SharingGroupId),

    /// A staged row could not be applied; nothing was committed.
    #[error("commit failed: {0}")]
    CommitFailed(StorageError),

    #[error("checksum mismatch: client sent {expected}, provider computed {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Cloud(#[from] CloudError),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ServerError {
    /// HTTP status a routing layer should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            ServerError::Unauthorized(_) => 401,
            ServerError::Forbidden(_) => 403,
            ServerError::BadRequest(_) | ServerError::ChecksumMismatch { .. } => 400,
            ServerError::Gone(_) => 410,
            ServerError::ServerBusy(_) => 503,
            ServerError::CommitFailed(e) if e.is_validation() => 400,
            ServerError::Storage(e) if e.is_validation() => 400,
            ServerError::Storage(StorageError::LockHeld(_)) => 503,
            // Refresh the index and resend with the current master version.
            ServerError::Storage(StorageError::VersionConflict { .. }) => 400,
            ServerError::Cloud(e) if e.is_auth_failure() => 401,
            ServerError::CommitFailed(_)
            | ServerError::Storage(_)
            | ServerError::Cloud(_)
            | ServerError::Config(_)
            | ServerError::Internal(_) => 500,
        }
    }

    /// "Fix your request."
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code())
    }

    pub fn is_server_error(&self) -> bool {
        self.status_code() >= 500
    }

    /// "Try again now": the same request may succeed after a backoff.
    pub fn is_retryable(&self) -> bool {
        match self {
            ServerError::ServerBusy(_) => true,
            ServerError::Storage(e) => matches!(e, StorageError::LockHeld(_)),
            _ => false,
        }
    }
}
