//! Storage error types.

use syncserver_types::{AppMetaDataVersion, FileId, FileVersion, MasterVersion, SharingGroupId};
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors raised by the repositories.
///
/// Variants other than `Sqlite`/`Json` are rejections of the requested
/// mutation. They are raised before anything is written.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("master version conflict: expected {expected}, found {actual}")]
    VersionConflict {
        expected: MasterVersion,
        actual: MasterVersion,
    },

    #[error("sharing group {0} is locked")]
    LockHeld(SharingGroupId),

    #[error("wrong file version for {file_id}: expected {expected}, got {actual}")]
    WrongFileVersion {
        file_id: FileId,
        expected: FileVersion,
        actual: FileVersion,
    },

    #[error("mime type mismatch for {file_id}: stored {stored}, got {supplied}")]
    MimeTypeMismatch {
        file_id: FileId,
        stored: String,
        supplied: String,
    },

    #[error("file group mismatch for {0}")]
    FileGroupMismatch(FileId),

    #[error("file {0} is deleted")]
    FileDeleted(FileId),

    #[error("app metadata version for {file_id}: expected {expected}, got {actual}")]
    AppMetaDataVersion {
        file_id: FileId,
        expected: AppMetaDataVersion,
        actual: AppMetaDataVersion,
    },

    #[error("file {file_id} has a change staged by device {device_id}")]
    StagedByOtherDevice { file_id: FileId, device_id: String },

    #[error("file {file_id} is not in sharing group {sharing_group_id}")]
    WrongSharingGroup {
        file_id: FileId,
        sharing_group_id: SharingGroupId,
    },
}

impl StorageError {
    /// True for rejections the client can fix by changing its request.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            StorageError::NotFound(_)
                | StorageError::WrongFileVersion { .. }
                | StorageError::MimeTypeMismatch { .. }
                | StorageError::FileGroupMismatch(_)
                | StorageError::FileDeleted(_)
                | StorageError::AppMetaDataVersion { .. }
                | StorageError::WrongSharingGroup { .. }
                | StorageError::StagedByOtherDevice { .. }
        )
    }

    /// True for optimistic-concurrency losses that a retry resolves.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            StorageError::VersionConflict { .. } | StorageError::LockHeld(_)
        )
    }
}
