//! Row types for every persisted entity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use syncserver_types::{
    AccountType, AppMetaDataVersion, DeviceId, FileGroupId, FileId, FileVersion, InvitationId,
    MasterVersion, Permission, SharingGroupId, UserId,
};
use thiserror::Error;

/// Lifecycle state of a staged row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UploadState {
    /// Row written, blob transfer to the provider in progress.
    UploadingFile,
    /// Blob is in cloud storage; awaiting Done Uploads.
    UploadedFile,
    /// App-metadata-only change awaiting Done Uploads.
    UploadingAppMetaData,
    /// Deletion awaiting Done Uploads.
    ToDeleteFromFileIndex,
}

impl UploadState {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadState::UploadingFile => "uploadingFile",
            UploadState::UploadedFile => "uploadedFile",
            UploadState::UploadingAppMetaData => "uploadingAppMetaData",
            UploadState::ToDeleteFromFileIndex => "toDeleteFromFileIndex",
        }
    }

    /// Order of application for rows of the same file and version.
    pub(crate) fn apply_rank(&self) -> u8 {
        match self {
            UploadState::UploadingFile | UploadState::UploadedFile => 0,
            UploadState::UploadingAppMetaData => 1,
            UploadState::ToDeleteFromFileIndex => 2,
        }
    }
}

impl fmt::Display for UploadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown upload state: {0}")]
pub struct UnknownUploadState(String);

impl FromStr for UploadState {
    type Err = UnknownUploadState;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "uploadingFile" => Ok(UploadState::UploadingFile),
            "uploadedFile" => Ok(UploadState::UploadedFile),
            "uploadingAppMetaData" => Ok(UploadState::UploadingAppMetaData),
            "toDeleteFromFileIndex" => Ok(UploadState::ToDeleteFromFileIndex),
            other => Err(UnknownUploadState(other.to_string())),
        }
    }
}

/// Client-defined metadata attached to a file, versioned independently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppMetaData {
    pub version: AppMetaDataVersion,
    pub contents: String,
}

/// An upload, metadata change or deletion awaiting Done Uploads.
#[derive(Debug, Clone, PartialEq)]
pub struct StagedUpload {
    pub file_id: FileId,
    pub device_id: DeviceId,
    pub sharing_group_id: SharingGroupId,
    /// The uploading user.
    pub user_id: UserId,
    /// The user whose cloud storage holds the blob.
    pub owning_user_id: UserId,
    pub file_version: FileVersion,
    pub mime_type: Option<String>,
    pub checksum: Option<String>,
    pub app_meta_data: Option<AppMetaData>,
    pub file_size_bytes: Option<i64>,
    pub state: UploadState,
    /// Hard delete: also remove the blob from cloud storage.
    pub actual_deletion: bool,
    pub undelete: bool,
    pub file_group_id: Option<FileGroupId>,
    pub creation_date: DateTime<Utc>,
    pub update_date: DateTime<Utc>,
}

/// Committed state of one file.
#[derive(Debug, Clone, PartialEq)]
pub struct FileIndexEntry {
    pub file_id: FileId,
    pub sharing_group_id: SharingGroupId,
    pub file_version: FileVersion,
    /// Device that produced the current version; part of the blob name.
    pub device_id: DeviceId,
    /// Owner, whose cloud storage holds every version.
    pub user_id: UserId,
    pub mime_type: String,
    pub last_uploaded_checksum: Option<String>,
    pub file_size_bytes: Option<i64>,
    pub app_meta_data_version: Option<AppMetaDataVersion>,
    pub app_meta_data: Option<String>,
    pub deleted: bool,
    pub file_group_id: Option<FileGroupId>,
    pub creation_date: DateTime<Utc>,
    pub update_date: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharingGroup {
    pub sharing_group_id: SharingGroupId,
    pub name: Option<String>,
    pub deleted: bool,
}

/// A sharing group as seen by one of its members.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharingGroupSummary {
    pub sharing_group_id: SharingGroupId,
    pub name: Option<String>,
    pub deleted: bool,
    pub permission: Permission,
    pub master_version: MasterVersion,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharingGroupUser {
    pub sharing_group_id: SharingGroupId,
    pub user_id: UserId,
    pub permission: Permission,
    /// Set for members without cloud storage: whose storage their files use.
    pub owning_user_id: Option<UserId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharingInvitation {
    pub invitation_id: InvitationId,
    pub sharing_group_id: SharingGroupId,
    pub owning_user_id: UserId,
    pub permission: Permission,
    pub allow_social_acceptance: bool,
    pub number_acceptors: i64,
    pub expiry: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SharingGroupLockRecord {
    pub sharing_group_id: SharingGroupId,
    pub held_by_device_id: Option<DeviceId>,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl SharingGroupLockRecord {
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub user_id: UserId,
    pub account_type: AccountType,
    /// Provider-side account id; unique per account type.
    pub creds_id: String,
    pub username: Option<String>,
    pub cloud_folder_name: Option<String>,
    pub creds_json: Option<String>,
}

/// Fields needed to add a user; the id is assigned on insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub account_type: AccountType,
    pub creds_id: String,
    pub username: Option<String>,
    pub cloud_folder_name: Option<String>,
    pub creds_json: Option<String>,
}
