//! Request and response bodies for every endpoint.
//!
//! Field names follow the client wire format (`fileUUID`, `checkSum`, ...).
//! Optional response fields are omitted when absent.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use syncserver_storage::{AppMetaData, UploadState};
use syncserver_types::{
    AppMetaDataVersion, CloudStorageType, DeviceId, FileGroupId, FileId, FileVersion,
    InvitationId, MasterVersion, Permission, SharingGroupId, UserId,
};

use crate::error::GoneReason;

// ── Uploads ──────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadFileRequest {
    #[serde(rename = "fileUUID")]
    pub file_id: FileId,
    /// Required at version 0; must match the stored value afterwards.
    #[serde(default)]
    pub mime_type: Option<String>,
    pub file_version: FileVersion,
    pub master_version: MasterVersion,
    #[serde(rename = "sharingGroupUUID")]
    pub sharing_group_id: SharingGroupId,
    /// Provider-specific checksum of the body, computed by the client.
    pub check_sum: String,
    #[serde(default)]
    pub app_meta_data: Option<AppMetaData>,
    #[serde(default)]
    pub undelete_server_file: bool,
    #[serde(default, rename = "fileGroupUUID")]
    pub file_group_id: Option<FileGroupId>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadFileResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creation_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub master_version_update: Option<MasterVersion>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadDeletionRequest {
    #[serde(rename = "fileUUID")]
    pub file_id: FileId,
    pub file_version: FileVersion,
    pub master_version: MasterVersion,
    #[serde(rename = "sharingGroupUUID")]
    pub sharing_group_id: SharingGroupId,
    /// Also remove the blob from cloud storage on commit.
    #[serde(default)]
    pub actual_deletion: bool,
}

/// Response of the endpoints whose only extra signal is a stale master version.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MasterVersionResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub master_version_update: Option<MasterVersion>,
}

impl MasterVersionResponse {
    pub fn stale(current: MasterVersion) -> Self {
        Self {
            master_version_update: Some(current),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadAppMetaDataRequest {
    #[serde(rename = "fileUUID")]
    pub file_id: FileId,
    pub master_version: MasterVersion,
    #[serde(rename = "sharingGroupUUID")]
    pub sharing_group_id: SharingGroupId,
    pub app_meta_data: AppMetaData,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DoneUploadsRequest {
    pub master_version: MasterVersion,
    #[serde(rename = "sharingGroupUUID")]
    pub sharing_group_id: SharingGroupId,
    #[serde(default)]
    pub sharing_group_name: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DoneUploadsResponse {
    pub number_uploads_transferred: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub master_version_update: Option<MasterVersion>,
    /// Cloud blob removals that failed after the commit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub number_deletion_errors: Option<usize>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetUploadsRequest {
    #[serde(rename = "sharingGroupUUID")]
    pub sharing_group_id: SharingGroupId,
}

/// One of the caller's pending staged rows.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadInfo {
    #[serde(rename = "fileUUID")]
    pub file_id: FileId,
    pub file_version: FileVersion,
    pub state: UploadState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_meta_data_version: Option<AppMetaDataVersion>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_size_bytes: Option<i64>,
    pub deleted: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetUploadsResponse {
    pub uploads: Vec<UploadInfo>,
}

// ── Index & downloads ────────────────────────────────────────────

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexRequest {
    #[serde(default, rename = "sharingGroupUUID")]
    pub sharing_group_id: Option<SharingGroupId>,
}

/// A committed file as listed by Index.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileInfo {
    #[serde(rename = "fileUUID")]
    pub file_id: FileId,
    #[serde(rename = "deviceUUID")]
    pub device_id: DeviceId,
    #[serde(rename = "sharingGroupUUID")]
    pub sharing_group_id: SharingGroupId,
    #[serde(rename = "fileGroupUUID", skip_serializing_if = "Option::is_none")]
    pub file_group_id: Option<FileGroupId>,
    pub file_version: FileVersion,
    pub mime_type: String,
    pub deleted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_meta_data_version: Option<AppMetaDataVersion>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_size_bytes: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cloud_storage_type: Option<CloudStorageType>,
    pub owner_user_id: UserId,
    pub creation_date: DateTime<Utc>,
    pub update_date: DateTime<Utc>,
}

/// A sharing group as seen by the caller.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SharingGroupInfo {
    #[serde(rename = "sharingGroupUUID")]
    pub sharing_group_id: SharingGroupId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sharing_group_name: Option<String>,
    pub deleted: bool,
    pub permission: Permission,
    pub master_version: MasterVersion,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_index: Option<Vec<FileInfo>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub master_version: Option<MasterVersion>,
    pub sharing_groups: Vec<SharingGroupInfo>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadFileRequest {
    #[serde(rename = "fileUUID")]
    pub file_id: FileId,
    pub master_version: MasterVersion,
    pub file_version: FileVersion,
    #[serde(rename = "sharingGroupUUID")]
    pub sharing_group_id: SharingGroupId,
    #[serde(default)]
    pub app_meta_data_version: Option<AppMetaDataVersion>,
}

/// Download result. `data` is the binary body; the other fields travel
/// in a response header.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadFileResponse {
    #[serde(skip)]
    pub data: Option<Vec<u8>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub check_sum: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_meta_data: Option<AppMetaData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cloud_storage_type: Option<CloudStorageType>,
    /// The provider's checksum differs from the one recorded at upload.
    pub contents_changed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gone: Option<GoneReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub master_version_update: Option<MasterVersion>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadAppMetaDataRequest {
    #[serde(rename = "fileUUID")]
    pub file_id: FileId,
    pub master_version: MasterVersion,
    #[serde(rename = "sharingGroupUUID")]
    pub sharing_group_id: SharingGroupId,
    pub app_meta_data_version: AppMetaDataVersion,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadAppMetaDataResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_meta_data: Option<AppMetaData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub master_version_update: Option<MasterVersion>,
}

// ── Sharing ──────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSharingInvitationRequest {
    #[serde(rename = "sharingGroupUUID")]
    pub sharing_group_id: SharingGroupId,
    pub permission: Permission,
    #[serde(default = "default_acceptors")]
    pub number_of_acceptors: i64,
    #[serde(default)]
    pub allow_social_acceptance: bool,
}

fn default_acceptors() -> i64 {
    1
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSharingInvitationResponse {
    #[serde(rename = "sharingInvitationUUID")]
    pub sharing_invitation_id: InvitationId,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedeemSharingInvitationRequest {
    #[serde(rename = "sharingInvitationUUID")]
    pub sharing_invitation_id: InvitationId,
    /// Used when redeeming creates a new owning-account user.
    #[serde(default)]
    pub cloud_folder_name: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedeemSharingInvitationResponse {
    pub user_id: UserId,
    #[serde(rename = "sharingGroupUUID")]
    pub sharing_group_id: SharingGroupId,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SharingInvitationInfoResponse {
    pub permission: Permission,
    pub allow_social_acceptance: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSharingGroupRequest {
    #[serde(rename = "sharingGroupUUID")]
    pub sharing_group_id: SharingGroupId,
    #[serde(default)]
    pub sharing_group_name: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveUserFromSharingGroupRequest {
    #[serde(rename = "sharingGroupUUID")]
    pub sharing_group_id: SharingGroupId,
}

// ── Users ────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddUserRequest {
    #[serde(default)]
    pub cloud_folder_name: Option<String>,
    /// The user's first sharing group, created alongside them.
    #[serde(rename = "sharingGroupUUID")]
    pub sharing_group_id: SharingGroupId,
    #[serde(default)]
    pub sharing_group_name: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserIdResponse {
    pub user_id: UserId,
}
