//! Index, Download File and Download App MetaData. Reads never take the lock.

use crate::error::{GoneReason, ServerError, ServerResult};
use crate::service::{Caller, SyncService};
use crate::types::{
    DownloadAppMetaDataRequest, DownloadAppMetaDataResponse, DownloadFileRequest,
    DownloadFileResponse, FileInfo, IndexRequest, IndexResponse, SharingGroupInfo,
};
use std::collections::HashMap;
use syncserver_cloud::CloudError;
use syncserver_cloud::checksum::checksums_match;
use syncserver_cloud::naming::cloud_file_name;
use syncserver_storage::{AppMetaData, FileIndexEntry};
use syncserver_types::{CloudStorageType, FileId, Permission, SharingGroupId, UserId};
use tracing::{debug, warn};

impl SyncService {
    /// The caller's sharing groups and, when one is named, its file index.
    pub fn index(&self, caller: &Caller, request: IndexRequest) -> ServerResult<IndexResponse> {
        if let Some(sharing_group_id) = &request.sharing_group_id {
            self.authorize(caller, sharing_group_id, Permission::Read)?;
        }

        self.database.read(|repos| {
            let sharing_groups = repos
                .sharing_groups()
                .list_for_user(caller.user_id())?
                .into_iter()
                .map(|group| SharingGroupInfo {
                    sharing_group_id: group.sharing_group_id,
                    sharing_group_name: group.name,
                    deleted: group.deleted,
                    permission: group.permission,
                    master_version: group.master_version,
                })
                .collect();

            let Some(sharing_group_id) = request.sharing_group_id else {
                return Ok(IndexResponse {
                    file_index: None,
                    master_version: None,
                    sharing_groups,
                });
            };

            // Read in one pass so the index and master version agree.
            let master_version = repos.master_versions().read(&sharing_group_id)?;
            let entries = repos.file_index().list_for_sharing_group(&sharing_group_id)?;
            let mut storage_types: HashMap<UserId, Option<CloudStorageType>> = HashMap::new();
            let mut file_index = Vec::with_capacity(entries.len());
            for entry in entries {
                let cloud_storage_type = match storage_types.get(&entry.user_id).copied() {
                    Some(known) => known,
                    None => {
                        let kind = repos
                            .users()
                            .get(entry.user_id)?
                            .and_then(|owner| owner.account_type.cloud_storage_type());
                        storage_types.insert(entry.user_id, kind);
                        kind
                    }
                };
                file_index.push(file_info(entry, cloud_storage_type));
            }

            Ok::<_, ServerError>(IndexResponse {
                file_index: Some(file_index),
                master_version: Some(master_version),
                sharing_groups,
            })
        })
    }

    /// Reads a committed file version from its owner's cloud storage.
    ///
    /// A blob missing from storage or an owner whose token was revoked is
    /// reported through `gone` on a successful response.
    pub async fn download_file(
        &self,
        caller: &Caller,
        request: DownloadFileRequest,
    ) -> ServerResult<DownloadFileResponse> {
        let sharing_group_id = request.sharing_group_id;
        self.authorize(caller, &sharing_group_id, Permission::Read)?;
        if let Some(current) =
            self.stale_master_version(&sharing_group_id, request.master_version)?
        {
            return Ok(DownloadFileResponse {
                master_version_update: Some(current),
                ..Default::default()
            });
        }

        let entry = self.committed_entry(&request.file_id, &sharing_group_id)?;
        if entry.deleted {
            return Err(ServerError::Gone(GoneReason::FileDeleted));
        }
        if entry.file_version != request.file_version {
            return Err(ServerError::BadRequest(format!(
                "file {} is at version {}, not {}",
                entry.file_id, entry.file_version, request.file_version
            )));
        }
        if let Some(version) = request.app_meta_data_version {
            if entry.app_meta_data_version != Some(version) {
                return Err(ServerError::BadRequest(format!(
                    "file {} has no app metadata version {version}",
                    entry.file_id
                )));
            }
        }

        let app_meta_data = stored_app_meta_data(&entry);
        let access = self.storage_for(entry.user_id).await?;
        let name = cloud_file_name(&entry.file_id, &entry.device_id, entry.file_version);
        let options = access.options(&entry.mime_type);

        match access
            .connector
            .download_file(&access.credentials, &name, &options)
            .await
        {
            Ok(file) => {
                let contents_changed = entry
                    .last_uploaded_checksum
                    .as_deref()
                    .is_some_and(|recorded| !checksums_match(recorded, &file.checksum));
                if contents_changed {
                    warn!("blob {name} changed outside the server");
                }
                Ok(DownloadFileResponse {
                    data: Some(file.data),
                    check_sum: Some(file.checksum),
                    app_meta_data,
                    cloud_storage_type: Some(access.storage_type),
                    contents_changed,
                    gone: None,
                    master_version_update: None,
                })
            }
            Err(e @ (CloudError::FileNotFound(_) | CloudError::AccessTokenRevokedOrExpired)) => {
                self.note_cloud_error(access.user_id, &e).await;
                let gone = if e.is_auth_failure() {
                    GoneReason::AuthTokenExpiredOrRevoked
                } else {
                    GoneReason::FileRemovedOrRenamed
                };
                debug!("download of {name} is gone: {gone}");
                Ok(DownloadFileResponse {
                    app_meta_data,
                    cloud_storage_type: Some(access.storage_type),
                    gone: Some(gone),
                    ..Default::default()
                })
            }
            Err(e) => {
                self.note_cloud_error(access.user_id, &e).await;
                Err(e.into())
            }
        }
    }

    pub fn download_app_meta_data(
        &self,
        caller: &Caller,
        request: DownloadAppMetaDataRequest,
    ) -> ServerResult<DownloadAppMetaDataResponse> {
        let sharing_group_id = request.sharing_group_id;
        self.authorize(caller, &sharing_group_id, Permission::Read)?;
        if let Some(current) =
            self.stale_master_version(&sharing_group_id, request.master_version)?
        {
            return Ok(DownloadAppMetaDataResponse {
                app_meta_data: None,
                master_version_update: Some(current),
            });
        }

        let entry = self.committed_entry(&request.file_id, &sharing_group_id)?;
        if entry.deleted {
            return Err(ServerError::Gone(GoneReason::FileDeleted));
        }
        match stored_app_meta_data(&entry) {
            Some(meta) if meta.version == request.app_meta_data_version => {
                Ok(DownloadAppMetaDataResponse {
                    app_meta_data: Some(meta),
                    master_version_update: None,
                })
            }
            _ => Err(ServerError::BadRequest(format!(
                "file {} has no app metadata version {}",
                entry.file_id, request.app_meta_data_version
            ))),
        }
    }

    fn committed_entry(
        &self,
        file_id: &FileId,
        sharing_group_id: &SharingGroupId,
    ) -> ServerResult<FileIndexEntry> {
        self.database
            .read(|repos| repos.file_index().get_in_group(file_id, sharing_group_id))?
            .ok_or_else(|| ServerError::BadRequest(format!("unknown file {file_id}")))
    }
}

fn stored_app_meta_data(entry: &FileIndexEntry) -> Option<AppMetaData> {
    match (entry.app_meta_data_version, &entry.app_meta_data) {
        (Some(version), Some(contents)) => Some(AppMetaData {
            version,
            contents: contents.clone(),
        }),
        _ => None,
    }
}

fn file_info(entry: FileIndexEntry, cloud_storage_type: Option<CloudStorageType>) -> FileInfo {
    FileInfo {
        file_id: entry.file_id,
        device_id: entry.device_id,
        sharing_group_id: entry.sharing_group_id,
        file_group_id: entry.file_group_id,
        file_version: entry.file_version,
        mime_type: entry.mime_type,
        deleted: entry.deleted,
        app_meta_data_version: entry.app_meta_data_version,
        file_size_bytes: entry.file_size_bytes,
        cloud_storage_type,
        owner_user_id: entry.user_id,
        creation_date: entry.creation_date,
        update_date: entry.update_date,
    }
}
