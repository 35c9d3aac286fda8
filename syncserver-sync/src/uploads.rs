//! Upload File, Upload Deletion, Upload App MetaData and Get Uploads.
//!
//! These endpoints only stage rows; nothing reaches the file index until
//! Done Uploads. Staging never takes the sharing-group lock: rows are keyed
//! by `(fileId, deviceId)` and re-staging overwrites.

use crate::error::{ServerError, ServerResult};
use crate::service::{Caller, SyncService};
use crate::types::{
    GetUploadsRequest, GetUploadsResponse, MasterVersionResponse, UploadAppMetaDataRequest,
    UploadDeletionRequest, UploadFileRequest, UploadFileResponse, UploadInfo,
};
use chrono::Utc;
use syncserver_cloud::checksum::checksums_match;
use syncserver_cloud::naming::cloud_file_name;
use syncserver_cloud::UploadOutcome;
use syncserver_storage::{StagedUpload, UploadState};
use syncserver_types::{Permission, UserId};
use tracing::{debug, info, warn};

impl SyncService {
    /// Writes a file version's blob to the owner's cloud storage, then stages it.
    ///
    /// The row only appears once the blob has landed, so a concurrent Done
    /// Uploads never sees a version whose write may still fail. The version
    /// checks run before the write and again inside the staging transaction.
    pub async fn upload_file(
        &self,
        caller: &Caller,
        request: UploadFileRequest,
        data: Vec<u8>,
    ) -> ServerResult<UploadFileResponse> {
        let sharing_group_id = request.sharing_group_id;
        let membership = self.authorize(caller, &sharing_group_id, Permission::Write)?;
        if let Some(current) =
            self.stale_master_version(&sharing_group_id, request.master_version)?
        {
            return Ok(UploadFileResponse {
                master_version_update: Some(current),
                ..Default::default()
            });
        }
        if request.check_sum.is_empty() {
            return Err(ServerError::BadRequest("checkSum is required".into()));
        }

        let (committed, pending) = self.database.read(|repos| {
            Ok::<_, ServerError>((
                repos
                    .file_index()
                    .get_in_group(&request.file_id, &sharing_group_id)?,
                repos.uploads().get(&request.file_id, &caller.device_id)?,
            ))
        })?;

        if let Some(row) = pending.filter(|row| {
            row.state == UploadState::UploadedFile && row.file_version == request.file_version
        }) {
            debug!(
                "file {} v{} already staged by device {}",
                request.file_id, request.file_version, caller.device_id
            );
            return Ok(UploadFileResponse {
                creation_date: Some(row.creation_date),
                update_date: Some(row.update_date),
                master_version_update: None,
            });
        }

        // Later versions stay in the storage that holds version 0.
        let owning_user_id = match &committed {
            Some(entry) => entry.user_id,
            None => self.effective_owner(caller, &membership)?,
        };
        let mime_type = request
            .mime_type
            .clone()
            .or_else(|| committed.as_ref().map(|entry| entry.mime_type.clone()))
            .unwrap_or_default();

        let now = Utc::now();
        let mut record = StagedUpload {
            file_id: request.file_id,
            device_id: caller.device_id,
            sharing_group_id,
            user_id: caller.user_id(),
            owning_user_id,
            file_version: request.file_version,
            mime_type: request.mime_type.clone(),
            checksum: Some(request.check_sum.clone()),
            app_meta_data: request.app_meta_data.clone(),
            file_size_bytes: Some(data.len() as i64),
            state: UploadState::UploadedFile,
            actual_deletion: false,
            undelete: request.undelete_server_file,
            file_group_id: request.file_group_id,
            creation_date: now,
            update_date: now,
        };
        self.database.read(|repos| {
            repos.file_index().validate_upload(&record)?;
            repos
                .uploads()
                .ensure_not_staged_elsewhere(&record.file_id, &record.device_id)
        })?;

        let name = cloud_file_name(&record.file_id, &record.device_id, record.file_version);
        let checksum = self
            .write_blob(owning_user_id, &name, &mime_type, data, &request.check_sum)
            .await?;

        record.checksum = Some(checksum);
        record.update_date = Utc::now();
        let staged = self.database.transaction(|repos| {
            repos.file_index().validate_upload(&record)?;
            let uploads = repos.uploads();
            uploads.ensure_not_staged_elsewhere(&record.file_id, &record.device_id)?;
            uploads.stage(&record)
        });
        if let Err(e) = staged {
            warn!("could not stage {} after writing {name}: {e}", record.file_id);
            self.discard_blob(owning_user_id, &name, &mime_type).await;
            return Err(e.into());
        }
        info!(
            "staged file {} v{} from device {} ({} bytes)",
            record.file_id,
            record.file_version,
            record.device_id,
            record.file_size_bytes.unwrap_or_default()
        );

        Ok(UploadFileResponse {
            creation_date: Some(record.creation_date),
            update_date: Some(record.update_date),
            master_version_update: None,
        })
    }

    /// Best-effort removal of a blob that will never be committed.
    async fn discard_blob(&self, owner: UserId, name: &str, mime_type: &str) {
        let access = match self.storage_for(owner).await {
            Ok(access) => access,
            Err(e) => {
                warn!("cannot reach storage of user {owner} to remove {name}: {e}");
                return;
            }
        };
        let options = access.options(mime_type);
        if let Err(e) = access
            .connector
            .delete_file(&access.credentials, name, &options)
            .await
        {
            if !e.is_not_found() {
                warn!("could not remove unstaged blob {name}: {e}");
            }
        }
    }

    /// Writes a blob and checks the provider's checksum against the client's.
    /// Returns the checksum to record.
    async fn write_blob(
        &self,
        owner: UserId,
        name: &str,
        mime_type: &str,
        data: Vec<u8>,
        client_checksum: &str,
    ) -> ServerResult<String> {
        let access = self.storage_for(owner).await?;
        let options = access.options(mime_type);
        let outcome = match access
            .connector
            .upload_file(&access.credentials, name, data, &options)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                self.note_cloud_error(owner, &e).await;
                return Err(e.into());
            }
        };

        match outcome {
            UploadOutcome::Uploaded { checksum } if checksums_match(&checksum, client_checksum) => {
                Ok(checksum)
            }
            UploadOutcome::Uploaded { checksum } => {
                warn!("checksum mismatch on {name}: client {client_checksum}, provider {checksum}");
                if let Err(e) = access
                    .connector
                    .delete_file(&access.credentials, name, &options)
                    .await
                {
                    if !e.is_not_found() {
                        warn!("could not remove mismatched blob {name}: {e}");
                    }
                }
                Err(ServerError::ChecksumMismatch {
                    expected: client_checksum.to_string(),
                    actual: checksum,
                })
            }
            UploadOutcome::AlreadyUploaded => {
                debug!("blob {name} already present in storage of user {owner}");
                Ok(client_checksum.to_string())
            }
        }
    }

    /// Stages a deletion of the file's committed version.
    pub fn upload_deletion(
        &self,
        caller: &Caller,
        request: UploadDeletionRequest,
    ) -> ServerResult<MasterVersionResponse> {
        let sharing_group_id = request.sharing_group_id;
        self.authorize(caller, &sharing_group_id, Permission::Write)?;
        if let Some(current) =
            self.stale_master_version(&sharing_group_id, request.master_version)?
        {
            return Ok(MasterVersionResponse::stale(current));
        }

        let entry = self
            .database
            .read(|repos| {
                repos
                    .file_index()
                    .get_in_group(&request.file_id, &sharing_group_id)
            })?
            .ok_or_else(|| ServerError::BadRequest(format!("unknown file {}", request.file_id)))?;

        let now = Utc::now();
        let record = StagedUpload {
            file_id: request.file_id,
            device_id: caller.device_id,
            sharing_group_id,
            user_id: caller.user_id(),
            owning_user_id: entry.user_id,
            file_version: request.file_version,
            mime_type: None,
            checksum: None,
            app_meta_data: None,
            file_size_bytes: None,
            state: UploadState::ToDeleteFromFileIndex,
            actual_deletion: request.actual_deletion,
            undelete: false,
            file_group_id: None,
            creation_date: now,
            update_date: now,
        };
        self.database
            .transaction(|repos| repos.uploads().stage_deletion(&record))?;
        info!(
            "staged deletion of {} v{} from device {}",
            record.file_id, record.file_version, record.device_id
        );
        Ok(MasterVersionResponse::default())
    }

    /// Stages a new app-metadata version for a committed file.
    pub fn upload_app_meta_data(
        &self,
        caller: &Caller,
        request: UploadAppMetaDataRequest,
    ) -> ServerResult<MasterVersionResponse> {
        let sharing_group_id = request.sharing_group_id;
        self.authorize(caller, &sharing_group_id, Permission::Write)?;
        if let Some(current) =
            self.stale_master_version(&sharing_group_id, request.master_version)?
        {
            return Ok(MasterVersionResponse::stale(current));
        }

        let (entry, pending) = self.database.read(|repos| {
            let file_index = repos.file_index();
            if file_index
                .get_in_group(&request.file_id, &sharing_group_id)?
                .is_none()
            {
                return Err(ServerError::BadRequest(format!(
                    "unknown file {}",
                    request.file_id
                )));
            }
            let entry = file_index
                .validate_app_meta_data(&request.file_id, request.app_meta_data.version)?;
            let pending = repos.uploads().get(&request.file_id, &caller.device_id)?;
            Ok((entry, pending))
        })?;

        // One staged row per (file, device); a pending upload or deletion must commit first.
        if let Some(row) = pending.filter(|row| row.state != UploadState::UploadingAppMetaData) {
            return Err(ServerError::BadRequest(format!(
                "file {} already has a pending {} from this device",
                row.file_id, row.state
            )));
        }

        let now = Utc::now();
        let record = StagedUpload {
            file_id: request.file_id,
            device_id: caller.device_id,
            sharing_group_id,
            user_id: caller.user_id(),
            owning_user_id: entry.user_id,
            file_version: entry.file_version,
            mime_type: None,
            checksum: None,
            app_meta_data: Some(request.app_meta_data),
            file_size_bytes: None,
            state: UploadState::UploadingAppMetaData,
            actual_deletion: false,
            undelete: false,
            file_group_id: None,
            creation_date: now,
            update_date: now,
        };
        self.database.transaction(|repos| {
            let uploads = repos.uploads();
            uploads.ensure_not_staged_elsewhere(&record.file_id, &record.device_id)?;
            uploads.stage(&record)
        })?;
        debug!("staged app metadata for {}", record.file_id);
        Ok(MasterVersionResponse::default())
    }

    /// The caller's own pending rows in one sharing group.
    pub fn get_uploads(
        &self,
        caller: &Caller,
        request: GetUploadsRequest,
    ) -> ServerResult<GetUploadsResponse> {
        self.authorize(caller, &request.sharing_group_id, Permission::Read)?;
        let rows = self.database.read(|repos| {
            repos
                .uploads()
                .list_pending(caller.user_id(), &caller.device_id, &request.sharing_group_id)
        })?;
        let uploads = rows
            .into_iter()
            .map(|row| UploadInfo {
                file_id: row.file_id,
                file_version: row.file_version,
                deleted: row.state == UploadState::ToDeleteFromFileIndex,
                state: row.state,
                mime_type: row.mime_type,
                app_meta_data_version: row.app_meta_data.map(|meta| meta.version),
                file_size_bytes: row.file_size_bytes,
            })
            .collect();
        Ok(GetUploadsResponse { uploads })
    }
}
