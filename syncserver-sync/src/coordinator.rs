//! Done Uploads: the staged-to-committed transition for one sharing group.
//!
//! # Protocol
//!
//! 1. Take the sharing-group lock. If it is held, sweep stale locks and try
//!    once more; a second refusal is `ServerBusy`.
//! 2. Compare the caller's master version with the stored one. A mismatch
//!    releases the lock and answers `masterVersionUpdate` with nothing
//!    transferred.
//! 3. In one database transaction, apply every staged row of the group (all
//!    devices) per file in ascending version order, clear the staging table
//!    and advance the master version by one. Any row failure rolls the whole
//!    transaction back.
//! 4. Release the lock, then remove superseded and hard-deleted blobs from
//!    cloud storage. Those removals never fail the commit.

use crate::error::{ServerError, ServerResult};
use crate::service::{Caller, SyncService};
use crate::types::{DoneUploadsRequest, DoneUploadsResponse};
use chrono::{DateTime, Utc};
use syncserver_cloud::CloudError;
use syncserver_cloud::naming::cloud_file_name;
use syncserver_storage::{Repositories, StagedUpload, StorageError, StorageResult, UploadState};
use syncserver_types::{DeviceId, MasterVersion, Permission, SharingGroupId, UserId};
use tracing::{debug, info, warn};

/// A cloud blob to remove once the commit is durable.
#[derive(Clone, Debug, PartialEq)]
struct BlobRemoval {
    owner: UserId,
    name: String,
    mime_type: String,
}

enum CommitOutcome {
    Stale(MasterVersion),
    Committed {
        transferred: usize,
        removals: Vec<BlobRemoval>,
    },
}

impl SyncService {
    pub async fn done_uploads(
        &self,
        caller: &Caller,
        request: DoneUploadsRequest,
    ) -> ServerResult<DoneUploadsResponse> {
        let sharing_group_id = request.sharing_group_id;
        self.authorize(caller, &sharing_group_id, Permission::Write)?;
        self.acquire_lock(&sharing_group_id, &caller.device_id)?;

        let outcome = self.commit(&request);

        if let Err(e) = self
            .database
            .transaction(|repos| repos.locks().release(&sharing_group_id))
        {
            warn!("could not release lock on {sharing_group_id}: {e}");
        }

        match outcome? {
            CommitOutcome::Stale(current) => {
                info!(
                    "done uploads for {sharing_group_id}: client master version {} is stale, \
                     current {current}",
                    request.master_version
                );
                Ok(DoneUploadsResponse {
                    number_uploads_transferred: 0,
                    master_version_update: Some(current),
                    number_deletion_errors: None,
                })
            }
            CommitOutcome::Committed {
                transferred,
                removals,
            } => {
                let deletion_errors = if removals.is_empty() {
                    None
                } else {
                    Some(self.remove_blobs(removals).await)
                };
                Ok(DoneUploadsResponse {
                    number_uploads_transferred: transferred,
                    master_version_update: None,
                    number_deletion_errors: deletion_errors,
                })
            }
        }
    }

    fn acquire_lock(
        &self,
        sharing_group_id: &SharingGroupId,
        device_id: &DeviceId,
    ) -> ServerResult<()> {
        let duration = self.config.lock_duration();
        let attempt = || {
            self.database.transaction(|repos| {
                repos
                    .locks()
                    .acquire(sharing_group_id, Some(device_id), duration, Utc::now())
            })
        };

        match attempt() {
            Ok(_) => return Ok(()),
            Err(StorageError::LockHeld(_)) => {}
            Err(e) => return Err(e.into()),
        }

        let swept = self
            .database
            .transaction(|repos| repos.locks().sweep_stale(Some(sharing_group_id), Utc::now()))?;
        debug!("lock on {sharing_group_id} held; swept {swept} stale lock(s)");

        match attempt() {
            Ok(_) => Ok(()),
            Err(StorageError::LockHeld(_)) => {
                info!("sharing group {sharing_group_id} is busy");
                Err(ServerError::ServerBusy(*sharing_group_id))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Everything between lock acquisition and release, in one transaction.
    fn commit(&self, request: &DoneUploadsRequest) -> ServerResult<CommitOutcome> {
        let sharing_group_id = request.sharing_group_id;
        self.database.transaction(|repos| {
            let current = repos.master_versions().read(&sharing_group_id)?;
            if current != request.master_version {
                return Ok(CommitOutcome::Stale(current));
            }

            let staged = repos.uploads().list_for_sharing_group(&sharing_group_id)?;
            if staged.is_empty() && request.sharing_group_name.is_none() {
                debug!("done uploads for {sharing_group_id}: nothing staged");
                return Ok(CommitOutcome::Committed {
                    transferred: 0,
                    removals: Vec::new(),
                });
            }

            let now = Utc::now();
            let mut removals = Vec::new();
            for row in &staged {
                apply_staged(repos, row, now, &mut removals).map_err(|e| {
                    warn!(
                        "commit of {sharing_group_id} failed on {} v{} ({}): {e}",
                        row.file_id, row.file_version, row.state
                    );
                    ServerError::CommitFailed(e)
                })?;
            }

            if let Some(name) = &request.sharing_group_name {
                repos.sharing_groups().rename(&sharing_group_id, name)?;
            }
            repos.uploads().clear_all_for(&sharing_group_id)?;
            let next = repos.master_versions().advance(&sharing_group_id, current)?;
            info!(
                "committed {} staged row(s) to {sharing_group_id}; \
                 master version {current} -> {next}",
                staged.len()
            );

            Ok(CommitOutcome::Committed {
                transferred: staged.len(),
                removals,
            })
        })
    }

    /// Best-effort blob cleanup. Returns the number of failed removals;
    /// blobs that are already gone do not count.
    async fn remove_blobs(&self, removals: Vec<BlobRemoval>) -> usize {
        let mut errors = 0;
        for removal in removals {
            let access = match self.storage_for(removal.owner).await {
                Ok(access) => access,
                Err(e) => {
                    warn!(
                        "cannot reach storage of user {} to remove {}: {e}",
                        removal.owner, removal.name
                    );
                    errors += 1;
                    continue;
                }
            };
            let options = access.options(&removal.mime_type);
            match access
                .connector
                .delete_file(&access.credentials, &removal.name, &options)
                .await
            {
                Ok(()) => debug!("removed blob {}", removal.name),
                Err(CloudError::FileNotFound(_)) => debug!("blob {} already gone", removal.name),
                Err(e) => {
                    self.note_cloud_error(removal.owner, &e).await;
                    errors += 1;
                }
            }
        }
        errors
    }
}

/// Applies one staged row to the file index, queueing blobs that become unreachable.
fn apply_staged(
    repos: &Repositories<'_>,
    row: &StagedUpload,
    now: DateTime<Utc>,
    removals: &mut Vec<BlobRemoval>,
) -> StorageResult<()> {
    let file_index = repos.file_index();
    match row.state {
        // Never listed for commit; its blob may still be in flight.
        UploadState::UploadingFile => {}
        UploadState::UploadedFile => {
            let previous = file_index.get(&row.file_id)?;
            file_index.apply_upload(row, now)?;
            if let Some(prev) = previous {
                removals.push(BlobRemoval {
                    owner: prev.user_id,
                    name: cloud_file_name(&prev.file_id, &prev.device_id, prev.file_version),
                    mime_type: prev.mime_type,
                });
            }
        }
        UploadState::UploadingAppMetaData => {
            let meta = row.app_meta_data.as_ref().ok_or_else(|| {
                StorageError::NotFound(format!("app metadata for staged row of {}", row.file_id))
            })?;
            file_index.apply_app_meta_data(&row.file_id, meta.version, &meta.contents, now)?;
        }
        UploadState::ToDeleteFromFileIndex => {
            let changed = file_index.apply_deletion(&row.file_id, row.file_version, now)?;
            if row.actual_deletion {
                if let Some(entry) = file_index.get(&row.file_id)? {
                    removals.push(BlobRemoval {
                        owner: entry.user_id,
                        name: cloud_file_name(&entry.file_id, &entry.device_id, entry.file_version),
                        mime_type: entry.mime_type,
                    });
                }
            } else if !changed {
                debug!("{} was already deleted", row.file_id);
            }
        }
    }
    Ok(())
}
