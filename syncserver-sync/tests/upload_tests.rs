mod common;

use async_trait::async_trait;
use common::{FOLDER, Harness, on_new_device, upload_request};
use std::sync::Arc;
use syncserver_cloud::naming::cloud_file_name;
use syncserver_cloud::{
    CloudCredentials, CloudError, CloudFileOptions, CloudResult, CloudStorage, DownloadedFile,
    MockStorage, UploadOutcome,
};
use syncserver_storage::{AppMetaData, StorageError, UploadState};
use syncserver_sync::{
    GetUploadsRequest, ServerError, UploadAppMetaDataRequest, UploadDeletionRequest,
};
use syncserver_types::{CloudStorageType, FileId, SharingGroupId};
use tokio::sync::Notify;

/// Holds every blob write until released, then fails it or hands it on.
struct GatedStorage {
    inner: Arc<MockStorage>,
    entered: Notify,
    release: Notify,
    fail: bool,
}

impl GatedStorage {
    fn new(inner: Arc<MockStorage>, fail: bool) -> Self {
        Self {
            inner,
            entered: Notify::new(),
            release: Notify::new(),
            fail,
        }
    }
}

#[async_trait]
impl CloudStorage for GatedStorage {
    fn storage_type(&self) -> CloudStorageType {
        self.inner.storage_type()
    }

    async fn upload_file(
        &self,
        creds: &CloudCredentials,
        name: &str,
        data: Vec<u8>,
        options: &CloudFileOptions,
    ) -> CloudResult<UploadOutcome> {
        self.entered.notify_one();
        self.release.notified().await;
        if self.fail {
            return Err(CloudError::Failure("connection reset".into()));
        }
        self.inner.upload_file(creds, name, data, options).await
    }

    async fn download_file(
        &self,
        creds: &CloudCredentials,
        name: &str,
        options: &CloudFileOptions,
    ) -> CloudResult<DownloadedFile> {
        self.inner.download_file(creds, name, options).await
    }

    async fn delete_file(
        &self,
        creds: &CloudCredentials,
        name: &str,
        options: &CloudFileOptions,
    ) -> CloudResult<()> {
        self.inner.delete_file(creds, name, options).await
    }

    async fn lookup_file(
        &self,
        creds: &CloudCredentials,
        name: &str,
        options: &CloudFileOptions,
    ) -> CloudResult<bool> {
        self.inner.lookup_file(creds, name, options).await
    }
}

// ── Upload File ──────────────────────────────────────────────────

#[tokio::test]
async fn upload_stages_row_and_writes_blob() {
    let h = Harness::new();
    let (alice, g) = h.owner("alice");
    let file = FileId::new();

    let response = h.upload(&alice, g, file, 0, 0, b"hello").await;
    assert!(response.master_version_update.is_none());
    assert!(response.creation_date.is_some());
    assert!(h.has_blob(file, alice.device_id, 0));

    let pending = h
        .service
        .get_uploads(&alice, GetUploadsRequest { sharing_group_id: g })
        .unwrap();
    assert_eq!(pending.uploads.len(), 1);
    assert_eq!(pending.uploads[0].state, UploadState::UploadedFile);
    assert_eq!(pending.uploads[0].file_size_bytes, Some(5));
    assert!(!pending.uploads[0].deleted);
}

#[tokio::test]
async fn stale_master_version_stages_nothing() {
    let h = Harness::new();
    let (alice, g) = h.owner("alice");

    let response = h.upload(&alice, g, FileId::new(), 0, 7, b"hello").await;
    assert_eq!(response.master_version_update, Some(0));
    assert_eq!(h.storage.upload_calls(), 0);

    let pending = h
        .service
        .get_uploads(&alice, GetUploadsRequest { sharing_group_id: g })
        .unwrap();
    assert!(pending.uploads.is_empty());
}

#[tokio::test]
async fn repeated_upload_is_idempotent() {
    let h = Harness::new();
    let (alice, g) = h.owner("alice");
    let file = FileId::new();

    let first = h.upload(&alice, g, file, 0, 0, b"hello").await;
    let second = h.upload(&alice, g, file, 0, 0, b"hello").await;
    assert_eq!(first.creation_date, second.creation_date);
    assert_eq!(h.storage.upload_calls(), 1);

    let pending = h
        .service
        .get_uploads(&alice, GetUploadsRequest { sharing_group_id: g })
        .unwrap();
    assert_eq!(pending.uploads.len(), 1);
}

#[tokio::test]
async fn checksum_mismatch_unstages_and_removes_blob() {
    let h = Harness::new();
    let (alice, g) = h.owner("alice");
    let file = FileId::new();

    let mut request = upload_request(g, file, 0, 0, b"hello");
    request.check_sum = "00000000000000000000000000000000".into();
    let err = h
        .service
        .upload_file(&alice, request, b"hello".to_vec())
        .await
        .unwrap_err();
    assert!(matches!(err, ServerError::ChecksumMismatch { .. }));
    assert_eq!(err.status_code(), 400);

    assert!(!h.has_blob(file, alice.device_id, 0));
    let pending = h
        .service
        .get_uploads(&alice, GetUploadsRequest { sharing_group_id: g })
        .unwrap();
    assert!(pending.uploads.is_empty());
}

#[tokio::test]
async fn checksum_comparison_ignores_case() {
    let h = Harness::new();
    let (alice, g) = h.owner("alice");

    let mut request = upload_request(g, FileId::new(), 0, 0, b"hello");
    request.check_sum = request.check_sum.to_uppercase();
    h.service
        .upload_file(&alice, request, b"hello".to_vec())
        .await
        .unwrap();
}

#[tokio::test]
async fn provider_failure_leaves_no_staged_row() {
    let h = Harness::new();
    let (alice, g) = h.owner("alice");
    h.storage.set_fail_uploads(true);

    let err = h
        .service
        .upload_file(&alice, upload_request(g, FileId::new(), 0, 0, b"x"), b"x".to_vec())
        .await
        .unwrap_err();
    assert!(matches!(err, ServerError::Cloud(_)));
    assert!(err.is_server_error());

    let pending = h
        .service
        .get_uploads(&alice, GetUploadsRequest { sharing_group_id: g })
        .unwrap();
    assert!(pending.uploads.is_empty());
}

#[tokio::test]
async fn commit_during_failed_write_does_not_see_the_upload() {
    let storage = Arc::new(MockStorage::new(CloudStorageType::Google));
    let gate = Arc::new(GatedStorage::new(storage.clone(), true));
    let h = Harness::with_connector(storage, gate.clone());
    let (laptop, g) = h.owner("alice");
    let phone = on_new_device(&laptop);
    let file = FileId::new();

    let (uploaded, done) = tokio::join!(
        h.service
            .upload_file(&laptop, upload_request(g, file, 0, 0, b"x"), b"x".to_vec()),
        async {
            gate.entered.notified().await;
            let done = h.done(&phone, g, 0).await;
            gate.release.notify_one();
            done
        },
    );

    assert!(matches!(uploaded, Err(ServerError::Cloud(_))));
    assert_eq!(done.number_uploads_transferred, 0);
    assert_eq!(h.master_version(g), 0);
    let entry = h
        .service
        .database()
        .read(|repos| repos.file_index().get(&file))
        .unwrap();
    assert!(entry.is_none());
    let pending = h
        .service
        .get_uploads(&laptop, GetUploadsRequest { sharing_group_id: g })
        .unwrap();
    assert!(pending.uploads.is_empty());
}

#[tokio::test]
async fn upload_is_staged_once_its_blob_lands() {
    let storage = Arc::new(MockStorage::new(CloudStorageType::Google));
    let gate = Arc::new(GatedStorage::new(storage.clone(), false));
    let h = Harness::with_connector(storage, gate.clone());
    let (laptop, g) = h.owner("alice");
    let phone = on_new_device(&laptop);
    let file = FileId::new();

    let (uploaded, early) = tokio::join!(
        h.service
            .upload_file(&laptop, upload_request(g, file, 0, 0, b"x"), b"x".to_vec()),
        async {
            gate.entered.notified().await;
            let early = h.done(&phone, g, 0).await;
            gate.release.notify_one();
            early
        },
    );
    uploaded.unwrap();
    assert_eq!(early.number_uploads_transferred, 0);
    assert_eq!(h.master_version(g), 0);

    let late = h.done(&phone, g, 0).await;
    assert_eq!(late.number_uploads_transferred, 1);
    assert_eq!(h.master_version(g), 1);
    assert!(h.has_blob(file, laptop.device_id, 0));
}

#[tokio::test]
async fn revoked_token_maps_to_unauthorized() {
    let h = Harness::new();
    let (alice, g) = h.owner("alice");
    h.storage.set_token_revoked(true);

    let err = h
        .service
        .upload_file(&alice, upload_request(g, FileId::new(), 0, 0, b"x"), b"x".to_vec())
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 401);
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn blob_already_in_storage_counts_as_uploaded() {
    let h = Harness::new();
    let (alice, g) = h.owner("alice");
    let file = FileId::new();
    h.storage.replace_contents(
        Some(FOLDER),
        &cloud_file_name(&file, &alice.device_id, 0),
        b"hello".to_vec(),
    );

    h.upload(&alice, g, file, 0, 0, b"hello").await;
    let pending = h
        .service
        .get_uploads(&alice, GetUploadsRequest { sharing_group_id: g })
        .unwrap();
    assert_eq!(pending.uploads[0].state, UploadState::UploadedFile);
}

#[tokio::test]
async fn new_file_must_start_at_version_zero() {
    let h = Harness::new();
    let (alice, g) = h.owner("alice");

    let err = h
        .service
        .upload_file(&alice, upload_request(g, FileId::new(), 1, 0, b"x"), b"x".to_vec())
        .await
        .unwrap_err();
    assert!(err.is_client_error());
    assert_eq!(h.storage.upload_calls(), 0);
}

#[tokio::test]
async fn mime_type_cannot_change() {
    let h = Harness::new();
    let (alice, g) = h.owner("alice");
    let file = FileId::new();
    h.upload(&alice, g, file, 0, 0, b"v0").await;
    h.done(&alice, g, 0).await;

    let mut request = upload_request(g, file, 1, 1, b"v1");
    request.mime_type = Some("image/jpeg".into());
    let err = h
        .service
        .upload_file(&alice, request, b"v1".to_vec())
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 400);
}

#[tokio::test]
async fn unknown_sharing_group_is_rejected() {
    let h = Harness::new();
    let (alice, _) = h.owner("alice");

    let err = h
        .service
        .upload_file(
            &alice,
            upload_request(SharingGroupId::new(), FileId::new(), 0, 0, b"x"),
            b"x".to_vec(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ServerError::BadRequest(_)));
}

#[tokio::test]
async fn non_member_is_forbidden() {
    let h = Harness::new();
    let (_, g) = h.owner("alice");
    let (bob, _) = h.owner("bob");

    let err = h
        .service
        .upload_file(&bob, upload_request(g, FileId::new(), 0, 0, b"x"), b"x".to_vec())
        .await
        .unwrap_err();
    assert!(matches!(err, ServerError::Forbidden(_)));
    assert_eq!(err.status_code(), 403);
}

// ── Upload Deletion ──────────────────────────────────────────────

#[tokio::test]
async fn deletion_requires_committed_file() {
    let h = Harness::new();
    let (alice, g) = h.owner("alice");

    let err = h
        .service
        .upload_deletion(
            &alice,
            UploadDeletionRequest {
                file_id: FileId::new(),
                file_version: 0,
                master_version: 0,
                sharing_group_id: g,
                actual_deletion: false,
            },
        )
        .unwrap_err();
    assert!(err.is_client_error());
}

#[tokio::test]
async fn deletion_with_wrong_version_is_rejected() {
    let h = Harness::new();
    let (alice, g) = h.owner("alice");
    let file = FileId::new();
    h.upload(&alice, g, file, 0, 0, b"v0").await;
    h.done(&alice, g, 0).await;

    let err = h
        .service
        .upload_deletion(
            &alice,
            UploadDeletionRequest {
                file_id: file,
                file_version: 1,
                master_version: 1,
                sharing_group_id: g,
                actual_deletion: false,
            },
        )
        .unwrap_err();
    assert_eq!(err.status_code(), 400);
}

#[tokio::test]
async fn repeated_deletion_stages_one_row() {
    let h = Harness::new();
    let (alice, g) = h.owner("alice");
    let file = FileId::new();
    h.upload(&alice, g, file, 0, 0, b"v0").await;
    h.done(&alice, g, 0).await;

    let request = UploadDeletionRequest {
        file_id: file,
        file_version: 0,
        master_version: 1,
        sharing_group_id: g,
        actual_deletion: false,
    };
    h.service.upload_deletion(&alice, request.clone()).unwrap();
    h.service.upload_deletion(&alice, request).unwrap();

    let pending = h
        .service
        .get_uploads(&alice, GetUploadsRequest { sharing_group_id: g })
        .unwrap();
    assert_eq!(pending.uploads.len(), 1);
    assert!(pending.uploads[0].deleted);
}

#[tokio::test]
async fn deletion_with_stale_master_version_reports_update() {
    let h = Harness::new();
    let (alice, g) = h.owner("alice");
    let file = FileId::new();
    h.upload(&alice, g, file, 0, 0, b"v0").await;
    h.done(&alice, g, 0).await;

    let response = h
        .service
        .upload_deletion(
            &alice,
            UploadDeletionRequest {
                file_id: file,
                file_version: 0,
                master_version: 0,
                sharing_group_id: g,
                actual_deletion: false,
            },
        )
        .unwrap();
    assert_eq!(response.master_version_update, Some(1));
}

// ── Changes from two devices ─────────────────────────────────────

#[tokio::test]
async fn second_device_cannot_stage_the_same_version() {
    let h = Harness::new();
    let (laptop, g) = h.owner("alice");
    let phone = on_new_device(&laptop);
    let file = FileId::new();
    let bystander = FileId::new();
    h.upload(&laptop, g, file, 0, 0, b"v0").await;
    h.done(&laptop, g, 0).await;

    h.upload(&laptop, g, file, 1, 1, b"laptop v1").await;
    let err = h
        .service
        .upload_file(
            &phone,
            upload_request(g, file, 1, 1, b"phone v1"),
            b"phone v1".to_vec(),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ServerError::Storage(StorageError::StagedByOtherDevice { file_id, .. }) if file_id == file
    ));
    assert_eq!(err.status_code(), 400);
    assert!(!h.has_blob(file, phone.device_id, 1));

    // The group keeps committing, unrelated files included.
    h.upload(&phone, g, bystander, 0, 1, b"other").await;
    let done = h.done(&phone, g, 1).await;
    assert_eq!(done.number_uploads_transferred, 2);
    assert_eq!(h.master_version(g), 2);
    let entry = h
        .service
        .database()
        .read(|repos| repos.file_index().get(&file))
        .unwrap()
        .unwrap();
    assert_eq!(entry.file_version, 1);
    assert_eq!(entry.device_id, laptop.device_id);
}

#[tokio::test]
async fn staged_deletion_blocks_another_devices_upload() {
    let h = Harness::new();
    let (laptop, g) = h.owner("alice");
    let phone = on_new_device(&laptop);
    let file = FileId::new();
    h.upload(&laptop, g, file, 0, 0, b"v0").await;
    h.done(&laptop, g, 0).await;

    h.service
        .upload_deletion(
            &laptop,
            UploadDeletionRequest {
                file_id: file,
                file_version: 0,
                master_version: 1,
                sharing_group_id: g,
                actual_deletion: false,
            },
        )
        .unwrap();
    let err = h
        .service
        .upload_file(&phone, upload_request(g, file, 1, 1, b"v1"), b"v1".to_vec())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ServerError::Storage(StorageError::StagedByOtherDevice { .. })
    ));

    let done = h.done(&laptop, g, 1).await;
    assert_eq!(done.number_uploads_transferred, 1);
    assert_eq!(h.master_version(g), 2);
}

#[tokio::test]
async fn staged_upload_blocks_another_devices_deletion() {
    let h = Harness::new();
    let (laptop, g) = h.owner("alice");
    let phone = on_new_device(&laptop);
    let file = FileId::new();
    h.upload(&laptop, g, file, 0, 0, b"v0").await;
    h.done(&laptop, g, 0).await;

    h.upload(&laptop, g, file, 1, 1, b"v1").await;
    let err = h
        .service
        .upload_deletion(
            &phone,
            UploadDeletionRequest {
                file_id: file,
                file_version: 0,
                master_version: 1,
                sharing_group_id: g,
                actual_deletion: true,
            },
        )
        .unwrap_err();
    assert!(matches!(
        err,
        ServerError::Storage(StorageError::StagedByOtherDevice { .. })
    ));
    assert_eq!(err.status_code(), 400);

    // After the upload commits, the phone deletes the new version.
    h.done(&phone, g, 1).await;
    h.service
        .upload_deletion(
            &phone,
            UploadDeletionRequest {
                file_id: file,
                file_version: 1,
                master_version: 2,
                sharing_group_id: g,
                actual_deletion: false,
            },
        )
        .unwrap();
}

// ── Upload App MetaData ──────────────────────────────────────────

#[tokio::test]
async fn app_meta_data_version_must_be_next() {
    let h = Harness::new();
    let (alice, g) = h.owner("alice");
    let file = FileId::new();
    h.upload(&alice, g, file, 0, 0, b"v0").await;
    h.done(&alice, g, 0).await;

    let err = h
        .service
        .upload_app_meta_data(
            &alice,
            UploadAppMetaDataRequest {
                file_id: file,
                master_version: 1,
                sharing_group_id: g,
                app_meta_data: AppMetaData {
                    version: 1,
                    contents: "{}".into(),
                },
            },
        )
        .unwrap_err();
    assert_eq!(err.status_code(), 400);

    h.service
        .upload_app_meta_data(
            &alice,
            UploadAppMetaDataRequest {
                file_id: file,
                master_version: 1,
                sharing_group_id: g,
                app_meta_data: AppMetaData {
                    version: 0,
                    contents: "{}".into(),
                },
            },
        )
        .unwrap();
    let pending = h
        .service
        .get_uploads(&alice, GetUploadsRequest { sharing_group_id: g })
        .unwrap();
    assert_eq!(pending.uploads[0].state, UploadState::UploadingAppMetaData);
    assert_eq!(pending.uploads[0].app_meta_data_version, Some(0));
}

#[tokio::test]
async fn app_meta_data_waits_for_pending_upload_from_same_device() {
    let h = Harness::new();
    let (alice, g) = h.owner("alice");
    let file = FileId::new();
    h.upload(&alice, g, file, 0, 0, b"v0").await;
    h.done(&alice, g, 0).await;
    h.upload(&alice, g, file, 1, 1, b"v1").await;

    let request = UploadAppMetaDataRequest {
        file_id: file,
        master_version: 1,
        sharing_group_id: g,
        app_meta_data: AppMetaData {
            version: 0,
            contents: "{}".into(),
        },
    };
    let err = h
        .service
        .upload_app_meta_data(&alice, request.clone())
        .unwrap_err();
    assert!(matches!(err, ServerError::BadRequest(_)));

    // Another device is blocked too while the upload is staged.
    let other_device = on_new_device(&alice);
    let err = h
        .service
        .upload_app_meta_data(&other_device, request)
        .unwrap_err();
    assert!(matches!(
        err,
        ServerError::Storage(StorageError::StagedByOtherDevice { .. })
    ));
    assert_eq!(err.status_code(), 400);
}
