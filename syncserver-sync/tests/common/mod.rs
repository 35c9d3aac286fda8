#![allow(dead_code)]

use std::sync::Arc;
use syncserver_cloud::checksum;
use syncserver_cloud::naming::cloud_file_name;
use syncserver_cloud::{
    CloudCredentials, CloudStorage, CloudStorageRegistry, CredentialsCache, MockStorage,
    StaticCredentialSource,
};
use syncserver_storage::Database;
use syncserver_sync::{
    AccountIdentity, AddUserRequest, Caller, DoneUploadsRequest, DoneUploadsResponse,
    ServerConfig, SyncService, UploadFileRequest, UploadFileResponse,
};
use syncserver_types::{AccountType, CloudStorageType, DeviceId, FileId, SharingGroupId};

pub const FOLDER: &str = "Sync";

/// A service over an in-memory database with a mock Google Drive.
pub struct Harness {
    pub service: SyncService,
    pub storage: Arc<MockStorage>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(ServerConfig::default())
    }

    pub fn with_config(config: ServerConfig) -> Self {
        let storage = Arc::new(MockStorage::new(CloudStorageType::Google));
        Self::build(storage.clone(), storage, config)
    }

    /// Routes Google traffic through `connector`, which usually wraps `storage`.
    pub fn with_connector(storage: Arc<MockStorage>, connector: Arc<dyn CloudStorage>) -> Self {
        Self::build(storage, connector, ServerConfig::default())
    }

    fn build(
        storage: Arc<MockStorage>,
        connector: Arc<dyn CloudStorage>,
        config: ServerConfig,
    ) -> Self {
        let database = Database::open_in_memory().unwrap();
        let mut registry = CloudStorageRegistry::new();
        registry.register(connector);
        let credentials = CredentialsCache::new(Arc::new(StaticCredentialSource), 3600, 300);
        Self {
            service: SyncService::new(database, registry, credentials, config),
            storage,
        }
    }

    /// Adds a Google user with their own sharing group.
    pub fn owner(&self, creds_id: &str) -> (Caller, SharingGroupId) {
        let sharing_group_id = SharingGroupId::new();
        let identity = google_identity(creds_id);
        self.service
            .add_user(
                &identity,
                AddUserRequest {
                    cloud_folder_name: Some(FOLDER.into()),
                    sharing_group_id,
                    sharing_group_name: Some("Mine".into()),
                },
            )
            .unwrap();
        let caller = self
            .service
            .authenticate(&identity, DeviceId::new())
            .unwrap();
        (caller, sharing_group_id)
    }

    pub async fn upload(
        &self,
        caller: &Caller,
        sharing_group_id: SharingGroupId,
        file_id: FileId,
        file_version: i64,
        master_version: i64,
        data: &[u8],
    ) -> UploadFileResponse {
        self.service
            .upload_file(
                caller,
                upload_request(sharing_group_id, file_id, file_version, master_version, data),
                data.to_vec(),
            )
            .await
            .unwrap()
    }

    pub async fn done(
        &self,
        caller: &Caller,
        sharing_group_id: SharingGroupId,
        master_version: i64,
    ) -> DoneUploadsResponse {
        self.service
            .done_uploads(
                caller,
                DoneUploadsRequest {
                    master_version,
                    sharing_group_id,
                    sharing_group_name: None,
                },
            )
            .await
            .unwrap()
    }

    pub fn master_version(&self, sharing_group_id: SharingGroupId) -> i64 {
        self.service
            .database()
            .read(|repos| repos.master_versions().read(&sharing_group_id))
            .unwrap()
    }

    pub fn has_blob(&self, file_id: FileId, device_id: DeviceId, version: i64) -> bool {
        self.storage
            .contains(Some(FOLDER), &cloud_file_name(&file_id, &device_id, version))
    }
}

pub fn google_identity(creds_id: &str) -> AccountIdentity {
    AccountIdentity::new(AccountType::Google, creds_id)
        .with_credentials(CloudCredentials::new(format!("token-{creds_id}")))
}

/// Same user on another device.
pub fn on_new_device(caller: &Caller) -> Caller {
    Caller {
        device_id: DeviceId::new(),
        ..caller.clone()
    }
}

pub fn upload_request(
    sharing_group_id: SharingGroupId,
    file_id: FileId,
    file_version: i64,
    master_version: i64,
    data: &[u8],
) -> UploadFileRequest {
    UploadFileRequest {
        file_id,
        mime_type: Some("text/plain".into()),
        file_version,
        master_version,
        sharing_group_id,
        check_sum: checksum::md5_hex(data),
        app_meta_data: None,
        undelete_server_file: false,
        file_group_id: None,
    }
}
