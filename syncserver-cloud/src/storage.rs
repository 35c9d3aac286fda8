//! The provider-neutral storage contract.

use crate::error::CloudResult;
use crate::types::{CloudCredentials, CloudFileOptions, DownloadedFile, UploadOutcome};
use async_trait::async_trait;
use syncserver_types::CloudStorageType;

/// One remote blob store. Each call is a self-contained request that the
/// caller may retry.
#[async_trait]
pub trait CloudStorage: Send + Sync {
    /// Which checksum algorithm and account kind this connector serves.
    fn storage_type(&self) -> CloudStorageType;

    /// Writes `data` under `name`. Never overwrites an existing blob.
    async fn upload_file(
        &self,
        creds: &CloudCredentials,
        name: &str,
        data: Vec<u8>,
        options: &CloudFileOptions,
    ) -> CloudResult<UploadOutcome>;

    async fn download_file(
        &self,
        creds: &CloudCredentials,
        name: &str,
        options: &CloudFileOptions,
    ) -> CloudResult<DownloadedFile>;

    /// Removes `name`. A missing blob yields `CloudError::FileNotFound`.
    async fn delete_file(
        &self,
        creds: &CloudCredentials,
        name: &str,
        options: &CloudFileOptions,
    ) -> CloudResult<()>;

    async fn lookup_file(
        &self,
        creds: &CloudCredentials,
        name: &str,
        options: &CloudFileOptions,
    ) -> CloudResult<bool>;
}
