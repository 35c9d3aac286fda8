//! In-memory connector for tests and local development.
//!
//! Checksums follow whichever provider the mock stands in for, so server
//! code paths that compare client checksums behave as in production.

use crate::checksum;
use crate::error::{CloudError, CloudResult};
use crate::storage::CloudStorage;
use crate::types::{CloudCredentials, CloudFileOptions, DownloadedFile, UploadOutcome};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use syncserver_types::CloudStorageType;

/// Blob store held in a map keyed by `"{folder}/{name}"`.
pub struct MockStorage {
    storage_type: CloudStorageType,
    files: Mutex<HashMap<String, Vec<u8>>>,
    token_revoked: AtomicBool,
    fail_uploads: AtomicBool,
    fail_deletes: AtomicBool,
    upload_calls: AtomicUsize,
    delete_calls: AtomicUsize,
}

fn key(name: &str, options: &CloudFileOptions) -> String {
    format!("{}/{name}", options.cloud_folder_name.as_deref().unwrap_or(""))
}

impl MockStorage {
    pub fn new(storage_type: CloudStorageType) -> Self {
        Self {
            storage_type,
            files: Mutex::new(HashMap::new()),
            token_revoked: AtomicBool::new(false),
            fail_uploads: AtomicBool::new(false),
            fail_deletes: AtomicBool::new(false),
            upload_calls: AtomicUsize::new(0),
            delete_calls: AtomicUsize::new(0),
        }
    }

    fn files(&self) -> MutexGuard<'_, HashMap<String, Vec<u8>>> {
        self.files.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_token(&self) -> CloudResult<()> {
        if self.token_revoked.load(Ordering::SeqCst) {
            return Err(CloudError::AccessTokenRevokedOrExpired);
        }
        Ok(())
    }

    /// Every subsequent call answers `AccessTokenRevokedOrExpired`.
    pub fn set_token_revoked(&self, revoked: bool) {
        self.token_revoked.store(revoked, Ordering::SeqCst);
    }

    pub fn set_fail_uploads(&self, fail: bool) {
        self.fail_uploads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    /// Number of upload calls that reached the store, whatever their outcome.
    pub fn upload_calls(&self) -> usize {
        self.upload_calls.load(Ordering::SeqCst)
    }

    pub fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }

    pub fn contains(&self, folder: Option<&str>, name: &str) -> bool {
        self.files()
            .contains_key(&format!("{}/{name}", folder.unwrap_or("")))
    }

    pub fn file_count(&self) -> usize {
        self.files().len()
    }

    /// Overwrites a stored blob behind the server's back.
    pub fn replace_contents(&self, folder: Option<&str>, name: &str, data: Vec<u8>) {
        self.files()
            .insert(format!("{}/{name}", folder.unwrap_or("")), data);
    }

    pub fn remove(&self, folder: Option<&str>, name: &str) -> bool {
        self.files()
            .remove(&format!("{}/{name}", folder.unwrap_or("")))
            .is_some()
    }
}

#[async_trait]
impl CloudStorage for MockStorage {
    fn storage_type(&self) -> CloudStorageType {
        self.storage_type
    }

    async fn upload_file(
        &self,
        _creds: &CloudCredentials,
        name: &str,
        data: Vec<u8>,
        options: &CloudFileOptions,
    ) -> CloudResult<UploadOutcome> {
        self.upload_calls.fetch_add(1, Ordering::SeqCst);
        self.check_token()?;
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(CloudError::Failure("injected upload failure".into()));
        }

        let mut files = self.files();
        let key = key(name, options);
        if files.contains_key(&key) {
            return Ok(UploadOutcome::AlreadyUploaded);
        }
        let checksum = checksum::compute(self.storage_type, &data);
        files.insert(key, data);
        Ok(UploadOutcome::Uploaded { checksum })
    }

    async fn download_file(
        &self,
        _creds: &CloudCredentials,
        name: &str,
        options: &CloudFileOptions,
    ) -> CloudResult<DownloadedFile> {
        self.check_token()?;
        let data = self
            .files()
            .get(&key(name, options))
            .cloned()
            .ok_or_else(|| CloudError::FileNotFound(name.to_string()))?;
        let checksum = checksum::compute(self.storage_type, &data);
        Ok(DownloadedFile { data, checksum })
    }

    async fn delete_file(
        &self,
        _creds: &CloudCredentials,
        name: &str,
        options: &CloudFileOptions,
    ) -> CloudResult<()> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        self.check_token()?;
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(CloudError::Failure("injected delete failure".into()));
        }
        match self.files().remove(&key(name, options)) {
            Some(_) => Ok(()),
            None => Err(CloudError::FileNotFound(name.to_string())),
        }
    }

    async fn lookup_file(
        &self,
        _creds: &CloudCredentials,
        name: &str,
        options: &CloudFileOptions,
    ) -> CloudResult<bool> {
        self.check_token()?;
        Ok(self.files().contains_key(&key(name, options)))
    }
}
