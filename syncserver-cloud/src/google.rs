//! Google Drive connector.
//!
//! Files live inside a folder named after the user's `cloudFolderName`,
//! created on first upload. Drive addresses files by id, so every
//! operation starts with a name search.

use crate::checksum;
use crate::config::CloudConfig;
use crate::error::{CloudError, CloudResult};
use crate::http::{build_client, response_error};
use crate::storage::CloudStorage;
use crate::types::{CloudCredentials, CloudFileOptions, DownloadedFile, UploadOutcome};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use syncserver_types::CloudStorageType;
use tracing::debug;

const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";
const MULTIPART_BOUNDARY: &str = "syncserver-multipart-boundary";

#[derive(Debug, Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveFile {
    id: String,
    #[serde(default)]
    md5_checksum: Option<String>,
}

/// Google Drive v3 REST client.
pub struct GoogleDrive {
    client: Client,
    api_base_url: String,
    upload_base_url: String,
}

/// Drive query strings quote names with single quotes.
fn escape_query_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Query used to find `name` inside `parent_id` (or anywhere, for folders).
pub fn search_query(name: &str, parent_id: Option<&str>, mime_type: Option<&str>) -> String {
    let mut query = format!("name = '{}' and trashed = false", escape_query_value(name));
    if let Some(parent) = parent_id {
        query.push_str(&format!(" and '{}' in parents", escape_query_value(parent)));
    }
    if let Some(mime) = mime_type {
        query.push_str(&format!(" and mimeType = '{}'", escape_query_value(mime)));
    }
    query
}

impl GoogleDrive {
    pub fn new(config: &CloudConfig) -> CloudResult<Self> {
        Ok(Self {
            client: build_client(config)?,
            api_base_url: config.google_api_base_url.trim_end_matches('/').to_string(),
            upload_base_url: config.google_upload_base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn search(
        &self,
        creds: &CloudCredentials,
        query: &str,
    ) -> CloudResult<Option<DriveFile>> {
        let resp = self
            .client
            .get(format!("{}/drive/v3/files", self.api_base_url))
            .bearer_auth(&creds.access_token)
            .query(&[("q", query), ("fields", "files(id,md5Checksum)")])
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(response_error(resp, "drive search").await);
        }
        let list: FileList = resp.json().await?;
        Ok(list.files.into_iter().next())
    }

    async fn find_folder(
        &self,
        creds: &CloudCredentials,
        folder_name: &str,
    ) -> CloudResult<Option<String>> {
        let query = search_query(folder_name, None, Some(FOLDER_MIME_TYPE));
        Ok(self.search(creds, &query).await?.map(|f| f.id))
    }

    async fn create_folder(
        &self,
        creds: &CloudCredentials,
        folder_name: &str,
    ) -> CloudResult<String> {
        let resp = self
            .client
            .post(format!("{}/drive/v3/files", self.api_base_url))
            .bearer_auth(&creds.access_token)
            .json(&serde_json::json!({ "name": folder_name, "mimeType": FOLDER_MIME_TYPE }))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(response_error(resp, "drive create folder").await);
        }
        let folder: DriveFile = resp.json().await?;
        debug!("created drive folder {folder_name} ({})", folder.id);
        Ok(folder.id)
    }

    /// Resolves the parent folder id. `Ok(None)` means "root" when the
    /// options name no folder, and "missing" otherwise.
    async fn parent_id(
        &self,
        creds: &CloudCredentials,
        options: &CloudFileOptions,
        create_if_missing: bool,
    ) -> CloudResult<Option<String>> {
        let Some(folder_name) = options.cloud_folder_name.as_deref() else {
            return Ok(None);
        };
        match self.find_folder(creds, folder_name).await? {
            Some(id) => Ok(Some(id)),
            None if create_if_missing => Ok(Some(self.create_folder(creds, folder_name).await?)),
            None => Err(CloudError::FileNotFound(folder_name.to_string())),
        }
    }

    async fn find_file(
        &self,
        creds: &CloudCredentials,
        name: &str,
        options: &CloudFileOptions,
    ) -> CloudResult<DriveFile> {
        let parent = match self.parent_id(creds, options, false).await {
            Ok(parent) => parent,
            Err(CloudError::FileNotFound(_)) => {
                return Err(CloudError::FileNotFound(name.to_string()));
            }
            Err(e) => return Err(e),
        };
        let query = search_query(name, parent.as_deref(), None);
        self.search(creds, &query)
            .await?
            .ok_or_else(|| CloudError::FileNotFound(name.to_string()))
    }
}

/// Body for a `multipart/related` upload: JSON metadata, then the content.
fn multipart_body(metadata: &serde_json::Value, mime_type: &str, data: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(data.len() + 512);
    body.extend_from_slice(
        format!(
            "--{MULTIPART_BOUNDARY}\r\n\
             Content-Type: application/json; charset=UTF-8\r\n\r\n\
             {metadata}\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(
        format!("--{MULTIPART_BOUNDARY}\r\nContent-Type: {mime_type}\r\n\r\n").as_bytes(),
    );
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{MULTIPART_BOUNDARY}--\r\n").as_bytes());
    body
}

#[async_trait]
impl CloudStorage for GoogleDrive {
    fn storage_type(&self) -> CloudStorageType {
        CloudStorageType::Google
    }

    async fn upload_file(
        &self,
        creds: &CloudCredentials,
        name: &str,
        data: Vec<u8>,
        options: &CloudFileOptions,
    ) -> CloudResult<UploadOutcome> {
        let parent = self.parent_id(creds, options, true).await?;
        let existing = self
            .search(creds, &search_query(name, parent.as_deref(), None))
            .await?;
        if existing.is_some() {
            debug!("drive file {name} already present");
            return Ok(UploadOutcome::AlreadyUploaded);
        }

        let mut metadata = serde_json::json!({ "name": name, "mimeType": options.mime_type });
        if let Some(parent) = parent {
            metadata["parents"] = serde_json::json!([parent]);
        }
        let size = data.len();
        let body = multipart_body(&metadata, &options.mime_type, &data);

        let resp = self
            .client
            .post(format!("{}/upload/drive/v3/files", self.upload_base_url))
            .bearer_auth(&creds.access_token)
            .query(&[("uploadType", "multipart"), ("fields", "id,md5Checksum")])
            .header(
                reqwest::header::CONTENT_TYPE,
                format!("multipart/related; boundary={MULTIPART_BOUNDARY}"),
            )
            .body(body)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(response_error(resp, "drive upload").await);
        }

        let file: DriveFile = resp.json().await?;
        let checksum = file.md5_checksum.ok_or_else(|| {
            CloudError::Failure("drive upload response missing md5Checksum".into())
        })?;
        debug!("uploaded {size} bytes to drive as {name}");
        Ok(UploadOutcome::Uploaded { checksum })
    }

    async fn download_file(
        &self,
        creds: &CloudCredentials,
        name: &str,
        options: &CloudFileOptions,
    ) -> CloudResult<DownloadedFile> {
        let file = self.find_file(creds, name, options).await?;
        let resp = self
            .client
            .get(format!("{}/drive/v3/files/{}", self.api_base_url, file.id))
            .bearer_auth(&creds.access_token)
            .query(&[("alt", "media")])
            .send()
            .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Err(CloudError::FileNotFound(name.to_string()));
        }
        if !resp.status().is_success() {
            return Err(response_error(resp, "drive download").await);
        }
        let data = resp.bytes().await?.to_vec();
        let checksum = file.md5_checksum.unwrap_or_else(|| checksum::md5_hex(&data));
        Ok(DownloadedFile { data, checksum })
    }

    async fn delete_file(
        &self,
        creds: &CloudCredentials,
        name: &str,
        options: &CloudFileOptions,
    ) -> CloudResult<()> {
        let file = self.find_file(creds, name, options).await?;
        let resp = self
            .client
            .delete(format!("{}/drive/v3/files/{}", self.api_base_url, file.id))
            .bearer_auth(&creds.access_token)
            .send()
            .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Err(CloudError::FileNotFound(name.to_string()));
        }
        if !resp.status().is_success() {
            return Err(response_error(resp, "drive delete").await);
        }
        debug!("deleted drive file {name}");
        Ok(())
    }

    async fn lookup_file(
        &self,
        creds: &CloudCredentials,
        name: &str,
        options: &CloudFileOptions,
    ) -> CloudResult<bool> {
        match self.find_file(creds, name, options).await {
            Ok(_) => Ok(true),
            Err(CloudError::FileNotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}
