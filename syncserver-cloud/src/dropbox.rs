//! Dropbox connector.

use crate::checksum;
use crate::config::CloudConfig;
use crate::error::{CloudError, CloudResult};
use crate::http::{build_client, response_error};
use crate::storage::CloudStorage;
use crate::types::{CloudCredentials, CloudFileOptions, DownloadedFile, UploadOutcome};
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use syncserver_types::CloudStorageType;
use tracing::debug;

const API_ARG_HEADER: &str = "Dropbox-API-Arg";
const API_RESULT_HEADER: &str = "Dropbox-API-Result";

#[derive(Debug, Deserialize)]
struct FileMetadata {
    #[serde(default)]
    content_hash: Option<String>,
}

/// Dropbox v2 HTTP client.
pub struct Dropbox {
    client: Client,
    api_base_url: String,
    content_base_url: String,
}

/// `/{folder}/{name}`, or `/{name}` without a folder.
pub fn dropbox_path(name: &str, options: &CloudFileOptions) -> String {
    match options.cloud_folder_name.as_deref() {
        Some(folder) => format!("/{folder}/{name}"),
        None => format!("/{name}"),
    }
}

/// Dropbox reports a missing path as 409 with a nested `not_found` tag,
/// under `path` or `path_lookup` depending on the endpoint.
fn is_not_found_body(body: &serde_json::Value) -> bool {
    let error = &body["error"];
    ["path", "path_lookup"]
        .iter()
        .any(|key| error[*key][".tag"] == "not_found")
}

async fn classify(resp: Response, path: &str, context: &str) -> CloudError {
    if resp.status() == StatusCode::CONFLICT {
        let text = resp.text().await.unwrap_or_default();
        let body: serde_json::Value = serde_json::from_str(&text).unwrap_or_default();
        if is_not_found_body(&body) {
            return CloudError::FileNotFound(path.to_string());
        }
        return CloudError::Failure(format!("{context}: HTTP 409: {text}"));
    }
    response_error(resp, context).await
}

impl Dropbox {
    pub fn new(config: &CloudConfig) -> CloudResult<Self> {
        Ok(Self {
            client: build_client(config)?,
            api_base_url: config.dropbox_api_base_url.trim_end_matches('/').to_string(),
            content_base_url: config.dropbox_content_base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get_metadata(
        &self,
        creds: &CloudCredentials,
        path: &str,
    ) -> CloudResult<FileMetadata> {
        let resp = self
            .client
            .post(format!("{}/2/files/get_metadata", self.api_base_url))
            .bearer_auth(&creds.access_token)
            .json(&serde_json::json!({ "path": path }))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(classify(resp, path, "dropbox get_metadata").await);
        }
        Ok(resp.json().await?)
    }
}

#[async_trait]
impl CloudStorage for Dropbox {
    fn storage_type(&self) -> CloudStorageType {
        CloudStorageType::Dropbox
    }

    async fn upload_file(
        &self,
        creds: &CloudCredentials,
        name: &str,
        data: Vec<u8>,
        options: &CloudFileOptions,
    ) -> CloudResult<UploadOutcome> {
        let path = dropbox_path(name, options);
        if self.lookup_file(creds, name, options).await? {
            debug!("dropbox file {path} already present");
            return Ok(UploadOutcome::AlreadyUploaded);
        }

        let arg = serde_json::json!({
            "path": path,
            "mode": "add",
            "autorename": false,
            "mute": true,
        });
        let size = data.len();
        let resp = self
            .client
            .post(format!("{}/2/files/upload", self.content_base_url))
            .bearer_auth(&creds.access_token)
            .header(API_ARG_HEADER, arg.to_string())
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(data)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(classify(resp, &path, "dropbox upload").await);
        }

        let metadata: FileMetadata = resp.json().await?;
        let checksum = metadata.content_hash.ok_or_else(|| {
            CloudError::Failure("dropbox upload response missing content_hash".into())
        })?;
        debug!("uploaded {size} bytes to dropbox at {path}");
        Ok(UploadOutcome::Uploaded { checksum })
    }

    async fn download_file(
        &self,
        creds: &CloudCredentials,
        name: &str,
        options: &CloudFileOptions,
    ) -> CloudResult<DownloadedFile> {
        let path = dropbox_path(name, options);
        let resp = self
            .client
            .post(format!("{}/2/files/download", self.content_base_url))
            .bearer_auth(&creds.access_token)
            .header(API_ARG_HEADER, serde_json::json!({ "path": path }).to_string())
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(classify(resp, &path, "dropbox download").await);
        }

        let header_hash = resp
            .headers()
            .get(API_RESULT_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| serde_json::from_str::<FileMetadata>(v).ok())
            .and_then(|m| m.content_hash);
        let data = resp.bytes().await?.to_vec();
        let checksum = header_hash.unwrap_or_else(|| checksum::dropbox_content_hash(&data));
        Ok(DownloadedFile { data, checksum })
    }

    async fn delete_file(
        &self,
        creds: &CloudCredentials,
        name: &str,
        options: &CloudFileOptions,
    ) -> CloudResult<()> {
        let path = dropbox_path(name, options);
        let resp = self
            .client
            .post(format!("{}/2/files/delete_v2", self.api_base_url))
            .bearer_auth(&creds.access_token)
            .json(&serde_json::json!({ "path": path }))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(classify(resp, &path, "dropbox delete").await);
        }
        debug!("deleted dropbox file {path}");
        Ok(())
    }

    async fn lookup_file(
        &self,
        creds: &CloudCredentials,
        name: &str,
        options: &CloudFileOptions,
    ) -> CloudResult<bool> {
        let path = dropbox_path(name, options);
        match self.get_metadata(creds, &path).await {
            Ok(_) => Ok(true),
            Err(CloudError::FileNotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}
