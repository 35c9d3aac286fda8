//! Microsoft OneDrive connector (Graph API).
//!
//! Items are addressed by path under the app folder. Small payloads go up
//! in one PUT; larger ones through an upload session, one block per PUT.

use crate::checksum;
use crate::config::CloudConfig;
use crate::error::{CloudError, CloudResult};
use crate::http::{build_client, response_error};
use crate::storage::CloudStorage;
use crate::types::{CloudCredentials, CloudFileOptions, DownloadedFile, UploadOutcome};
use crate::upload_state::{ONEDRIVE_BLOCK_MULTIPLE, UploadState};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use syncserver_types::CloudStorageType;
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
struct DriveItem {
    #[serde(default)]
    file: Option<FileFacet>,
}

#[derive(Debug, Deserialize)]
struct FileFacet {
    #[serde(default)]
    hashes: Option<Hashes>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Hashes {
    #[serde(default)]
    sha1_hash: Option<String>,
}

impl DriveItem {
    fn sha1(self) -> Option<String> {
        self.file?.hashes?.sha1_hash
    }
}

/// An open Graph upload session.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadSession {
    pub upload_url: String,
    #[serde(default)]
    pub expiration_date_time: Option<String>,
}

/// Result of sending one block of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockResult {
    /// Graph accepted the block and expects more.
    Continue,
    /// The final block landed; carries the item's SHA-1.
    Complete { checksum: String },
}

/// OneDrive client over Microsoft Graph.
pub struct OneDrive {
    client: Client,
    graph_base_url: String,
    block_size: usize,
    simple_upload_limit: usize,
}

impl OneDrive {
    pub fn new(config: &CloudConfig) -> CloudResult<Self> {
        if config.onedrive_block_size == 0
            || config.onedrive_block_size % ONEDRIVE_BLOCK_MULTIPLE != 0
        {
            return Err(CloudError::Config(format!(
                "onedrive block size {} is not a multiple of {ONEDRIVE_BLOCK_MULTIPLE}",
                config.onedrive_block_size
            )));
        }
        Ok(Self {
            client: build_client(config)?,
            graph_base_url: config.microsoft_graph_base_url.trim_end_matches('/').to_string(),
            block_size: config.onedrive_block_size,
            simple_upload_limit: config.onedrive_simple_upload_limit,
        })
    }

    /// `.../me/drive/special/approot:/{folder}/{name}`
    fn item_url(&self, name: &str, options: &CloudFileOptions) -> String {
        let base = &self.graph_base_url;
        match options.cloud_folder_name.as_deref() {
            Some(folder) => format!("{base}/me/drive/special/approot:/{folder}/{name}"),
            None => format!("{base}/me/drive/special/approot:/{name}"),
        }
    }

    async fn get_item(
        &self,
        creds: &CloudCredentials,
        name: &str,
        options: &CloudFileOptions,
    ) -> CloudResult<DriveItem> {
        let resp = self
            .client
            .get(self.item_url(name, options))
            .bearer_auth(&creds.access_token)
            .send()
            .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Err(CloudError::FileNotFound(name.to_string()));
        }
        if !resp.status().is_success() {
            return Err(response_error(resp, "onedrive get item").await);
        }
        Ok(resp.json().await?)
    }

    async fn upload_simple(
        &self,
        creds: &CloudCredentials,
        name: &str,
        data: Vec<u8>,
        options: &CloudFileOptions,
    ) -> CloudResult<UploadOutcome> {
        let resp = self
            .client
            .put(format!("{}:/content", self.item_url(name, options)))
            .bearer_auth(&creds.access_token)
            .query(&[("@microsoft.graph.conflictBehavior", "fail")])
            .header(reqwest::header::CONTENT_TYPE, options.mime_type.as_str())
            .body(data)
            .send()
            .await?;
        if resp.status() == StatusCode::CONFLICT {
            return Ok(UploadOutcome::AlreadyUploaded);
        }
        if !resp.status().is_success() {
            return Err(response_error(resp, "onedrive upload").await);
        }
        let item: DriveItem = resp.json().await?;
        let checksum = item.sha1().ok_or_else(|| {
            CloudError::Failure("onedrive upload response missing sha1Hash".into())
        })?;
        Ok(UploadOutcome::Uploaded { checksum })
    }

    /// Opens an upload session that fails if `name` already exists.
    pub async fn create_upload_session(
        &self,
        creds: &CloudCredentials,
        name: &str,
        options: &CloudFileOptions,
    ) -> CloudResult<Option<UploadSession>> {
        let resp = self
            .client
            .post(format!("{}:/createUploadSession", self.item_url(name, options)))
            .bearer_auth(&creds.access_token)
            .json(&serde_json::json!({
                "item": { "@microsoft.graph.conflictBehavior": "fail" }
            }))
            .send()
            .await?;
        if resp.status() == StatusCode::CONFLICT {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(response_error(resp, "onedrive create session").await);
        }
        Ok(Some(resp.json().await?))
    }

    /// Sends the block `state` currently points at.
    pub async fn upload_block(
        &self,
        session: &UploadSession,
        state: &UploadState,
    ) -> CloudResult<BlockResult> {
        let resp = self
            .client
            .put(&session.upload_url)
            .header(reqwest::header::CONTENT_RANGE, state.content_range())
            .body(state.current_block_data().to_vec())
            .send()
            .await?;
        match resp.status() {
            StatusCode::ACCEPTED => Ok(BlockResult::Continue),
            StatusCode::OK | StatusCode::CREATED => {
                let item: DriveItem = resp.json().await?;
                let checksum = item.sha1().ok_or_else(|| {
                    CloudError::Failure("onedrive session response missing sha1Hash".into())
                })?;
                Ok(BlockResult::Complete { checksum })
            }
            _ => Err(response_error(resp, "onedrive upload block").await),
        }
    }

    async fn upload_in_session(
        &self,
        creds: &CloudCredentials,
        name: &str,
        data: Vec<u8>,
        options: &CloudFileOptions,
    ) -> CloudResult<UploadOutcome> {
        let Some(session) = self.create_upload_session(creds, name, options).await? else {
            return Ok(UploadOutcome::AlreadyUploaded);
        };
        let mut state = UploadState::new(self.block_size, data)?;
        debug!(
            "onedrive session for {name}: {} bytes in {} blocks",
            state.total_bytes(),
            state.number_of_blocks()
        );

        loop {
            match self.upload_block(&session, &state).await? {
                BlockResult::Complete { checksum } => {
                    return Ok(UploadOutcome::Uploaded { checksum });
                }
                BlockResult::Continue => {
                    if !state.advance_to_next_block() {
                        warn!(
                            "onedrive session for {name} accepted every block without completing"
                        );
                        return Err(CloudError::Failure(format!(
                            "upload session for {name} did not complete"
                        )));
                    }
                }
            }
        }
    }
}

#[async_trait]
impl CloudStorage for OneDrive {
    fn storage_type(&self) -> CloudStorageType {
        CloudStorageType::OneDrive
    }

    async fn upload_file(
        &self,
        creds: &CloudCredentials,
        name: &str,
        data: Vec<u8>,
        options: &CloudFileOptions,
    ) -> CloudResult<UploadOutcome> {
        let size = data.len();
        let outcome = if size <= self.simple_upload_limit {
            self.upload_simple(creds, name, data, options).await?
        } else {
            self.upload_in_session(creds, name, data, options).await?
        };
        debug!("uploaded {size} bytes to onedrive as {name}");
        Ok(outcome)
    }

    async fn download_file(
        &self,
        creds: &CloudCredentials,
        name: &str,
        options: &CloudFileOptions,
    ) -> CloudResult<DownloadedFile> {
        let item = self.get_item(creds, name, options).await?;
        let resp = self
            .client
            .get(format!("{}:/content", self.item_url(name, options)))
            .bearer_auth(&creds.access_token)
            .send()
            .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Err(CloudError::FileNotFound(name.to_string()));
        }
        if !resp.status().is_success() {
            return Err(response_error(resp, "onedrive download").await);
        }
        let data = resp.bytes().await?.to_vec();
        let checksum = item.sha1().unwrap_or_else(|| checksum::sha1_hex(&data));
        Ok(DownloadedFile { data, checksum })
    }

    async fn delete_file(
        &self,
        creds: &CloudCredentials,
        name: &str,
        options: &CloudFileOptions,
    ) -> CloudResult<()> {
        let resp = self
            .client
            .delete(self.item_url(name, options))
            .bearer_auth(&creds.access_token)
            .send()
            .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Err(CloudError::FileNotFound(name.to_string()));
        }
        if !resp.status().is_success() {
            return Err(response_error(resp, "onedrive delete").await);
        }
        debug!("deleted onedrive item {name}");
        Ok(())
    }

    async fn lookup_file(
        &self,
        creds: &CloudCredentials,
        name: &str,
        options: &CloudFileOptions,
    ) -> CloudResult<bool> {
        match self.get_item(creds, name, options).await {
            Ok(_) => Ok(true),
            Err(CloudError::FileNotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}
