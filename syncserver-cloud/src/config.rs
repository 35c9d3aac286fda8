//! Cloud connector configuration.

use crate::error::{CloudError, CloudResult};
use crate::upload_state::ONEDRIVE_BLOCK_MULTIPLE;
use serde::{Deserialize, Serialize};

/// Endpoints, limits and credential timing for the provider connectors.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CloudConfig {
    /// Google Drive metadata API (e.g., "https://www.googleapis.com").
    pub google_api_base_url: String,

    /// Google Drive upload API host.
    pub google_upload_base_url: String,

    /// Dropbox RPC endpoint host.
    pub dropbox_api_base_url: String,

    /// Dropbox content (upload/download) endpoint host.
    pub dropbox_content_base_url: String,

    /// Microsoft Graph base, including the API version segment.
    pub microsoft_graph_base_url: String,

    /// Per-request HTTP timeout in seconds.
    pub request_timeout_secs: u64,

    /// Block size for OneDrive upload sessions. Must be a multiple of 320 KiB.
    pub onedrive_block_size: usize,

    /// Payloads up to this size go to OneDrive in a single PUT.
    pub onedrive_simple_upload_limit: usize,

    /// Refresh cached provider credentials this many seconds before expiry.
    pub credential_refresh_margin_secs: i64,

    /// Evict cached provider credentials after this many seconds.
    pub credential_cache_ttl_secs: i64,
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            google_api_base_url: "https://www.googleapis.com".to_string(),
            google_upload_base_url: "https://www.googleapis.com".to_string(),
            dropbox_api_base_url: "https://api.dropboxapi.com".to_string(),
            dropbox_content_base_url: "https://content.dropboxapi.com".to_string(),
            microsoft_graph_base_url: "https://graph.microsoft.com/v1.0".to_string(),
            request_timeout_secs: 60,
            onedrive_block_size: 4 * ONEDRIVE_BLOCK_MULTIPLE, // 1.25 MiB
            onedrive_simple_upload_limit: 4 * 1024 * 1024,    // Graph's single-PUT ceiling
            credential_refresh_margin_secs: 300,              // 5 minutes before expiry
            credential_cache_ttl_secs: 3600,
        }
    }
}

impl CloudConfig {
    /// Points every provider at one base URL. Used against local mock servers.
    pub fn with_base_url(base_url: &str) -> Self {
        Self {
            google_api_base_url: base_url.to_string(),
            google_upload_base_url: base_url.to_string(),
            dropbox_api_base_url: base_url.to_string(),
            dropbox_content_base_url: base_url.to_string(),
            microsoft_graph_base_url: base_url.to_string(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> CloudResult<()> {
        if self.onedrive_block_size == 0
            || self.onedrive_block_size % ONEDRIVE_BLOCK_MULTIPLE != 0
        {
            return Err(CloudError::Config(format!(
                "onedrive_block_size must be a non-zero multiple of \
                 {ONEDRIVE_BLOCK_MULTIPLE}, got {}",
                self.onedrive_block_size
            )));
        }
        if self.request_timeout_secs == 0 {
            return Err(CloudError::Config("request_timeout_secs must be positive".into()));
        }
        if self.credential_cache_ttl_secs <= 0 {
            return Err(CloudError::Config("credential_cache_ttl_secs must be positive".into()));
        }
        Ok(())
    }
}
