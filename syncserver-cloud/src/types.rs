//! Data types shared by all connectors.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// OAuth material for one user's cloud storage account.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CloudCredentials {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// `None` for tokens that do not expire on a schedule (Dropbox).
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl CloudCredentials {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            expires_at: None,
        }
    }

    /// Returns true if the token expires within `secs` seconds.
    pub fn expires_within_secs(&self, secs: i64) -> bool {
        self.expires_at
            .is_some_and(|at| at - Utc::now() < Duration::seconds(secs))
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| at <= Utc::now())
    }
}

/// Where and as what a blob is stored.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloudFileOptions {
    /// Folder inside the user's storage. `None` places files at the root.
    pub cloud_folder_name: Option<String>,
    pub mime_type: String,
}

impl CloudFileOptions {
    pub fn new(cloud_folder_name: Option<String>, mime_type: impl Into<String>) -> Self {
        Self {
            cloud_folder_name,
            mime_type: mime_type.into(),
        }
    }
}

/// Successful result of an upload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UploadOutcome {
    /// Blob written; provider-computed checksum.
    Uploaded { checksum: String },
    /// A blob with that name already existed; nothing was written.
    AlreadyUploaded,
}

/// Blob contents plus the provider's checksum for them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DownloadedFile {
    pub data: Vec<u8>,
    pub checksum: String,
}
