//! Server configuration.

use crate::error::{ServerError, ServerResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use syncserver_cloud::CloudConfig;

/// Configuration for the sync server.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// SQLite database file.
    pub database_path: PathBuf,

    /// How long a Done Uploads commit may hold a sharing-group lock (seconds).
    pub lock_duration_secs: i64,

    /// How long a sharing invitation stays redeemable (seconds).
    pub invitation_lifetime_secs: i64,

    /// Upper bound on `numberOfAcceptors` for one invitation.
    pub max_invitation_acceptors: i64,

    /// Period of the stale-lock / expired-invitation sweep (seconds).
    pub janitor_interval_secs: u64,

    /// Provider endpoints and credential timing.
    pub cloud: CloudConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("syncserver.db"),
            lock_duration_secs: 60,
            invitation_lifetime_secs: 24 * 60 * 60, // 24 hours
            max_invitation_acceptors: 10,
            janitor_interval_secs: 60,
            cloud: CloudConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Reads a JSON config file. Missing fields take their defaults.
    pub fn load(path: &Path) -> ServerResult<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ServerError::Config(format!("reading {}: {e}", path.display())))?;
        let config: Self = serde_json::from_str(&raw)
            .map_err(|e| ServerError::Config(format!("parsing {}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ServerResult<()> {
        if self.lock_duration_secs <= 0 {
            return Err(ServerError::Config("lock_duration_secs must be positive".into()));
        }
        if self.invitation_lifetime_secs <= 0 {
            return Err(ServerError::Config(
                "invitation_lifetime_secs must be positive".into(),
            ));
        }
        if self.max_invitation_acceptors < 1 {
            return Err(ServerError::Config(
                "max_invitation_acceptors must be at least 1".into(),
            ));
        }
        if self.janitor_interval_secs == 0 {
            return Err(ServerError::Config("janitor_interval_secs must be positive".into()));
        }
        self.cloud
            .validate()
            .map_err(|e| ServerError::Config(e.to_string()))
    }

    pub fn lock_duration(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.lock_duration_secs)
    }

    pub fn invitation_lifetime(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.invitation_lifetime_secs)
    }

    pub fn janitor_interval(&self) -> Duration {
        Duration::from_secs(self.janitor_interval_secs)
    }
}
