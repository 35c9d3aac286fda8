//! Background maintenance on a fixed interval.

use crate::error::{ServerError, ServerResult};
use crate::service::SyncService;
use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// What one janitor pass cleaned up.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct JanitorReport {
    pub stale_locks: usize,
    pub expired_invitations: usize,
    pub evicted_credentials: usize,
}

impl JanitorReport {
    pub fn is_empty(&self) -> bool {
        self.stale_locks == 0 && self.expired_invitations == 0 && self.evicted_credentials == 0
    }
}

impl SyncService {
    /// Sweeps stale sharing-group locks, expired invitations and aged
    /// credential cache entries.
    pub async fn run_janitor_once(&self) -> ServerResult<JanitorReport> {
        let now = Utc::now();
        let (stale_locks, expired_invitations) = self.database.transaction(|repos| {
            Ok::<_, ServerError>((
                repos.locks().sweep_stale(None, now)?,
                repos.invitations().remove_expired(now)?,
            ))
        })?;
        let evicted_credentials = self.credentials.evict_expired().await;
        Ok(JanitorReport {
            stale_locks,
            expired_invitations,
            evicted_credentials,
        })
    }
}

/// Runs the janitor every `janitor_interval_secs` until `shutdown` turns
/// true or its sender is dropped.
pub fn spawn_janitor(service: SyncService, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(service.config().janitor_interval());
        // Skip first immediate tick
        ticker.tick().await;
        info!("janitor started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match service.run_janitor_once().await {
                        Ok(report) if report.is_empty() => debug!("janitor: nothing to clean"),
                        Ok(report) => info!(
                            "janitor removed {} stale lock(s), {} expired invitation(s), \
                             {} cached credential(s)",
                            report.stale_locks,
                            report.expired_invitations,
                            report.evicted_credentials
                        ),
                        Err(e) => warn!("janitor pass failed: {e}"),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("janitor stopped");
    })
}
