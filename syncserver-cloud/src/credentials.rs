//! Per-user provider credential cache with time-based eviction.
//!
//! Tokens are refreshed through an injected [`CredentialSource`] shortly
//! before they expire; the OAuth exchange itself lives outside this crate.

use crate::error::CloudResult;
use crate::types::CloudCredentials;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use syncserver_types::{CloudStorageType, UserId};
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Exchanges stale credentials for fresh ones.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    async fn refresh(
        &self,
        storage_type: CloudStorageType,
        creds: &CloudCredentials,
    ) -> CloudResult<CloudCredentials>;
}

/// Source that never refreshes: hands back what it was given.
pub struct StaticCredentialSource;

#[async_trait]
impl CredentialSource for StaticCredentialSource {
    async fn refresh(
        &self,
        _storage_type: CloudStorageType,
        creds: &CloudCredentials,
    ) -> CloudResult<CloudCredentials> {
        Ok(creds.clone())
    }
}

/// Credentials ready for use, and whether they differ from the stored copy.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedCredentials {
    pub credentials: CloudCredentials,
    pub refreshed: bool,
}

#[derive(Clone)]
struct CachedEntry {
    credentials: CloudCredentials,
    cached_at: DateTime<Utc>,
}

/// Cache of provider credentials keyed by user.
#[derive(Clone)]
pub struct CredentialsCache {
    source: Arc<dyn CredentialSource>,
    entries: Arc<RwLock<HashMap<UserId, CachedEntry>>>,
    ttl: Duration,
    refresh_margin_secs: i64,
}

impl CredentialsCache {
    pub fn new(source: Arc<dyn CredentialSource>, ttl_secs: i64, refresh_margin_secs: i64) -> Self {
        Self {
            source,
            entries: Arc::new(RwLock::new(HashMap::new())),
            ttl: Duration::seconds(ttl_secs),
            refresh_margin_secs,
        }
    }

    fn is_usable(&self, entry: &CachedEntry, now: DateTime<Utc>) -> bool {
        now - entry.cached_at < self.ttl
            && !entry.credentials.expires_within_secs(self.refresh_margin_secs)
    }

    /// Credentials for `user_id`, starting from `stored` on a cache miss.
    pub async fn get(
        &self,
        user_id: UserId,
        storage_type: CloudStorageType,
        stored: &CloudCredentials,
    ) -> CloudResult<ResolvedCredentials> {
        // Fast path: cached and not close to expiry
        {
            let entries = self.entries.read().await;
            if let Some(entry) = entries.get(&user_id) {
                if self.is_usable(entry, Utc::now()) {
                    return Ok(ResolvedCredentials {
                        credentials: entry.credentials.clone(),
                        refreshed: false,
                    });
                }
                debug!("cached credentials for user {user_id} are stale");
            }
        }

        // Slow path: refresh if the stored token is about to lapse
        let (credentials, refreshed) = if stored.expires_within_secs(self.refresh_margin_secs)
            && stored.refresh_token.is_some()
        {
            let fresh = self
                .source
                .refresh(storage_type, stored)
                .await
                .map_err(|e| {
                    warn!("credential refresh for user {user_id} failed: {e}");
                    e
                })?;
            debug!("refreshed {storage_type} credentials for user {user_id}");
            let changed = fresh != *stored;
            (fresh, changed)
        } else {
            (stored.clone(), false)
        };

        let mut entries = self.entries.write().await;
        entries.insert(
            user_id,
            CachedEntry {
                credentials: credentials.clone(),
                cached_at: Utc::now(),
            },
        );

        Ok(ResolvedCredentials {
            credentials,
            refreshed,
        })
    }

    /// Drops a user's entry, e.g. after the provider rejected the token.
    pub async fn invalidate(&self, user_id: UserId) {
        self.entries.write().await.remove(&user_id);
    }

    /// Removes entries older than the TTL. Returns how many were evicted.
    pub async fn evict_expired(&self) -> usize {
        let now = Utc::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| now - entry.cached_at < self.ttl);
        before - entries.len()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}
