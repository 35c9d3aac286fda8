//! The sync service: shared state plus the helpers every endpoint uses.
//!
//! Endpoints live in sibling modules as further `impl SyncService` blocks.

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use std::sync::Arc;
use syncserver_cloud::{
    CloudCredentials, CloudFileOptions, CloudStorage, CloudStorageRegistry, CredentialSource,
    CredentialsCache,
};
use syncserver_storage::{Database, SharingGroupUser, User};
use syncserver_types::{
    AccountType, CloudStorageType, DeviceId, MasterVersion, Permission, SharingGroupId, UserId,
};
use tracing::{debug, info, warn};

/// Who is signing in, as established by the provider's token check.
#[derive(Clone, Debug, PartialEq)]
pub struct AccountIdentity {
    pub account_type: AccountType,
    /// Provider-side account id.
    pub creds_id: String,
    pub username: Option<String>,
    /// Present for accounts that own cloud storage.
    pub credentials: Option<CloudCredentials>,
}

impl AccountIdentity {
    pub fn new(account_type: AccountType, creds_id: impl Into<String>) -> Self {
        Self {
            account_type,
            creds_id: creds_id.into(),
            username: None,
            credentials: None,
        }
    }

    pub fn with_credentials(mut self, credentials: CloudCredentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub(crate) fn creds_json(&self) -> ServerResult<Option<String>> {
        self.credentials
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| ServerError::Internal(format!("serializing credentials: {e}")))
    }
}

/// An authenticated user on a specific device.
#[derive(Clone, Debug, PartialEq)]
pub struct Caller {
    pub user: User,
    pub device_id: DeviceId,
}

impl Caller {
    pub fn user_id(&self) -> UserId {
        self.user.user_id
    }
}

/// Everything needed to talk to one user's cloud storage.
pub(crate) struct StorageAccess {
    pub user_id: UserId,
    pub storage_type: CloudStorageType,
    pub connector: Arc<dyn CloudStorage>,
    pub credentials: CloudCredentials,
    pub cloud_folder_name: Option<String>,
}

impl StorageAccess {
    pub fn options(&self, mime_type: &str) -> CloudFileOptions {
        CloudFileOptions::new(self.cloud_folder_name.clone(), mime_type)
    }
}

/// Server core shared by all endpoints. Cheap to clone.
#[derive(Clone)]
pub struct SyncService {
    pub(crate) database: Database,
    pub(crate) registry: CloudStorageRegistry,
    pub(crate) credentials: CredentialsCache,
    pub(crate) config: ServerConfig,
}

impl SyncService {
    pub fn new(
        database: Database,
        registry: CloudStorageRegistry,
        credentials: CredentialsCache,
        config: ServerConfig,
    ) -> Self {
        Self {
            database,
            registry,
            credentials,
            config,
        }
    }

    /// Opens the configured database and registers the HTTP connectors.
    pub fn from_config(
        config: ServerConfig,
        source: Arc<dyn CredentialSource>,
    ) -> ServerResult<Self> {
        config.validate()?;
        let database = Database::open(&config.database_path)?;
        let registry = CloudStorageRegistry::with_providers(&config.cloud)?;
        let credentials = CredentialsCache::new(
            source,
            config.cloud.credential_cache_ttl_secs,
            config.cloud.credential_refresh_margin_secs,
        );
        info!("sync service ready (database {})", config.database_path.display());
        Ok(Self::new(database, registry, credentials, config))
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn credentials(&self) -> &CredentialsCache {
        &self.credentials
    }

    /// Resolves a signed-in account to a known user.
    pub fn authenticate(
        &self,
        identity: &AccountIdentity,
        device_id: DeviceId,
    ) -> ServerResult<Caller> {
        let user = self
            .database
            .read(|repos| {
                repos
                    .users()
                    .find_by_account(identity.account_type, &identity.creds_id)
            })?
            .ok_or_else(|| {
                ServerError::Unauthorized(format!(
                    "no user for {} account {}",
                    identity.account_type, identity.creds_id
                ))
            })?;
        Ok(Caller { user, device_id })
    }

    /// Checks the caller belongs to a live group with at least `minimum` permission.
    pub(crate) fn authorize(
        &self,
        caller: &Caller,
        sharing_group_id: &SharingGroupId,
        minimum: Permission,
    ) -> ServerResult<SharingGroupUser> {
        let (group, membership) = self.database.read(|repos| {
            Ok::<_, ServerError>((
                repos.sharing_groups().get(sharing_group_id)?,
                repos.members().get(sharing_group_id, caller.user_id())?,
            ))
        })?;
        let group = group.ok_or_else(|| {
            ServerError::BadRequest(format!("unknown sharing group {sharing_group_id}"))
        })?;
        if group.deleted {
            return Err(ServerError::BadRequest(format!(
                "sharing group {sharing_group_id} is deleted"
            )));
        }
        let membership = membership.ok_or_else(|| {
            ServerError::Forbidden(format!(
                "user {} is not in sharing group {sharing_group_id}",
                caller.user_id()
            ))
        })?;
        if !membership.permission.has_minimum(minimum) {
            return Err(ServerError::Forbidden(format!(
                "{minimum} permission required, user {} has {}",
                caller.user_id(),
                membership.permission
            )));
        }
        Ok(membership)
    }

    /// The stored master version when `claimed` is out of date, else `None`.
    pub(crate) fn stale_master_version(
        &self,
        sharing_group_id: &SharingGroupId,
        claimed: MasterVersion,
    ) -> ServerResult<Option<MasterVersion>> {
        let current = self
            .database
            .read(|repos| repos.master_versions().read(sharing_group_id))?;
        if current == claimed {
            return Ok(None);
        }
        debug!("stale master version for {sharing_group_id}: client {claimed}, server {current}");
        Ok(Some(current))
    }

    /// The user whose cloud storage holds files the caller creates.
    pub(crate) fn effective_owner(
        &self,
        caller: &Caller,
        membership: &SharingGroupUser,
    ) -> ServerResult<UserId> {
        if caller.user.account_type.has_cloud_storage() {
            return Ok(caller.user_id());
        }
        membership.owning_user_id.ok_or_else(|| {
            ServerError::Forbidden(format!(
                "user {} has no cloud storage and no owning user",
                caller.user_id()
            ))
        })
    }

    /// Connector and fresh credentials for `user_id`'s cloud storage.
    /// Refreshed credentials are written back to the user row.
    pub(crate) async fn storage_for(&self, user_id: UserId) -> ServerResult<StorageAccess> {
        let user = self
            .database
            .read(|repos| repos.users().get(user_id))?
            .ok_or_else(|| ServerError::Internal(format!("owning user {user_id} not found")))?;
        let storage_type = user.account_type.cloud_storage_type().ok_or_else(|| {
            ServerError::Internal(format!(
                "user {user_id} ({}) has no cloud storage",
                user.account_type
            ))
        })?;
        let stored: CloudCredentials = user
            .creds_json
            .as_deref()
            .map(serde_json::from_str::<CloudCredentials>)
            .transpose()
            .map_err(|e| ServerError::Internal(format!("credentials for user {user_id}: {e}")))?
            .ok_or_else(|| {
                ServerError::Unauthorized(format!("no credentials for user {user_id}"))
            })?;

        let connector = self.registry.get(storage_type)?;
        let resolved = self.credentials.get(user_id, storage_type, &stored).await?;
        if resolved.refreshed {
            let json = serde_json::to_string(&resolved.credentials)
                .map_err(|e| ServerError::Internal(format!("serializing credentials: {e}")))?;
            self.database
                .transaction(|repos| repos.users().update_creds(user_id, &json))?;
            debug!("stored refreshed credentials for user {user_id}");
        }

        Ok(StorageAccess {
            user_id,
            storage_type,
            connector,
            credentials: resolved.credentials,
            cloud_folder_name: user.cloud_folder_name,
        })
    }

    /// Drops cached credentials after a provider rejected them.
    pub(crate) async fn note_cloud_error(
        &self,
        user_id: UserId,
        err: &syncserver_cloud::CloudError,
    ) {
        if err.is_auth_failure() {
            warn!("cloud storage rejected credentials of user {user_id}");
            self.credentials.invalidate(user_id).await;
        } else if !err.is_not_found() {
            warn!("cloud storage call for user {user_id} failed: {err}");
        }
    }
}
