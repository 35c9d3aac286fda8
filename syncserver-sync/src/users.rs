//! Add User, Check Creds and Remove User.

use crate::error::{ServerError, ServerResult};
use crate::service::{AccountIdentity, Caller, SyncService};
use crate::types::{AddUserRequest, UserIdResponse};
use chrono::Utc;
use syncserver_storage::{NewUser, SharingGroupUser};
use syncserver_types::Permission;
use tracing::{debug, info, warn};

impl SyncService {
    /// Creates an owning-account user together with their first sharing group.
    pub fn add_user(
        &self,
        identity: &AccountIdentity,
        request: AddUserRequest,
    ) -> ServerResult<UserIdResponse> {
        if !identity.account_type.has_cloud_storage() {
            return Err(ServerError::Forbidden(format!(
                "{} accounts join through a sharing invitation",
                identity.account_type
            )));
        }
        let Some(creds_json) = identity.creds_json()? else {
            return Err(ServerError::BadRequest(
                "cloud storage credentials are required".into(),
            ));
        };

        let sharing_group_id = request.sharing_group_id;
        let user_id = self
            .database
            .transaction(|repos| {
                let user_id = repos.users().add(&NewUser {
                    account_type: identity.account_type,
                    creds_id: identity.creds_id.clone(),
                    username: identity.username.clone(),
                    cloud_folder_name: request.cloud_folder_name.clone(),
                    creds_json: Some(creds_json.clone()),
                })?;
                repos
                    .sharing_groups()
                    .create(&sharing_group_id, request.sharing_group_name.as_deref())?;
                repos.master_versions().initialize(&sharing_group_id)?;
                repos.members().add(&SharingGroupUser {
                    sharing_group_id,
                    user_id,
                    permission: Permission::Admin,
                    owning_user_id: None,
                })?;
                Ok(user_id)
            })
            .inspect_err(|e: &ServerError| warn!("add user {} failed: {e}", identity.creds_id))?;

        info!(
            "added {} user {user_id} with sharing group {sharing_group_id}",
            identity.account_type
        );
        Ok(UserIdResponse { user_id })
    }

    /// Confirms the account is known, storing any newer credentials it presents.
    pub async fn check_creds(&self, identity: &AccountIdentity) -> ServerResult<UserIdResponse> {
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

        if let Some(creds_json) = identity.creds_json()? {
            if user.creds_json.as_deref() != Some(creds_json.as_str()) {
                self.database
                    .transaction(|repos| repos.users().update_creds(user.user_id, &creds_json))?;
                self.credentials.invalidate(user.user_id).await;
                debug!("updated stored credentials for user {}", user.user_id);
            }
        }
        Ok(UserIdResponse {
            user_id: user.user_id,
        })
    }

    /// Deletes the caller's account.
    ///
    /// Files they own are marked deleted and each affected group's master
    /// version advances so other members notice. Groups left without
    /// members are marked deleted.
    pub async fn remove_user(&self, caller: &Caller) -> ServerResult<()> {
        let user_id = caller.user_id();
        let now = Utc::now();
        let (affected, emptied) = self.database.transaction(|repos| {
            let affected = repos.file_index().mark_deleted_for_owner(user_id, now)?;
            for sharing_group_id in &affected {
                let current = repos.master_versions().read(sharing_group_id)?;
                repos.master_versions().advance(sharing_group_id, current)?;
            }
            repos.uploads().remove_for_user(user_id, None)?;
            repos.invitations().remove_for_owner(user_id)?;

            let mut emptied = 0;
            for sharing_group_id in repos.members().remove_all_for_user(user_id)? {
                if repos.members().count(&sharing_group_id)? == 0
                    && repos.sharing_groups().mark_deleted(&sharing_group_id)?
                {
                    emptied += 1;
                }
            }
            repos.users().remove(user_id)?;
            Ok::<_, ServerError>((affected.len(), emptied))
        })?;

        self.credentials.invalidate(user_id).await;
        info!(
            "removed user {user_id}: files deleted in {affected} group(s), \
             {emptied} group(s) left empty"
        );
        Ok(())
    }
}
