//! Sharing groups and invitations.
//!
//! Invitations are time-limited and carry a number of acceptances. Each
//! records the user whose cloud storage will hold files uploaded by
//! acceptors without storage of their own.

use crate::error::{GoneReason, ServerError, ServerResult};
use crate::service::{AccountIdentity, Caller, SyncService};
use crate::types::{
    CreateSharingGroupRequest, CreateSharingInvitationRequest, CreateSharingInvitationResponse,
    RedeemSharingInvitationRequest, RedeemSharingInvitationResponse,
    RemoveUserFromSharingGroupRequest, SharingInvitationInfoResponse,
};
use chrono::{DateTime, Utc};
use syncserver_storage::{NewUser, Repositories, SharingGroupUser, SharingInvitation};
use syncserver_types::{InvitationId, Permission};
use tracing::info;

/// The invitation if it exists and has not expired.
fn live_invitation(
    repos: &Repositories<'_>,
    invitation_id: &InvitationId,
    now: DateTime<Utc>,
) -> ServerResult<SharingInvitation> {
    match repos.invitations().get(invitation_id)? {
        Some(invitation) if invitation.expiry >= now => Ok(invitation),
        _ => Err(ServerError::Gone(GoneReason::InvitationUnavailable)),
    }
}

impl SyncService {
    /// Creates a group with the caller as its admin.
    pub fn create_sharing_group(
        &self,
        caller: &Caller,
        request: CreateSharingGroupRequest,
    ) -> ServerResult<()> {
        if !caller.user.account_type.has_cloud_storage() {
            return Err(ServerError::Forbidden(format!(
                "{} accounts cannot own sharing groups",
                caller.user.account_type
            )));
        }
        let sharing_group_id = request.sharing_group_id;
        self.database.transaction(|repos| {
            repos
                .sharing_groups()
                .create(&sharing_group_id, request.sharing_group_name.as_deref())?;
            repos.master_versions().initialize(&sharing_group_id)?;
            repos.members().add(&SharingGroupUser {
                sharing_group_id,
                user_id: caller.user_id(),
                permission: Permission::Admin,
                owning_user_id: None,
            })
        })?;
        info!("user {} created sharing group {sharing_group_id}", caller.user_id());
        Ok(())
    }

    /// Removes the caller from a group along with their staged rows there.
    /// The last member leaving deletes the group.
    pub fn remove_user_from_sharing_group(
        &self,
        caller: &Caller,
        request: RemoveUserFromSharingGroupRequest,
    ) -> ServerResult<()> {
        let sharing_group_id = request.sharing_group_id;
        self.authorize(caller, &sharing_group_id, Permission::Read)?;
        let emptied = self.database.transaction(|repos| {
            repos.members().remove(&sharing_group_id, caller.user_id())?;
            repos
                .uploads()
                .remove_for_user(caller.user_id(), Some(&sharing_group_id))?;
            if repos.members().count(&sharing_group_id)? == 0 {
                return repos.sharing_groups().mark_deleted(&sharing_group_id);
            }
            Ok(false)
        })?;
        info!("user {} left sharing group {sharing_group_id}", caller.user_id());
        if emptied {
            info!("sharing group {sharing_group_id} has no members left; marked deleted");
        }
        Ok(())
    }

    pub fn create_sharing_invitation(
        &self,
        caller: &Caller,
        request: CreateSharingInvitationRequest,
    ) -> ServerResult<CreateSharingInvitationResponse> {
        let sharing_group_id = request.sharing_group_id;
        let membership = self.authorize(caller, &sharing_group_id, Permission::Admin)?;
        let max = self.config.max_invitation_acceptors;
        if !(1..=max).contains(&request.number_of_acceptors) {
            return Err(ServerError::BadRequest(format!(
                "numberOfAcceptors must be between 1 and {max}, got {}",
                request.number_of_acceptors
            )));
        }

        let invitation = SharingInvitation {
            invitation_id: InvitationId::new(),
            sharing_group_id,
            owning_user_id: self.effective_owner(caller, &membership)?,
            permission: request.permission,
            allow_social_acceptance: request.allow_social_acceptance,
            number_acceptors: request.number_of_acceptors,
            expiry: Utc::now() + self.config.invitation_lifetime(),
        };
        self.database
            .transaction(|repos| repos.invitations().add(&invitation))?;
        info!(
            "user {} invited {} acceptor(s) to {sharing_group_id} with {} permission",
            caller.user_id(),
            invitation.number_acceptors,
            invitation.permission
        );
        Ok(CreateSharingInvitationResponse {
            sharing_invitation_id: invitation.invitation_id,
        })
    }

    pub fn get_sharing_invitation_info(
        &self,
        invitation_id: &InvitationId,
    ) -> ServerResult<SharingInvitationInfoResponse> {
        let invitation = self
            .database
            .read(|repos| live_invitation(repos, invitation_id, Utc::now()))?;
        Ok(SharingInvitationInfoResponse {
            permission: invitation.permission,
            allow_social_acceptance: invitation.allow_social_acceptance,
        })
    }

    /// Joins the invitation's group, creating the user on first sign-in.
    pub fn redeem_sharing_invitation(
        &self,
        identity: &AccountIdentity,
        request: RedeemSharingInvitationRequest,
    ) -> ServerResult<RedeemSharingInvitationResponse> {
        let has_storage = identity.account_type.has_cloud_storage();
        let creds_json = identity.creds_json()?;

        let (user_id, sharing_group_id) = self.database.transaction(|repos| {
            let invitation = live_invitation(repos, &request.sharing_invitation_id, Utc::now())?;
            let sharing_group_id = invitation.sharing_group_id;
            if !has_storage && !invitation.allow_social_acceptance {
                return Err(ServerError::Forbidden(format!(
                    "invitation does not admit {} accounts",
                    identity.account_type
                )));
            }

            let existing = repos
                .users()
                .find_by_account(identity.account_type, &identity.creds_id)?;
            let user_id = match existing {
                Some(user) => {
                    if user.user_id == invitation.owning_user_id {
                        return Err(ServerError::Forbidden(
                            "cannot redeem your own invitation".into(),
                        ));
                    }
                    if repos.members().get(&sharing_group_id, user.user_id)?.is_some() {
                        return Err(ServerError::Forbidden(format!(
                            "user {} is already in sharing group {sharing_group_id}",
                            user.user_id
                        )));
                    }
                    user.user_id
                }
                None => repos.users().add(&NewUser {
                    account_type: identity.account_type,
                    creds_id: identity.creds_id.clone(),
                    username: identity.username.clone(),
                    cloud_folder_name: request.cloud_folder_name.clone().filter(|_| has_storage),
                    creds_json: creds_json.clone(),
                })?,
            };

            repos.members().add(&SharingGroupUser {
                sharing_group_id,
                user_id,
                permission: invitation.permission,
                owning_user_id: Some(invitation.owning_user_id),
            })?;
            let remaining = repos.invitations().consume(&invitation.invitation_id)?;
            info!(
                "user {user_id} joined {sharing_group_id} with {} permission \
                 ({remaining} acceptance(s) left)",
                invitation.permission
            );
            Ok((user_id, sharing_group_id))
        })?;

        Ok(RedeemSharingInvitationResponse {
            user_id,
            sharing_group_id,
        })
    }
}
