use crate::error::{StorageError, StorageResult};
use crate::models::SharingInvitation;
use crate::rows::{get_parsed, get_time, to_millis};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use syncserver_types::{InvitationId, UserId};

/// Time-limited invitations into a sharing group.
pub struct InvitationRepository<'c> {
    conn: &'c Connection,
}

impl<'c> InvitationRepository<'c> {
    pub(crate) fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    pub fn add(&self, invitation: &SharingInvitation) -> StorageResult<()> {
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO sharing_invitations
                (invitation_id, sharing_group_id, owning_user_id, permission,
                 allow_social_acceptance, number_acceptors, expiry)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                invitation.invitation_id.to_string(),
                invitation.sharing_group_id.to_string(),
                invitation.owning_user_id.0,
                invitation.permission.as_str(),
                invitation.allow_social_acceptance,
                invitation.number_acceptors,
                to_millis(invitation.expiry),
            ],
        )?;
        if inserted == 0 {
            return Err(StorageError::AlreadyExists(format!(
                "invitation {}",
                invitation.invitation_id
            )));
        }
        Ok(())
    }

    pub fn get(&self, invitation_id: &InvitationId) -> StorageResult<Option<SharingInvitation>> {
        Ok(self
            .conn
            .query_row(
                "SELECT invitation_id, sharing_group_id, owning_user_id, permission,
                        allow_social_acceptance, number_acceptors, expiry
                 FROM sharing_invitations WHERE invitation_id = ?1",
                params![invitation_id.to_string()],
                |row| {
                    Ok(SharingInvitation {
                        invitation_id: get_parsed(row, 0)?,
                        sharing_group_id: get_parsed(row, 1)?,
                        owning_user_id: UserId(row.get(2)?),
                        permission: get_parsed(row, 3)?,
                        allow_social_acceptance: row.get(4)?,
                        number_acceptors: row.get(5)?,
                        expiry: get_time(row, 6)?,
                    })
                },
            )
            .optional()?)
    }

    /// Uses up one acceptance; the last one removes the invitation.
    /// Returns the acceptances left.
    pub fn consume(&self, invitation_id: &InvitationId) -> StorageResult<i64> {
        let invitation = self
            .get(invitation_id)?
            .ok_or_else(|| StorageError::NotFound(format!("invitation {invitation_id}")))?;
        if invitation.number_acceptors > 1 {
            self.conn.execute(
                "UPDATE sharing_invitations SET number_acceptors = number_acceptors - 1
                 WHERE invitation_id = ?1",
                params![invitation_id.to_string()],
            )?;
            Ok(invitation.number_acceptors - 1)
        } else {
            self.remove(invitation_id)?;
            Ok(0)
        }
    }

    pub fn remove(&self, invitation_id: &InvitationId) -> StorageResult<bool> {
        let removed = self.conn.execute(
            "DELETE FROM sharing_invitations WHERE invitation_id = ?1",
            params![invitation_id.to_string()],
        )?;
        Ok(removed > 0)
    }

    pub fn remove_expired(&self, now: DateTime<Utc>) -> StorageResult<usize> {
        Ok(self.conn.execute(
            "DELETE FROM sharing_invitations WHERE expiry < ?1",
            params![to_millis(now)],
        )?)
    }

    pub fn remove_for_owner(&self, user_id: UserId) -> StorageResult<usize> {
        Ok(self.conn.execute(
            "DELETE FROM sharing_invitations WHERE owning_user_id = ?1",
            params![user_id.0],
        )?)
    }
}
