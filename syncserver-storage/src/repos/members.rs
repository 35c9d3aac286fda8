use crate::error::{StorageError, StorageResult};
use crate::models::SharingGroupUser;
use crate::rows::get_parsed;
use rusqlite::{Connection, OptionalExtension, Row, params};
use syncserver_types::{SharingGroupId, UserId};

fn map_row(row: &Row<'_>) -> rusqlite::Result<SharingGroupUser> {
    let owning: Option<i64> = row.get(3)?;
    Ok(SharingGroupUser {
        sharing_group_id: get_parsed(row, 0)?,
        user_id: UserId(row.get(1)?),
        permission: get_parsed(row, 2)?,
        owning_user_id: owning.map(UserId),
    })
}

/// Sharing-group membership rows.
pub struct MemberRepository<'c> {
    conn: &'c Connection,
}

impl<'c> MemberRepository<'c> {
    pub(crate) fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    pub fn add(&self, member: &SharingGroupUser) -> StorageResult<()> {
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO sharing_group_users
                 (sharing_group_id, user_id, permission, owning_user_id)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                member.sharing_group_id.to_string(),
                member.user_id.0,
                member.permission.as_str(),
                member.owning_user_id.map(|u| u.0),
            ],
        )?;
        if inserted == 0 {
            return Err(StorageError::AlreadyExists(format!(
                "user {} in sharing group {}",
                member.user_id, member.sharing_group_id
            )));
        }
        Ok(())
    }

    pub fn get(
        &self,
        sharing_group_id: &SharingGroupId,
        user_id: UserId,
    ) -> StorageResult<Option<SharingGroupUser>> {
        Ok(self
            .conn
            .query_row(
                "SELECT sharing_group_id, user_id, permission, owning_user_id
                 FROM sharing_group_users WHERE sharing_group_id = ?1 AND user_id = ?2",
                params![sharing_group_id.to_string(), user_id.0],
                map_row,
            )
            .optional()?)
    }

    pub fn list(&self, sharing_group_id: &SharingGroupId) -> StorageResult<Vec<SharingGroupUser>> {
        let mut stmt = self.conn.prepare(
            "SELECT sharing_group_id, user_id, permission, owning_user_id
             FROM sharing_group_users WHERE sharing_group_id = ?1 ORDER BY user_id",
        )?;
        let rows = stmt
            .query_map(params![sharing_group_id.to_string()], map_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn count(&self, sharing_group_id: &SharingGroupId) -> StorageResult<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sharing_group_users WHERE sharing_group_id = ?1",
            params![sharing_group_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    pub fn remove(
        &self,
        sharing_group_id: &SharingGroupId,
        user_id: UserId,
    ) -> StorageResult<bool> {
        let removed = self.conn.execute(
            "DELETE FROM sharing_group_users WHERE sharing_group_id = ?1 AND user_id = ?2",
            params![sharing_group_id.to_string(), user_id.0],
        )?;
        Ok(removed > 0)
    }

    /// Removes every membership of `user_id`. Returns the groups left.
    pub fn remove_all_for_user(&self, user_id: UserId) -> StorageResult<Vec<SharingGroupId>> {
        let mut stmt = self
            .conn
            .prepare("SELECT sharing_group_id FROM sharing_group_users WHERE user_id = ?1")?;
        let groups = stmt
            .query_map(params![user_id.0], |row| get_parsed(row, 0))?
            .collect::<Result<Vec<SharingGroupId>, _>>()?;
        self.conn.execute(
            "DELETE FROM sharing_group_users WHERE user_id = ?1",
            params![user_id.0],
        )?;
        Ok(groups)
    }
}
