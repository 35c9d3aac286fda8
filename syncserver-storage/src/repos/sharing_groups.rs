use crate::error::{StorageError, StorageResult};
use crate::models::{SharingGroup, SharingGroupSummary};
use crate::rows::get_parsed;
use rusqlite::{Connection, OptionalExtension, params};
use syncserver_types::{SharingGroupId, UserId};

pub struct SharingGroupRepository<'c> {
    conn: &'c Connection,
}

impl<'c> SharingGroupRepository<'c> {
    pub(crate) fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    pub fn create(
        &self,
        sharing_group_id: &SharingGroupId,
        name: Option<&str>,
    ) -> StorageResult<()> {
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO sharing_groups (sharing_group_id, name, deleted)
             VALUES (?1, ?2, 0)",
            params![sharing_group_id.to_string(), name],
        )?;
        if inserted == 0 {
            return Err(StorageError::AlreadyExists(format!("sharing group {sharing_group_id}")));
        }
        Ok(())
    }

    pub fn get(&self, sharing_group_id: &SharingGroupId) -> StorageResult<Option<SharingGroup>> {
        Ok(self
            .conn
            .query_row(
                "SELECT sharing_group_id, name, deleted FROM sharing_groups
                 WHERE sharing_group_id = ?1",
                params![sharing_group_id.to_string()],
                |row| {
                    Ok(SharingGroup {
                        sharing_group_id: get_parsed(row, 0)?,
                        name: row.get(1)?,
                        deleted: row.get(2)?,
                    })
                },
            )
            .optional()?)
    }

    pub fn rename(&self, sharing_group_id: &SharingGroupId, name: &str) -> StorageResult<()> {
        let updated = self.conn.execute(
            "UPDATE sharing_groups SET name = ?2 WHERE sharing_group_id = ?1",
            params![sharing_group_id.to_string(), name],
        )?;
        if updated == 0 {
            return Err(StorageError::NotFound(format!("sharing group {sharing_group_id}")));
        }
        Ok(())
    }

    pub fn mark_deleted(&self, sharing_group_id: &SharingGroupId) -> StorageResult<bool> {
        let updated = self.conn.execute(
            "UPDATE sharing_groups SET deleted = 1 WHERE sharing_group_id = ?1 AND deleted = 0",
            params![sharing_group_id.to_string()],
        )?;
        Ok(updated > 0)
    }

    /// Every group `user_id` belongs to, with their permission and the
    /// group's current master version.
    pub fn list_for_user(&self, user_id: UserId) -> StorageResult<Vec<SharingGroupSummary>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT g.sharing_group_id, g.name, g.deleted, u.permission, COALESCE(m.version, 0)
            FROM sharing_group_users u
            JOIN sharing_groups g ON g.sharing_group_id = u.sharing_group_id
            LEFT JOIN master_versions m ON m.sharing_group_id = g.sharing_group_id
            WHERE u.user_id = ?1
            ORDER BY g.name, g.sharing_group_id
            "#,
        )?;
        let rows = stmt
            .query_map(params![user_id.0], |row| {
                Ok(SharingGroupSummary {
                    sharing_group_id: get_parsed(row, 0)?,
                    name: row.get(1)?,
                    deleted: row.get(2)?,
                    permission: get_parsed(row, 3)?,
                    master_version: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}
