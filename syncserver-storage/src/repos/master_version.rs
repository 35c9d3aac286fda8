//! Per-sharing-group master version: the optimistic-concurrency fence.

use crate::error::{StorageError, StorageResult};
use rusqlite::{Connection, OptionalExtension, params};
use syncserver_types::{MasterVersion, SharingGroupId};

pub struct MasterVersionRepository<'c> {
    conn: &'c Connection,
}

impl<'c> MasterVersionRepository<'c> {
    pub(crate) fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    /// Creates the row at version 0.
    pub fn initialize(&self, sharing_group_id: &SharingGroupId) -> StorageResult<()> {
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO master_versions (sharing_group_id, version) VALUES (?1, 0)",
            params![sharing_group_id.to_string()],
        )?;
        if inserted == 0 {
            return Err(StorageError::AlreadyExists(format!(
                "master version for sharing group {sharing_group_id}"
            )));
        }
        Ok(())
    }

    pub fn get(&self, sharing_group_id: &SharingGroupId) -> StorageResult<Option<MasterVersion>> {
        Ok(self
            .conn
            .query_row(
                "SELECT version FROM master_versions WHERE sharing_group_id = ?1",
                params![sharing_group_id.to_string()],
                |row| row.get(0),
            )
            .optional()?)
    }

    pub fn read(&self, sharing_group_id: &SharingGroupId) -> StorageResult<MasterVersion> {
        self.get(sharing_group_id)?.ok_or_else(|| {
            StorageError::NotFound(format!("master version for sharing group {sharing_group_id}"))
        })
    }

    /// Compare-and-swap from `expected` to `expected + 1`.
    pub fn advance(
        &self,
        sharing_group_id: &SharingGroupId,
        expected: MasterVersion,
    ) -> StorageResult<MasterVersion> {
        let updated = self.conn.execute(
            "UPDATE master_versions SET version = version + 1
             WHERE sharing_group_id = ?1 AND version = ?2",
            params![sharing_group_id.to_string(), expected],
        )?;
        if updated == 1 {
            return Ok(expected + 1);
        }
        let actual = self.read(sharing_group_id)?;
        Err(StorageError::VersionConflict { expected, actual })
    }

    pub fn remove(&self, sharing_group_id: &SharingGroupId) -> StorageResult<bool> {
        let removed = self.conn.execute(
            "DELETE FROM master_versions WHERE sharing_group_id = ?1",
            params![sharing_group_id.to_string()],
        )?;
        Ok(removed > 0)
    }
}
