//! Expiry-based sharing-group locks.
//!
//! A lock row whose `expires_at` has passed is stale and may be taken over
//! by anyone. Acquisition is a single upsert whose update branch only fires
//! on a stale row, so two callers can never both win.

use crate::error::{StorageError, StorageResult};
use crate::models::SharingGroupLockRecord;
use crate::rows::{get_parsed, get_parsed_opt, get_time, to_millis};
use chrono::{DateTime, Duration, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use syncserver_types::{DeviceId, SharingGroupId};

pub struct LockRepository<'c> {
    conn: &'c Connection,
}

impl<'c> LockRepository<'c> {
    pub(crate) fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    /// Takes the lock for `duration` if it is free or stale.
    pub fn acquire(
        &self,
        sharing_group_id: &SharingGroupId,
        device_id: Option<&DeviceId>,
        duration: Duration,
        now: DateTime<Utc>,
    ) -> StorageResult<SharingGroupLockRecord> {
        let expires_at = now + duration;
        let changed = self.conn.execute(
            r#"
            INSERT INTO sharing_group_locks
                (sharing_group_id, held_by_device_id, acquired_at, expires_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT (sharing_group_id) DO UPDATE SET
                held_by_device_id = excluded.held_by_device_id,
                acquired_at = excluded.acquired_at,
                expires_at = excluded.expires_at
            WHERE sharing_group_locks.expires_at < ?3
            "#,
            params![
                sharing_group_id.to_string(),
                device_id.map(|d| d.to_string()),
                to_millis(now),
                to_millis(expires_at),
            ],
        )?;
        if changed == 0 {
            return Err(StorageError::LockHeld(*sharing_group_id));
        }
        Ok(SharingGroupLockRecord {
            sharing_group_id: *sharing_group_id,
            held_by_device_id: device_id.copied(),
            acquired_at: now,
            expires_at,
        })
    }

    /// Deletes the lock row. Idempotent.
    pub fn release(&self, sharing_group_id: &SharingGroupId) -> StorageResult<bool> {
        let removed = self.conn.execute(
            "DELETE FROM sharing_group_locks WHERE sharing_group_id = ?1",
            params![sharing_group_id.to_string()],
        )?;
        Ok(removed > 0)
    }

    pub fn get(
        &self,
        sharing_group_id: &SharingGroupId,
    ) -> StorageResult<Option<SharingGroupLockRecord>> {
        Ok(self
            .conn
            .query_row(
                "SELECT sharing_group_id, held_by_device_id, acquired_at, expires_at
                 FROM sharing_group_locks WHERE sharing_group_id = ?1",
                params![sharing_group_id.to_string()],
                |row| {
                    Ok(SharingGroupLockRecord {
                        sharing_group_id: get_parsed(row, 0)?,
                        held_by_device_id: get_parsed_opt(row, 1)?,
                        acquired_at: get_time(row, 2)?,
                        expires_at: get_time(row, 3)?,
                    })
                },
            )
            .optional()?)
    }

    /// Removes stale locks, for one sharing group or all of them.
    pub fn sweep_stale(
        &self,
        scope: Option<&SharingGroupId>,
        now: DateTime<Utc>,
    ) -> StorageResult<usize> {
        let removed = match scope {
            Some(sharing_group_id) => self.conn.execute(
                "DELETE FROM sharing_group_locks WHERE sharing_group_id = ?1 AND expires_at < ?2",
                params![sharing_group_id.to_string(), to_millis(now)],
            )?,
            None => self.conn.execute(
                "DELETE FROM sharing_group_locks WHERE expires_at < ?1",
                params![to_millis(now)],
            )?,
        };
        Ok(removed)
    }
}
