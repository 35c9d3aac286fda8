//! Staged uploads, deletions and metadata changes awaiting Done Uploads.

use crate::error::{StorageError, StorageResult};
use crate::models::{AppMetaData, StagedUpload, UploadState};
use crate::repos::file_index::FileIndexRepository;
use crate::rows::{get_parsed, get_parsed_opt, get_time, to_millis};
use rusqlite::{Connection, OptionalExtension, Row, params};
use syncserver_types::{DeviceId, FileId, SharingGroupId, UserId};

const COLUMNS: &str = "file_id, device_id, sharing_group_id, user_id, owning_user_id, \
     file_version, mime_type, checksum, app_meta_data_version, app_meta_data, \
     file_size_bytes, state, actual_deletion, undelete, file_group_id, creation_date, \
     update_date";

fn map_row(row: &Row<'_>) -> rusqlite::Result<StagedUpload> {
    let app_meta_data_version: Option<i64> = row.get(8)?;
    let app_meta_data_contents: Option<String> = row.get(9)?;
    let app_meta_data = match (app_meta_data_version, app_meta_data_contents) {
        (Some(version), Some(contents)) => Some(AppMetaData { version, contents }),
        _ => None,
    };
    Ok(StagedUpload {
        file_id: get_parsed(row, 0)?,
        device_id: get_parsed(row, 1)?,
        sharing_group_id: get_parsed(row, 2)?,
        user_id: UserId(row.get(3)?),
        owning_user_id: UserId(row.get(4)?),
        file_version: row.get(5)?,
        mime_type: row.get(6)?,
        checksum: row.get(7)?,
        app_meta_data,
        file_size_bytes: row.get(10)?,
        state: get_parsed(row, 11)?,
        actual_deletion: row.get(12)?,
        undelete: row.get(13)?,
        file_group_id: get_parsed_opt(row, 14)?,
        creation_date: get_time(row, 15)?,
        update_date: get_time(row, 16)?,
    })
}

pub struct UploadRepository<'c> {
    conn: &'c Connection,
}

impl<'c> UploadRepository<'c> {
    pub(crate) fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    /// Insert-or-update keyed by `(file_id, device_id)`; the last write wins.
    /// The original creation date survives a re-stage.
    pub fn stage(&self, record: &StagedUpload) -> StorageResult<()> {
        self.conn.execute(
            &format!(
                r#"
                INSERT INTO staged_uploads ({COLUMNS})
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
                ON CONFLICT (file_id, device_id) DO UPDATE SET
                    sharing_group_id = excluded.sharing_group_id,
                    user_id = excluded.user_id,
                    owning_user_id = excluded.owning_user_id,
                    file_version = excluded.file_version,
                    mime_type = excluded.mime_type,
                    checksum = excluded.checksum,
                    app_meta_data_version = excluded.app_meta_data_version,
                    app_meta_data = excluded.app_meta_data,
                    file_size_bytes = excluded.file_size_bytes,
                    state = excluded.state,
                    actual_deletion = excluded.actual_deletion,
                    undelete = excluded.undelete,
                    file_group_id = excluded.file_group_id,
                    update_date = excluded.update_date
                "#
            ),
            params![
                record.file_id.to_string(),
                record.device_id.to_string(),
                record.sharing_group_id.to_string(),
                record.user_id.0,
                record.owning_user_id.0,
                record.file_version,
                record.mime_type,
                record.checksum,
                record.app_meta_data.as_ref().map(|m| m.version),
                record.app_meta_data.as_ref().map(|m| m.contents.as_str()),
                record.file_size_bytes,
                record.state.as_str(),
                record.actual_deletion,
                record.undelete,
                record.file_group_id.map(|g| g.to_string()),
                to_millis(record.creation_date),
                to_millis(record.update_date),
            ],
        )?;
        Ok(())
    }

    /// Stages a deletion after checking `record.file_version` against the
    /// committed version of the file. Another device's staged change to the
    /// same file blocks it.
    pub fn stage_deletion(&self, record: &StagedUpload) -> StorageResult<()> {
        let entry = FileIndexRepository::new(self.conn)
            .get(&record.file_id)?
            .ok_or_else(|| StorageError::NotFound(format!("file {}", record.file_id)))?;
        if entry.sharing_group_id != record.sharing_group_id {
            return Err(StorageError::WrongSharingGroup {
                file_id: record.file_id,
                sharing_group_id: record.sharing_group_id,
            });
        }
        if entry.file_version != record.file_version {
            return Err(StorageError::WrongFileVersion {
                file_id: record.file_id,
                expected: entry.file_version,
                actual: record.file_version,
            });
        }
        self.ensure_not_staged_elsewhere(&record.file_id, &record.device_id)?;
        let deletion = StagedUpload {
            state: UploadState::ToDeleteFromFileIndex,
            ..record.clone()
        };
        self.stage(&deletion)
    }

    /// Fails with `StagedByOtherDevice` when a device other than `device_id`
    /// has any row staged for `file_id`. Two devices' changes to one file
    /// could never both commit.
    pub fn ensure_not_staged_elsewhere(
        &self,
        file_id: &FileId,
        device_id: &DeviceId,
    ) -> StorageResult<()> {
        let other: Option<String> = self
            .conn
            .query_row(
                "SELECT device_id FROM staged_uploads
                 WHERE file_id = ?1 AND device_id != ?2 LIMIT 1",
                params![file_id.to_string(), device_id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        match other {
            Some(other) => Err(StorageError::StagedByOtherDevice {
                file_id: *file_id,
                device_id: other,
            }),
            None => Ok(()),
        }
    }

    pub fn get(
        &self,
        file_id: &FileId,
        device_id: &DeviceId,
    ) -> StorageResult<Option<StagedUpload>> {
        Ok(self
            .conn
            .query_row(
                &format!(
                    "SELECT {COLUMNS} FROM staged_uploads WHERE file_id = ?1 AND device_id = ?2"
                ),
                params![file_id.to_string(), device_id.to_string()],
                map_row,
            )
            .optional()?)
    }

    pub fn remove(&self, file_id: &FileId, device_id: &DeviceId) -> StorageResult<bool> {
        let removed = self.conn.execute(
            "DELETE FROM staged_uploads WHERE file_id = ?1 AND device_id = ?2",
            params![file_id.to_string(), device_id.to_string()],
        )?;
        Ok(removed > 0)
    }

    /// The caller's own pending rows, for Get Uploads.
    pub fn list_pending(
        &self,
        user_id: UserId,
        device_id: &DeviceId,
        sharing_group_id: &SharingGroupId,
    ) -> StorageResult<Vec<StagedUpload>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {COLUMNS} FROM staged_uploads
             WHERE user_id = ?1 AND device_id = ?2 AND sharing_group_id = ?3
             ORDER BY file_id, file_version"
        ))?;
        let rows = stmt
            .query_map(
                params![user_id.0, device_id.to_string(), sharing_group_id.to_string()],
                map_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Every committable row in the group, from all devices, in application
    /// order: by file, then ascending version, uploads before metadata before
    /// deletions. `uploadingFile` rows have no blob yet and are left out.
    pub fn list_for_sharing_group(
        &self,
        sharing_group_id: &SharingGroupId,
    ) -> StorageResult<Vec<StagedUpload>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {COLUMNS} FROM staged_uploads
             WHERE sharing_group_id = ?1 AND state != 'uploadingFile'"
        ))?;
        let mut rows = stmt
            .query_map(params![sharing_group_id.to_string()], map_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.sort_by(|a, b| {
            (a.file_id, a.file_version, a.state.apply_rank(), a.creation_date)
                .cmp(&(b.file_id, b.file_version, b.state.apply_rank(), b.creation_date))
        });
        Ok(rows)
    }

    pub fn clear_all_for(&self, sharing_group_id: &SharingGroupId) -> StorageResult<usize> {
        Ok(self.conn.execute(
            "DELETE FROM staged_uploads WHERE sharing_group_id = ?1",
            params![sharing_group_id.to_string()],
        )?)
    }

    /// Drops a user's rows, in one group or everywhere.
    pub fn remove_for_user(
        &self,
        user_id: UserId,
        scope: Option<&SharingGroupId>,
    ) -> StorageResult<usize> {
        let removed = match scope {
            Some(sharing_group_id) => self.conn.execute(
                "DELETE FROM staged_uploads WHERE user_id = ?1 AND sharing_group_id = ?2",
                params![user_id.0, sharing_group_id.to_string()],
            )?,
            None => self.conn.execute(
                "DELETE FROM staged_uploads WHERE user_id = ?1",
                params![user_id.0],
            )?,
        };
        Ok(removed)
    }
}
