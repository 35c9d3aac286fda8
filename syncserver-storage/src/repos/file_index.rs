//! The committed file index.
//!
//! Versions advance by exactly one per commit. Mime type and file group
//! are fixed at version 0. A deleted file only accepts an explicit undelete
//! at the next version.

use crate::error::{StorageError, StorageResult};
use crate::models::{FileIndexEntry, StagedUpload};
use crate::rows::{get_parsed, get_parsed_opt, get_time, to_millis};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use syncserver_types::{AppMetaDataVersion, FileId, FileVersion, SharingGroupId, UserId};

const COLUMNS: &str = "file_id, sharing_group_id, file_version, device_id, user_id, mime_type, \
     last_uploaded_checksum, file_size_bytes, app_meta_data_version, app_meta_data, deleted, \
     file_group_id, creation_date, update_date";

fn map_row(row: &Row<'_>) -> rusqlite::Result<FileIndexEntry> {
    Ok(FileIndexEntry {
        file_id: get_parsed(row, 0)?,
        sharing_group_id: get_parsed(row, 1)?,
        file_version: row.get(2)?,
        device_id: get_parsed(row, 3)?,
        user_id: UserId(row.get(4)?),
        mime_type: row.get(5)?,
        last_uploaded_checksum: row.get(6)?,
        file_size_bytes: row.get(7)?,
        app_meta_data_version: row.get(8)?,
        app_meta_data: row.get(9)?,
        deleted: row.get(10)?,
        file_group_id: get_parsed_opt(row, 11)?,
        creation_date: get_time(row, 12)?,
        update_date: get_time(row, 13)?,
    })
}

/// Metadata version that must come next after `current`.
fn next_app_meta_data_version(current: Option<AppMetaDataVersion>) -> AppMetaDataVersion {
    current.map_or(0, |v| v + 1)
}

pub struct FileIndexRepository<'c> {
    conn: &'c Connection,
}

impl<'c> FileIndexRepository<'c> {
    pub(crate) fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    pub fn get(&self, file_id: &FileId) -> StorageResult<Option<FileIndexEntry>> {
        Ok(self
            .conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM file_index WHERE file_id = ?1"),
                params![file_id.to_string()],
                map_row,
            )
            .optional()?)
    }

    /// Looks up `file_id` and checks it belongs to `sharing_group_id`.
    pub fn get_in_group(
        &self,
        file_id: &FileId,
        sharing_group_id: &SharingGroupId,
    ) -> StorageResult<Option<FileIndexEntry>> {
        match self.get(file_id)? {
            Some(entry) if entry.sharing_group_id != *sharing_group_id => {
                Err(StorageError::WrongSharingGroup {
                    file_id: *file_id,
                    sharing_group_id: *sharing_group_id,
                })
            }
            other => Ok(other),
        }
    }

    pub fn current_version(&self, file_id: &FileId) -> StorageResult<Option<FileVersion>> {
        Ok(self
            .conn
            .query_row(
                "SELECT file_version FROM file_index WHERE file_id = ?1",
                params![file_id.to_string()],
                |row| row.get(0),
            )
            .optional()?)
    }

    pub fn list_for_sharing_group(
        &self,
        sharing_group_id: &SharingGroupId,
    ) -> StorageResult<Vec<FileIndexEntry>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {COLUMNS} FROM file_index WHERE sharing_group_id = ?1
             ORDER BY creation_date, file_id"
        ))?;
        let rows = stmt
            .query_map(params![sharing_group_id.to_string()], map_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Checks that `record` may become the next version of its file,
    /// without writing anything.
    pub fn validate_upload(&self, record: &StagedUpload) -> StorageResult<Option<FileIndexEntry>> {
        let file_id = record.file_id;
        let existing = self.get(&file_id)?;

        let Some(entry) = existing else {
            if record.file_version != 0 {
                return Err(StorageError::WrongFileVersion {
                    file_id,
                    expected: 0,
                    actual: record.file_version,
                });
            }
            if record.mime_type.is_none() {
                return Err(StorageError::NotFound(format!("mime type for new file {file_id}")));
            }
            if let Some(meta) = &record.app_meta_data {
                if meta.version != 0 {
                    return Err(StorageError::AppMetaDataVersion {
                        file_id,
                        expected: 0,
                        actual: meta.version,
                    });
                }
            }
            return Ok(None);
        };

        if entry.sharing_group_id != record.sharing_group_id {
            return Err(StorageError::WrongSharingGroup {
                file_id,
                sharing_group_id: record.sharing_group_id,
            });
        }
        if record.file_version != entry.file_version + 1 {
            return Err(StorageError::WrongFileVersion {
                file_id,
                expected: entry.file_version + 1,
                actual: record.file_version,
            });
        }
        if let Some(mime_type) = &record.mime_type {
            if *mime_type != entry.mime_type {
                return Err(StorageError::MimeTypeMismatch {
                    file_id,
                    stored: entry.mime_type.clone(),
                    supplied: mime_type.clone(),
                });
            }
        }
        if let Some(file_group_id) = record.file_group_id {
            if entry.file_group_id != Some(file_group_id) {
                return Err(StorageError::FileGroupMismatch(file_id));
            }
        }
        if entry.deleted && !record.undelete {
            return Err(StorageError::FileDeleted(file_id));
        }
        if let Some(meta) = &record.app_meta_data {
            let expected = next_app_meta_data_version(entry.app_meta_data_version);
            if meta.version != expected {
                return Err(StorageError::AppMetaDataVersion {
                    file_id,
                    expected,
                    actual: meta.version,
                });
            }
        }
        Ok(Some(entry))
    }

    /// Commits a staged file upload as the next version (or version 0).
    pub fn apply_upload(&self, record: &StagedUpload, now: DateTime<Utc>) -> StorageResult<()> {
        match self.validate_upload(record)? {
            None => {
                let mime_type = record.mime_type.clone().unwrap_or_default();
                self.conn.execute(
                    &format!(
                        "INSERT INTO file_index ({COLUMNS})
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, 0, ?11, ?12, ?12)"
                    ),
                    params![
                        record.file_id.to_string(),
                        record.sharing_group_id.to_string(),
                        record.file_version,
                        record.device_id.to_string(),
                        record.owning_user_id.0,
                        mime_type,
                        record.checksum,
                        record.file_size_bytes,
                        record.app_meta_data.as_ref().map(|m| m.version),
                        record.app_meta_data.as_ref().map(|m| m.contents.as_str()),
                        record.file_group_id.map(|g| g.to_string()),
                        to_millis(now),
                    ],
                )?;
            }
            Some(_) => {
                // Absent app metadata leaves the stored value alone.
                self.conn.execute(
                    "UPDATE file_index SET
                        file_version = ?2,
                        device_id = ?3,
                        last_uploaded_checksum = ?4,
                        file_size_bytes = ?5,
                        app_meta_data_version = COALESCE(?6, app_meta_data_version),
                        app_meta_data = COALESCE(?7, app_meta_data),
                        deleted = 0,
                        update_date = ?8
                     WHERE file_id = ?1",
                    params![
                        record.file_id.to_string(),
                        record.file_version,
                        record.device_id.to_string(),
                        record.checksum,
                        record.file_size_bytes,
                        record.app_meta_data.as_ref().map(|m| m.version),
                        record.app_meta_data.as_ref().map(|m| m.contents.as_str()),
                        to_millis(now),
                    ],
                )?;
            }
        }
        Ok(())
    }

    /// Marks the file deleted at `file_version`. Returns false when it
    /// already was deleted at that same version.
    pub fn apply_deletion(
        &self,
        file_id: &FileId,
        file_version: FileVersion,
        now: DateTime<Utc>,
    ) -> StorageResult<bool> {
        let entry = self
            .get(file_id)?
            .ok_or_else(|| StorageError::NotFound(format!("file {file_id}")))?;
        if entry.file_version != file_version {
            if entry.deleted {
                return Err(StorageError::FileDeleted(*file_id));
            }
            return Err(StorageError::WrongFileVersion {
                file_id: *file_id,
                expected: entry.file_version,
                actual: file_version,
            });
        }
        if entry.deleted {
            return Ok(false);
        }
        self.conn.execute(
            "UPDATE file_index SET deleted = 1, update_date = ?2 WHERE file_id = ?1",
            params![file_id.to_string(), to_millis(now)],
        )?;
        Ok(true)
    }

    /// Checks that `version` is the next app-metadata version for a live file.
    pub fn validate_app_meta_data(
        &self,
        file_id: &FileId,
        version: AppMetaDataVersion,
    ) -> StorageResult<FileIndexEntry> {
        let entry = self
            .get(file_id)?
            .ok_or_else(|| StorageError::NotFound(format!("file {file_id}")))?;
        if entry.deleted {
            return Err(StorageError::FileDeleted(*file_id));
        }
        let expected = next_app_meta_data_version(entry.app_meta_data_version);
        if version != expected {
            return Err(StorageError::AppMetaDataVersion {
                file_id: *file_id,
                expected,
                actual: version,
            });
        }
        Ok(entry)
    }

    pub fn apply_app_meta_data(
        &self,
        file_id: &FileId,
        version: AppMetaDataVersion,
        contents: &str,
        now: DateTime<Utc>,
    ) -> StorageResult<()> {
        self.validate_app_meta_data(file_id, version)?;
        self.conn.execute(
            "UPDATE file_index SET app_meta_data_version = ?2, app_meta_data = ?3, update_date = ?4
             WHERE file_id = ?1",
            params![file_id.to_string(), version, contents, to_millis(now)],
        )?;
        Ok(())
    }

    /// Marks every live file owned by `user_id` deleted. Returns the groups touched.
    pub fn mark_deleted_for_owner(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> StorageResult<Vec<SharingGroupId>> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT sharing_group_id FROM file_index WHERE user_id = ?1 AND deleted = 0",
        )?;
        let groups = stmt
            .query_map(params![user_id.0], |row| get_parsed(row, 0))?
            .collect::<Result<Vec<SharingGroupId>, _>>()?;
        self.conn.execute(
            "UPDATE file_index SET deleted = 1, update_date = ?2
             WHERE user_id = ?1 AND deleted = 0",
            params![user_id.0, to_millis(now)],
        )?;
        Ok(groups)
    }
}
