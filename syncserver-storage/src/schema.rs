use crate::error::StorageResult;
use rusqlite::Connection;

/// Creates every table the server needs. Safe to run on an existing database.
pub(crate) fn initialize_schema(conn: &Connection) -> StorageResult<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            user_id INTEGER PRIMARY KEY AUTOINCREMENT,
            account_type TEXT NOT NULL,
            creds_id TEXT NOT NULL,
            username TEXT,
            cloud_folder_name TEXT,
            creds_json TEXT,
            UNIQUE (account_type, creds_id)
        );

        CREATE TABLE IF NOT EXISTS sharing_groups (
            sharing_group_id TEXT PRIMARY KEY,
            name TEXT,
            deleted INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS sharing_group_users (
            sharing_group_id TEXT NOT NULL,
            user_id INTEGER NOT NULL,
            permission TEXT NOT NULL,
            owning_user_id INTEGER,
            PRIMARY KEY (sharing_group_id, user_id)
        );
        CREATE INDEX IF NOT EXISTS idx_sharing_group_users_user ON sharing_group_users(user_id);

        CREATE TABLE IF NOT EXISTS master_versions (
            sharing_group_id TEXT PRIMARY KEY,
            version INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS sharing_group_locks (
            sharing_group_id TEXT PRIMARY KEY,
            held_by_device_id TEXT,
            acquired_at INTEGER NOT NULL,
            expires_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS staged_uploads (
            file_id TEXT NOT NULL,
            device_id TEXT NOT NULL,
            sharing_group_id TEXT NOT NULL,
            user_id INTEGER NOT NULL,
            owning_user_id INTEGER NOT NULL,
            file_version INTEGER NOT NULL,
            mime_type TEXT,
            checksum TEXT,
            app_meta_data_version INTEGER,
            app_meta_data TEXT,
            file_size_bytes INTEGER,
            state TEXT NOT NULL,
            actual_deletion INTEGER NOT NULL DEFAULT 0,
            undelete INTEGER NOT NULL DEFAULT 0,
            file_group_id TEXT,
            creation_date INTEGER NOT NULL,
            update_date INTEGER NOT NULL,
            PRIMARY KEY (file_id, device_id)
        );
        CREATE INDEX IF NOT EXISTS idx_staged_uploads_group ON staged_uploads(sharing_group_id);

        CREATE TABLE IF NOT EXISTS file_index (
            file_id TEXT PRIMARY KEY,
            sharing_group_id TEXT NOT NULL,
            file_version INTEGER NOT NULL,
            device_id TEXT NOT NULL,
            user_id INTEGER NOT NULL,
            mime_type TEXT NOT NULL,
            last_uploaded_checksum TEXT,
            file_size_bytes INTEGER,
            app_meta_data_version INTEGER,
            app_meta_data TEXT,
            deleted INTEGER NOT NULL DEFAULT 0,
            file_group_id TEXT,
            creation_date INTEGER NOT NULL,
            update_date INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_file_index_group ON file_index(sharing_group_id);

        CREATE TABLE IF NOT EXISTS sharing_invitations (
            invitation_id TEXT PRIMARY KEY,
            sharing_group_id TEXT NOT NULL,
            owning_user_id INTEGER NOT NULL,
            permission TEXT NOT NULL,
            allow_social_acceptance INTEGER NOT NULL,
            number_acceptors INTEGER NOT NULL,
            expiry INTEGER NOT NULL
        );
        "#,
    )?;
    Ok(())
}
