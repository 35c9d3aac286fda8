use crate::error::{StorageError, StorageResult};
use crate::models::{NewUser, User};
use crate::rows::get_parsed;
use rusqlite::{Connection, OptionalExtension, Row, params};
use syncserver_types::{AccountType, UserId};

const COLUMNS: &str = "user_id, account_type, creds_id, username, cloud_folder_name, creds_json";

fn map_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        user_id: UserId(row.get(0)?),
        account_type: get_parsed(row, 1)?,
        creds_id: row.get(2)?,
        username: row.get(3)?,
        cloud_folder_name: row.get(4)?,
        creds_json: row.get(5)?,
    })
}

pub struct UserRepository<'c> {
    conn: &'c Connection,
}

impl<'c> UserRepository<'c> {
    pub(crate) fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    /// Inserts a user; an account that already exists is rejected.
    pub fn add(&self, user: &NewUser) -> StorageResult<UserId> {
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO users
                 (account_type, creds_id, username, cloud_folder_name, creds_json)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                user.account_type.as_str(),
                user.creds_id,
                user.username,
                user.cloud_folder_name,
                user.creds_json,
            ],
        )?;
        if inserted == 0 {
            return Err(StorageError::AlreadyExists(format!(
                "{} account {}",
                user.account_type, user.creds_id
            )));
        }
        Ok(UserId(self.conn.last_insert_rowid()))
    }

    pub fn get(&self, user_id: UserId) -> StorageResult<Option<User>> {
        Ok(self
            .conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM users WHERE user_id = ?1"),
                params![user_id.0],
                map_row,
            )
            .optional()?)
    }

    pub fn find_by_account(
        &self,
        account_type: AccountType,
        creds_id: &str,
    ) -> StorageResult<Option<User>> {
        Ok(self
            .conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM users WHERE account_type = ?1 AND creds_id = ?2"),
                params![account_type.as_str(), creds_id],
                map_row,
            )
            .optional()?)
    }

    pub fn update_creds(&self, user_id: UserId, creds_json: &str) -> StorageResult<()> {
        let updated = self.conn.execute(
            "UPDATE users SET creds_json = ?2 WHERE user_id = ?1",
            params![user_id.0, creds_json],
        )?;
        if updated == 0 {
            return Err(StorageError::NotFound(format!("user {user_id}")));
        }
        Ok(())
    }

    pub fn remove(&self, user_id: UserId) -> StorageResult<bool> {
        let removed = self
            .conn
            .execute("DELETE FROM users WHERE user_id = ?1", params![user_id.0])?;
        Ok(removed > 0)
    }
}
