//! Sync server core.
//!
//! Clients stage uploads, deletions and app-metadata changes against a
//! sharing group, then commit them all at once with Done Uploads. Each
//! sharing group carries a master version that every request echoes; a
//! stale value is answered with `masterVersionUpdate` instead of data, and
//! the client refreshes its index and retries.
//!
//! # Modules
//!
//! - [`uploads`]: Upload File / Upload Deletion / Upload App MetaData / Get Uploads
//! - [`coordinator`]: Done Uploads under the sharing-group lock
//! - [`downloads`]: Index / Download File / Download App MetaData
//! - [`sharing`]: sharing groups and invitations
//! - [`users`]: Add User / Check Creds / Remove User
//! - [`janitor`]: periodic stale-lock and invitation sweep
//!
//! HTTP routing sits outside this crate; [`ServerError::status_code`] gives
//! the status each failure should map to.

pub mod config;
pub mod coordinator;
pub mod downloads;
pub mod error;
pub mod janitor;
pub mod service;
pub mod sharing;
pub mod telemetry;
pub mod types;
pub mod uploads;
pub mod users;

pub use config::ServerConfig;
pub use error::{GoneReason, ServerError, ServerResult};
pub use janitor::{JanitorReport, spawn_janitor};
pub use service::{AccountIdentity, Caller, SyncService};
pub use types::*;
