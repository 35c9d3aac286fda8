//! SQLite persistence for the sync server.
//!
//! # Architecture
//!
//! - One connection behind [`Database`]; callers borrow it through
//!   [`Database::read`] or [`Database::transaction`]
//! - [`Repositories`] hands out one repository per table
//! - Master versions and sharing-group locks change only through
//!   single conditional writes, so a lost race shows up as a typed error
//! - File-index mutations re-validate version, mime type and file group
//!   before writing

mod database;
mod error;
mod models;
mod repos;
mod rows;
mod schema;

pub use database::Database;
pub use error::{StorageError, StorageResult};
pub use models::*;
pub use repos::{
    FileIndexRepository, InvitationRepository, LockRepository, MasterVersionRepository,
    MemberRepository, Repositories, SharingGroupRepository, UploadRepository, UserRepository,
};
