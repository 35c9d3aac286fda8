//! Shared vocabulary for the sync server crates.
//!
//! Strongly typed identifiers for users, devices, files and sharing groups,
//! the sharing permission ladder, and the account/cloud-storage kinds that
//! decide which provider holds a user's files.

mod account;
mod error;
mod ids;
mod permission;

pub use account::{AccountType, CloudStorageType};
pub use error::ParseError;
pub use ids::{DeviceId, FileGroupId, FileId, InvitationId, SharingGroupId, UserId};
pub use permission::Permission;

/// Version number of one file's contents. Starts at 0.
pub type FileVersion = i64;

/// Version number of a sharing group's committed index. Starts at 0.
pub type MasterVersion = i64;

/// Version number of a file's app metadata. Starts at 0.
pub type AppMetaDataVersion = i64;
