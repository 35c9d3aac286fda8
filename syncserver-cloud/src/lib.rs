//! Cloud storage layer for the sync server.
//!
//! Every provider sits behind the [`CloudStorage`] trait with one failure
//! taxonomy:
//! - `AccessTokenRevokedOrExpired` triggers re-authentication, never a retry
//! - `FileNotFound` is a normal negative answer on download/lookup/delete
//! - `Failure` covers everything else
//!
//! Provided connectors:
//! - Google Drive (MD5 checksums, multipart uploads into a named folder)
//! - Dropbox (block-wise `content_hash`)
//! - Microsoft OneDrive (SHA-1, chunked upload sessions for large payloads)
//! - An in-memory mock with fault injection
//!
//! Connectors are looked up through a [`CloudStorageRegistry`] and fed
//! credentials from a [`CredentialsCache`].

pub mod checksum;
pub mod config;
pub mod credentials;
pub mod dropbox;
pub mod error;
pub mod google;
mod http;
pub mod microsoft;
pub mod mock;
pub mod naming;
pub mod registry;
pub mod storage;
pub mod types;
pub mod upload_state;

pub use config::CloudConfig;
pub use credentials::{
    CredentialSource, CredentialsCache, ResolvedCredentials, StaticCredentialSource,
};
pub use error::{CloudError, CloudResult};
pub use mock::MockStorage;
pub use registry::CloudStorageRegistry;
pub use storage::CloudStorage;
pub use types::*;
pub use upload_state::UploadState;
