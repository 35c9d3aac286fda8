use thiserror::Error;

/// Failure to parse one of the shared vocabulary types from its wire form.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("unknown permission: {0}")]
    UnknownPermission(String),

    #[error("unknown cloud storage type: {0}")]
    UnknownCloudStorageType(String),

    #[error("unknown account type: {0}")]
    UnknownAccountType(String),

    #[error("invalid identifier {value:?}: {reason}")]
    InvalidId { value: String, reason: String },
}
