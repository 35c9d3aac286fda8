use crate::error::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Remote blob store backing a user's files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CloudStorageType {
    Google,
    Dropbox,
    OneDrive,
}

impl CloudStorageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CloudStorageType::Google => "Google",
            CloudStorageType::Dropbox => "Dropbox",
            CloudStorageType::OneDrive => "OneDrive",
        }
    }
}

impl fmt::Display for CloudStorageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CloudStorageType {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Google" => Ok(CloudStorageType::Google),
            "Dropbox" => Ok(CloudStorageType::Dropbox),
            "OneDrive" => Ok(CloudStorageType::OneDrive),
            other => Err(ParseError::UnknownCloudStorageType(other.to_string())),
        }
    }
}

/// Sign-in account kind.
///
/// Owning accounts bring their own cloud storage. Social accounts
/// (Facebook, Sign in with Apple) have none and store files with the
/// user who invited them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccountType {
    Google,
    Dropbox,
    Microsoft,
    Facebook,
    AppleSignIn,
}

impl AccountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountType::Google => "Google",
            AccountType::Dropbox => "Dropbox",
            AccountType::Microsoft => "Microsoft",
            AccountType::Facebook => "Facebook",
            AccountType::AppleSignIn => "AppleSignIn",
        }
    }

    pub fn cloud_storage_type(&self) -> Option<CloudStorageType> {
        match self {
            AccountType::Google => Some(CloudStorageType::Google),
            AccountType::Dropbox => Some(CloudStorageType::Dropbox),
            AccountType::Microsoft => Some(CloudStorageType::OneDrive),
            AccountType::Facebook | AccountType::AppleSignIn => None,
        }
    }

    pub fn has_cloud_storage(&self) -> bool {
        self.cloud_storage_type().is_some()
    }
}

impl fmt::Display for AccountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccountType {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Google" => Ok(AccountType::Google),
            "Dropbox" => Ok(AccountType::Dropbox),
            "Microsoft" => Ok(AccountType::Microsoft),
            "Facebook" => Ok(AccountType::Facebook),
            "AppleSignIn" => Ok(AccountType::AppleSignIn),
            other => Err(ParseError::UnknownAccountType(other.to_string())),
        }
    }
}
