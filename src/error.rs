use thiserror::Error;

use crate::kv::KVError;

// ── Error codes ─────────────────────────────────────────────────────
//
// Stable, machine-readable identifiers. Callers match on these,
// never on the human-readable message string.

pub mod error_code {
    pub const INVALID_DATA: &str = "INVALID_DATA";
    pub const INVALID_UID: &str = "INVALID_UID";
    pub const INVALID_GROUP_NAME: &str = "INVALID_GROUP_NAME";
    pub const GROUP_NAME_TOO_LONG: &str = "GROUP_NAME_TOO_LONG";
    pub const ALREADY_EXISTS: &str = "ALREADY_EXISTS";
    pub const STORAGE_ERROR: &str = "STORAGE_ERROR";
    pub const INTERNAL: &str = "INTERNAL";
}

/// Error type for every group operation.
#[derive(Debug, Error)]
pub enum GroupError {
    /// Group name argument missing or not a name.
    #[error("invalid data")]
    InvalidData,

    /// User id missing.
    #[error("invalid uid")]
    InvalidUid,

    #[error("invalid group name: {0:?}")]
    InvalidGroupName(String),

    #[error("group name too long: {0:?}")]
    GroupNameTooLong(String),

    /// Creation lost to an existing group of the same name.
    #[error("group already exists: {0}")]
    GroupAlreadyExists(String),

    #[error("storage: {0}")]
    Storage(String),

    #[error("internal: {0}")]
    Internal(String),
}

impl GroupError {
    /// Stable, machine-readable error code.
    pub fn error_code(&self) -> &'static str {
        match self {
            GroupError::InvalidData => error_code::INVALID_DATA,
            GroupError::InvalidUid => error_code::INVALID_UID,
            GroupError::InvalidGroupName(_) => error_code::INVALID_GROUP_NAME,
            GroupError::GroupNameTooLong(_) => error_code::GROUP_NAME_TOO_LONG,
            GroupError::GroupAlreadyExists(_) => error_code::ALREADY_EXISTS,
            GroupError::Storage(_) => error_code::STORAGE_ERROR,
            GroupError::Internal(_) => error_code::INTERNAL,
        }
    }
}

impl From<KVError> for GroupError {
    fn from(e: KVError) -> Self {
        GroupError::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for GroupError {
    fn from(e: serde_json::Error) -> Self {
        GroupError::Internal(e.to_string())
    }
}
