//! Error types for Roster

use crate::{GroupId, UserId};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, RosterError>;

/// Unique column that rejected a write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictField {
    Username,
    Number,
    GroupName,
}

impl std::fmt::Display for ConflictField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConflictField::Username => write!(f, "Username already registered"),
            ConflictField::Number => write!(f, "Number already registered"),
            ConflictField::GroupName => write!(f, "Group name already exists"),
        }
    }
}

#[derive(Error, Debug)]
pub enum RosterError {
    /// The addressed user does not exist
    #[error("User not found")]
    UserNotFound,

    /// The addressed group does not exist
    #[error("Group not found")]
    GroupNotFound,

    /// A user id referenced from a request body does not exist
    #[error("User with id {0} not found")]
    UserIdNotFound(UserId),

    /// A group id referenced from a request body does not exist
    #[error("Group with id {0} not found")]
    GroupIdNotFound(GroupId),

    #[error("{0}")]
    Conflict(ConflictField),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl RosterError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            RosterError::UserNotFound
                | RosterError::GroupNotFound
                | RosterError::UserIdNotFound(_)
                | RosterError::GroupIdNotFound(_)
        )
    }
}
