//! User types

use crate::{GroupId, GroupSummary, UserId};
use serde::{Deserialize, Serialize};

/// User record, also the flat `UserResponse` shape
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub number: Option<i64>,
}

/// User with the groups it belongs to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDetail {
    #[serde(flatten)]
    pub user: User,
    #[serde(default)]
    pub groups: Vec<GroupSummary>,
}

/// User creation request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserCreate {
    pub username: String,
    #[serde(default)]
    pub number: Option<i64>,
    #[serde(default)]
    pub group_ids: Option<Vec<GroupId>>,
}

impl UserCreate {
    pub fn new(username: impl Into<String>, number: Option<i64>) -> Self {
        Self {
            username: username.into(),
            number,
            group_ids: None,
        }
    }

    pub fn with_groups(mut self, group_ids: Vec<GroupId>) -> Self {
        self.group_ids = Some(group_ids);
        self
    }

    pub fn group_ids(&self) -> &[GroupId] {
        self.group_ids.as_deref().unwrap_or_default()
    }
}

/// User update request.
///
/// Both fields replace the stored values: a missing or null `number`
/// clears it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserUpdate {
    pub username: String,
    #[serde(default)]
    pub number: Option<i64>,
}

impl UserUpdate {
    pub fn new(username: impl Into<String>, number: Option<i64>) -> Self {
        Self {
            username: username.into(),
            number,
        }
    }
}
