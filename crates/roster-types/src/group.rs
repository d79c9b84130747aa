//! Group types

use crate::{GroupId, User, UserId};
use serde::{Deserialize, Serialize};

/// Group record, embedded in a user's group list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSummary {
    pub id: GroupId,
    pub name: String,
}

/// Group with its members, the `GroupResponse` shape
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupDetail {
    pub id: GroupId,
    pub name: String,
    pub users: Vec<User>,
}

impl GroupDetail {
    pub fn users_count(&self) -> usize {
        self.users.len()
    }
}

/// Group creation request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupCreate {
    pub name: String,
    #[serde(default)]
    pub user_ids: Option<Vec<UserId>>,
}

impl GroupCreate {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            user_ids: None,
        }
    }

    pub fn with_users(mut self, user_ids: Vec<UserId>) -> Self {
        self.user_ids = Some(user_ids);
        self
    }

    pub fn user_ids(&self) -> &[UserId] {
        self.user_ids.as_deref().unwrap_or_default()
    }
}

/// Bulk membership edit for one group
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GroupUpdate {
    #[serde(default)]
    pub add_users: Option<Vec<UserId>>,
    #[serde(default)]
    pub remove_users: Option<Vec<UserId>>,
}

impl GroupUpdate {
    pub fn add_users(&self) -> &[UserId] {
        self.add_users.as_deref().unwrap_or_default()
    }

    pub fn remove_users(&self) -> &[UserId] {
        self.remove_users.as_deref().unwrap_or_default()
    }

    /// Every user id referenced by this edit, additions first
    pub fn referenced_users(&self) -> impl Iterator<Item = UserId> + '_ {
        self.add_users()
            .iter()
            .chain(self.remove_users().iter())
            .copied()
    }
}
