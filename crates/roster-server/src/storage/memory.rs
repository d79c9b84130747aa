//! In-memory store (arena of entities by id plus a set of membership pairs)

use async_trait::async_trait;
use roster_core::{
    ConflictField, GroupCreate, GroupDetail, GroupId, GroupSummary, GroupUpdate, Page,
    Repository, Result, RosterError, User, UserCreate, UserDetail, UserId, UserUpdate,
};
use std::collections::{BTreeMap, BTreeSet};
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Non-persistent repository with the same contract as the SQLite one.
///
/// One lock guards all three tables, so every operation sees and leaves a
/// consistent snapshot.
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

#[derive(Default)]
struct Tables {
    users: BTreeMap<UserId, User>,
    groups: BTreeMap<GroupId, GroupSummary>,
    /// (group_id, user_id), so a group's members are a contiguous range
    memberships: BTreeSet<(GroupId, UserId)>,
    last_user_id: UserId,
    last_group_id: GroupId,
}

impl Tables {
    fn user_detail(&self, id: UserId) -> Result<UserDetail> {
        let user = self.users.get(&id).cloned().ok_or(RosterError::UserNotFound)?;
        let groups = self
            .memberships
            .iter()
            .filter(|(_, user_id)| *user_id == id)
            .filter_map(|(group_id, _)| self.groups.get(group_id).cloned())
            .collect();
        Ok(UserDetail { user, groups })
    }

    fn group_detail(&self, id: GroupId) -> Result<GroupDetail> {
        let group = self.groups.get(&id).ok_or(RosterError::GroupNotFound)?;
        let users = self
            .memberships
            .range((id, UserId::MIN)..=(id, UserId::MAX))
            .filter_map(|(_, user_id)| self.users.get(user_id).cloned())
            .collect();
        Ok(GroupDetail {
            id: group.id,
            name: group.name.clone(),
            users,
        })
    }

    fn check_user_unique(
        &self,
        except: Option<UserId>,
        username: &str,
        number: Option<i64>,
    ) -> Result<()> {
        for user in self.users.values().filter(|u| Some(u.id) != except) {
            if user.username == username {
                return Err(RosterError::Conflict(ConflictField::Username));
            }
            if number.is_some() && user.number == number {
                return Err(RosterError::Conflict(ConflictField::Number));
            }
        }
        Ok(())
    }

    fn require_users(&self, ids: impl IntoIterator<Item = UserId>) -> Result<()> {
        match ids.into_iter().find(|id| !self.users.contains_key(id)) {
            Some(missing) => Err(RosterError::UserIdNotFound(missing)),
            None => Ok(()),
        }
    }

    fn require_groups(&self, ids: impl IntoIterator<Item = GroupId>) -> Result<()> {
        match ids.into_iter().find(|id| !self.groups.contains_key(id)) {
            Some(missing) => Err(RosterError::GroupIdNotFound(missing)),
            None => Ok(()),
        }
    }

    fn require_pair(&self, group_id: GroupId, user_id: UserId) -> Result<()> {
        if !self.groups.contains_key(&group_id) {
            return Err(RosterError::GroupNotFound);
        }
        if !self.users.contains_key(&user_id) {
            return Err(RosterError::UserNotFound);
        }
        Ok(())
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Repository for MemoryStore {
    async fn list_users(&self, page: Page) -> Result<Vec<User>> {
        debug!("Listing users: skip={}, limit={}", page.skip, page.limit);
        let tables = self.tables.read().await;
        Ok(page.apply(tables.users.values().cloned()))
    }

    async fn get_user(&self, id: UserId) -> Result<UserDetail> {
        self.tables.read().await.user_detail(id)
    }

    async fn create_user(&self, req: &UserCreate) -> Result<User> {
        let mut tables = self.tables.write().await;

        tables.require_groups(req.group_ids().iter().copied())?;
        tables.check_user_unique(None, &req.username, req.number)?;

        tables.last_user_id += 1;
        let user = User {
            id: tables.last_user_id,
            username: req.username.clone(),
            number: req.number,
        };
        tables.users.insert(user.id, user.clone());
        for &group_id in req.group_ids() {
            tables.memberships.insert((group_id, user.id));
        }

        info!(
            "Created user: id={}, username={}, groups={:?}",
            user.id,
            user.username,
            req.group_ids()
        );

        Ok(user)
    }

    async fn update_user(&self, id: UserId, req: &UserUpdate) -> Result<UserDetail> {
        let mut tables = self.tables.write().await;

        if !tables.users.contains_key(&id) {
            return Err(RosterError::UserNotFound);
        }
        tables.check_user_unique(Some(id), &req.username, req.number)?;

        if let Some(user) = tables.users.get_mut(&id) {
            user.username = req.username.clone();
            user.number = req.number;
        }

        info!("Updated user: id={}, username={}", id, req.username);

        tables.user_detail(id)
    }

    async fn delete_user(&self, id: UserId) -> Result<User> {
        let mut tables = self.tables.write().await;

        let user = tables.users.remove(&id).ok_or(RosterError::UserNotFound)?;
        tables.memberships.retain(|(_, user_id)| *user_id != id);

        info!("Deleted user: id={}", id);

        Ok(user)
    }

    async fn list_groups(&self, page: Page) -> Result<Vec<GroupDetail>> {
        debug!("Listing groups: skip={}, limit={}", page.skip, page.limit);
        let tables = self.tables.read().await;
        page.apply(tables.groups.keys())
            .into_iter()
            .map(|id| tables.group_detail(*id))
            .collect()
    }

    async fn get_group(&self, id: GroupId) -> Result<GroupDetail> {
        self.tables.read().await.group_detail(id)
    }

    async fn create_group(&self, req: &GroupCreate) -> Result<GroupDetail> {
        let mut tables = self.tables.write().await;

        tables.require_users(req.user_ids().iter().copied())?;
        if tables.groups.values().any(|g| g.name == req.name) {
            return Err(RosterError::Conflict(ConflictField::GroupName));
        }

        tables.last_group_id += 1;
        let id = tables.last_group_id;
        tables.groups.insert(
            id,
            GroupSummary {
                id,
                name: req.name.clone(),
            },
        );
        for &user_id in req.user_ids() {
            tables.memberships.insert((id, user_id));
        }

        info!(
            "Created group: id={}, name={}, users={:?}",
            id,
            req.name,
            req.user_ids()
        );

        tables.group_detail(id)
    }

    async fn update_group_members(&self, id: GroupId, req: &GroupUpdate) -> Result<GroupDetail> {
        let mut tables = self.tables.write().await;

        if !tables.groups.contains_key(&id) {
            return Err(RosterError::GroupNotFound);
        }
        tables.require_users(req.referenced_users())?;

        for &user_id in req.add_users() {
            tables.memberships.insert((id, user_id));
        }
        for user_id in req.remove_users() {
            tables.memberships.remove(&(id, *user_id));
        }

        info!(
            "Updated group members: id={}, added={:?}, removed={:?}",
            id,
            req.add_users(),
            req.remove_users()
        );

        tables.group_detail(id)
    }

    async fn delete_group(&self, id: GroupId) -> Result<GroupDetail> {
        let mut tables = self.tables.write().await;

        let snapshot = tables.group_detail(id)?;
        tables.groups.remove(&id);
        tables.memberships.retain(|(group_id, _)| *group_id != id);

        info!(
            "Deleted group: id={}, members={}",
            id,
            snapshot.users_count()
        );

        Ok(snapshot)
    }

    async fn add_membership(&self, group_id: GroupId, user_id: UserId) -> Result<GroupDetail> {
        let mut tables = self.tables.write().await;

        tables.require_pair(group_id, user_id)?;
        if tables.memberships.insert((group_id, user_id)) {
            info!("Added user {} to group {}", user_id, group_id);
        } else {
            debug!("User {} already in group {}", user_id, group_id);
        }

        tables.group_detail(group_id)
    }

    async fn remove_membership(&self, group_id: GroupId, user_id: UserId) -> Result<GroupDetail> {
        let mut tables = self.tables.write().await;

        tables.require_pair(group_id, user_id)?;
        if tables.memberships.remove(&(group_id, user_id)) {
            info!("Removed user {} from group {}", user_id, group_id);
        } else {
            debug!("User {} was not in group {}", user_id, group_id);
        }

        tables.group_detail(group_id)
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
