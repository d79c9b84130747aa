//! Repository port for users, groups and memberships

use crate::{
    GroupCreate, GroupDetail, GroupId, GroupUpdate, Page, Result, User, UserCreate, UserDetail,
    UserId, UserUpdate,
};
use async_trait::async_trait;

/// All reads and writes against the roster store.
///
/// Every mutating call is atomic: either all of its row changes become
/// visible or none do. Referenced ids in request bodies are validated
/// before anything is written. Membership rows never outlive either of
/// their endpoints.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Users ordered by id, windowed by `page`
    async fn list_users(&self, page: Page) -> Result<Vec<User>>;

    async fn get_user(&self, id: UserId) -> Result<UserDetail>;

    /// Fails with `GroupIdNotFound` for the first unknown group id
    async fn create_user(&self, req: &UserCreate) -> Result<User>;

    /// Replaces both `username` and `number`
    async fn update_user(&self, id: UserId, req: &UserUpdate) -> Result<UserDetail>;

    /// Returns the user as it was before deletion
    async fn delete_user(&self, id: UserId) -> Result<User>;

    /// Groups ordered by id with their members, windowed by `page`
    async fn list_groups(&self, page: Page) -> Result<Vec<GroupDetail>>;

    async fn get_group(&self, id: GroupId) -> Result<GroupDetail>;

    /// Fails with `UserIdNotFound` for the first unknown user id
    async fn create_group(&self, req: &GroupCreate) -> Result<GroupDetail>;

    /// Applies additions then removals
    async fn update_group_members(&self, id: GroupId, req: &GroupUpdate) -> Result<GroupDetail>;

    /// Returns the group, members included, as it was before deletion
    async fn delete_group(&self, id: GroupId) -> Result<GroupDetail>;

    /// Idempotent; a second add leaves the membership set unchanged
    async fn add_membership(&self, group_id: GroupId, user_id: UserId) -> Result<GroupDetail>;

    /// Idempotent; removing a non-member is a no-op
    async fn remove_membership(&self, group_id: GroupId, user_id: UserId) -> Result<GroupDetail>;

    /// Storage liveness probe
    async fn ping(&self) -> Result<()>;
}
