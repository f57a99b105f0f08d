//! Group records and the catalog capability around them.

pub mod catalog;
pub mod model;
pub mod naming;

use async_trait::async_trait;

use crate::error::GroupError;

pub use catalog::StoreGroupCatalog;
pub use model::{CreateGroup, Group};
pub use naming::{is_privilege_group, slugify};

/// Group existence, membership and creation, as the join and leave
/// workflows consume them. Hosts with their own group storage implement
/// this; `StoreGroupCatalog` is the database-backed default.
#[async_trait]
pub trait GroupCatalog: Send + Sync {
    /// For each name, whether the group exists.
    async fn exists(&self, names: &[String]) -> Result<Vec<bool>, GroupError>;

    /// For each name, whether `uid` is a member.
    async fn is_member_of_groups(&self, uid: &str, names: &[String])
        -> Result<Vec<bool>, GroupError>;

    /// Create a group. Fails with `GroupAlreadyExists` if the name or its
    /// slug is taken.
    async fn create(&self, input: CreateGroup) -> Result<Group, GroupError>;

    /// Fetch `fields` of each group; missing groups yield None.
    async fn get_groups_fields(&self, names: &[String], fields: &[&str])
        -> Result<Vec<Option<Group>>, GroupError>;

    /// Drop cached membership state for `uid` in each of `names`.
    fn clear_cache(&self, uid: &str, names: &[String]);

    fn is_privilege_group(&self, name: &str) -> bool;

    /// Name of the banned-users group.
    fn banned_users_group(&self) -> &str;
}
