use std::sync::Arc;

use async_trait::async_trait;

use crate::db::Database;
use crate::error::GroupError;

/// User account capabilities the group workflows need.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn is_administrator(&self, uid: &str) -> Result<bool, GroupError>;

    async fn set_user_field(&self, uid: &str, field: &str, value: &str) -> Result<(), GroupError>;
}

/// Users stored as `user:{uid}` objects in the same database as groups.
/// Administrators are the members of the configured administrators group.
pub struct DbUserDirectory {
    db: Arc<dyn Database>,
    administrators_group: String,
}

impl DbUserDirectory {
    pub fn new(db: Arc<dyn Database>, administrators_group: impl Into<String>) -> Self {
        Self {
            db,
            administrators_group: administrators_group.into(),
        }
    }
}

#[async_trait]
impl UserDirectory for DbUserDirectory {
    async fn is_administrator(&self, uid: &str) -> Result<bool, GroupError> {
        let key = format!("group:{}:members", self.administrators_group);
        let flags = self.db.is_member_of_sorted_sets(&[key], uid).await?;
        Ok(flags.first().copied().unwrap_or(false))
    }

    async fn set_user_field(&self, uid: &str, field: &str, value: &str) -> Result<(), GroupError> {
        self.db.set_object_field(&format!("user:{uid}"), field, value).await
    }
}
