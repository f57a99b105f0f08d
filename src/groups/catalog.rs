use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::cache::Cache;
use crate::db::Database;
use crate::error::GroupError;
use crate::groups::model::{CreateGroup, Group};
use crate::groups::naming::{self, slugify, validate_group_name};
use crate::groups::GroupCatalog;
use crate::hooks::{GroupEvent, HookBus};

pub(crate) fn group_key(name: &str) -> String {
    format!("group:{name}")
}

pub(crate) fn members_key(name: &str) -> String {
    format!("group:{name}:members")
}

pub(crate) fn owners_key(name: &str) -> String {
    format!("group:{name}:owners")
}

pub(crate) const VISIBLE_BY_MEMBER_COUNT: &str = "groups:visible:memberCount";
const VISIBLE_BY_CREATETIME: &str = "groups:visible:createtime";
const VISIBLE_BY_NAME: &str = "groups:visible:name";
const BY_CREATETIME: &str = "groups:createtime";
const SLUG_TO_NAME: &str = "groupslug:groupname";

fn membership_cache_key(uid: &str, name: &str) -> String {
    format!("{uid}:{name}")
}

pub(crate) fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// GroupCatalog over a `Database`, with membership flags cached per
/// `{uid}:{group}`.
pub struct StoreGroupCatalog {
    db: Arc<dyn Database>,
    cache: Arc<dyn Cache>,
    hooks: Arc<dyn HookBus>,
    banned_users_group: String,
    max_group_name_length: usize,
}

impl StoreGroupCatalog {
    pub fn new(
        db: Arc<dyn Database>,
        cache: Arc<dyn Cache>,
        hooks: Arc<dyn HookBus>,
        banned_users_group: impl Into<String>,
        max_group_name_length: usize,
    ) -> Self {
        Self {
            db,
            cache,
            hooks,
            banned_users_group: banned_users_group.into(),
            max_group_name_length,
        }
    }
}

#[async_trait]
impl GroupCatalog for StoreGroupCatalog {
    async fn exists(&self, names: &[String]) -> Result<Vec<bool>, GroupError> {
        let keys: Vec<String> = names.iter().map(|n| group_key(n)).collect();
        self.db.exists(&keys).await
    }

    async fn is_member_of_groups(
        &self,
        uid: &str,
        names: &[String],
    ) -> Result<Vec<bool>, GroupError> {
        let mut flags = vec![false; names.len()];
        let mut misses = Vec::new();
        for (i, name) in names.iter().enumerate() {
            match self.cache.get(&membership_cache_key(uid, name)) {
                Some(hit) => flags[i] = hit == "1",
                None => misses.push(i),
            }
        }

        if !misses.is_empty() {
            let keys: Vec<String> = misses.iter().map(|&i| members_key(&names[i])).collect();
            let found = self.db.is_member_of_sorted_sets(&keys, uid).await?;
            for (&i, is_member) in misses.iter().zip(found) {
                flags[i] = is_member;
                let value = if is_member { "1" } else { "0" };
                self.cache
                    .set(&membership_cache_key(uid, &names[i]), value.to_string());
            }
        }

        Ok(flags)
    }

    async fn create(&self, input: CreateGroup) -> Result<Group, GroupError> {
        validate_group_name(&input.name, self.max_group_name_length)?;

        let slug = slugify(&input.name);
        let taken = self.exists(std::slice::from_ref(&input.name)).await?;
        if taken.first().copied().unwrap_or(false) {
            return Err(GroupError::GroupAlreadyExists(input.name));
        }
        if !naming::is_privilege_group(&input.name)
            && self.db.get_object_field(SLUG_TO_NAME, &slug).await?.is_some()
        {
            return Err(GroupError::GroupAlreadyExists(input.name));
        }

        let now = now_ms();
        let group = Group {
            user_title: input.user_title.unwrap_or_else(|| input.name.clone()),
            user_title_enabled: true,
            name: input.name,
            slug,
            create_time: now,
            description: input.description,
            member_count: 0,
            hidden: input.hidden,
            system: input.system,
            private: input.private,
            disable_join_requests: input.disable_join_requests,
            disable_leave: input.disable_leave,
        };

        self.db.set_object(&group_key(&group.name), &group.to_fields()).await?;
        self.db
            .sorted_set_add_many(BY_CREATETIME, &[(now, group.name.clone())])
            .await?;
        self.db
            .set_object_field(SLUG_TO_NAME, &group.slug, &group.name)
            .await?;

        if !group.hidden && !group.system {
            self.db
                .sorted_set_add_many(VISIBLE_BY_CREATETIME, &[(now, group.name.clone())])
                .await?;
            self.db
                .sorted_set_add_many(VISIBLE_BY_MEMBER_COUNT, &[(0, group.name.clone())])
                .await?;
            self.db
                .sorted_set_add_many(
                    VISIBLE_BY_NAME,
                    &[(0, format!("{}:{}", group.name.to_lowercase(), group.name))],
                )
                .await?;
        }

        debug!(name = %group.name, hidden = group.hidden, "group created");
        if let Err(e) = self.hooks.fire(GroupEvent::Create {
            name: group.name.clone(),
            hidden: group.hidden,
        }) {
            warn!("[groups.create] hook failed for {}: {e}", group.name);
        }

        Ok(group)
    }

    async fn get_groups_fields(
        &self,
        names: &[String],
        fields: &[&str],
    ) -> Result<Vec<Option<Group>>, GroupError> {
        let keys: Vec<String> = names.iter().map(|n| group_key(n)).collect();
        let objects = self.db.get_objects_fields(&keys, fields).await?;
        Ok(objects.iter().map(Group::from_fields).collect())
    }

    fn clear_cache(&self, uid: &str, names: &[String]) {
        let keys: Vec<String> = names
            .iter()
            .map(|name| membership_cache_key(uid, name))
            .collect();
        self.cache.del(&keys);
    }

    fn is_privilege_group(&self, name: &str) -> bool {
        naming::is_privilege_group(name)
    }

    fn banned_users_group(&self) -> &str {
        &self.banned_users_group
    }
}
