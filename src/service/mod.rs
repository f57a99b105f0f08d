pub mod join;
pub mod leave;

use std::collections::HashSet;
use std::sync::Arc;

use tracing::warn;

use crate::cache::{Cache, MemoryCache};
use crate::config::GroupsConfig;
use crate::db::{Database, KvDatabase};
use crate::error::GroupError;
use crate::groups::catalog::{VISIBLE_BY_MEMBER_COUNT, members_key};
use crate::groups::{GroupCatalog, StoreGroupCatalog};
use crate::hooks::{BroadcastHookBus, GroupEvent, HookBus};
use crate::kv::{KVStore, RedbStore};
use crate::users::{DbUserDirectory, UserDirectory};

/// Turn loosely typed caller input into a list of group names.
///
/// A string becomes a one-element list and an array of strings is taken
/// as-is. Null, `false`, the empty string and anything else is rejected
/// with `InvalidData`. An empty array is valid and means "nothing to do".
pub fn parse_group_names(value: &serde_json::Value) -> Result<Vec<String>, GroupError> {
    match value {
        serde_json::Value::String(name) if !name.is_empty() => Ok(vec![name.clone()]),
        serde_json::Value::Array(items) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(str::to_string)
                    .ok_or(GroupError::InvalidData)
            })
            .collect(),
        _ => Err(GroupError::InvalidData),
    }
}

/// Keep the first occurrence of each name.
fn dedupe(names: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    names
        .iter()
        .filter(|name| seen.insert(name.as_str()))
        .cloned()
        .collect()
}

/// Group membership workflows: join, leave and the visible ranking.
///
/// Every collaborator is injected, so hosts can back any of them with
/// their own systems. `with_store` wires the database-backed defaults.
pub struct GroupService {
    pub(crate) db: Arc<dyn Database>,
    pub(crate) catalog: Arc<dyn GroupCatalog>,
    pub(crate) users: Arc<dyn UserDirectory>,
    pub(crate) cache: Arc<dyn Cache>,
    pub(crate) hooks: Arc<dyn HookBus>,
    pub(crate) untitled_groups: Vec<String>,
}

impl GroupService {
    pub fn new(
        db: Arc<dyn Database>,
        catalog: Arc<dyn GroupCatalog>,
        users: Arc<dyn UserDirectory>,
        cache: Arc<dyn Cache>,
        hooks: Arc<dyn HookBus>,
        config: &GroupsConfig,
    ) -> Self {
        Self {
            db,
            catalog,
            users,
            cache,
            hooks,
            untitled_groups: config.untitled_groups.clone(),
        }
    }

    /// Build the default stack on top of a key-value store.
    pub fn with_store(kv: Arc<dyn KVStore>, hooks: Arc<dyn HookBus>, config: &GroupsConfig) -> Self {
        let db: Arc<dyn Database> = Arc::new(KvDatabase::new(kv));
        let cache: Arc<dyn Cache> = Arc::new(MemoryCache::new(config.cache_ttl_secs));
        let catalog = Arc::new(StoreGroupCatalog::new(
            Arc::clone(&db),
            Arc::clone(&cache),
            Arc::clone(&hooks),
            config.banned_users_group.clone(),
            config.max_group_name_length,
        ));
        let users = Arc::new(DbUserDirectory::new(
            Arc::clone(&db),
            config.administrators_group.clone(),
        ));
        Self::new(db, catalog, users, cache, hooks, config)
    }

    /// Open the redb database at `config.resolve_db_path()` and build the
    /// default stack on it, firing hooks on a broadcast bus sized by
    /// `config.hook_channel_capacity`. The bus is returned for subscribing.
    pub fn open(config: &GroupsConfig) -> Result<(Self, Arc<BroadcastHookBus>), GroupError> {
        let kv = RedbStore::open(&config.resolve_db_path())?;
        let hooks = Arc::new(BroadcastHookBus::new(config.hook_channel_capacity));
        let svc = Self::with_store(Arc::new(kv), hooks.clone(), config);
        Ok((svc, hooks))
    }

    /// Group catalog this service works against.
    pub fn catalog(&self) -> &Arc<dyn GroupCatalog> {
        &self.catalog
    }

    /// Members of a group with their join times, earliest first.
    pub async fn members(&self, name: &str) -> Result<Vec<(String, i64)>, GroupError> {
        self.db.sorted_set_range_with_scores(&members_key(name)).await
    }

    /// Visible groups by member count, largest first.
    pub async fn visible_groups_by_member_count(
        &self,
        limit: usize,
    ) -> Result<Vec<(String, i64)>, GroupError> {
        self.db
            .sorted_set_rev_range_with_scores(VISIBLE_BY_MEMBER_COUNT, limit)
            .await
    }

    /// Re-rank the non-hidden groups among `names` by their current member count.
    pub(crate) async fn refresh_visible_ranking(&self, names: &[String]) -> Result<(), GroupError> {
        let groups = self
            .catalog
            .get_groups_fields(names, &["name", "hidden", "memberCount"])
            .await?;
        // A record without a name was never created (only counted), so it
        // must not enter the ranking.
        let entries: Vec<(i64, String)> = names
            .iter()
            .zip(groups)
            .filter_map(|(name, group)| {
                let group = group?;
                (!group.name.is_empty() && !group.hidden).then(|| (group.member_count, name.clone()))
            })
            .collect();
        if entries.is_empty() {
            return Ok(());
        }
        self.db
            .sorted_set_add_many(VISIBLE_BY_MEMBER_COUNT, &entries)
            .await
    }

    /// Groups among `names` that may appear in a user's display title.
    pub(crate) fn titled_groups<'a>(&self, names: &'a [String]) -> Vec<&'a String> {
        let banned = self.catalog.banned_users_group();
        names
            .iter()
            .filter(|name| {
                !self.untitled_groups.contains(name)
                    && name.as_str() != banned
                    && !self.catalog.is_privilege_group(name)
            })
            .collect()
    }

    /// Fire a hook event. Failures are logged and otherwise ignored.
    pub(crate) fn fire(&self, event: GroupEvent) {
        let hook = event.hook();
        if let Err(e) = self.hooks.fire(event) {
            warn!("{hook} hook failed: {e}");
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::groups::CreateGroup;
    use serde_json::json;

    #[test]
    fn test_parse_group_names() {
        assert_eq!(parse_group_names(&json!("staff")).unwrap(), vec!["staff"]);
        assert_eq!(parse_group_names(&json!(["a", "b"])).unwrap(), vec!["a", "b"]);
        assert!(parse_group_names(&json!([])).unwrap().is_empty());

        for bad in [json!(null), json!(""), json!(false), json!(3), json!(["a", 1])] {
            assert!(matches!(parse_group_names(&bad), Err(GroupError::InvalidData)));
        }
    }

    #[test]
    fn test_dedupe_keeps_first_order() {
        assert_eq!(dedupe(&names(&["b", "a", "b", "c", "a"])), names(&["b", "a", "c"]));
    }

    #[tokio::test]
    async fn test_open_uses_configured_path() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let config = GroupsConfig::from_args(&[format!("--db={}", tmp.path().display())]);

        let (svc, hooks) = GroupService::open(&config).unwrap();
        let mut rx = hooks.subscribe();
        svc.catalog().create(CreateGroup::new("gamers")).await.unwrap();
        assert_eq!(
            svc.visible_groups_by_member_count(10).await.unwrap(),
            vec![("gamers".to_string(), 0)]
        );
        assert_eq!(rx.recv().await.unwrap().hook(), "action:group.create");
    }

    #[tokio::test]
    async fn test_open_sizes_hook_bus_from_config() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let mut config = GroupsConfig::from_args(&[format!("--db={}", tmp.path().display())]);
        config.hook_channel_capacity = 1;

        let (svc, hooks) = GroupService::open(&config).unwrap();
        let mut rx = hooks.subscribe();
        svc.catalog().create(CreateGroup::new("gamers")).await.unwrap();
        svc.catalog().create(CreateGroup::new("poets")).await.unwrap();

        // A one-slot channel keeps only the newest event.
        assert!(matches!(
            rx.recv().await,
            Err(tokio::sync::broadcast::error::RecvError::Lagged(1))
        ));
        assert_eq!(rx.recv().await.unwrap().hook(), "action:group.create");
    }

    #[test]
    fn test_titled_groups_filters_system_and_privilege_groups() {
        let h = harness();
        let input = names(&[
            "registered-users",
            "staff",
            "banned-users",
            "cid:1:privileges:find",
            "verified-users",
            "poets",
        ]);
        let titled: Vec<&str> = h.svc.titled_groups(&input).into_iter().map(String::as_str).collect();
        assert_eq!(titled, vec!["staff", "poets"]);
    }
}
