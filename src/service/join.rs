use tracing::{debug, error, info};

use crate::error::GroupError;
use crate::groups::CreateGroup;
use crate::groups::catalog::{group_key, members_key, now_ms, owners_key};
use crate::hooks::GroupEvent;
use crate::service::{GroupService, dedupe};

impl GroupService {
    /// Make `uid` a member of every group in `group_names`.
    ///
    /// Missing groups are created hidden. Groups the user already belongs
    /// to are skipped. Administrators also become owners of the groups they
    /// join. The first time a user joins a titled group, that group list
    /// becomes their display title.
    ///
    /// There is no rollback: if a write fails, groups handled before the
    /// failure keep their new state.
    pub async fn join(&self, group_names: &[String], uid: &str) -> Result<(), GroupError> {
        if group_names.is_empty() {
            return Ok(());
        }
        if uid.is_empty() {
            return Err(GroupError::InvalidUid);
        }
        let group_names = dedupe(group_names);

        let (is_members, exists, is_admin) = tokio::try_join!(
            self.catalog.is_member_of_groups(uid, &group_names),
            self.catalog.exists(&group_names),
            self.users.is_administrator(uid),
        )?;

        let groups_to_create: Vec<String> = group_names
            .iter()
            .zip(&exists)
            .filter(|(name, exists)| !name.is_empty() && !**exists)
            .map(|(name, _)| name.clone())
            .collect();
        let groups_to_join: Vec<String> = group_names
            .iter()
            .zip(&is_members)
            .filter(|(_, is_member)| !**is_member)
            .map(|(name, _)| name.clone())
            .collect();

        if groups_to_join.is_empty() {
            debug!("[groups.join] uid {uid} already in all requested groups");
            return Ok(());
        }

        self.create_missing_groups(&groups_to_create).await?;

        let member_keys: Vec<String> = groups_to_join.iter().map(|n| members_key(n)).collect();
        let group_keys: Vec<String> = groups_to_join.iter().map(|n| group_key(n)).collect();
        let owner_keys: Vec<String> = groups_to_join.iter().map(|n| owners_key(n)).collect();

        let add_owner = async {
            if is_admin {
                self.db.sets_add(&owner_keys, uid).await
            } else {
                Ok(())
            }
        };
        tokio::try_join!(
            self.db.sorted_sets_add(&member_keys, now_ms(), uid),
            self.db.incr_object_field_by(&group_keys, "memberCount", 1),
            add_owner,
        )?;

        self.catalog.clear_cache(uid, &groups_to_join);
        self.cache.del(&member_keys);

        self.refresh_visible_ranking(&groups_to_join).await?;
        self.assign_default_title(&groups_to_join, uid).await?;

        info!("[groups.join] uid {uid} joined {} group(s)", groups_to_join.len());
        self.fire(GroupEvent::Join {
            group_names: groups_to_join,
            uid: uid.to_string(),
        });
        Ok(())
    }

    /// Join a single group.
    pub async fn join_one(&self, group_name: &str, uid: &str) -> Result<(), GroupError> {
        if group_name.is_empty() {
            return Err(GroupError::InvalidData);
        }
        self.join(&[group_name.to_string()], uid).await
    }

    /// Create each group as hidden, one at a time. Losing a creation race
    /// to another joiner is fine; any other failure stops the loop.
    async fn create_missing_groups(&self, names: &[String]) -> Result<(), GroupError> {
        for name in names {
            match self.catalog.create(CreateGroup::hidden(name.clone())).await {
                Ok(_) => {}
                Err(GroupError::GroupAlreadyExists(_)) => {
                    debug!("[groups.join] group ({name}) was created concurrently");
                }
                Err(e) => {
                    error!("[groups.join] Could not create new hidden group ({name}): {e:?}");
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    /// Set the user's display title to the titled groups among `names`,
    /// unless a title is already set. An empty string counts as set.
    async fn assign_default_title(&self, names: &[String], uid: &str) -> Result<(), GroupError> {
        let titled = self.titled_groups(names);
        if titled.is_empty() {
            return Ok(());
        }

        let current = self
            .db
            .get_object_field(&format!("user:{uid}"), "groupTitle")
            .await?;
        if current.is_some() {
            return Ok(());
        }

        let title = serde_json::to_string(&titled)?;
        self.users.set_user_field(uid, "groupTitle", &title).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use tokio::sync::broadcast::error::TryRecvError;

    use crate::cache::MemoryCache;
    use crate::config::GroupsConfig;
    use crate::db::{Database, KvDatabase};
    use crate::error::GroupError;
    use crate::groups::{CreateGroup, Group, GroupCatalog, StoreGroupCatalog};
    use crate::hooks::{BroadcastHookBus, GroupEvent, HookBus, HookError};
    use crate::kv::MemoryStore;
    use crate::service::GroupService;
    use crate::service::testing::*;
    use crate::users::DbUserDirectory;

    #[tokio::test]
    async fn test_join_creates_missing_group_hidden() {
        let h = harness();
        let mut rx = h.hooks.subscribe();

        h.svc.join_one("new-team", "u42").await.unwrap();

        let groups = h
            .svc
            .catalog()
            .get_groups_fields(&names(&["new-team"]), &[])
            .await
            .unwrap();
        let group = groups[0].as_ref().unwrap();
        assert!(group.hidden);
        assert_eq!(group.member_count, 1);

        let members = h.svc.members("new-team").await.unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].0, "u42");
        assert!(!h.db.is_set_member("group:new-team:owners", "u42").await.unwrap());
        assert_eq!(
            group_title(&h.db, "u42").await.as_deref(),
            Some(r#"["new-team"]"#)
        );

        // Hidden groups never enter the ranking.
        assert!(h.svc.visible_groups_by_member_count(10).await.unwrap().is_empty());

        // Creation fires first, then the join.
        assert_eq!(rx.recv().await.unwrap().hook(), "action:group.create");
        assert_eq!(
            rx.recv().await.unwrap(),
            GroupEvent::Join {
                group_names: names(&["new-team"]),
                uid: "u42".into(),
            }
        );
    }

    #[tokio::test]
    async fn test_empty_list_is_noop_even_without_uid() {
        let h = harness();
        let mut rx = h.hooks.subscribe();
        h.svc.join(&[], "").await.unwrap();
        h.svc.join(&[], "u1").await.unwrap();
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn test_missing_uid_is_rejected() {
        let h = harness();
        let err = h.svc.join(&names(&["staff"]), "").await.unwrap_err();
        assert!(matches!(err, GroupError::InvalidUid));
        assert_eq!(h.svc.catalog().exists(&names(&["staff"])).await.unwrap(), vec![false]);
    }

    #[tokio::test]
    async fn test_join_one_rejects_empty_name() {
        let h = harness();
        let err = h.svc.join_one("", "u1").await.unwrap_err();
        assert!(matches!(err, GroupError::InvalidData));
    }

    #[tokio::test]
    async fn test_rejoin_is_noop() {
        let h = harness();
        h.svc.join_one("staff", "u1").await.unwrap();

        let mut rx = h.hooks.subscribe();
        h.svc.join_one("staff", "u1").await.unwrap();

        assert_eq!(member_count(&h.db, "staff").await.as_deref(), Some("1"));
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn test_partial_rejoin_only_reports_new_groups() {
        let h = harness();
        h.svc.join_one("staff", "u1").await.unwrap();

        let mut rx = h.hooks.subscribe();
        h.svc.join(&names(&["staff", "poets", "staff"]), "u1").await.unwrap();

        assert_eq!(member_count(&h.db, "staff").await.as_deref(), Some("1"));
        assert_eq!(member_count(&h.db, "poets").await.as_deref(), Some("1"));

        let mut last = None;
        while let Ok(event) = rx.try_recv() {
            last = Some(event);
        }
        assert_eq!(
            last,
            Some(GroupEvent::Join {
                group_names: names(&["poets"]),
                uid: "u1".into(),
            })
        );
    }

    #[tokio::test]
    async fn test_visible_group_ranking_tracks_member_count() {
        let h = harness();
        h.svc.catalog().create(CreateGroup::new("gamers")).await.unwrap();
        h.svc.catalog().create(CreateGroup::new("poets")).await.unwrap();

        h.svc.join_one("gamers", "u1").await.unwrap();
        h.svc.join_one("gamers", "u2").await.unwrap();
        h.svc.join_one("poets", "u3").await.unwrap();

        assert_eq!(
            h.svc.visible_groups_by_member_count(10).await.unwrap(),
            vec![("gamers".to_string(), 2), ("poets".to_string(), 1)]
        );
    }

    #[tokio::test]
    async fn test_ranking_skips_uncreated_empty_name() {
        let h = harness();
        h.svc.catalog().create(CreateGroup::new("staff")).await.unwrap();

        h.svc.join(&names(&["", "staff"]), "u1").await.unwrap();

        assert_eq!(
            h.svc.visible_groups_by_member_count(10).await.unwrap(),
            vec![("staff".to_string(), 1)]
        );
    }

    #[tokio::test]
    async fn test_ranking_skips_group_blocked_by_slug() {
        let h = harness();
        h.svc.catalog().create(CreateGroup::new("Staff Room")).await.unwrap();

        // "staff room" shares the slug, so it is never created.
        h.svc.join_one("staff room", "u1").await.unwrap();

        assert_eq!(
            h.svc.visible_groups_by_member_count(10).await.unwrap(),
            vec![("Staff Room".to_string(), 0)]
        );
    }

    #[tokio::test]
    async fn test_admin_becomes_owner() {
        let h = harness();
        h.db.sorted_sets_add(&names(&["group:administrators:members"]), 1, "root")
            .await
            .unwrap();

        h.svc.join(&names(&["staff", "poets"]), "root").await.unwrap();
        h.svc.join_one("staff", "u2").await.unwrap();

        assert!(h.db.is_set_member("group:staff:owners", "root").await.unwrap());
        assert!(h.db.is_set_member("group:poets:owners", "root").await.unwrap());
        assert!(!h.db.is_set_member("group:staff:owners", "u2").await.unwrap());
    }

    #[tokio::test]
    async fn test_title_is_set_only_once() {
        let h = harness();
        h.svc.join(&names(&["registered-users", "staff"]), "u1").await.unwrap();
        assert_eq!(group_title(&h.db, "u1").await.as_deref(), Some(r#"["staff"]"#));

        h.svc.join_one("poets", "u1").await.unwrap();
        assert_eq!(group_title(&h.db, "u1").await.as_deref(), Some(r#"["staff"]"#));
    }

    #[tokio::test]
    async fn test_empty_title_counts_as_set() {
        let h = harness();
        h.db.set_object_field("user:u1", "groupTitle", "").await.unwrap();

        h.svc.join_one("staff", "u1").await.unwrap();
        assert_eq!(group_title(&h.db, "u1").await.as_deref(), Some(""));
    }

    #[tokio::test]
    async fn test_system_and_privilege_groups_never_become_titles() {
        let h = harness();
        h.svc
            .join(
                &names(&["registered-users", "banned-users", "cid:1:privileges:find"]),
                "u1",
            )
            .await
            .unwrap();
        assert_eq!(group_title(&h.db, "u1").await, None);
    }

    #[tokio::test]
    async fn test_join_invalidates_membership_cache() {
        let h = harness();
        let staff = names(&["staff"]);
        // Prime the cache with "not a member".
        assert_eq!(
            h.svc.catalog().is_member_of_groups("u1", &staff).await.unwrap(),
            vec![false]
        );

        h.svc.join(&staff, "u1").await.unwrap();
        assert_eq!(
            h.svc.catalog().is_member_of_groups("u1", &staff).await.unwrap(),
            vec![true]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_joins_keep_count_in_step() {
        let h = harness();
        h.svc.catalog().create(CreateGroup::new("crowd")).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..20 {
            let svc = Arc::clone(&h.svc);
            handles.push(tokio::spawn(async move {
                svc.join_one("crowd", &format!("u{i}")).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(member_count(&h.db, "crowd").await.as_deref(), Some("20"));
        assert_eq!(h.svc.members("crowd").await.unwrap().len(), 20);
    }

    // ── Catalog doubles ──

    /// Reports every group as missing, as if another joiner created it
    /// between the existence check and the create call.
    struct RacingCatalog {
        inner: StoreGroupCatalog,
    }

    /// Fails to create one named group and records every create attempt.
    struct FailingCatalog {
        inner: StoreGroupCatalog,
        fail_on: String,
        attempts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl GroupCatalog for RacingCatalog {
        async fn exists(&self, names: &[String]) -> Result<Vec<bool>, GroupError> {
            Ok(vec![false; names.len()])
        }
        async fn is_member_of_groups(&self, uid: &str, names: &[String]) -> Result<Vec<bool>, GroupError> {
            self.inner.is_member_of_groups(uid, names).await
        }
        async fn create(&self, input: CreateGroup) -> Result<Group, GroupError> {
            self.inner.create(input).await
        }
        async fn get_groups_fields(&self, names: &[String], fields: &[&str]) -> Result<Vec<Option<Group>>, GroupError> {
            self.inner.get_groups_fields(names, fields).await
        }
        fn clear_cache(&self, uid: &str, names: &[String]) {
            self.inner.clear_cache(uid, names)
        }
        fn is_privilege_group(&self, name: &str) -> bool {
            self.inner.is_privilege_group(name)
        }
        fn banned_users_group(&self) -> &str {
            self.inner.banned_users_group()
        }
    }

    #[async_trait]
    impl GroupCatalog for FailingCatalog {
        async fn exists(&self, names: &[String]) -> Result<Vec<bool>, GroupError> {
            self.inner.exists(names).await
        }
        async fn is_member_of_groups(&self, uid: &str, names: &[String]) -> Result<Vec<bool>, GroupError> {
            self.inner.is_member_of_groups(uid, names).await
        }
        async fn create(&self, input: CreateGroup) -> Result<Group, GroupError> {
            self.attempts.lock().unwrap().push(input.name.clone());
            if input.name == self.fail_on {
                return Err(GroupError::Storage("write refused".into()));
            }
            self.inner.create(input).await
        }
        async fn get_groups_fields(&self, names: &[String], fields: &[&str]) -> Result<Vec<Option<Group>>, GroupError> {
            self.inner.get_groups_fields(names, fields).await
        }
        fn clear_cache(&self, uid: &str, names: &[String]) {
            self.inner.clear_cache(uid, names)
        }
        fn is_privilege_group(&self, name: &str) -> bool {
            self.inner.is_privilege_group(name)
        }
        fn banned_users_group(&self) -> &str {
            self.inner.banned_users_group()
        }
    }

    fn service_with<C, F>(make: F) -> (GroupService, Arc<dyn Database>, Arc<C>)
    where
        C: GroupCatalog + 'static,
        F: FnOnce(StoreGroupCatalog) -> C,
    {
        let config = GroupsConfig::default();
        let db: Arc<dyn Database> = Arc::new(KvDatabase::new(Arc::new(MemoryStore::new())));
        let cache = Arc::new(MemoryCache::new(60));
        let hooks = Arc::new(BroadcastHookBus::new(16));
        let inner = StoreGroupCatalog::new(
            Arc::clone(&db),
            cache.clone(),
            hooks.clone(),
            "banned-users",
            255,
        );
        let catalog = Arc::new(make(inner));
        let users = Arc::new(DbUserDirectory::new(Arc::clone(&db), "administrators"));
        let svc = GroupService::new(Arc::clone(&db), catalog.clone(), users, cache, hooks, &config);
        (svc, db, catalog)
    }

    #[tokio::test]
    async fn test_creation_race_does_not_fail_join() {
        let (svc, db, catalog) = service_with(|inner| RacingCatalog { inner });
        catalog.inner.create(CreateGroup::hidden("new-team")).await.unwrap();

        svc.join_one("new-team", "u42").await.unwrap();
        assert_eq!(member_count(&db, "new-team").await.as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn test_creation_failure_aborts_join() {
        let (svc, db, catalog) = service_with(|inner| FailingCatalog {
            inner,
            fail_on: "b".into(),
            attempts: Mutex::new(Vec::new()),
        });

        let err = svc.join(&names(&["a", "b", "c"]), "u1").await.unwrap_err();
        assert!(matches!(err, GroupError::Storage(_)));

        // Serial creation: "c" was never attempted.
        assert_eq!(*catalog.attempts.lock().unwrap(), names(&["a", "b"]));
        // Nothing was joined.
        assert_eq!(member_count(&db, "a").await.as_deref(), Some("0"));
        assert!(svc.members("a").await.unwrap().is_empty());
    }

    struct FailingHooks;

    impl HookBus for FailingHooks {
        fn fire(&self, _event: GroupEvent) -> Result<(), HookError> {
            Err(HookError::Backend("observer queue closed".into()))
        }
    }

    #[tokio::test]
    async fn test_hook_failure_does_not_fail_join() {
        let svc = GroupService::with_store(
            Arc::new(MemoryStore::new()),
            Arc::new(FailingHooks),
            &GroupsConfig::default(),
        );

        svc.join_one("new-team", "u42").await.unwrap();

        assert_eq!(member_count(&svc.db, "new-team").await.as_deref(), Some("1"));
        assert_eq!(svc.members("new-team").await.unwrap().len(), 1);
    }
}
