use tracing::{debug, info};

use crate::error::GroupError;
use crate::groups::catalog::{group_key, members_key, owners_key};
use crate::hooks::GroupEvent;
use crate::service::{GroupService, dedupe};

/// Parse a stored `groupTitle`. Titles are JSON lists of group names; a
/// bare non-empty string from older data is a one-element list.
fn parse_title(raw: &str) -> Vec<String> {
    match serde_json::from_str::<Vec<String>>(raw) {
        Ok(list) => list,
        Err(_) if !raw.is_empty() => vec![raw.to_string()],
        Err(_) => Vec::new(),
    }
}

impl GroupService {
    /// Remove `uid` from every group in `group_names` it belongs to.
    ///
    /// Ownership goes with membership. Groups are never deleted, even when
    /// their last member leaves.
    pub async fn leave(&self, group_names: &[String], uid: &str) -> Result<(), GroupError> {
        if group_names.is_empty() {
            return Ok(());
        }
        if uid.is_empty() {
            return Err(GroupError::InvalidUid);
        }
        let group_names = dedupe(group_names);

        let is_members = self.catalog.is_member_of_groups(uid, &group_names).await?;
        let groups_to_leave: Vec<String> = group_names
            .into_iter()
            .zip(is_members)
            .filter_map(|(name, is_member)| is_member.then_some(name))
            .collect();

        if groups_to_leave.is_empty() {
            debug!("[groups.leave] uid {uid} is in none of the requested groups");
            return Ok(());
        }

        let member_keys: Vec<String> = groups_to_leave.iter().map(|n| members_key(n)).collect();
        let owner_keys: Vec<String> = groups_to_leave.iter().map(|n| owners_key(n)).collect();
        let group_keys: Vec<String> = groups_to_leave.iter().map(|n| group_key(n)).collect();

        tokio::try_join!(
            self.db.sorted_sets_remove(&member_keys, uid),
            self.db.sets_remove(&owner_keys, uid),
            self.db.incr_object_field_by(&group_keys, "memberCount", -1),
        )?;

        self.catalog.clear_cache(uid, &groups_to_leave);
        self.cache.del(&member_keys);

        self.refresh_visible_ranking(&groups_to_leave).await?;
        self.clear_group_title(&groups_to_leave, uid).await?;

        info!("[groups.leave] uid {uid} left {} group(s)", groups_to_leave.len());
        self.fire(GroupEvent::Leave {
            group_names: groups_to_leave,
            uid: uid.to_string(),
        });
        Ok(())
    }

    /// Drop left groups from the user's title. A title that ends up empty
    /// is removed, so the next join can assign a fresh one.
    async fn clear_group_title(&self, names: &[String], uid: &str) -> Result<(), GroupError> {
        let titled = self.titled_groups(names);
        if titled.is_empty() {
            return Ok(());
        }

        let user_key = format!("user:{uid}");
        let Some(raw) = self.db.get_object_field(&user_key, "groupTitle").await? else {
            return Ok(());
        };
        let current = parse_title(&raw);
        let remaining: Vec<&String> = current.iter().filter(|t| !titled.contains(t)).collect();
        if remaining.len() == current.len() {
            return Ok(());
        }

        if remaining.is_empty() {
            self.db.delete_object_field(&user_key, "groupTitle").await
        } else {
            let title = serde_json::to_string(&remaining)?;
            self.users.set_user_field(uid, "groupTitle", &title).await
        }
    }
}
