use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A group record, stored as the `group:{name}` object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub name: String,
    pub slug: String,
    /// Creation time, epoch milliseconds.
    pub create_time: i64,
    pub user_title: String,
    pub user_title_enabled: bool,
    pub description: String,
    pub member_count: i64,
    /// Hidden groups stay out of the visible-group indexes.
    pub hidden: bool,
    pub system: bool,
    pub private: bool,
    pub disable_join_requests: bool,
    pub disable_leave: bool,
}

fn flag(value: bool) -> String {
    let text = if value { "1" } else { "0" };
    text.to_string()
}

fn parse_flag(value: Option<&String>) -> bool {
    matches!(value.map(String::as_str), Some("1") | Some("true"))
}

impl Group {
    /// Field list as written to the store.
    pub fn to_fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("name", self.name.clone()),
            ("slug", self.slug.clone()),
            ("createtime", self.create_time.to_string()),
            ("userTitle", self.user_title.clone()),
            ("userTitleEnabled", flag(self.user_title_enabled)),
            ("description", self.description.clone()),
            ("memberCount", self.member_count.to_string()),
            ("hidden", flag(self.hidden)),
            ("system", flag(self.system)),
            ("private", flag(self.private)),
            ("disableJoinRequests", flag(self.disable_join_requests)),
            ("disableLeave", flag(self.disable_leave)),
        ]
    }

    /// Rebuild a group from stored fields. Fields that were not fetched take
    /// their defaults. An empty map means the group does not exist.
    pub fn from_fields(fields: &HashMap<String, String>) -> Option<Group> {
        if fields.is_empty() {
            return None;
        }
        let text = |k: &str| fields.get(k).cloned().unwrap_or_default();
        let number = |k: &str| {
            fields
                .get(k)
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(0)
        };
        Some(Group {
            name: text("name"),
            slug: text("slug"),
            create_time: number("createtime"),
            user_title: text("userTitle"),
            user_title_enabled: parse_flag(fields.get("userTitleEnabled")),
            description: text("description"),
            member_count: number("memberCount"),
            hidden: parse_flag(fields.get("hidden")),
            system: parse_flag(fields.get("system")),
            private: parse_flag(fields.get("private")),
            disable_join_requests: parse_flag(fields.get("disableJoinRequests")),
            disable_leave: parse_flag(fields.get("disableLeave")),
        })
    }
}

/// Input for creating a group.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateGroup {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Defaults to the group name.
    #[serde(default)]
    pub user_title: Option<String>,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub system: bool,
    #[serde(default = "default_private")]
    pub private: bool,
    #[serde(default)]
    pub disable_join_requests: bool,
    #[serde(default)]
    pub disable_leave: bool,
}

fn default_private() -> bool {
    true
}

impl CreateGroup {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            user_title: None,
            hidden: false,
            system: false,
            private: default_private(),
            disable_join_requests: false,
            disable_leave: false,
        }
    }

    /// The shape of a group created implicitly by a join.
    pub fn hidden(name: impl Into<String>) -> Self {
        Self {
            hidden: true,
            ..Self::new(name)
        }
    }
}
