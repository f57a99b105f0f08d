use std::path::PathBuf;

/// Configuration for the group service.
#[derive(Debug, Clone)]
pub struct GroupsConfig {
    /// Path to the redb database file. Defaults to `groups.redb`.
    pub db_path: Option<PathBuf>,

    /// Members of this group are administrators.
    pub administrators_group: String,

    /// Group holding banned users. Never used as a display title.
    pub banned_users_group: String,

    /// System groups that never become a user's default title.
    pub untitled_groups: Vec<String>,

    /// Longest accepted group name, in characters.
    pub max_group_name_length: usize,

    /// Membership cache TTL in seconds.
    pub cache_ttl_secs: u64,

    /// Buffered events per hook subscriber before it starts lagging.
    pub hook_channel_capacity: usize,
}

impl Default for GroupsConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            administrators_group: "administrators".to_string(),
            banned_users_group: "banned-users".to_string(),
            untitled_groups: vec![
                "registered-users".to_string(),
                "verified-users".to_string(),
                "unverified-users".to_string(),
            ],
            max_group_name_length: 255,
            cache_ttl_secs: 120, // 2 min
            hook_channel_capacity: 100,
        }
    }
}

impl GroupsConfig {
    /// Parse configuration from command-line arguments.
    ///
    /// Supported flags:
    /// - `--db=PATH`
    /// - `--admin-group=NAME`
    /// - `--banned-group=NAME`
    /// - `--cache-ttl=SECS`
    /// - `--max-name-length=N`
    ///
    /// Unknown flags and unparsable numbers are ignored.
    pub fn from_args(args: &[String]) -> Self {
        let mut config = GroupsConfig::default();

        for arg in args {
            if let Some(val) = arg.strip_prefix("--db=") {
                config.db_path = Some(PathBuf::from(val));
            } else if let Some(val) = arg.strip_prefix("--admin-group=") {
                config.administrators_group = val.to_string();
            } else if let Some(val) = arg.strip_prefix("--banned-group=") {
                config.banned_users_group = val.to_string();
            } else if let Some(val) = arg.strip_prefix("--cache-ttl=") {
                if let Ok(secs) = val.parse() {
                    config.cache_ttl_secs = secs;
                }
            } else if let Some(val) = arg.strip_prefix("--max-name-length=") {
                if let Ok(n) = val.parse() {
                    config.max_group_name_length = n;
                }
            }
        }

        config
    }

    /// Resolve the redb database path, falling back to `groups.redb`.
    pub fn resolve_db_path(&self) -> PathBuf {
        self.db_path
            .clone()
            .unwrap_or_else(|| PathBuf::from("groups.redb"))
    }
}
