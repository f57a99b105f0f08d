pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod groups;
pub mod hooks;
pub mod kv;
pub mod service;
pub mod users;

pub use cache::{Cache, MemoryCache};
pub use config::GroupsConfig;
pub use db::{Database, KvDatabase};
pub use error::GroupError;
pub use groups::{CreateGroup, Group, GroupCatalog, StoreGroupCatalog};
pub use hooks::{BroadcastHookBus, GroupEvent, HookBus, HookError};
pub use kv::{KVError, KVStore, MemoryStore, RedbStore};
pub use service::{GroupService, parse_group_names};
pub use users::{DbUserDirectory, UserDirectory};
