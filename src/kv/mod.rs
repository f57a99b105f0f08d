//! Byte-level key-value storage underneath the group store.

pub mod error;
pub mod memory;
pub mod redb;
pub mod traits;

pub use error::KVError;
pub use memory::MemoryStore;
pub use self::redb::RedbStore;
pub use traits::KVStore;
