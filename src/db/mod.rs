//! Data-store primitives the group workflows are written against.
//!
//! The shapes follow a Redis-like model: objects are flat string maps,
//! ordered sets carry an integer score per member, plain sets carry none.
//! Bulk variants take several keys and apply the same write to each.

pub mod kv_database;

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::GroupError;

pub use kv_database::KvDatabase;

#[async_trait]
pub trait Database: Send + Sync {
    // ── Ordered sets ──

    /// Add `member` with `score` to every ordered set in `keys`.
    async fn sorted_sets_add(&self, keys: &[String], score: i64, member: &str)
        -> Result<(), GroupError>;

    /// Upsert several `(score, member)` pairs into one ordered set.
    async fn sorted_set_add_many(&self, key: &str, entries: &[(i64, String)])
        -> Result<(), GroupError>;

    /// Remove `member` from every ordered set in `keys`.
    async fn sorted_sets_remove(&self, keys: &[String], member: &str) -> Result<(), GroupError>;

    /// For each key, whether `member` is in that ordered set.
    async fn is_member_of_sorted_sets(&self, keys: &[String], member: &str)
        -> Result<Vec<bool>, GroupError>;

    async fn sorted_set_score(&self, key: &str, member: &str) -> Result<Option<i64>, GroupError>;

    /// Members in ascending score order. Ties break on member name.
    async fn sorted_set_range_with_scores(&self, key: &str)
        -> Result<Vec<(String, i64)>, GroupError>;

    /// Up to `limit` members in descending score order.
    async fn sorted_set_rev_range_with_scores(&self, key: &str, limit: usize)
        -> Result<Vec<(String, i64)>, GroupError>;

    // ── Plain sets ──

    async fn sets_add(&self, keys: &[String], member: &str) -> Result<(), GroupError>;

    async fn sets_remove(&self, keys: &[String], member: &str) -> Result<(), GroupError>;

    async fn is_set_member(&self, key: &str, member: &str) -> Result<bool, GroupError>;

    // ── Objects ──

    /// For each key, whether an object with at least one field exists.
    async fn exists(&self, keys: &[String]) -> Result<Vec<bool>, GroupError>;

    async fn get_object_field(&self, key: &str, field: &str)
        -> Result<Option<String>, GroupError>;

    /// Fetch `fields` of each object. An empty `fields` slice fetches all.
    /// Missing objects yield an empty map.
    async fn get_objects_fields(&self, keys: &[String], fields: &[&str])
        -> Result<Vec<HashMap<String, String>>, GroupError>;

    async fn set_object(&self, key: &str, fields: &[(&str, String)]) -> Result<(), GroupError>;

    async fn set_object_field(&self, key: &str, field: &str, value: &str)
        -> Result<(), GroupError>;

    async fn delete_object_field(&self, key: &str, field: &str) -> Result<(), GroupError>;

    /// Add `delta` to an integer field of each object, creating it at 0.
    /// Returns the new values in key order.
    async fn incr_object_field_by(&self, keys: &[String], field: &str, delta: i64)
        -> Result<Vec<i64>, GroupError>;
}
