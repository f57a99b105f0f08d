use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::db::Database;
use crate::error::GroupError;
use crate::kv::{KVError, KVStore};

/// Separates a logical key from the field or member inside it.
const SEP: char = '\x1f';

fn object_key(key: &str, field: &str) -> String {
    format!("obj:{key}{SEP}{field}")
}

fn object_prefix(key: &str) -> String {
    format!("obj:{key}{SEP}")
}

fn zset_key(key: &str, member: &str) -> String {
    format!("zset:{key}{SEP}{member}")
}

fn zset_prefix(key: &str) -> String {
    format!("zset:{key}{SEP}")
}

fn set_key(key: &str, member: &str) -> String {
    format!("set:{key}{SEP}{member}")
}

fn utf8(bytes: Vec<u8>) -> Result<String, GroupError> {
    String::from_utf8(bytes).map_err(|e| KVError::Serialization(e.to_string()).into())
}

fn parse_score(raw: Vec<u8>) -> Result<i64, GroupError> {
    let text = utf8(raw)?;
    text.parse()
        .map_err(|_| KVError::Serialization(format!("bad score: {text}")).into())
}

/// Database implemented on top of any `KVStore`.
///
/// Each logical entry becomes one physical key:
///
/// ```text
/// obj:group:staff␟memberCount      → "3"
/// zset:group:staff:members␟42      → "1712345678901"
/// set:group:staff:owners␟42        → ""
/// ```
///
/// The separator is the ASCII unit separator, so a prefix scan over
/// `zset:group:staff:members␟` never picks up `group:staff2`.
pub struct KvDatabase {
    kv: Arc<dyn KVStore>,
    counter_lock: Mutex<()>,
}

impl KvDatabase {
    pub fn new(kv: Arc<dyn KVStore>) -> Self {
        Self {
            kv,
            counter_lock: Mutex::new(()),
        }
    }

    fn scan_members(&self, key: &str) -> Result<Vec<(String, i64)>, GroupError> {
        let prefix = zset_prefix(key);
        let mut out = Vec::new();
        for (physical, raw) in self.kv.scan(&prefix)? {
            let member = physical[prefix.len()..].to_string();
            out.push((member, parse_score(raw)?));
        }
        Ok(out)
    }
}

#[async_trait]
impl Database for KvDatabase {
    async fn sorted_sets_add(
        &self,
        keys: &[String],
        score: i64,
        member: &str,
    ) -> Result<(), GroupError> {
        let physical: Vec<String> = keys.iter().map(|k| zset_key(k, member)).collect();
        let value = score.to_string();
        let entries: Vec<(&str, &[u8])> = physical
            .iter()
            .map(|k| (k.as_str(), value.as_bytes()))
            .collect();
        self.kv.batch_set(&entries)?;
        Ok(())
    }

    async fn sorted_set_add_many(
        &self,
        key: &str,
        entries: &[(i64, String)],
    ) -> Result<(), GroupError> {
        let rows: Vec<(String, String)> = entries
            .iter()
            .map(|(score, member)| (zset_key(key, member), score.to_string()))
            .collect();
        let batch: Vec<(&str, &[u8])> = rows
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_bytes()))
            .collect();
        self.kv.batch_set(&batch)?;
        Ok(())
    }

    async fn sorted_sets_remove(&self, keys: &[String], member: &str) -> Result<(), GroupError> {
        let physical: Vec<String> = keys.iter().map(|k| zset_key(k, member)).collect();
        let refs: Vec<&str> = physical.iter().map(String::as_str).collect();
        self.kv.batch_delete(&refs)?;
        Ok(())
    }

    async fn is_member_of_sorted_sets(
        &self,
        keys: &[String],
        member: &str,
    ) -> Result<Vec<bool>, GroupError> {
        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            out.push(self.kv.get(&zset_key(key, member))?.is_some());
        }
        Ok(out)
    }

    async fn sorted_set_score(&self, key: &str, member: &str) -> Result<Option<i64>, GroupError> {
        match self.kv.get(&zset_key(key, member))? {
            Some(raw) => Ok(Some(parse_score(raw)?)),
            None => Ok(None),
        }
    }

    async fn sorted_set_range_with_scores(
        &self,
        key: &str,
    ) -> Result<Vec<(String, i64)>, GroupError> {
        let mut members = self.scan_members(key)?;
        members.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        Ok(members)
    }

    async fn sorted_set_rev_range_with_scores(
        &self,
        key: &str,
        limit: usize,
    ) -> Result<Vec<(String, i64)>, GroupError> {
        let mut members = self.scan_members(key)?;
        members.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| b.0.cmp(&a.0)));
        members.truncate(limit);
        Ok(members)
    }

    async fn sets_add(&self, keys: &[String], member: &str) -> Result<(), GroupError> {
        let physical: Vec<String> = keys.iter().map(|k| set_key(k, member)).collect();
        let entries: Vec<(&str, &[u8])> = physical.iter().map(|k| (k.as_str(), &b""[..])).collect();
        self.kv.batch_set(&entries)?;
        Ok(())
    }

    async fn sets_remove(&self, keys: &[String], member: &str) -> Result<(), GroupError> {
        let physical: Vec<String> = keys.iter().map(|k| set_key(k, member)).collect();
        let refs: Vec<&str> = physical.iter().map(String::as_str).collect();
        self.kv.batch_delete(&refs)?;
        Ok(())
    }

    async fn is_set_member(&self, key: &str, member: &str) -> Result<bool, GroupError> {
        Ok(self.kv.get(&set_key(key, member))?.is_some())
    }

    async fn exists(&self, keys: &[String]) -> Result<Vec<bool>, GroupError> {
        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            out.push(!self.kv.scan(&object_prefix(key))?.is_empty());
        }
        Ok(out)
    }

    async fn get_object_field(
        &self,
        key: &str,
        field: &str,
    ) -> Result<Option<String>, GroupError> {
        match self.kv.get(&object_key(key, field))? {
            Some(raw) => Ok(Some(utf8(raw)?)),
            None => Ok(None),
        }
    }

    async fn get_objects_fields(
        &self,
        keys: &[String],
        fields: &[&str],
    ) -> Result<Vec<HashMap<String, String>>, GroupError> {
        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            let mut object = HashMap::new();
            if fields.is_empty() {
                let prefix = object_prefix(key);
                for (physical, raw) in self.kv.scan(&prefix)? {
                    object.insert(physical[prefix.len()..].to_string(), utf8(raw)?);
                }
            } else {
                for field in fields {
                    if let Some(raw) = self.kv.get(&object_key(key, field))? {
                        object.insert(field.to_string(), utf8(raw)?);
                    }
                }
            }
            out.push(object);
        }
        Ok(out)
    }

    async fn set_object(&self, key: &str, fields: &[(&str, String)]) -> Result<(), GroupError> {
        let physical: Vec<String> = fields.iter().map(|(f, _)| object_key(key, f)).collect();
        let entries: Vec<(&str, &[u8])> = physical
            .iter()
            .zip(fields)
            .map(|(k, (_, v))| (k.as_str(), v.as_bytes()))
            .collect();
        self.kv.batch_set(&entries)?;
        Ok(())
    }

    async fn set_object_field(
        &self,
        key: &str,
        field: &str,
        value: &str,
    ) -> Result<(), GroupError> {
        self.kv.set(&object_key(key, field), value.as_bytes())?;
        Ok(())
    }

    async fn delete_object_field(&self, key: &str, field: &str) -> Result<(), GroupError> {
        self.kv.delete(&object_key(key, field))?;
        Ok(())
    }

    async fn incr_object_field_by(
        &self,
        keys: &[String],
        field: &str,
        delta: i64,
    ) -> Result<Vec<i64>, GroupError> {
        // Read-modify-write; the lock keeps concurrent increments from
        // overwriting each other within this process.
        let _guard = self
            .counter_lock
            .lock()
            .map_err(|_| GroupError::Internal("counter lock poisoned".to_string()))?;

        let mut rows = Vec::with_capacity(keys.len());
        for key in keys {
            let physical = object_key(key, field);
            let current = match self.kv.get(&physical)? {
                Some(raw) => {
                    let text = utf8(raw)?;
                    text.parse::<i64>().map_err(|_| {
                        GroupError::from(KVError::Serialization(format!(
                            "{key}.{field} is not an integer: {text}"
                        )))
                    })?
                }
                None => 0,
            };
            rows.push((physical, (current + delta).to_string(), current + delta));
        }

        let batch: Vec<(&str, &[u8])> = rows
            .iter()
            .map(|(k, v, _)| (k.as_str(), v.as_bytes()))
            .collect();
        self.kv.batch_set(&batch)?;
        Ok(rows.into_iter().map(|(_, _, n)| n).collect())
    }
}
