use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

/// Externally held cache the group workflows invalidate.
///
/// Keys are free-form strings such as `42:staff` (membership flag for
/// uid 42 in `staff`) or `group:staff:members`.
pub trait Cache: Send + Sync {
    /// Get a fresh value. Expired or missing entries yield None.
    fn get(&self, key: &str) -> Option<String>;

    fn set(&self, key: &str, value: String);

    /// Drop each of `keys`. Missing keys are ignored.
    fn del(&self, keys: &[String]);

    fn clear(&self);
}

struct CacheEntry {
    value: String,
    inserted_at: Instant,
}

/// In-memory TTL cache.
pub struct MemoryCache {
    ttl: Duration,
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl MemoryCache {
    pub fn new(ttl_secs: u64) -> Self {
        Self {
            ttl: Duration::from_secs(ttl_secs),
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Number of entries held. Expired ones linger until the next `set`.
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Cache for MemoryCache {
    fn get(&self, key: &str) -> Option<String> {
        let entries = self.entries.read().ok()?;
        entries.get(key).and_then(|entry| {
            if entry.inserted_at.elapsed() < self.ttl {
                Some(entry.value.clone())
            } else {
                None
            }
        })
    }

    fn set(&self, key: &str, value: String) {
        if let Ok(mut entries) = self.entries.write() {
            let ttl = self.ttl;
            entries.retain(|_, entry| entry.inserted_at.elapsed() < ttl);
            entries.insert(
                key.to_string(),
                CacheEntry {
                    value,
                    inserted_at: Instant::now(),
                },
            );
        }
    }

    fn del(&self, keys: &[String]) {
        if let Ok(mut entries) = self.entries.write() {
            for key in keys {
                entries.remove(key);
            }
        }
    }

    fn clear(&self) {
        if let Ok(mut entries) = self.entries.write() {
            entries.clear();
        }
    }
}
