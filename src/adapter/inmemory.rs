//! In-memory cache adapter (default, thread-safe, async).
//!
//! Uses DashMap for lock-free concurrent access with per-key sharding.
//! Carries no native TTL: the engine's expiry timers and birth-time checks
//! govern the lifetime of every record.

use super::{CacheAdapter, DataCacheRecord};
use crate::error::Result;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;

/// Thread-safe async in-memory cache adapter.
///
/// The default adapter when none is configured. Cloning is cheap and clones
/// share the same underlying store, so one adapter instance can back several
/// wrapped functions (their fingerprints never collide).
///
/// # Example
///
/// ```no_run
/// use cache_candidate::adapter::{CacheAdapter, DataCacheRecord, InMemoryAdapter};
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let adapter: InMemoryAdapter<String> = InMemoryAdapter::new();
///
///     adapter
///         .set("key1", DataCacheRecord::new("value".to_string()), Duration::from_secs(300))
///         .await?;
///
///     let record = adapter.get("key1").await?;
///     assert!(record.is_some());
///
///     Ok(())
/// }
/// ```
pub struct InMemoryAdapter<T> {
    store: Arc<DashMap<String, DataCacheRecord<T>>>,
}

impl<T> InMemoryAdapter<T> {
    /// Create a new empty in-memory adapter.
    pub fn new() -> Self {
        InMemoryAdapter {
            store: Arc::new(DashMap::new()),
        }
    }

    /// Current number of stored records (expired records included until removed).
    pub fn len(&self) -> usize {
        self.store.len()
    }

    /// Check if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Remove every record.
    pub fn clear(&self) {
        self.store.clear();
    }
}

impl<T> Default for InMemoryAdapter<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for InMemoryAdapter<T> {
    fn clone(&self) -> Self {
        InMemoryAdapter {
            store: Arc::clone(&self.store),
        }
    }
}

impl<T: Clone + Send + Sync> CacheAdapter<T> for InMemoryAdapter<T> {
    async fn get(&self, key: &str) -> Result<Option<DataCacheRecord<T>>> {
        let record = self.store.get(key).map(|entry| entry.value().clone());
        if record.is_some() {
            debug!("InMemory GET {} -> HIT", key);
        } else {
            debug!("InMemory GET {} -> MISS", key);
        }
        Ok(record)
    }

    async fn set(&self, key: &str, record: DataCacheRecord<T>, _ttl: Duration) -> Result<()> {
        // No native expiry; the engine schedules deletion and checks birth_time.
        self.store.insert(key.to_string(), record);
        debug!("InMemory SET {}", key);
        Ok(())
    }

    async fn has(&self, key: &str) -> Result<bool> {
        Ok(self.store.contains_key(key))
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let removed = self.store.remove(key).is_some();
        debug!("InMemory DELETE {} (removed: {})", key, removed);
        Ok(removed)
    }
}
