//! Cache adapter implementations.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub mod inmemory;
#[cfg(feature = "redis")]
pub mod redis;

pub use inmemory::InMemoryAdapter;
#[cfg(feature = "redis")]
pub use redis::{PoolStats, RedisAdapter, RedisConfig};

/// Current wall-clock time in milliseconds since the Unix epoch.
///
/// Record birth times are wall-clock (not monotonic) so a record written by
/// one process can be judged expired by another through a shared store.
pub fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// A cached result together with the moment it was written.
///
/// Expiry is always judged against `birth_time`: the birth time is **not**
/// refreshed on a hit. Keep-alive extends the deletion *timer*, never the
/// record's own age.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DataCacheRecord<T> {
    /// The cached value.
    pub result: T,
    /// Wall-clock write time, milliseconds since the Unix epoch.
    pub birth_time: u64,
}

impl<T> DataCacheRecord<T> {
    /// Wrap a fresh result, stamping it with the current time.
    pub fn new(result: T) -> Self {
        DataCacheRecord {
            result,
            birth_time: epoch_millis(),
        }
    }

    /// Whether the record has outlived `ttl`.
    pub fn is_expired(&self, ttl: Duration) -> bool {
        epoch_millis().saturating_sub(self.birth_time) >= ttl.as_millis() as u64
    }
}

/// Trait for cache adapter implementations.
///
/// Abstracts storage operations over typed `{result, birth_time}` records,
/// allowing swappable stores: in-memory (default), Redis, or custom.
///
/// **IMPORTANT:** All methods use `&self` instead of `&mut self` to allow
/// concurrent access. Implementations should use interior mutability
/// (DashMap, connection pools, or external storage).
///
/// A shared adapter (e.g. a remote store used by several wrapped functions or
/// processes) must itself guarantee atomicity of each individual operation;
/// the engine assumes but does not provide adapter-level concurrency control.
///
/// **ASYNC:** All methods return futures and must be awaited. The trait
/// declares `impl Future + Send` (rather than `async fn`) so the engine can
/// drive adapter calls from spawned timers and detached refresh tasks;
/// implementations still write plain `async fn`.
pub trait CacheAdapter<T>: Send + Sync + Clone {
    /// Retrieve the record stored under `key`.
    ///
    /// # Returns
    /// - `Ok(Some(record))` - Record found (possibly past its TTL; the engine
    ///   checks `birth_time` itself)
    /// - `Ok(None)` - Key not present
    ///
    /// # Errors
    /// Returns `Err` if a store error occurs (connection lost, etc.)
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<DataCacheRecord<T>>>> + Send;

    /// Store a record under `key`.
    ///
    /// `ttl` is advisory for stores with native expiry (e.g. Redis `EX`);
    /// stores without native expiry may ignore it, because the engine also
    /// schedules deletion and checks `birth_time` on every read.
    ///
    /// # Errors
    /// Returns `Err` if a store error occurs
    fn set(
        &self,
        key: &str,
        record: DataCacheRecord<T>,
        ttl: Duration,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Check whether `key` is present (expired or not).
    ///
    /// # Errors
    /// Returns `Err` if a store error occurs
    fn has(&self, key: &str) -> impl Future<Output = Result<bool>> + Send;

    /// Remove the record stored under `key`.
    ///
    /// # Returns
    /// `Ok(true)` if a record was present and removed.
    ///
    /// # Errors
    /// Returns `Err` if a store error occurs
    fn delete(&self, key: &str) -> impl Future<Output = Result<bool>> + Send;
}
