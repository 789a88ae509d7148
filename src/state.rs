//! Per-wrapper mutable state: running-query registry, stale holder, and
//! expiry timer table.
//!
//! Each wrapped function owns exactly one `CandidateState`; the maps are
//! never shared across wrappers, so fingerprints from different wrappers can
//! never contaminate each other. Every component clones cheaply (shared
//! `Arc` inside) so the state can also be captured by timers and detached
//! refresh tasks.

use dashmap::DashMap;
use futures::future::{BoxFuture, Shared};
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::error::Result;
use crate::ledger::TimeFrameLedger;

/// An in-flight execution, shareable between the caller that started it and
/// any caller that attached afterwards. All of them observe the same settled
/// value or the same failure.
pub type SharedExecution<T> = Shared<BoxFuture<'static, Result<T>>>;

/// Fingerprint → in-flight execution.
pub struct RunningQueries<T> {
    map: Arc<DashMap<String, SharedExecution<T>>>,
}

impl<T: Clone> RunningQueries<T> {
    pub fn new() -> Self {
        RunningQueries {
            map: Arc::new(DashMap::new()),
        }
    }

    pub fn get(&self, key: &str) -> Option<SharedExecution<T>> {
        self.map.get(key).map(|entry| entry.value().clone())
    }

    pub fn insert(&self, key: &str, execution: SharedExecution<T>) {
        self.map.insert(key.to_string(), execution);
    }

    pub fn remove(&self, key: &str) -> bool {
        self.map.remove(key).is_some()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl<T> Clone for RunningQueries<T> {
    fn clone(&self) -> Self {
        RunningQueries {
            map: Arc::clone(&self.map),
        }
    }
}

/// Fingerprint → last completed result (stale-while-revalidate only).
///
/// Entries are consumed: `take` removes the value it returns, so one stale
/// value is served at most once before a refresh replaces it.
pub struct StaleHolder<T> {
    map: Arc<DashMap<String, T>>,
}

impl<T: Clone> StaleHolder<T> {
    pub fn new() -> Self {
        StaleHolder {
            map: Arc::new(DashMap::new()),
        }
    }

    pub fn store(&self, key: &str, value: T) {
        self.map.insert(key.to_string(), value);
    }

    pub fn take(&self, key: &str) -> Option<T> {
        self.map.remove(key).map(|(_, value)| value)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }
}

impl<T> Clone for StaleHolder<T> {
    fn clone(&self) -> Self {
        StaleHolder {
            map: Arc::clone(&self.map),
        }
    }
}

/// Fingerprint → scheduled deletion task.
///
/// Arming a key aborts whatever task was previously scheduled for it, which
/// is what a keep-alive hit does to push a deletion out to TTL-from-now.
pub struct ExpiryTimers {
    map: Arc<DashMap<String, JoinHandle<()>>>,
}

impl ExpiryTimers {
    pub fn new() -> Self {
        ExpiryTimers {
            map: Arc::new(DashMap::new()),
        }
    }

    pub fn arm(&self, key: &str, handle: JoinHandle<()>) {
        if let Some((_, previous)) = self.map.remove(key) {
            previous.abort();
        }
        self.map.insert(key.to_string(), handle);
    }

    /// Abort and forget the timer for `key`, if any.
    pub fn clear(&self, key: &str) -> bool {
        match self.map.remove(key) {
            Some((_, handle)) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    /// Forget the timer entry without aborting (used by a fired timer to
    /// drop its own handle).
    pub fn discard(&self, key: &str) {
        self.map.remove(key);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }
}

impl Clone for ExpiryTimers {
    fn clone(&self) -> Self {
        ExpiryTimers {
            map: Arc::clone(&self.map),
        }
    }
}

impl Drop for ExpiryTimers {
    fn drop(&mut self) {
        // Last owner going away: stop pending deletions so they do not hold
        // the runtime.
        if Arc::strong_count(&self.map) == 1 {
            for entry in self.map.iter() {
                entry.value().abort();
            }
        }
    }
}

/// The complete per-wrapper state bundle.
pub struct CandidateState<T> {
    pub ledger: TimeFrameLedger,
    pub running: RunningQueries<T>,
    pub stale: StaleHolder<T>,
    pub timers: ExpiryTimers,
}

impl<T: Clone> CandidateState<T> {
    pub fn new() -> Self {
        CandidateState {
            ledger: TimeFrameLedger::new(),
            running: RunningQueries::new(),
            stale: StaleHolder::new(),
            timers: ExpiryTimers::new(),
        }
    }
}

impl<T: Clone> Default for CandidateState<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use std::time::Duration;

    #[tokio::test]
    async fn test_running_queries_roundtrip() {
        let running: RunningQueries<u32> = RunningQueries::new();
        let execution: SharedExecution<u32> = async { Ok(1u32) }.boxed().shared();

        running.insert("key", execution);
        assert!(running.contains("key"));

        let attached = running.get("key").expect("entry missing");
        assert_eq!(attached.await.expect("execution failed"), 1);

        assert!(running.remove("key"));
        assert!(!running.contains("key"));
        assert!(!running.remove("key"));
    }

    #[tokio::test]
    async fn test_running_queries_share_one_result() {
        let running: RunningQueries<u32> = RunningQueries::new();
        let execution: SharedExecution<u32> = async { Ok(7u32) }.boxed().shared();
        running.insert("key", execution.clone());

        let first = running.get("key").expect("entry missing");
        let second = running.get("key").expect("entry missing");
        assert_eq!(first.await.expect("execution failed"), 7);
        assert_eq!(second.await.expect("execution failed"), 7);
    }

    #[test]
    fn test_stale_holder_take_consumes() {
        let stale: StaleHolder<u32> = StaleHolder::new();
        stale.store("key", 9);
        assert!(stale.contains("key"));

        assert_eq!(stale.take("key"), Some(9));
        assert!(!stale.contains("key"));
        assert_eq!(stale.take("key"), None);
    }

    #[tokio::test]
    async fn test_timers_arm_aborts_previous() {
        let timers = ExpiryTimers::new();

        let first = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(60)).await;
        });
        timers.arm("key", first);

        let second = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(60)).await;
        });
        timers.arm("key", second);

        assert_eq!(timers.len(), 1);
        assert!(timers.clear("key"));
        assert!(!timers.contains("key"));
    }
}
