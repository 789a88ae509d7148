//! Dependency-invalidation side-module.
//!
//! Associates cache entries with external invalidation tags so a whole family
//! of entries can be purged at once (`invalidate("user:42")` deletes every
//! entry registered under that tag, across whatever adapters they live in).
//!
//! The manager is an explicit, constructible component - construct one at
//! process start and inject it, or construct one per test for isolation.
//! There is deliberately no module-level singleton.

use crate::error::Result;
use crate::plugin::{CandidatePlugin, Hook};
use dashmap::DashMap;
use futures::future::BoxFuture;
use serde_json::Value;
use std::sync::Arc;

/// Adapter-erased deletion callback: removes one cache entry by key.
pub type AdapterDeleteFn = Arc<dyn Fn(String) -> BoxFuture<'static, Result<bool>> + Send + Sync>;

/// One registration: a cache entry, the tags it belongs to, and how to
/// delete it.
pub struct DependencyRegistration {
    pub key: String,
    pub dependency_keys: Vec<String>,
    pub deleter: AdapterDeleteFn,
}

#[derive(Clone)]
struct DependencyEntry {
    key: String,
    deleter: AdapterDeleteFn,
}

/// Process-wide index from dependency tag to the cache entries it covers.
///
/// ```text
/// entry abc tagged [1, 2, 3]
/// entry def tagged [3, 4]
///
/// index: 1 => [abc], 2 => [abc], 3 => [abc, def], 4 => [def]
/// ```
pub struct DependencyManager {
    index: DashMap<String, Vec<DependencyEntry>>,
}

impl DependencyManager {
    pub fn new() -> Self {
        DependencyManager {
            index: DashMap::new(),
        }
    }

    /// Associate a cache entry with zero or more dependency tags.
    pub fn register(&self, registration: DependencyRegistration) {
        for dependency_key in &registration.dependency_keys {
            let entry = DependencyEntry {
                key: registration.key.clone(),
                deleter: Arc::clone(&registration.deleter),
            };
            self.index
                .entry(dependency_key.clone())
                .or_default()
                .push(entry);
        }
        debug!(
            "registered {} under {} dependency tag(s)",
            registration.key,
            registration.dependency_keys.len()
        );
    }

    /// Purge every cache entry registered under `dependency_key`.
    ///
    /// Returns the number of entries deleted. An unknown tag deletes nothing.
    ///
    /// # Errors
    /// Propagates the first adapter deletion failure; entries already
    /// deleted stay deleted.
    pub async fn invalidate(&self, dependency_key: &str) -> Result<usize> {
        let entries: Vec<DependencyEntry> = self
            .index
            .get(dependency_key)
            .map(|entries| entries.value().clone())
            .unwrap_or_default();

        for entry in &entries {
            (entry.deleter)(entry.key.clone()).await?;
            debug!("invalidated {} via tag {}", entry.key, dependency_key);
        }
        Ok(entries.len())
    }

    /// Remove every tag association held for a cache entry.
    ///
    /// Called when the entry leaves the cache through the normal path
    /// (expiry or delete), so associations never dangle.
    pub fn delete_key(&self, key: &str) {
        self.index.retain(|_, entries| {
            entries.retain(|entry| entry.key != key);
            !entries.is_empty()
        });
    }

    /// Whether any entry is registered under `dependency_key`.
    pub fn contains(&self, dependency_key: &str) -> bool {
        self.index.contains_key(dependency_key)
    }

    /// Cache entry keys currently registered under `dependency_key`.
    pub fn keys_for(&self, dependency_key: &str) -> Vec<String> {
        self.index
            .get(dependency_key)
            .map(|entries| entries.iter().map(|entry| entry.key.clone()).collect())
            .unwrap_or_default()
    }

    /// Number of dependency tags currently indexed.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

impl Default for DependencyManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Build the dependency-keys plugin for one wrapper.
///
/// `keys_fn` maps the produced result to the tags the entry should carry;
/// tags listed under `dependencyKeys` in the plugin's additional parameters
/// (strings or numbers) are appended as well. On every cache write the entry
/// is registered; on every cache delete - scheduled, lazy, or external - its
/// associations are cleared.
pub fn dependency_keys_plugin(
    manager: Arc<DependencyManager>,
    keys_fn: impl Fn(&Value) -> Vec<String> + Send + Sync + 'static,
) -> CandidatePlugin {
    let keys_fn = Arc::new(keys_fn);
    let on_add_manager = Arc::clone(&manager);
    let on_delete_manager = manager;

    CandidatePlugin::new("dependency-keys")
        .with_hook(Hook::DataCacheRecordAddPost, move |payload, params| {
            let manager = Arc::clone(&on_add_manager);
            let keys_fn = Arc::clone(&keys_fn);
            async move {
                let result = match &payload.result {
                    Some(result) => result,
                    None => return Ok(()),
                };
                let mut dependency_keys = keys_fn(result);
                dependency_keys.extend(static_dependency_keys(params.as_ref()));
                if dependency_keys.is_empty() {
                    return Ok(());
                }
                let internals = payload.internals.clone();
                let deleter: AdapterDeleteFn =
                    Arc::new(move |key: String| internals.delete_record(&key));
                manager.register(DependencyRegistration {
                    key: payload.key.clone(),
                    dependency_keys,
                    deleter,
                });
                Ok(())
            }
        })
        .with_hook(Hook::DataCacheRecordDeletePost, move |payload, _params| {
            let manager = Arc::clone(&on_delete_manager);
            async move {
                manager.delete_key(&payload.key);
                Ok(())
            }
        })
}

/// Static tags from the plugin's additional parameters: a `dependencyKeys`
/// entry holding a string, a number, or an array of either.
fn static_dependency_keys(params: Option<&Value>) -> Vec<String> {
    let keys = match params.and_then(|p| p.get("dependencyKeys")) {
        Some(keys) => keys,
        None => return Vec::new(),
    };
    match keys {
        Value::String(s) => vec![s.clone()],
        Value::Number(n) => vec![n.to_string()],
        Value::Array(items) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_deleter(counter: Arc<AtomicUsize>) -> AdapterDeleteFn {
        Arc::new(move |_key: String| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(true)
            }
            .boxed()
        })
    }

    #[tokio::test]
    async fn test_invalidate_deletes_every_tagged_entry() {
        let manager = DependencyManager::new();
        let deleted = Arc::new(AtomicUsize::new(0));

        manager.register(DependencyRegistration {
            key: "abc".to_string(),
            dependency_keys: vec!["1".to_string(), "3".to_string()],
            deleter: counting_deleter(Arc::clone(&deleted)),
        });
        manager.register(DependencyRegistration {
            key: "def".to_string(),
            dependency_keys: vec!["3".to_string()],
            deleter: counting_deleter(Arc::clone(&deleted)),
        });

        let count = manager.invalidate("3").await.expect("invalidate failed");
        assert_eq!(count, 2);
        assert_eq!(deleted.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_invalidate_unknown_tag_is_empty() {
        let manager = DependencyManager::new();
        let count = manager
            .invalidate("missing")
            .await
            .expect("invalidate failed");
        assert_eq!(count, 0);
    }

    #[test]
    fn test_delete_key_clears_associations() {
        let manager = DependencyManager::new();
        let deleted = Arc::new(AtomicUsize::new(0));

        manager.register(DependencyRegistration {
            key: "abc".to_string(),
            dependency_keys: vec!["1".to_string(), "2".to_string()],
            deleter: counting_deleter(Arc::clone(&deleted)),
        });
        manager.register(DependencyRegistration {
            key: "def".to_string(),
            dependency_keys: vec!["2".to_string()],
            deleter: counting_deleter(Arc::clone(&deleted)),
        });

        manager.delete_key("abc");

        // Tag 1 only covered abc and disappears entirely; tag 2 keeps def.
        assert!(!manager.contains("1"));
        assert_eq!(manager.keys_for("2"), vec!["def".to_string()]);
    }

    #[test]
    fn test_per_test_isolation() {
        let manager = DependencyManager::new();
        assert!(manager.is_empty());
        assert_eq!(manager.len(), 0);
    }

    #[test]
    fn test_static_dependency_keys_remapping() {
        assert_eq!(
            static_dependency_keys(Some(&serde_json::json!({"dependencyKeys": "users"}))),
            vec!["users".to_string()]
        );
        assert_eq!(
            static_dependency_keys(Some(&serde_json::json!({"dependencyKeys": 7}))),
            vec!["7".to_string()]
        );
        assert_eq!(
            static_dependency_keys(Some(&serde_json::json!({"dependencyKeys": ["a", 2]}))),
            vec!["a".to_string(), "2".to_string()]
        );
        assert!(static_dependency_keys(None).is_empty());
    }
}
