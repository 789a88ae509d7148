//! Plugin hook pipeline.
//!
//! Plugins observe and extend the engine at a closed set of lifecycle
//! transitions. Registration is validated eagerly at wrap time (a plugin
//! with no hooks, or with two handlers for the same hook, fails wrapper
//! construction); dispatch walks the plugin list in registration order and
//! awaits every matching handler before the call proceeds. A handler error
//! aborts the call - hooks are never best-effort.

use crate::config::ConfigSnapshot;
use crate::error::{Error, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// The closed set of lifecycle transitions a plugin can attach to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Hook {
    /// Once, at wrap time.
    Setup,
    /// At the start of every call.
    Init,
    /// Before the wrapped function executes.
    ExecutionPre,
    /// After the wrapped function was invoked (the execution may still be
    /// pending; no result value is available yet).
    ExecutionPost,
    /// Before a qualified result is written to the cache store.
    DataCacheRecordAddPre,
    /// After a qualified result was written to the cache store.
    DataCacheRecordAddPost,
    /// Before a cache record is deleted.
    DataCacheRecordDeletePre,
    /// After a cache record was deleted.
    DataCacheRecordDeletePost,
    /// On a cache or running-query hit.
    CacheHit,
    /// Before a keep-alive hit rearms the deletion timer.
    RefreshKeepAlivePre,
    /// After a keep-alive hit rearmed the deletion timer.
    RefreshKeepAlivePost,
}

impl std::fmt::Display for Hook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Hook::Setup => "SETUP",
            Hook::Init => "INIT",
            Hook::ExecutionPre => "EXECUTION_PRE",
            Hook::ExecutionPost => "EXECUTION_POST",
            Hook::DataCacheRecordAddPre => "DATACACHE_RECORD_ADD_PRE",
            Hook::DataCacheRecordAddPost => "DATACACHE_RECORD_ADD_POST",
            Hook::DataCacheRecordDeletePre => "DATACACHE_RECORD_DELETE_PRE",
            Hook::DataCacheRecordDeletePost => "DATACACHE_RECORD_DELETE_POST",
            Hook::CacheHit => "CACHE_HIT",
            Hook::RefreshKeepAlivePre => "REFRESH_KEEP_ALIVE_PRE",
            Hook::RefreshKeepAlivePost => "REFRESH_KEEP_ALIVE_POST",
        };
        write!(f, "{}", name)
    }
}

/// A hook handler: receives the payload snapshot and the plugin's own
/// additional static parameters.
pub type HookAction =
    Arc<dyn Fn(PluginPayload, Option<Value>) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// One hook registration inside a plugin.
#[derive(Clone)]
pub struct ActionableHook {
    pub hook: Hook,
    pub action: HookAction,
}

impl ActionableHook {
    /// Register `action` for `hook`.
    pub fn new<F, Fut>(hook: Hook, action: F) -> Self
    where
        F: Fn(PluginPayload, Option<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        ActionableHook {
            hook,
            action: Arc::new(move |payload, params| action(payload, params).boxed()),
        }
    }
}

/// A plugin: a named, ordered collection of hook handlers plus optional
/// static parameters handed to every handler invocation.
#[derive(Clone)]
pub struct CandidatePlugin {
    pub name: String,
    pub hooks: Vec<ActionableHook>,
    pub additional_parameters: Option<Value>,
}

impl CandidatePlugin {
    pub fn new(name: impl Into<String>) -> Self {
        CandidatePlugin {
            name: name.into(),
            hooks: Vec::new(),
            additional_parameters: None,
        }
    }

    pub fn with_hook<F, Fut>(mut self, hook: Hook, action: F) -> Self
    where
        F: Fn(PluginPayload, Option<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.hooks.push(ActionableHook::new(hook, action));
        self
    }

    pub fn with_additional_parameters(mut self, parameters: Value) -> Self {
        self.additional_parameters = Some(parameters);
        self
    }
}

/// Serializable view of one ledger record, for hook payloads.
#[derive(Clone, Debug, Serialize)]
pub struct LedgerRecordSnapshot {
    pub execution_time_ms: u64,
    pub age_ms: u64,
}

/// Constrained view of the engine internals, exposed to plugins.
///
/// Fields are private and access goes through methods, so a plugin can call
/// into the engine but can never rebind its read/mutation entry points. The
/// only replaceable piece of the pipeline is key derivation, and that is
/// replaced through configuration, not through this table.
#[derive(Clone)]
pub struct CandidateInternals {
    derive_key: Arc<dyn Fn(&[&str]) -> String + Send + Sync>,
    get_record: Arc<dyn Fn(String) -> BoxFuture<'static, Result<Option<Value>>> + Send + Sync>,
    add_record: Arc<dyn Fn(String, Value) -> BoxFuture<'static, Result<()>> + Send + Sync>,
    delete_record: Arc<dyn Fn(String) -> BoxFuture<'static, Result<bool>> + Send + Sync>,
    record_expired: Arc<dyn Fn(u64) -> bool + Send + Sync>,
    threshold_evaluation: Arc<dyn Fn(String, Duration) -> u32 + Send + Sync>,
}

impl CandidateInternals {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        derive_key: Arc<dyn Fn(&[&str]) -> String + Send + Sync>,
        get_record: Arc<dyn Fn(String) -> BoxFuture<'static, Result<Option<Value>>> + Send + Sync>,
        add_record: Arc<dyn Fn(String, Value) -> BoxFuture<'static, Result<()>> + Send + Sync>,
        delete_record: Arc<dyn Fn(String) -> BoxFuture<'static, Result<bool>> + Send + Sync>,
        record_expired: Arc<dyn Fn(u64) -> bool + Send + Sync>,
        threshold_evaluation: Arc<dyn Fn(String, Duration) -> u32 + Send + Sync>,
    ) -> Self {
        CandidateInternals {
            derive_key,
            get_record,
            add_record,
            delete_record,
            record_expired,
            threshold_evaluation,
        }
    }

    /// Derive a fingerprint from identity parts.
    pub fn derive_key(&self, parts: &[&str]) -> String {
        (self.derive_key)(parts)
    }

    /// Fetch the serialized cache record stored under `key`, if any.
    pub fn get_record(&self, key: &str) -> BoxFuture<'static, Result<Option<Value>>> {
        (self.get_record)(key.to_string())
    }

    /// Store `result` under `key` with the wrapper's configured TTL.
    pub fn add_record(&self, key: &str, result: Value) -> BoxFuture<'static, Result<()>> {
        (self.add_record)(key.to_string(), result)
    }

    /// Delete the cache record stored under `key` (bare storage operation;
    /// no hooks or events fire).
    pub fn delete_record(&self, key: &str) -> BoxFuture<'static, Result<bool>> {
        (self.delete_record)(key.to_string())
    }

    /// Whether a record born at `birth_time` (epoch ms) has outlived the
    /// wrapper's TTL.
    pub fn record_expired(&self, birth_time: u64) -> bool {
        (self.record_expired)(birth_time)
    }

    /// Evaluate the frequency/latency qualification modes against the
    /// current ledger for `key`.
    ///
    /// A configured candidate predicate is not re-evaluable from here (it
    /// needs the typed call arguments); in that case this falls back to the
    /// record count.
    pub fn threshold_evaluation(&self, key: &str, execution_time: Duration) -> u32 {
        (self.threshold_evaluation)(key.to_string(), execution_time)
    }
}

/// Snapshot handed to every hook handler.
#[derive(Clone)]
pub struct PluginPayload {
    /// Scalar configuration view.
    pub config: ConfigSnapshot,
    /// The call fingerprint (empty for the SETUP hook).
    pub key: String,
    /// The call arguments, serialized (absent for SETUP and timer-driven
    /// deletes).
    pub fn_args: Option<Value>,
    /// The produced result, serialized (post-hooks only).
    pub result: Option<Value>,
    /// Ledger records currently held for the key.
    pub ledger_records: Vec<LedgerRecordSnapshot>,
    /// Whether an execution is in flight for the key.
    pub has_running_query: bool,
    /// Whether a stale value is held for the key.
    pub has_stale_value: bool,
    /// Constrained engine internals.
    pub internals: CandidateInternals,
}

/// Validate plugin registrations. Called once at wrap time.
///
/// # Errors
/// Returns `Error::ConfigError` when a plugin registers zero hooks, or more
/// than one handler for the same hook.
pub fn check_hooks(plugins: &[CandidatePlugin]) -> Result<()> {
    for plugin in plugins {
        if plugin.hooks.is_empty() {
            return Err(Error::ConfigError(format!(
                "plugin {} registers no hooks",
                plugin.name
            )));
        }
        for hook in plugin.hooks.iter().map(|h| h.hook) {
            let instances = plugin.hooks.iter().filter(|h| h.hook == hook).count();
            if instances > 1 {
                return Err(Error::ConfigError(format!(
                    "only one hook instance per plugin is allowed: {} has {} instances of {}",
                    plugin.name, instances, hook
                )));
            }
        }
    }
    Ok(())
}

/// Run every handler registered for `hook`, in plugin registration order.
///
/// # Errors
/// Propagates the first handler error; the surrounding call aborts with it.
pub(crate) async fn execute_hook(
    hook: Hook,
    plugins: &[CandidatePlugin],
    payload: &PluginPayload,
) -> Result<()> {
    for plugin in plugins {
        let matching: Vec<&ActionableHook> =
            plugin.hooks.iter().filter(|h| h.hook == hook).collect();
        if matching.len() > 1 {
            return Err(Error::PluginError(format!(
                "only one hook instance per plugin is allowed: {} has {} instances of {}",
                plugin.name,
                matching.len(),
                hook
            )));
        }
        if let Some(actionable) = matching.first() {
            (actionable.action)(payload.clone(), plugin.additional_parameters.clone())
                .await
                .map_err(|e| match e {
                    Error::PluginError(_) => e,
                    other => Error::PluginError(format!(
                        "hook {} of plugin {} failed: {}",
                        hook, plugin.name, other
                    )),
                })?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn noop_internals() -> CandidateInternals {
        CandidateInternals::new(
            Arc::new(|parts: &[&str]| parts.join("|")),
            Arc::new(|_: String| async { Ok(None) }.boxed()),
            Arc::new(|_: String, _: Value| async { Ok(()) }.boxed()),
            Arc::new(|_: String| async { Ok(false) }.boxed()),
            Arc::new(|_: u64| false),
            Arc::new(|_: String, _: Duration| 0),
        )
    }

    fn payload() -> PluginPayload {
        PluginPayload {
            config: ConfigSnapshot {
                ttl_ms: 1000,
                time_frame_ms: 1000,
                requests_threshold: 1,
                millisecond_threshold_ms: None,
                expiration_mode: crate::config::ExpirationMode::Default,
                keep_alive: false,
                fetching_mode: crate::config::FetchingMode::Default,
            },
            key: "key".to_string(),
            fn_args: None,
            result: None,
            ledger_records: Vec::new(),
            has_running_query: false,
            has_stale_value: false,
            internals: noop_internals(),
        }
    }

    #[test]
    fn test_check_hooks_rejects_empty_plugin() {
        let plugin = CandidatePlugin::new("empty");
        let err = check_hooks(&[plugin]).expect_err("empty plugin must be rejected");
        assert!(matches!(err, Error::ConfigError(_)));
    }

    #[test]
    fn test_check_hooks_rejects_duplicate_hook() {
        let plugin = CandidatePlugin::new("doubled")
            .with_hook(Hook::Init, |_p, _a| async { Ok(()) })
            .with_hook(Hook::Init, |_p, _a| async { Ok(()) });
        let err = check_hooks(&[plugin]).expect_err("duplicate hook must be rejected");
        assert!(matches!(err, Error::ConfigError(_)));
    }

    #[test]
    fn test_check_hooks_accepts_distinct_hooks() {
        let plugin = CandidatePlugin::new("ok")
            .with_hook(Hook::Init, |_p, _a| async { Ok(()) })
            .with_hook(Hook::CacheHit, |_p, _a| async { Ok(()) });
        check_hooks(&[plugin]).expect("distinct hooks are valid");
    }

    #[tokio::test]
    async fn test_execute_hook_runs_in_registration_order() {
        let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));

        let first = {
            let seen = Arc::clone(&seen);
            CandidatePlugin::new("first").with_hook(Hook::Init, move |_p, _a| {
                let seen = Arc::clone(&seen);
                async move {
                    seen.lock().expect("lock poisoned").push("first".to_string());
                    Ok(())
                }
            })
        };
        let second = {
            let seen = Arc::clone(&seen);
            CandidatePlugin::new("second").with_hook(Hook::Init, move |_p, _a| {
                let seen = Arc::clone(&seen);
                async move {
                    seen.lock().expect("lock poisoned").push("second".to_string());
                    Ok(())
                }
            })
        };

        execute_hook(Hook::Init, &[first, second], &payload())
            .await
            .expect("hooks must run");

        assert_eq!(
            *seen.lock().expect("lock poisoned"),
            vec!["first".to_string(), "second".to_string()]
        );
    }

    #[tokio::test]
    async fn test_execute_hook_skips_unrelated_hooks() {
        let seen: Arc<Mutex<u32>> = Arc::new(Mutex::new(0));
        let plugin = {
            let seen = Arc::clone(&seen);
            CandidatePlugin::new("other").with_hook(Hook::CacheHit, move |_p, _a| {
                let seen = Arc::clone(&seen);
                async move {
                    *seen.lock().expect("lock poisoned") += 1;
                    Ok(())
                }
            })
        };

        execute_hook(Hook::Init, &[plugin], &payload())
            .await
            .expect("no matching hooks is fine");
        assert_eq!(*seen.lock().expect("lock poisoned"), 0);
    }

    #[tokio::test]
    async fn test_execute_hook_propagates_handler_error() {
        let plugin = CandidatePlugin::new("failing").with_hook(Hook::Init, |_p, _a| async {
            Err(Error::Other("handler exploded".to_string()))
        });

        let err = execute_hook(Hook::Init, &[plugin], &payload())
            .await
            .expect_err("handler error must propagate");
        assert!(matches!(err, Error::PluginError(_)));
    }

    #[tokio::test]
    async fn test_execute_hook_receives_additional_parameters() {
        let seen: Arc<Mutex<Option<Value>>> = Arc::new(Mutex::new(None));
        let plugin = {
            let seen = Arc::clone(&seen);
            CandidatePlugin::new("params")
                .with_hook(Hook::Init, move |_p, params| {
                    let seen = Arc::clone(&seen);
                    async move {
                        *seen.lock().expect("lock poisoned") = params;
                        Ok(())
                    }
                })
                .with_additional_parameters(serde_json::json!({"tag": "users"}))
        };

        execute_hook(Hook::Init, &[plugin], &payload())
            .await
            .expect("hook must run");

        let params = seen
            .lock()
            .expect("lock poisoned")
            .clone()
            .expect("parameters missing");
        assert_eq!(params["tag"], "users");
    }

    #[test]
    fn test_internals_key_derivation_is_not_rebindable() {
        // The table only offers methods; there is no way to assign over the
        // core entry points from outside the crate.
        let internals = noop_internals();
        assert_eq!(internals.derive_key(&["a", "b"]), "a|b");
        assert!(!internals.record_expired(0));
    }

    #[test]
    fn test_hook_display_names() {
        assert_eq!(Hook::Init.to_string(), "INIT");
        assert_eq!(
            Hook::DataCacheRecordDeletePost.to_string(),
            "DATACACHE_RECORD_DELETE_POST"
        );
        assert_eq!(Hook::RefreshKeepAlivePre.to_string(), "REFRESH_KEEP_ALIVE_PRE");
    }
}
