//! The orchestrator: wraps a function and decides, call by call, whether its
//! results have earned a place in the cache.
//!
//! Every invocation walks one state machine:
//!
//! ```text
//! INIT → CACHE_LOOKUP → {CACHE_HIT | RUNNING_QUERY_HIT | STALE_HIT | EXECUTE}
//!      → HANDLE_RESULT → QUALIFY → {WRITE_CACHE | SKIP} → DONE
//! ```
//!
//! Plugin hooks fire at every transition; lifecycle events are emitted
//! alongside. All per-key bookkeeping lives in maps owned exclusively by one
//! wrapper instance, mutated only between await points on the cooperative
//! timeline, so no locks are needed beyond the sharded maps themselves.

use crate::adapter::{CacheAdapter, DataCacheRecord};
use crate::config::{CacheCandidateConfig, ExpirationMode, FetchingMode};
use crate::error::{Error, Result};
use crate::evaluator;
use crate::key::{unique_identifier, KeyDeriver, MethodScope};
use crate::ledger::TimeFrameRecord;
use crate::plugin::{execute_hook, check_hooks, CandidateInternals, Hook, LedgerRecordSnapshot, PluginPayload};
use crate::state::{CandidateState, SharedExecution};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

/// The wrapped function, argument-to-future, with the future type erased so
/// the wrapper itself stays nameable.
type WrappedFn<Args, T> = Arc<dyn Fn(Args) -> BoxFuture<'static, Result<T>> + Send + Sync>;

struct Inner<Args, T, A> {
    config: CacheCandidateConfig<Args, T, A>,
    state: CandidateState<T>,
    internals: CandidateInternals,
    original: WrappedFn<Args, T>,
    unique_id: String,
    scope: Option<MethodScope>,
}

/// A function wrapped with adaptive cache-candidate behavior.
///
/// Cloning is cheap (an `Arc` bump) and clones share all bookkeeping, so the
/// wrapper can be handed to as many tasks as needed.
///
/// # Example
///
/// ```ignore
/// use cache_candidate::{cache_candidate, CacheCandidateConfig};
/// use std::time::Duration;
///
/// let wrapped = cache_candidate(
///     |n: u32| async move { Ok(n * 2) },
///     CacheCandidateConfig::new()
///         .with_requests_threshold(1)
///         .with_ttl(Duration::from_millis(800)),
/// )?;
///
/// let doubled = wrapped.call(21).await?;   // executes
/// let cached = wrapped.call(21).await?;    // served from cache
/// ```
pub struct CacheCandidate<Args, T, A> {
    inner: Arc<Inner<Args, T, A>>,
}

impl<Args, T, A> Clone for CacheCandidate<Args, T, A> {
    fn clone(&self) -> Self {
        CacheCandidate {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Wrap `f` with cache-candidate behavior under `config`.
///
/// The wrapped form is always asynchronous; a synchronous function is wrapped
/// by handing in an `async` block that returns its value.
///
/// # Errors
/// Fails synchronously on configuration errors: the eject + keep-alive
/// combination, a plugin with zero hooks, or duplicate hook registrations
/// within one plugin.
pub fn cache_candidate<Args, T, A, F, Fut>(
    f: F,
    config: CacheCandidateConfig<Args, T, A>,
) -> Result<CacheCandidate<Args, T, A>>
where
    Args: Serialize + Clone + Send + Sync + 'static,
    T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
    A: CacheAdapter<T> + 'static,
    F: Fn(Args) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T>> + Send + 'static,
{
    CacheCandidate::new(f, config)
}

impl<Args, T, A> CacheCandidate<Args, T, A>
where
    Args: Serialize + Clone + Send + Sync + 'static,
    T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
    A: CacheAdapter<T> + 'static,
{
    /// Wrap a plain function. See [`cache_candidate`].
    pub fn new<F, Fut>(f: F, config: CacheCandidateConfig<Args, T, A>) -> Result<Self>
    where
        F: Fn(Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        Self::build(f, config, None)
    }

    /// Wrap a method under an explicit (type × instance × method) scope.
    ///
    /// The scope feeds the fingerprint, so two instances - or two types whose
    /// methods share a name - never share cache entries.
    pub fn for_method<F, Fut>(
        f: F,
        scope: MethodScope,
        config: CacheCandidateConfig<Args, T, A>,
    ) -> Result<Self>
    where
        F: Fn(Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        Self::build(f, config, Some(scope))
    }

    fn build<F, Fut>(
        f: F,
        config: CacheCandidateConfig<Args, T, A>,
        scope: Option<MethodScope>,
    ) -> Result<Self>
    where
        F: Fn(Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        config.validate()?;
        check_hooks(&config.plugins)?;

        let state = CandidateState::new();
        let internals = Self::make_internals(&config, &state);
        let original: WrappedFn<Args, T> = Arc::new(move |args: Args| f(args).boxed());

        let candidate = CacheCandidate {
            inner: Arc::new(Inner {
                config,
                state,
                internals,
                original,
                unique_id: unique_identifier(),
                scope,
            }),
        };
        candidate.dispatch_setup();
        Ok(candidate)
    }

    /// Invoke the wrapped function through the caching state machine.
    ///
    /// # Errors
    /// Propagates wrapped-function failures (never cached), plugin hook
    /// failures, and cache adapter failures.
    pub async fn call(&self, args: Args) -> Result<T> {
        let args_value = serde_json::to_value(&args)
            .map_err(|e| Error::KeyError(format!("failed to serialize call arguments: {}", e)))?;
        let key = self.derive_call_key(&args, &args_value);
        self.lets_candidate(key, args, args_value).await
    }

    /// The fingerprint this wrapper derives for `args`.
    ///
    /// Useful for wiring external invalidation (e.g. a dependency manager)
    /// to specific call sites.
    pub fn key_for(&self, args: &Args) -> Result<String> {
        let args_value = serde_json::to_value(args)
            .map_err(|e| Error::KeyError(format!("failed to serialize call arguments: {}", e)))?;
        Ok(self.derive_call_key(args, &args_value))
    }

    /// The constrained internals table, as handed to plugins.
    pub fn internals(&self) -> CandidateInternals {
        self.inner.internals.clone()
    }

    fn derive_call_key(&self, args: &Args, args_value: &Value) -> String {
        if let Some(custom_key) = &self.inner.config.custom_key {
            return custom_key(args);
        }
        let serialized = args_value.to_string();
        match &self.inner.scope {
            Some(scope) => KeyDeriver::derive(&[
                scope.method(),
                &self.inner.unique_id,
                &scope.identity(),
                &serialized,
            ]),
            None => KeyDeriver::derive(&[&self.inner.unique_id, &serialized]),
        }
    }

    async fn lets_candidate(&self, key: String, args: Args, args_value: Value) -> Result<T> {
        let inner = &self.inner;
        let plugins = &inner.config.plugins;
        let events = &inner.config.events;
        let payload = self.payload(&key, Some(args_value.clone()), None);

        // INIT
        execute_hook(Hook::Init, plugins, &payload).await?;

        // CACHE_LOOKUP: a non-expired record wins outright.
        if let Some(cached) = self.get_data_cache_record(&key, &payload).await? {
            if inner.config.keep_alive {
                self.refresh_keep_alive(&key, &payload).await?;
            }
            let mut hit_payload = payload.clone();
            hit_payload.result = Some(serde_json::to_value(&cached)?);
            execute_hook(Hook::CacheHit, plugins, &hit_payload).await?;
            (events.on_cache_hit)(&key);
            debug!("cache hit for {}", key);
            return Ok(cached);
        }

        // RUNNING_QUERY_HIT: attach to an execution already in flight.
        if let Some(execution) = inner.state.running.get(&key) {
            execute_hook(Hook::CacheHit, plugins, &payload).await?;
            (events.on_cache_hit)(&key);
            debug!("attached to running query for {}", key);
            return execution.await;
        }

        // STALE_HIT: serve the last-known-good value, refresh in background.
        if inner.config.fetching_mode == FetchingMode::StaleWhileRevalidate {
            if let Some(stale) = inner.state.stale.take(&key) {
                (events.on_cache_hit)(&key);
                debug!("serving stale value for {}, revalidating in background", key);
                let this = self.clone();
                let revalidate_key = key.clone();
                tokio::spawn(async move {
                    if let Err(e) = this
                        .revalidate(revalidate_key.clone(), args, args_value)
                        .await
                    {
                        warn!("background revalidation for {} failed: {}", revalidate_key, e);
                    }
                });
                return Ok(stale);
            }
        }

        // EXECUTE: drop aged history first so it cannot inflate this call's
        // qualification count.
        inner.state.ledger.prune_expired(&key, inner.config.time_frame);

        execute_hook(Hook::ExecutionPre, plugins, &payload).await?;
        (events.on_before_function_execution)(&key);
        let execution_start = Instant::now();

        // Spawned so the execution always runs to completion, even if every
        // interested caller goes away mid-flight.
        let task = tokio::spawn((inner.original)(args.clone()));
        let execution: SharedExecution<T> = async move {
            match task.await {
                Ok(settled) => settled,
                Err(e) => Err(Error::ExecutionError(format!(
                    "wrapped function task failed: {}",
                    e
                ))),
            }
        }
        .boxed()
        .shared();
        inner.state.running.insert(&key, execution.clone());

        if let Err(e) = execute_hook(Hook::ExecutionPost, plugins, &payload).await {
            // The entry must not outlive the aborted call, or later callers
            // would attach to an execution nobody settles the books for.
            inner.state.running.remove(&key);
            return Err(e);
        }

        match execution.await {
            Ok(result) => {
                self.handle_result(&key, execution_start, result.clone(), &args, &args_value)
                    .await?;
                Ok(result)
            }
            Err(e) => {
                // Failures are never cached: evict immediately so the next
                // call re-attempts instead of replaying the error.
                inner.state.running.remove(&key);
                Err(e)
            }
        }
    }

    /// HANDLE_RESULT + QUALIFY: record telemetry, then write the cache if
    /// the call pattern has earned it.
    async fn handle_result(
        &self,
        key: &str,
        execution_start: Instant,
        result: T,
        args: &Args,
        args_value: &Value,
    ) -> Result<()> {
        let inner = &self.inner;
        let execution_end = Instant::now();
        let execution_time = execution_end.duration_since(execution_start);
        (inner.config.events.on_after_function_execution)(key, execution_time);

        inner.state.ledger.append(
            key,
            TimeFrameRecord {
                execution_time,
                execution_end,
            },
        );

        if inner.config.fetching_mode == FetchingMode::StaleWhileRevalidate {
            inner.state.stale.store(key, result.clone());
        }

        let records = inner.state.ledger.records_for(key);
        let amount = evaluator::exceeding_amount(&inner.config, &records, execution_time, args);
        debug!(
            "exceeding amount for {}: {} (threshold: {})",
            key, amount, inner.config.requests_threshold
        );

        let outcome = if amount >= inner.config.requests_threshold {
            self.write_data_cache_record(key, result, args_value).await
        } else {
            Ok(())
        };

        // Registry eviction runs on the completion path no matter what the
        // write did.
        inner.state.running.remove(key);
        outcome
    }

    /// WRITE_CACHE: add hooks around the adapter write, then arm the expiry
    /// timer per mode. Timer arming happens even when the write failed, so a
    /// half-written entry can never outstay its TTL.
    async fn write_data_cache_record(&self, key: &str, result: T, args_value: &Value) -> Result<()> {
        let inner = &self.inner;
        let payload = self.payload(key, Some(args_value.clone()), None);

        execute_hook(Hook::DataCacheRecordAddPre, &inner.config.plugins, &payload).await?;

        let record = DataCacheRecord::new(result.clone());
        let set_result = inner.config.cache.set(key, record, inner.config.ttl).await;

        let outcome = match set_result {
            Ok(()) => match serde_json::to_value(&result) {
                Ok(result_value) => {
                    let mut post_payload = payload.clone();
                    post_payload.result = Some(result_value);
                    match execute_hook(
                        Hook::DataCacheRecordAddPost,
                        &inner.config.plugins,
                        &post_payload,
                    )
                    .await
                    {
                        Ok(()) => {
                            (inner.config.events.on_cache_set)(key);
                            debug!("cached result for {}", key);
                            Ok(())
                        }
                        Err(e) => Err(e),
                    }
                }
                Err(e) => Err(Error::from(e)),
            },
            Err(e) => Err(e),
        };

        if inner.config.expiration_mode != ExpirationMode::Eject {
            self.arm_expiry_timer(key);
        }

        outcome
    }

    /// Fetch the cached value for `key`, removing it lazily if past TTL.
    async fn get_data_cache_record(&self, key: &str, payload: &PluginPayload) -> Result<Option<T>> {
        let cache = &self.inner.config.cache;
        if !cache.has(key).await? {
            return Ok(None);
        }
        match cache.get(key).await? {
            Some(record) => {
                if record.is_expired(self.inner.config.ttl) {
                    // An expired record observed on a read is removed on the
                    // spot, in every expiration mode.
                    self.delete_data_cache_record(key, payload, false).await?;
                    Ok(None)
                } else {
                    Ok(Some(record.result))
                }
            }
            None => Ok(None),
        }
    }

    /// Delete the record for `key`, with delete hooks around the storage
    /// call and the delete event after. `skip_storage` is the timeout-only
    /// timer path: hooks and event fire, the store is left alone.
    async fn delete_data_cache_record(
        &self,
        key: &str,
        payload: &PluginPayload,
        skip_storage: bool,
    ) -> Result<()> {
        let inner = &self.inner;
        execute_hook(Hook::DataCacheRecordDeletePre, &inner.config.plugins, payload).await?;
        if !skip_storage {
            inner.config.cache.delete(key).await?;
        }
        execute_hook(Hook::DataCacheRecordDeletePost, &inner.config.plugins, payload).await?;
        (inner.config.events.on_cache_delete)(key);
        debug!("deleted cache record for {} (storage skipped: {})", key, skip_storage);
        Ok(())
    }

    /// Schedule (or reschedule) deletion of `key` at TTL-from-now.
    fn arm_expiry_timer(&self, key: &str) {
        let this = self.clone();
        let timer_key = key.to_string();
        let ttl = self.inner.config.ttl;
        let skip_storage = self.inner.config.expiration_mode == ExpirationMode::TimeoutOnly;

        let handle = tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            let payload = this.payload(&timer_key, None, None);
            if let Err(e) = this
                .delete_data_cache_record(&timer_key, &payload, skip_storage)
                .await
            {
                warn!("scheduled expiry for {} failed: {}", timer_key, e);
            }
            this.inner.state.timers.discard(&timer_key);
        });
        self.inner.state.timers.arm(key, handle);
    }

    /// Keep-alive: a hit pushes the scheduled deletion out to TTL-from-now.
    async fn refresh_keep_alive(&self, key: &str, payload: &PluginPayload) -> Result<()> {
        let plugins = &self.inner.config.plugins;
        execute_hook(Hook::RefreshKeepAlivePre, plugins, payload).await?;
        self.arm_expiry_timer(key);
        execute_hook(Hook::RefreshKeepAlivePost, plugins, payload).await?;
        Ok(())
    }

    /// Boxed re-entry into the state machine, used by the detached
    /// stale-while-revalidate refresh.
    fn revalidate(&self, key: String, args: Args, args_value: Value) -> BoxFuture<'static, Result<T>> {
        let this = self.clone();
        async move { this.lets_candidate(key, args, args_value).await }.boxed()
    }

    fn payload(&self, key: &str, fn_args: Option<Value>, result: Option<Value>) -> PluginPayload {
        let inner = &self.inner;
        let ledger_records = inner
            .state
            .ledger
            .records_for(key)
            .iter()
            .map(|record| LedgerRecordSnapshot {
                execution_time_ms: record.execution_time.as_millis() as u64,
                age_ms: record.execution_end.elapsed().as_millis() as u64,
            })
            .collect();

        PluginPayload {
            config: inner.config.snapshot(),
            key: key.to_string(),
            fn_args,
            result,
            ledger_records,
            has_running_query: inner.state.running.contains(key),
            has_stale_value: inner.state.stale.contains(key),
            internals: inner.internals.clone(),
        }
    }

    /// SETUP hooks fire once at wrap time, detached; wrap itself stays
    /// synchronous so configuration errors surface immediately.
    fn dispatch_setup(&self) {
        let has_setup = self
            .inner
            .config
            .plugins
            .iter()
            .any(|plugin| plugin.hooks.iter().any(|hook| hook.hook == Hook::Setup));
        if !has_setup {
            return;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let this = self.clone();
                handle.spawn(async move {
                    let payload = this.payload("", None, None);
                    if let Err(e) =
                        execute_hook(Hook::Setup, &this.inner.config.plugins, &payload).await
                    {
                        warn!("SETUP hooks failed: {}", e);
                    }
                });
            }
            Err(_) => {
                warn!("no async runtime at wrap time; SETUP hooks were skipped");
            }
        }
    }

    fn make_internals(
        config: &CacheCandidateConfig<Args, T, A>,
        state: &CandidateState<T>,
    ) -> CandidateInternals {
        let ttl = config.ttl;
        let ttl_ms = ttl.as_millis() as u64;
        let millisecond_threshold = config.millisecond_threshold;

        let get_record = {
            let cache = config.cache.clone();
            Arc::new(move |key: String| {
                let cache = cache.clone();
                async move {
                    match cache.get(&key).await? {
                        Some(record) => Ok(Some(serde_json::to_value(&record)?)),
                        None => Ok(None),
                    }
                }
                .boxed()
            })
        };

        let add_record = {
            let cache = config.cache.clone();
            Arc::new(move |key: String, result: Value| {
                let cache = cache.clone();
                async move {
                    let result: T = serde_json::from_value(result)?;
                    cache.set(&key, DataCacheRecord::new(result), ttl).await
                }
                .boxed()
            })
        };

        let delete_record = {
            let cache = config.cache.clone();
            Arc::new(move |key: String| {
                let cache = cache.clone();
                async move { cache.delete(&key).await }.boxed()
            })
        };

        let threshold_evaluation = {
            let ledger = state.ledger.clone();
            Arc::new(move |key: String, execution_time: std::time::Duration| {
                let records = ledger.records_for(&key);
                match millisecond_threshold {
                    Some(threshold) => {
                        if execution_time > threshold {
                            records
                                .iter()
                                .filter(|record| record.execution_time > threshold)
                                .count() as u32
                        } else {
                            0
                        }
                    }
                    None => records.len() as u32,
                }
            })
        };

        CandidateInternals::new(
            Arc::new(|parts: &[&str]| KeyDeriver::derive(parts)),
            get_record,
            add_record,
            delete_record,
            Arc::new(move |birth_time: u64| {
                crate::adapter::epoch_millis().saturating_sub(birth_time) >= ttl_ms
            }),
            threshold_evaluation,
        )
    }
}
