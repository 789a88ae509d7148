//! Wrapper configuration: thresholds, expiry policy, events, and plugins.
//!
//! Configuration is immutable per wrapped function. It is assembled with
//! `with_*` builder methods and validated once at wrap time; an invalid
//! combination (eject expiry together with keep-alive) fails construction
//! synchronously and the wrapper is never usable.

use crate::adapter::{CacheAdapter, InMemoryAdapter};
use crate::error::{Error, Result};
use crate::evaluator::CandidateContext;
use crate::plugin::CandidatePlugin;
use serde::Serialize;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

/// Default TTL for qualified cache records (10 minutes).
pub const DEFAULT_TTL: Duration = Duration::from_millis(600_000);

/// Default sliding window for qualification history (30 seconds).
pub const DEFAULT_TIME_FRAME: Duration = Duration::from_millis(30_000);

/// Default number of qualifying calls before a result is cached.
pub const DEFAULT_REQUESTS_THRESHOLD: u32 = 3;

/// Candidate predicate: decides qualification directly from the call context.
pub type CandidateFn<Args> =
    Arc<dyn for<'a> Fn(&CandidateContext<'a, Args>) -> bool + Send + Sync>;

/// Custom key function: replaces SHA-256 fingerprinting wholesale.
///
/// No uniqueness guarantee is enforced once a custom key function is in
/// place; collision avoidance becomes the caller's responsibility.
pub type KeyFn<Args> = Arc<dyn Fn(&Args) -> String + Send + Sync>;

/// How a qualified cache record reaches the end of its life.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExpirationMode {
    /// On TTL elapse, delete the record from the store and emit the deletion
    /// hooks/event.
    #[default]
    Default,

    /// On TTL elapse, emit the deletion hooks/event but skip the storage
    /// delete; the store's own TTL (if any) is relied upon to reap the entry.
    TimeoutOnly,

    /// Schedule no timer at all; the record is removed reactively when a
    /// later read finds it past TTL. Incompatible with keep-alive.
    Eject,
}

impl std::fmt::Display for ExpirationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExpirationMode::Default => write!(f, "default"),
            ExpirationMode::TimeoutOnly => write!(f, "timeout-only"),
            ExpirationMode::Eject => write!(f, "eject"),
        }
    }
}

/// How a lookup treats an expired-but-remembered value.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FetchingMode {
    /// Expired records are simply misses.
    #[default]
    Default,

    /// Serve the last-known-good value immediately and refresh in the
    /// background.
    StaleWhileRevalidate,
}

impl std::fmt::Display for FetchingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchingMode::Default => write!(f, "default"),
            FetchingMode::StaleWhileRevalidate => write!(f, "stale-while-revalidate"),
        }
    }
}

/// Lifecycle event callbacks. Every callback defaults to a no-op.
///
/// Events are observational only: unlike plugin hooks they cannot abort a
/// call, and their return is ignored.
#[derive(Clone)]
pub struct CandidateEvents {
    pub on_cache_hit: Arc<dyn Fn(&str) + Send + Sync>,
    pub on_cache_set: Arc<dyn Fn(&str) + Send + Sync>,
    pub on_cache_delete: Arc<dyn Fn(&str) + Send + Sync>,
    pub on_before_function_execution: Arc<dyn Fn(&str) + Send + Sync>,
    pub on_after_function_execution: Arc<dyn Fn(&str, Duration) + Send + Sync>,
}

impl Default for CandidateEvents {
    fn default() -> Self {
        CandidateEvents {
            on_cache_hit: Arc::new(|_| {}),
            on_cache_set: Arc::new(|_| {}),
            on_cache_delete: Arc::new(|_| {}),
            on_before_function_execution: Arc::new(|_| {}),
            on_after_function_execution: Arc::new(|_, _| {}),
        }
    }
}

impl CandidateEvents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_on_cache_hit(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_cache_hit = Arc::new(f);
        self
    }

    pub fn with_on_cache_set(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_cache_set = Arc::new(f);
        self
    }

    pub fn with_on_cache_delete(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_cache_delete = Arc::new(f);
        self
    }

    pub fn with_on_before_function_execution(
        mut self,
        f: impl Fn(&str) + Send + Sync + 'static,
    ) -> Self {
        self.on_before_function_execution = Arc::new(f);
        self
    }

    pub fn with_on_after_function_execution(
        mut self,
        f: impl Fn(&str, Duration) + Send + Sync + 'static,
    ) -> Self {
        self.on_after_function_execution = Arc::new(f);
        self
    }
}

/// Serializable view of the scalar configuration, handed to candidate
/// predicates and plugin hook payloads.
#[derive(Clone, Debug, Serialize)]
pub struct ConfigSnapshot {
    pub ttl_ms: u64,
    pub time_frame_ms: u64,
    pub requests_threshold: u32,
    pub millisecond_threshold_ms: Option<u64>,
    pub expiration_mode: ExpirationMode,
    pub keep_alive: bool,
    pub fetching_mode: FetchingMode,
}

/// Configuration for one wrapped function.
///
/// # Example
///
/// ```ignore
/// use cache_candidate::{CacheCandidateConfig, ExpirationMode};
/// use std::time::Duration;
///
/// let config = CacheCandidateConfig::new()
///     .with_ttl(Duration::from_millis(800))
///     .with_requests_threshold(1)
///     .with_expiration_mode(ExpirationMode::Default);
/// ```
pub struct CacheCandidateConfig<Args, T, A> {
    /// Lifetime of a cached result once written.
    pub ttl: Duration,
    /// Sliding window over which repeated-call history is considered.
    pub time_frame: Duration,
    /// Number of qualifying calls required before caching triggers.
    pub requests_threshold: u32,
    /// Optional latency gate: only executions slower than this count.
    pub millisecond_threshold: Option<Duration>,
    /// Optional predicate that decides qualification outright.
    pub candidate_function: Option<CandidateFn<Args>>,
    /// Optional replacement for the default SHA-256 key derivation.
    pub custom_key: Option<KeyFn<Args>>,
    /// Expiry policy for qualified records.
    pub expiration_mode: ExpirationMode,
    /// Rearm the deletion timer on every hit instead of only on write.
    pub keep_alive: bool,
    /// Expired-lookup policy.
    pub fetching_mode: FetchingMode,
    /// Lifecycle event callbacks.
    pub events: CandidateEvents,
    /// Plugins, executed in registration order at every hook point.
    pub plugins: Vec<CandidatePlugin>,
    /// The cache store.
    pub cache: A,
    _result: PhantomData<fn() -> T>,
}

impl<Args, T> CacheCandidateConfig<Args, T, InMemoryAdapter<T>> {
    /// Configuration with every default: 10-minute TTL, 30-second time
    /// frame, threshold of 3, default expiry and fetching modes, no-op
    /// events, no plugins, and a fresh in-memory adapter.
    pub fn new() -> Self {
        CacheCandidateConfig {
            ttl: DEFAULT_TTL,
            time_frame: DEFAULT_TIME_FRAME,
            requests_threshold: DEFAULT_REQUESTS_THRESHOLD,
            millisecond_threshold: None,
            candidate_function: None,
            custom_key: None,
            expiration_mode: ExpirationMode::Default,
            keep_alive: false,
            fetching_mode: FetchingMode::Default,
            events: CandidateEvents::default(),
            plugins: Vec::new(),
            cache: InMemoryAdapter::new(),
            _result: PhantomData,
        }
    }
}

impl<Args, T> Default for CacheCandidateConfig<Args, T, InMemoryAdapter<T>> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Args, T, A> CacheCandidateConfig<Args, T, A> {
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_time_frame(mut self, time_frame: Duration) -> Self {
        self.time_frame = time_frame;
        self
    }

    pub fn with_requests_threshold(mut self, threshold: u32) -> Self {
        self.requests_threshold = threshold;
        self
    }

    pub fn with_millisecond_threshold(mut self, threshold: Duration) -> Self {
        self.millisecond_threshold = Some(threshold);
        self
    }

    pub fn with_candidate_function(
        mut self,
        f: impl for<'a> Fn(&CandidateContext<'a, Args>) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.candidate_function = Some(Arc::new(f));
        self
    }

    pub fn with_custom_key(mut self, f: impl Fn(&Args) -> String + Send + Sync + 'static) -> Self {
        self.custom_key = Some(Arc::new(f));
        self
    }

    pub fn with_expiration_mode(mut self, mode: ExpirationMode) -> Self {
        self.expiration_mode = mode;
        self
    }

    pub fn with_keep_alive(mut self, keep_alive: bool) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    pub fn with_fetching_mode(mut self, mode: FetchingMode) -> Self {
        self.fetching_mode = mode;
        self
    }

    pub fn with_events(mut self, events: CandidateEvents) -> Self {
        self.events = events;
        self
    }

    pub fn with_plugin(mut self, plugin: CandidatePlugin) -> Self {
        self.plugins.push(plugin);
        self
    }

    pub fn with_plugins(mut self, plugins: Vec<CandidatePlugin>) -> Self {
        self.plugins = plugins;
        self
    }

    /// Swap the cache store, keeping every other setting.
    pub fn with_cache<A2>(self, cache: A2) -> CacheCandidateConfig<Args, T, A2> {
        CacheCandidateConfig {
            ttl: self.ttl,
            time_frame: self.time_frame,
            requests_threshold: self.requests_threshold,
            millisecond_threshold: self.millisecond_threshold,
            candidate_function: self.candidate_function,
            custom_key: self.custom_key,
            expiration_mode: self.expiration_mode,
            keep_alive: self.keep_alive,
            fetching_mode: self.fetching_mode,
            events: self.events,
            plugins: self.plugins,
            cache,
            _result: PhantomData,
        }
    }

    /// Validate the configuration.
    ///
    /// # Errors
    /// Returns `Error::ConfigError` for the eject + keep-alive combination:
    /// eject mode never schedules a timer, so there is nothing for a hit to
    /// keep alive.
    pub fn validate(&self) -> Result<()> {
        if self.expiration_mode == ExpirationMode::Eject && self.keep_alive {
            return Err(Error::ConfigError(
                "expiration_mode 'eject' cannot be combined with keep_alive".to_string(),
            ));
        }
        Ok(())
    }

    /// Serializable view of the scalar settings.
    pub fn snapshot(&self) -> ConfigSnapshot {
        ConfigSnapshot {
            ttl_ms: self.ttl.as_millis() as u64,
            time_frame_ms: self.time_frame.as_millis() as u64,
            requests_threshold: self.requests_threshold,
            millisecond_threshold_ms: self.millisecond_threshold.map(|d| d.as_millis() as u64),
            expiration_mode: self.expiration_mode,
            keep_alive: self.keep_alive,
            fetching_mode: self.fetching_mode,
        }
    }
}

impl<Args, T, A: CacheAdapter<T>> Clone for CacheCandidateConfig<Args, T, A> {
    fn clone(&self) -> Self {
        CacheCandidateConfig {
            ttl: self.ttl,
            time_frame: self.time_frame,
            requests_threshold: self.requests_threshold,
            millisecond_threshold: self.millisecond_threshold,
            candidate_function: self.candidate_function.clone(),
            custom_key: self.custom_key.clone(),
            expiration_mode: self.expiration_mode,
            keep_alive: self.keep_alive,
            fetching_mode: self.fetching_mode,
            events: self.events.clone(),
            plugins: self.plugins.clone(),
            cache: self.cache.clone(),
            _result: PhantomData,
        }
    }
}
