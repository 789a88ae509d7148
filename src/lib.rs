//! # cache-candidate
//!
//! An adaptive function-memoization layer: wrap an asynchronous (or
//! synchronous) function and let the engine decide, call by call, whether the
//! result is a "cache candidate" - worth caching - based on repeated-call
//! frequency, execution latency, or a custom predicate.
//!
//! ## Features
//!
//! - **Adaptive qualification:** cache only what a time-framed call history,
//!   a latency threshold, or your own predicate says is worth caching
//! - **De-duplication:** concurrent identical calls share one in-flight
//!   execution and observe the same settled result or failure
//! - **Expiry policies:** timer-driven deletion, event-only timeouts, or
//!   lazy ejection, with optional keep-alive renewal on every hit
//! - **Stale-while-revalidate:** serve the last-known-good value immediately
//!   while a detached refresh runs
//! - **Pluggable storage:** in-memory by default, Redis behind the `redis`
//!   feature, or any [`CacheAdapter`] implementation
//! - **Extensible:** ordered plugin hooks at every lifecycle transition, and
//!   a dependency-tag side-module for bulk invalidation
//!
//! ## Quick Start
//!
//! ```ignore
//! use cache_candidate::{cache_candidate, CacheCandidateConfig};
//! use std::time::Duration;
//!
//! # async fn demo() -> cache_candidate::Result<()> {
//! let wrapped = cache_candidate(
//!     |user_id: u64| async move {
//!         // expensive lookup
//!         Ok(format!("user-{}", user_id))
//!     },
//!     CacheCandidateConfig::new()
//!         .with_requests_threshold(1)
//!         .with_ttl(Duration::from_millis(800)),
//! )?;
//!
//! let fresh = wrapped.call(42).await?;   // executes and caches
//! let cached = wrapped.call(42).await?;  // served from cache
//! assert_eq!(fresh, cached);
//! # Ok(())
//! # }
//! ```
//!
//! ## Method Wrapping
//!
//! To cache a method per instance, hand the wrapper an explicit
//! [`MethodScope`] built from the type name, a stable instance identity, and
//! the method name:
//!
//! ```ignore
//! use cache_candidate::{CacheCandidate, CacheCandidateConfig, MethodScope};
//!
//! let scope = MethodScope::new("UserService", format!("tenant-{}", tenant_id), "load");
//! let wrapped = CacheCandidate::for_method(load_fn, scope, CacheCandidateConfig::new())?;
//! ```

#[macro_use]
extern crate log;

pub mod adapter;
pub mod candidate;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod key;
pub mod ledger;
pub mod manager;
pub mod plugin;
pub mod state;

// Re-exports for convenience
pub use adapter::{CacheAdapter, DataCacheRecord, InMemoryAdapter};
#[cfg(feature = "redis")]
pub use adapter::{RedisAdapter, RedisConfig};
pub use candidate::{cache_candidate, CacheCandidate};
pub use config::{
    CacheCandidateConfig, CandidateEvents, ConfigSnapshot, ExpirationMode, FetchingMode,
};
pub use error::{Error, Result};
pub use evaluator::CandidateContext;
pub use key::{KeyDeriver, MethodScope};
pub use ledger::{TimeFrameLedger, TimeFrameRecord};
pub use manager::{dependency_keys_plugin, DependencyManager, DependencyRegistration};
pub use plugin::{
    ActionableHook, CandidateInternals, CandidatePlugin, Hook, PluginPayload,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
