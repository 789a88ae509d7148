//! Per-key time-frame ledger of recent executions.
//!
//! Every completed execution appends one record; qualification reads the
//! records still inside the sliding time frame. Pruning is lazy and happens
//! once per invocation, after the fast paths (cache hit, running query) are
//! ruled out, so stale history never inflates the threshold count seen by the
//! in-flight call.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// One completed execution: how long it took and when it finished.
///
/// `execution_end` is monotonic; ledger records never leave the process.
#[derive(Clone, Debug)]
pub struct TimeFrameRecord {
    pub execution_time: Duration,
    pub execution_end: Instant,
}

/// Per-key ordered log of recent execution records.
///
/// Cloning is cheap and clones share the same underlying map; the ledger is
/// owned by exactly one wrapper instance and shared with its timers and
/// plugin internals.
pub struct TimeFrameLedger {
    records: Arc<DashMap<String, Vec<TimeFrameRecord>>>,
}

impl TimeFrameLedger {
    pub fn new() -> Self {
        TimeFrameLedger {
            records: Arc::new(DashMap::new()),
        }
    }

    /// Append a record for `key`. Append is unconditional: every completed
    /// execution is recorded, whether or not it ends up qualifying.
    pub fn append(&self, key: &str, record: TimeFrameRecord) {
        self.records
            .entry(key.to_string())
            .or_default()
            .push(record);
    }

    /// Drop every record for `key` that has aged out of `time_frame`.
    pub fn prune_expired(&self, key: &str, time_frame: Duration) {
        if let Some(mut entry) = self.records.get_mut(key) {
            let now = Instant::now();
            entry.retain(|record| record.execution_end + time_frame > now);
        }
    }

    /// Snapshot of the records currently held for `key`.
    ///
    /// A missing key yields an empty vector, not a fault.
    pub fn records_for(&self, key: &str) -> Vec<TimeFrameRecord> {
        self.records
            .get(key)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    /// Number of records currently held for `key`.
    pub fn len(&self, key: &str) -> usize {
        self.records.get(key).map(|entry| entry.len()).unwrap_or(0)
    }
}

impl Default for TimeFrameLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for TimeFrameLedger {
    fn clone(&self) -> Self {
        TimeFrameLedger {
            records: Arc::clone(&self.records),
        }
    }
}
