//! Qualification evaluator.
//!
//! Pure decision logic: given the ledger history for a key and the
//! configuration, compute the "exceeding amount" that is compared against the
//! requests threshold. Caching triggers when the amount reaches the
//! threshold.

use crate::adapter::CacheAdapter;
use crate::config::{CacheCandidateConfig, ConfigSnapshot};
use crate::ledger::TimeFrameRecord;
use std::time::Duration;

/// Context handed to a candidate predicate.
pub struct CandidateContext<'a, Args> {
    /// Ledger records for this key, the just-finished execution included.
    pub records: &'a [TimeFrameRecord],
    /// Scalar configuration view.
    pub config: &'a ConfigSnapshot,
    /// The call arguments.
    pub args: &'a Args,
}

/// Compute the amount compared against `requests_threshold`.
///
/// Three mutually exclusive modes, in precedence order:
///
/// 1. A candidate predicate decides outright: `true` forces exactly the
///    threshold (immediate qualification), `false` forces 0.
/// 2. A millisecond threshold counts how many recorded executions (this one
///    included) ran longer than the threshold - but only when the current
///    execution itself did.
/// 3. Otherwise the amount is simply the number of records still inside the
///    time frame.
///
/// A new key with no history evaluates against an empty record slice.
pub fn exceeding_amount<Args, T, A: CacheAdapter<T>>(
    config: &CacheCandidateConfig<Args, T, A>,
    records: &[TimeFrameRecord],
    execution_time: Duration,
    args: &Args,
) -> u32 {
    if let Some(candidate_function) = &config.candidate_function {
        let snapshot = config.snapshot();
        let context = CandidateContext {
            records,
            config: &snapshot,
            args,
        };
        return if candidate_function(&context) {
            config.requests_threshold
        } else {
            0
        };
    }

    if let Some(threshold) = config.millisecond_threshold {
        return amount_from_millisecond_threshold(records, execution_time, threshold);
    }

    records.len() as u32
}

fn amount_from_millisecond_threshold(
    records: &[TimeFrameRecord],
    execution_time: Duration,
    threshold: Duration,
) -> u32 {
    if execution_time <= threshold {
        return 0;
    }
    records
        .iter()
        .filter(|record| record.execution_time > threshold)
        .count() as u32
}
