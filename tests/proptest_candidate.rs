//! Property-based tests for the pure components.
//!
//! These tests use proptest to verify that the key deriver, the time-frame
//! ledger, and the qualification evaluator hold their invariants for
//! randomly generated inputs, catching edge cases that example-based tests
//! might miss.
//!
//! # Properties Tested
//!
//! 1. **Determinism**: derive(parts) == derive(parts) always
//! 2. **Shape**: every derived key is 64 lowercase hex characters
//! 3. **Separation**: changing any identity part changes the key
//! 4. **Pruning**: prune keeps exactly the records still inside the frame
//! 5. **Evaluator bounds**: the amount never exceeds the record count in the
//!    frequency and latency modes

use cache_candidate::evaluator::exceeding_amount;
use cache_candidate::{
    CacheCandidateConfig, InMemoryAdapter, KeyDeriver, TimeFrameLedger, TimeFrameRecord,
};
use proptest::prelude::*;
use std::time::{Duration, Instant};

fn record_with(execution_time_ms: u64, age_ms: u64) -> TimeFrameRecord {
    let now = Instant::now();
    TimeFrameRecord {
        execution_time: Duration::from_millis(execution_time_ms),
        execution_end: now
            .checked_sub(Duration::from_millis(age_ms))
            .unwrap_or(now),
    }
}

proptest! {
    #[test]
    fn prop_key_derivation_is_deterministic(parts in prop::collection::vec("[a-z0-9{}:,\\[\\]\"]{0,40}", 1..6)) {
        let part_refs: Vec<&str> = parts.iter().map(String::as_str).collect();
        prop_assert_eq!(KeyDeriver::derive(&part_refs), KeyDeriver::derive(&part_refs));
    }

    #[test]
    fn prop_key_is_64_hex_chars(parts in prop::collection::vec(".{0,60}", 1..6)) {
        let part_refs: Vec<&str> = parts.iter().map(String::as_str).collect();
        let key = KeyDeriver::derive(&part_refs);
        prop_assert_eq!(key.len(), 64);
        prop_assert!(key.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn prop_changing_a_part_changes_the_key(
        base in "[a-z0-9]{1,30}",
        args in "[a-z0-9]{1,30}",
        other in "[a-z0-9]{1,30}",
    ) {
        prop_assume!(base != other);
        prop_assert_ne!(
            KeyDeriver::derive(&[&base, &args]),
            KeyDeriver::derive(&[&other, &args])
        );
    }

    #[test]
    fn prop_prune_keeps_exactly_in_frame_records(
        ages in prop::collection::vec(0u64..5_000, 0..20),
        time_frame_ms in 1u64..5_000,
    ) {
        let ledger = TimeFrameLedger::new();
        for age in &ages {
            ledger.append("key", record_with(1, *age));
        }

        ledger.prune_expired("key", Duration::from_millis(time_frame_ms));

        // Records strictly younger than the frame survive; boundary records
        // may go either way depending on elapsed wall time, so only bound
        // the count from both sides.
        let strictly_inside = ages.iter().filter(|age| **age + 50 < time_frame_ms).count();
        let possibly_inside = ages.iter().filter(|age| **age < time_frame_ms).count();
        let kept = ledger.len("key");
        prop_assert!(kept >= strictly_inside);
        prop_assert!(kept <= possibly_inside);
    }

    #[test]
    fn prop_default_amount_equals_record_count(count in 0usize..30) {
        let config = CacheCandidateConfig::<u32, u32, InMemoryAdapter<u32>>::new()
            .with_requests_threshold(3);
        let records: Vec<TimeFrameRecord> =
            (0..count).map(|_| record_with(1, 0)).collect();

        let amount = exceeding_amount(&config, &records, Duration::from_millis(1), &0);
        prop_assert_eq!(amount as usize, count);
    }

    #[test]
    fn prop_latency_amount_never_exceeds_record_count(
        times in prop::collection::vec(0u64..200, 0..30),
        threshold_ms in 1u64..200,
        current_ms in 0u64..200,
    ) {
        let config = CacheCandidateConfig::<u32, u32, InMemoryAdapter<u32>>::new()
            .with_millisecond_threshold(Duration::from_millis(threshold_ms));
        let records: Vec<TimeFrameRecord> =
            times.iter().map(|t| record_with(*t, 0)).collect();

        let amount = exceeding_amount(&config, &records, Duration::from_millis(current_ms), &0);
        prop_assert!(amount as usize <= records.len());
        if current_ms <= threshold_ms {
            prop_assert_eq!(amount, 0);
        }
    }

    #[test]
    fn prop_candidate_function_forces_threshold_or_zero(
        count in 0usize..30,
        threshold in 1u32..10,
        accept in any::<bool>(),
    ) {
        let config = CacheCandidateConfig::<u32, u32, InMemoryAdapter<u32>>::new()
            .with_requests_threshold(threshold)
            .with_candidate_function(move |_ctx| accept);
        let records: Vec<TimeFrameRecord> =
            (0..count).map(|_| record_with(1, 0)).collect();

        let amount = exceeding_amount(&config, &records, Duration::from_millis(1), &0);
        prop_assert_eq!(amount, if accept { threshold } else { 0 });
    }
}
