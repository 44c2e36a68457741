//! Integration tests for reproducibility stamps.

use chrono::{TimeZone, Utc};
use proptest::prelude::*;
use serde_json::json;
use taskbrain_core::versioning::{compare, fingerprint, stamp};
use taskbrain_core::{Priority, TaskRecord};

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Reordering tasks does not change the context hash.
    #[test]
    fn prop_context_hash_is_order_independent(
        efforts in prop::collection::vec(0.0f64..100.0, 1..12),
        seed in any::<u64>(),
    ) {
        let tasks: Vec<TaskRecord> = efforts
            .iter()
            .enumerate()
            .map(|(i, e)| {
                let mut t = TaskRecord::new(format!("task-{i}"), *e);
                t.priority = if i % 2 == 0 { Priority::High } else { Priority::Low };
                t
            })
            .collect();

        let mut shuffled = tasks.clone();
        let len = shuffled.len();
        shuffled.rotate_left((seed as usize) % len);
        shuffled.reverse();

        prop_assert_eq!(
            fingerprint(&json!({"energy": "high", "tasks": tasks})),
            fingerprint(&json!({"tasks": shuffled, "energy": "high"}))
        );
    }
}

#[test]
fn identical_rules_and_context_give_identical_stamps() {
    let rules = json!({"budget": {"lock_threshold": 0.95}, "weights": {"playlist.energy": 0.4}});
    let context = json!({"tasks": ["b", "a"], "energy": "low"});
    let same_context = json!({"energy": "low", "tasks": ["a", "b"]});

    let now = Utc.with_ymd_and_hms(2026, 1, 1, 8, 0, 0).unwrap();
    let a = stamp(&rules, &context, now);
    let b = stamp(&rules, &same_context, now);
    assert_eq!(a.rules_hash, b.rules_hash);
    assert_eq!(a.decision_context_hash, b.decision_context_hash);
    assert!(compare(&a, &b).reproducible);
}

#[test]
fn changed_rules_are_reported_but_not_fatal() {
    let now = Utc.with_ymd_and_hms(2026, 1, 1, 8, 0, 0).unwrap();
    let a = stamp(&json!({"lock": 0.95}), &json!({"t": 1}), now);
    let b = stamp(&json!({"lock": 0.90}), &json!({"t": 1}), now);
    let report = compare(&a, &b);
    assert!(!report.rules_match);
    assert!(report.context_matches);
    assert!(!report.reproducible);
}
