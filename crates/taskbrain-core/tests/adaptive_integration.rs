//! Integration tests for the overfitting guard.

use chrono::{DateTime, Duration, TimeZone, Utc};
use proptest::prelude::*;
use taskbrain_core::adaptive::{is_adaptation_allowed, Observation};
use taskbrain_core::config::AdaptiveConfig;
use taskbrain_core::OverfittingGuard;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Whatever the sample count or values, a window shorter than 30 days
    /// never passes.
    #[test]
    fn prop_short_windows_never_adapt(
        offsets in prop::collection::vec(0i64..(30 * 24 * 60 - 1), 2..300),
        value in 0.0f64..1.0,
    ) {
        let window: Vec<Observation> = offsets
            .iter()
            .map(|m| Observation { value, at: t0() + Duration::minutes(*m) })
            .collect();
        prop_assert!(!is_adaptation_allowed(&window, &AdaptiveConfig::default()));

        let mut guard = OverfittingGuard::new(AdaptiveConfig::default());
        for o in &window {
            guard.observe("f", o.value, o.at);
        }
        let latest = window.iter().map(|o| o.at).max().unwrap_or_else(t0);
        prop_assert!(!guard.propose("f", 0.5, latest).is_accepted());
        prop_assert!(guard.weight("f").is_none());
    }
}

#[test]
fn daily_sessions_adapt_only_after_thirty_days() {
    let mut guard = OverfittingGuard::new(AdaptiveConfig::default());
    let mut first_accepted = None;

    for day in 0..40 {
        let at = t0() + Duration::days(day);
        guard.observe("override_pressure", 0.2, at);
        if guard.propose("override_pressure", 0.0, at).is_accepted() && first_accepted.is_none() {
            first_accepted = Some(day);
        }
    }
    assert_eq!(first_accepted, Some(30));
}

#[test]
fn expired_adaptation_needs_fresh_evidence() {
    let mut guard = OverfittingGuard::new(AdaptiveConfig::default());
    for day in 0..=30 {
        guard.observe("f", 0.5, t0() + Duration::days(day));
    }
    let accepted_at = t0() + Duration::days(30);
    assert!(guard.propose("f", 0.5, accepted_at).is_accepted());

    let after_ttl = accepted_at + Duration::days(60);
    guard.tick(after_ttl);
    assert!(guard.weight("f").is_none());

    guard.observe("f", 0.5, after_ttl);
    assert!(!guard.propose("f", 0.5, after_ttl).is_accepted());
}
