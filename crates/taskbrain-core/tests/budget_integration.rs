//! Integration tests for the budget ledger and cost engine.
//!
//! Covers the load invariant across arbitrary commit sequences and the
//! refuse-then-force flow through the brain.

use chrono::{TimeZone, Utc};
use proptest::prelude::*;
use taskbrain_core::{
    Brain, BrainConfig, BudgetLedger, CostEngine, DailyBudget, Evaluation, EvaluationContext,
    EnergyLevel, Priority, RefusalReason, SchedulingRequest, TaskRecord,
};

fn ctx(budget: &DailyBudget) -> EvaluationContext {
    EvaluationContext {
        budget: Some(budget.clone()),
        protective_active: false,
        energy: EnergyLevel::Medium,
        now: Utc.with_ymd_and_hms(2026, 3, 10, 14, 0, 0).unwrap(),
        override_pressure: 0.0,
    }
}

fn arb_priority() -> impl Strategy<Value = Priority> {
    prop_oneof![
        Just(Priority::Low),
        Just(Priority::Medium),
        Just(Priority::High),
        Just(Priority::Critical),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// used_load + remaining == max_load before and after every commit, and
    /// remaining never goes negative.
    #[test]
    fn prop_commits_keep_budget_balanced(
        max_load in 10.0f64..500.0,
        used_share in 0.0f64..1.0,
        tasks in prop::collection::vec((0.0f64..200.0, arb_priority(), any::<bool>()), 1..20),
    ) {
        let engine = CostEngine::default();
        let mut ledger = BudgetLedger::new(DailyBudget::with_usage(max_load, max_load * used_share, 0.95));
        prop_assert!(ledger.budget().is_balanced());

        for (i, (effort, priority, force)) in tasks.into_iter().enumerate() {
            let mut task = TaskRecord::new(format!("t{i}"), effort);
            task.priority = priority;
            let budget = ledger.snapshot();

            match engine.evaluate(&task, &ctx(&budget)) {
                Evaluation::Allowed { .. } => {
                    prop_assert!(ledger.activate(&task).is_ok());
                }
                Evaluation::Refused { cost, .. } => {
                    prop_assert!(cost.total > 0.0 && cost.total < 1.0);
                    if force {
                        ledger.commit_override(&task, &cost);
                    }
                }
            }

            let after = ledger.budget();
            prop_assert!(after.is_balanced());
            prop_assert!(after.remaining >= 0.0);
            prop_assert!(after.overdraft >= 0.0);
        }
    }
}

#[test]
fn refused_task_forced_through_brain_leaves_nonnegative_budget() {
    let config = BrainConfig::default();
    let mut brain = Brain::new(config);
    let now = Utc.with_ymd_and_hms(2026, 3, 10, 9, 0, 0).unwrap();

    // Use 80 of 100 first.
    let warmup = brain.decide(
        &SchedulingRequest {
            session_id: "s1".to_string(),
            tasks: vec![TaskRecord::new("warmup", 80.0)],
            energy: EnergyLevel::Medium,
            available_minutes: None,
        },
        now,
    );
    brain.activate(&warmup, "warmup").unwrap();
    assert_eq!(brain.budget().remaining, 20.0);

    let mut big = TaskRecord::new("big", 30.0);
    big.priority = Priority::High;
    let decision = brain.decide(
        &SchedulingRequest {
            session_id: "s1".to_string(),
            tasks: vec![big],
            energy: EnergyLevel::Medium,
            available_minutes: None,
        },
        now,
    );

    assert!(decision.rejected_task_ids.contains("big"));
    assert_eq!(decision.refusals["big"], RefusalReason::InsufficientBudget);
    let cost = &decision.costs["big"];
    assert!(cost.total > 0.0 && cost.total < 1.0);

    let forced = brain.force(&decision, "big", true, now).unwrap();
    assert!(forced.receipt.budget_after.remaining >= 0.0);
    assert!(brain.budget().overdraft > 0.0);

    // The overdraft shrinks tomorrow's budget.
    let tomorrow = brain.reset_cycle(None);
    assert!(tomorrow.max_load < 100.0);
    assert!(tomorrow.is_balanced());
}

#[test]
fn malformed_budget_yields_degraded_refusal_not_panic() {
    let engine = CostEngine::default();
    let mut c = ctx(&DailyBudget::new(100.0, 0.95));
    c.budget = Some(DailyBudget {
        max_load: f64::NAN,
        used_load: 0.0,
        remaining: 100.0,
        lock_threshold: 0.95,
        overdraft: 0.0,
    });
    let eval = engine.evaluate(&TaskRecord::new("t", 5.0), &c);
    let cost = eval.cost().expect("refused");
    assert!(cost.degraded);
    assert!(cost.explanation_required);
}
