//! Task evaluation against the budget and override cost pricing.
//!
//! Cost composition (before adjustments):
//! - Priority factor: 45% (critical is cheapest to force, low the dearest)
//! - Budget scarcity: 35%
//! - Shortfall of this task against usable capacity: 20%
//!
//! The result is scaled by the adaptive override pressure, bumped during late
//! hours, floored while protective mode is active, and clamped into
//! `[0.05, 0.95]`.

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

use super::{DailyBudget, LOAD_EPSILON};
use crate::config::BudgetConfig;
use crate::records::{EnergyLevel, TaskRecord};

const MIN_COST: f64 = 0.05;
const MAX_COST: f64 = 0.95;
const LATE_HOURS_BUMP: f64 = 0.1;
/// Largest discount an urgent task gets on its override price.
const URGENCY_DISCOUNT: f64 = 0.1;

/// Which resource an override mostly borrows from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum CostType {
    Time,
    Energy,
    Focus,
}

/// Severity shown to the user alongside an override.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "UPPERCASE")]
pub enum WarningLevel {
    Low,
    Medium,
    High,
}

impl WarningLevel {
    /// Classify a cost total.
    pub fn from_total(total: f64) -> Self {
        if total < 0.35 {
            WarningLevel::Low
        } else if total < 0.7 {
            WarningLevel::Medium
        } else {
            WarningLevel::High
        }
    }
}

/// What forcing a refused task does to the user's budget and protections.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OverrideConsequences {
    /// Extra load charged on commit, in budget units
    pub budget_reduction: f64,
    pub protection_disabled: bool,
    pub warning_level: WarningLevel,
}

/// Explicit price of forcing a refused task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OverrideCost {
    pub cost_type: CostType,
    /// Fraction of future budget (strictly between 0 and 1)
    pub total: f64,
    pub explanation_required: bool,
    pub consequences: OverrideConsequences,
    /// Conservative profile used when the inputs could not be trusted
    #[serde(default)]
    pub degraded: bool,
}

/// Why a task was refused.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum RefusalReason {
    InsufficientBudget,
    Locked,
    /// Protective mode only admits short, light tasks
    ProtectiveLimit,
    MalformedContext(String),
}

impl RefusalReason {
    /// Short human-readable reason.
    pub fn describe(&self) -> String {
        match self {
            RefusalReason::InsufficientBudget => "not enough budget left today".to_string(),
            RefusalReason::Locked => "daily budget is locked".to_string(),
            RefusalReason::ProtectiveLimit => {
                "protective mode only allows short, light tasks".to_string()
            }
            RefusalReason::MalformedContext(detail) => {
                format!("budget could not be verified ({detail})")
            }
        }
    }
}

/// Outcome of evaluating one task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Evaluation {
    Allowed { load: f64, remaining_after: f64 },
    Refused { reason: RefusalReason, cost: OverrideCost },
}

impl Evaluation {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Evaluation::Allowed { .. })
    }

    /// Override cost, if the task was refused.
    pub fn cost(&self) -> Option<&OverrideCost> {
        match self {
            Evaluation::Refused { cost, .. } => Some(cost),
            Evaluation::Allowed { .. } => None,
        }
    }
}

/// Inputs an evaluation depends on besides the task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EvaluationContext {
    /// `None` when storage could not supply a budget
    pub budget: Option<DailyBudget>,
    pub protective_active: bool,
    pub energy: EnergyLevel,
    pub now: DateTime<Utc>,
    /// Adaptive pressure from chronic forcing (0.0-1.0)
    #[serde(default)]
    pub override_pressure: f64,
}

/// Stateless evaluator; the budget itself is owned by the ledger.
#[derive(Debug, Clone, Default)]
pub struct CostEngine {
    config: BudgetConfig,
}

impl CostEngine {
    pub fn new(config: BudgetConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BudgetConfig {
        &self.config
    }

    /// Decide whether `task` fits, or price the override if it doesn't.
    ///
    /// Never fails: malformed inputs yield a degraded refusal.
    pub fn evaluate(&self, task: &TaskRecord, ctx: &EvaluationContext) -> Evaluation {
        let budget = match self.checked_budget(task, ctx) {
            Ok(budget) => budget,
            Err(detail) => {
                tracing::warn!(task_id = %task.id, %detail, "degraded evaluation");
                return Evaluation::Refused {
                    cost: self.degraded_cost(task, ctx),
                    reason: RefusalReason::MalformedContext(detail),
                };
            }
        };

        let load = task.estimated_load();
        let reason = if budget.is_locked() {
            Some(RefusalReason::Locked)
        } else if ctx.protective_active && self.exceeds_protective_limit(task) {
            Some(RefusalReason::ProtectiveLimit)
        } else if load > self.usable_capacity(budget, ctx) + LOAD_EPSILON {
            Some(RefusalReason::InsufficientBudget)
        } else {
            None
        };

        match reason {
            None => Evaluation::Allowed {
                load,
                remaining_after: budget.remaining - load,
            },
            Some(reason) => Evaluation::Refused {
                cost: self.override_cost(task, budget, ctx),
                reason,
            },
        }
    }

    /// Price of forcing `task` against `budget`.
    pub fn override_cost(
        &self,
        task: &TaskRecord,
        budget: &DailyBudget,
        ctx: &EvaluationContext,
    ) -> OverrideCost {
        let load = task.estimated_load();
        let capacity = self.usable_capacity(budget, ctx);

        let priority_factor = task.priority.cost_factor();
        let scarcity = if budget.max_load > 0.0 {
            (1.0 - budget.remaining / budget.max_load).clamp(0.0, 1.0)
        } else {
            1.0
        };
        let shortfall = if load > 0.0 {
            ((load - capacity).max(0.0) / load).min(1.0)
        } else {
            0.0
        };

        let urgency = if task.urgency.is_finite() {
            task.urgency.clamp(0.0, 1.0)
        } else {
            0.0
        };

        let mut raw = 0.45 * priority_factor + 0.35 * scarcity + 0.20 * shortfall;
        raw = (raw - URGENCY_DISCOUNT * urgency).max(0.0);
        raw *= 1.0 + 0.5 * ctx.override_pressure.clamp(0.0, 1.0);
        if is_late_hours(ctx.now) {
            raw += LATE_HOURS_BUMP;
        }
        if ctx.protective_active {
            raw = raw.max(self.config.protective_cost_floor);
        }
        let total = raw.clamp(MIN_COST, MAX_COST);

        let mut warning_level = WarningLevel::from_total(total);
        if ctx.protective_active {
            warning_level = warning_level.max(WarningLevel::Medium);
        }

        let cost_type = if ctx.protective_active || ctx.energy == EnergyLevel::Low {
            CostType::Energy
        } else if task.energy == EnergyLevel::High {
            CostType::Focus
        } else {
            CostType::Time
        };

        OverrideCost {
            cost_type,
            total,
            explanation_required: warning_level == WarningLevel::High,
            consequences: OverrideConsequences {
                budget_reduction: total * load.max(0.0),
                protection_disabled: ctx.protective_active,
                warning_level,
            },
            degraded: false,
        }
    }

    /// Conservative cost used when the context cannot be trusted.
    fn degraded_cost(&self, task: &TaskRecord, ctx: &EvaluationContext) -> OverrideCost {
        let load = task.estimated_load();
        let load = if load.is_finite() { load.max(0.0) } else { 0.0 };
        OverrideCost {
            cost_type: CostType::Time,
            total: self.config.degraded_cost_total.clamp(MIN_COST, MAX_COST),
            explanation_required: true,
            consequences: OverrideConsequences {
                budget_reduction: load,
                protection_disabled: ctx.protective_active,
                warning_level: WarningLevel::High,
            },
            degraded: true,
        }
    }

    fn checked_budget<'a>(
        &self,
        task: &TaskRecord,
        ctx: &'a EvaluationContext,
    ) -> Result<&'a DailyBudget, String> {
        let budget = ctx.budget.as_ref().ok_or_else(|| "budget missing".to_string())?;
        budget.validate()?;
        let load = task.estimated_load();
        if !load.is_finite() || load < 0.0 {
            return Err(format!("task effort {load} is invalid"));
        }
        if !ctx.override_pressure.is_finite() {
            return Err("override pressure is not a finite number".to_string());
        }
        Ok(budget)
    }

    fn usable_capacity(&self, budget: &DailyBudget, ctx: &EvaluationContext) -> f64 {
        if ctx.protective_active {
            budget.remaining * self.config.protective_capacity_factor
        } else {
            budget.remaining
        }
    }

    fn exceeds_protective_limit(&self, task: &TaskRecord) -> bool {
        let too_long = task
            .estimated_minutes
            .is_some_and(|m| m > self.config.protective_max_session_minutes);
        too_long || task.energy == EnergyLevel::High
    }
}

/// 22:00-06:00 UTC counts as late hours.
pub(crate) fn is_late_hours(now: DateTime<Utc>) -> bool {
    let hour = now.hour();
    hour >= 22 || hour < 6
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::Priority;
    use chrono::TimeZone;

    fn midday() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap()
    }

    fn ctx(budget: Option<DailyBudget>, protective: bool) -> EvaluationContext {
        EvaluationContext {
            budget,
            protective_active: protective,
            energy: EnergyLevel::Medium,
            now: midday(),
            override_pressure: 0.0,
        }
    }

    fn task(load: f64, priority: Priority) -> TaskRecord {
        let mut t = TaskRecord::new("t", load);
        t.priority = priority;
        t
    }

    #[test]
    fn urgency_lowers_override_price() {
        let engine = CostEngine::default();
        let budget = DailyBudget::with_usage(100.0, 80.0, 0.95);
        let calm = task(30.0, Priority::Medium);
        let mut urgent = calm.clone();
        urgent.urgency = 1.0;
        let mut broken = calm.clone();
        broken.urgency = f64::NAN;

        let c = ctx(Some(budget.clone()), false);
        let base = engine.override_cost(&calm, &budget, &c).total;
        let discounted = engine.override_cost(&urgent, &budget, &c).total;
        assert!((base - discounted - URGENCY_DISCOUNT).abs() < 1e-9);
        assert_eq!(engine.override_cost(&broken, &budget, &c).total, base);
    }

    #[test]
    fn late_hours_window() {
        let at = |h| Utc.with_ymd_and_hms(2026, 3, 10, h, 0, 0).unwrap();
        assert!(is_late_hours(at(22)));
        assert!(is_late_hours(at(5)));
        assert!(!is_late_hours(at(6)));
        assert!(!is_late_hours(at(21)));
    }

    #[test]
    fn allows_task_that_fits() {
        let engine = CostEngine::default();
        let eval = engine.evaluate(
            &task(20.0, Priority::Medium),
            &ctx(Some(DailyBudget::new(100.0, 0.95)), false),
        );
        assert_eq!(
            eval,
            Evaluation::Allowed {
                load: 20.0,
                remaining_after: 80.0
            }
        );
    }

    #[test]
    fn refuses_when_remaining_too_small() {
        let engine = CostEngine::default();
        let eval = engine.evaluate(
            &task(30.0, Priority::High),
            &ctx(Some(DailyBudget::with_usage(100.0, 80.0, 0.95)), false),
        );
        match eval {
            Evaluation::Refused { reason, cost } => {
                assert_eq!(reason, RefusalReason::InsufficientBudget);
                assert!(cost.total > 0.0 && cost.total < 1.0);
                assert!(!cost.degraded);
            }
            other => panic!("expected refusal, got {other:?}"),
        }
    }

    #[test]
    fn refuses_when_locked_even_if_task_fits() {
        let engine = CostEngine::default();
        let eval = engine.evaluate(
            &task(1.0, Priority::Low),
            &ctx(Some(DailyBudget::with_usage(100.0, 96.0, 0.95)), false),
        );
        assert!(matches!(
            eval,
            Evaluation::Refused {
                reason: RefusalReason::Locked,
                ..
            }
        ));
    }

    #[test]
    fn higher_priority_costs_less() {
        let engine = CostEngine::default();
        let budget = DailyBudget::with_usage(100.0, 80.0, 0.95);
        let c = ctx(Some(budget.clone()), false);
        let low = engine.override_cost(&task(30.0, Priority::Low), &budget, &c);
        let critical = engine.override_cost(&task(30.0, Priority::Critical), &budget, &c);
        assert!(critical.total < low.total);
    }

    #[test]
    fn scarcer_budget_costs_more() {
        let engine = CostEngine::default();
        let t = task(30.0, Priority::Medium);
        let roomy = DailyBudget::with_usage(100.0, 20.0, 0.95);
        let tight = DailyBudget::with_usage(100.0, 90.0, 0.95);
        let a = engine.override_cost(&t, &roomy, &ctx(Some(roomy.clone()), false));
        let b = engine.override_cost(&t, &tight, &ctx(Some(tight.clone()), false));
        assert!(b.total > a.total);
    }

    #[test]
    fn protective_mode_raises_floor_and_disables_protection() {
        let engine = CostEngine::default();
        let budget = DailyBudget::with_usage(100.0, 10.0, 0.95);
        let cost = engine.override_cost(
            &task(5.0, Priority::Critical),
            &budget,
            &ctx(Some(budget.clone()), true),
        );
        assert!(cost.total >= engine.config().protective_cost_floor);
        assert!(cost.consequences.protection_disabled);
        assert!(cost.consequences.warning_level >= WarningLevel::Medium);
        assert_eq!(cost.cost_type, CostType::Energy);
    }

    #[test]
    fn protective_mode_refuses_heavy_tasks() {
        let engine = CostEngine::default();
        let mut heavy = task(5.0, Priority::Medium);
        heavy.estimated_minutes = Some(90);
        let eval = engine.evaluate(&heavy, &ctx(Some(DailyBudget::new(100.0, 0.95)), true));
        assert!(matches!(
            eval,
            Evaluation::Refused {
                reason: RefusalReason::ProtectiveLimit,
                ..
            }
        ));
    }

    #[test]
    fn explanation_required_iff_high_warning() {
        let engine = CostEngine::default();
        let budget = DailyBudget::with_usage(100.0, 94.0, 0.95);
        let mut c = ctx(Some(budget.clone()), false);
        c.override_pressure = 1.0;
        let cost = engine.override_cost(&task(60.0, Priority::Low), &budget, &c);
        assert_eq!(cost.consequences.warning_level, WarningLevel::High);
        assert!(cost.explanation_required);

        let cheap = engine.override_cost(
            &task(21.0, Priority::Critical),
            &DailyBudget::with_usage(100.0, 80.0, 0.95),
            &ctx(None, false),
        );
        assert_eq!(
            cheap.explanation_required,
            cheap.consequences.warning_level == WarningLevel::High
        );
    }

    #[test]
    fn missing_budget_degrades() {
        let engine = CostEngine::default();
        let eval = engine.evaluate(&task(10.0, Priority::High), &ctx(None, false));
        match eval {
            Evaluation::Refused { reason, cost } => {
                assert!(matches!(reason, RefusalReason::MalformedContext(_)));
                assert!(cost.degraded);
                assert_eq!(cost.consequences.warning_level, WarningLevel::High);
                assert!(cost.explanation_required);
            }
            other => panic!("expected degraded refusal, got {other:?}"),
        }
    }

    #[test]
    fn negative_remaining_degrades_instead_of_granting() {
        let engine = CostEngine::default();
        let broken = DailyBudget {
            max_load: 100.0,
            used_load: 130.0,
            remaining: -30.0,
            lock_threshold: 0.95,
            overdraft: 0.0,
        };
        let eval = engine.evaluate(&task(1.0, Priority::Critical), &ctx(Some(broken), false));
        assert!(!eval.is_allowed());
        assert!(eval.cost().unwrap().degraded);
    }

    #[test]
    fn late_hours_cost_more() {
        let engine = CostEngine::default();
        let budget = DailyBudget::with_usage(100.0, 80.0, 0.95);
        let t = task(30.0, Priority::Medium);
        let day = ctx(Some(budget.clone()), false);
        let mut night = day.clone();
        night.now = Utc.with_ymd_and_hms(2026, 3, 10, 23, 30, 0).unwrap();
        assert!(
            engine.override_cost(&t, &budget, &night).total
                > engine.override_cost(&t, &budget, &day).total
        );
    }
}
