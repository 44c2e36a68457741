//! Daily load budget and its single owner, the [`BudgetLedger`].
//!
//! Every mutation of the budget goes through the ledger and re-balances
//! immediately, so `used_load + remaining == max_load` holds whenever the
//! ledger hands the budget out.

pub mod cost;

pub use cost::{
    CostEngine, CostType, Evaluation, EvaluationContext, OverrideConsequences, OverrideCost,
    RefusalReason, WarningLevel,
};

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::records::TaskRecord;

/// Tolerance for floating point budget arithmetic.
pub const LOAD_EPSILON: f64 = 1e-6;

/// The user's task-load capacity for one planning cycle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DailyBudget {
    pub max_load: f64,
    pub used_load: f64,
    pub remaining: f64,
    /// Usage ratio (0.0-1.0) at which the budget locks
    pub lock_threshold: f64,
    /// Override load beyond `max_load`, deducted from the next cycle
    #[serde(default)]
    pub overdraft: f64,
}

impl DailyBudget {
    /// Fresh budget for a new cycle.
    pub fn new(max_load: f64, lock_threshold: f64) -> Self {
        Self::with_usage(max_load, 0.0, lock_threshold)
    }

    /// Budget with some load already used.
    pub fn with_usage(max_load: f64, used_load: f64, lock_threshold: f64) -> Self {
        Self {
            max_load,
            used_load,
            remaining: max_load - used_load,
            lock_threshold,
            overdraft: 0.0,
        }
    }

    /// Check the fields an evaluation relies on.
    ///
    /// Returns a description of the first problem found.
    pub fn validate(&self) -> Result<(), String> {
        let fields = [
            ("max_load", self.max_load),
            ("used_load", self.used_load),
            ("remaining", self.remaining),
            ("lock_threshold", self.lock_threshold),
            ("overdraft", self.overdraft),
        ];
        for (name, value) in fields {
            if !value.is_finite() {
                return Err(format!("{name} is not a finite number"));
            }
            if value < 0.0 {
                return Err(format!("{name} is negative ({value})"));
            }
        }
        if self.max_load <= 0.0 {
            return Err("max_load must be positive".to_string());
        }
        if self.lock_threshold > 1.0 {
            return Err(format!("lock_threshold {} exceeds 1.0", self.lock_threshold));
        }
        if !self.is_balanced() {
            return Err(format!(
                "used_load ({}) + remaining ({}) != max_load ({})",
                self.used_load, self.remaining, self.max_load
            ));
        }
        Ok(())
    }

    /// `used_load + remaining == max_load` within tolerance.
    pub fn is_balanced(&self) -> bool {
        (self.used_load + self.remaining - self.max_load).abs() <= LOAD_EPSILON * self.max_load.max(1.0)
    }

    /// Whether usage reached the lock threshold.
    pub fn is_locked(&self) -> bool {
        self.used_load + LOAD_EPSILON >= self.lock_threshold * self.max_load
    }

    /// Used load as a share of max load.
    pub fn usage_ratio(&self) -> f64 {
        if self.max_load <= 0.0 {
            return 1.0;
        }
        (self.used_load / self.max_load).clamp(0.0, 1.0)
    }

    /// Restore the invariant after `used_load` changed.
    ///
    /// Load beyond `max_load` moves into `overdraft`.
    fn rebalance(&mut self) {
        if self.used_load > self.max_load {
            self.overdraft += self.used_load - self.max_load;
            self.used_load = self.max_load;
        }
        if self.used_load < 0.0 {
            self.used_load = 0.0;
        }
        self.remaining = self.max_load - self.used_load;
    }
}

/// Receipt returned when load is committed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommitReceipt {
    pub task_id: String,
    /// Load charged against the budget, including any override penalty
    pub charged: f64,
    pub budget_after: DailyBudget,
}

/// Sole writer of the [`DailyBudget`].
#[derive(Debug, Clone)]
pub struct BudgetLedger {
    budget: DailyBudget,
}

impl BudgetLedger {
    /// Create a ledger over an existing budget.
    pub fn new(budget: DailyBudget) -> Self {
        Self { budget }
    }

    /// Current budget.
    pub fn budget(&self) -> &DailyBudget {
        &self.budget
    }

    /// Owned copy for decision inputs.
    pub fn snapshot(&self) -> DailyBudget {
        self.budget.clone()
    }

    /// Charge an allowed task's load.
    ///
    /// # Errors
    /// Returns an error if the budget is malformed or the load does not fit.
    pub fn activate(&mut self, task: &TaskRecord) -> Result<CommitReceipt, ValidationError> {
        self.budget
            .validate()
            .map_err(|message| ValidationError::InvalidValue {
                field: "budget".to_string(),
                message,
            })?;

        let load = task.estimated_load();
        if !load.is_finite() || load < 0.0 {
            return Err(ValidationError::InvalidValue {
                field: "effort".to_string(),
                message: format!("task '{}' has invalid effort {load}", task.id),
            });
        }
        if load > self.budget.remaining + LOAD_EPSILON {
            return Err(ValidationError::InsufficientBudget {
                task_id: task.id.clone(),
                needed: load,
                remaining: self.budget.remaining,
            });
        }

        self.budget.used_load += load;
        self.budget.rebalance();
        tracing::debug!(task_id = %task.id, load, remaining = self.budget.remaining, "activated task");

        Ok(CommitReceipt {
            task_id: task.id.clone(),
            charged: load,
            budget_after: self.snapshot(),
        })
    }

    /// Charge a forced task: its load plus the override's budget reduction.
    pub fn commit_override(&mut self, task: &TaskRecord, cost: &OverrideCost) -> CommitReceipt {
        let load = sanitize_load(task.estimated_load());
        let reduction = sanitize_load(cost.consequences.budget_reduction);
        let charged = load + reduction;

        self.budget.used_load += charged;
        self.budget.rebalance();
        tracing::debug!(
            task_id = %task.id,
            charged,
            overdraft = self.budget.overdraft,
            "committed override"
        );

        CommitReceipt {
            task_id: task.id.clone(),
            charged,
            budget_after: self.snapshot(),
        }
    }

    /// Give back load, e.g. the penalty of a regretted override.
    ///
    /// Overdraft is paid back first.
    pub fn refund(&mut self, amount: f64) -> DailyBudget {
        let mut amount = sanitize_load(amount);
        let from_overdraft = amount.min(self.budget.overdraft);
        self.budget.overdraft -= from_overdraft;
        amount -= from_overdraft;
        self.budget.used_load -= amount;
        self.budget.rebalance();
        self.snapshot()
    }

    /// Start a new planning cycle. Outstanding overdraft shrinks the new budget.
    pub fn reset_for_new_cycle(&mut self, max_load: f64) -> DailyBudget {
        let max_load = sanitize_load(max_load);
        let effective = (max_load - self.budget.overdraft).max(0.0);
        tracing::info!(max_load, overdraft = self.budget.overdraft, effective, "budget reset");
        self.budget = DailyBudget::new(effective, self.budget.lock_threshold);
        self.snapshot()
    }
}

fn sanitize_load(value: f64) -> f64 {
    if value.is_finite() {
        value.max(0.0)
    } else {
        0.0
    }
}
