//! Reversible override records.
//!
//! Each forced task leaves a [`ReversibleOverride`]. Until
//! `undo_available_until` the user may regret it, which turns the override
//! into a no-cost outcome: the whole charge is refunded. After that the
//! override is permanent; only its outcome may still be recorded.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::error::OverrideError;

/// One forced decision.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReversibleOverride {
    pub id: String,
    pub task_id: String,
    pub decision_id: String,
    /// Which guard was bypassed (e.g. `insufficient_budget`, `protective_limit`)
    pub invariant_touched: String,
    /// The user confirmed the cost before forcing
    pub acknowledged: bool,
    pub reversible: bool,
    pub undo_window_minutes: i64,
    pub undo_available_until: DateTime<Utc>,
    /// Outcome once known
    pub succeeded: Option<bool>,
    pub user_regretted: bool,
    /// Override penalty on top of the task's own load
    pub budget_reduction: f64,
    /// Everything charged to the budget for this override
    pub charged: f64,
    pub created_at: DateTime<Utc>,
}

impl ReversibleOverride {
    /// Whether regret is still possible at `now`.
    pub fn can_undo(&self, now: DateTime<Utc>) -> bool {
        self.reversible && !self.user_regretted && now < self.undo_available_until
    }
}

/// What the caller knows when an override is committed.
#[derive(Debug, Clone, PartialEq)]
pub struct OverrideDraft {
    pub task_id: String,
    pub decision_id: String,
    pub invariant_touched: String,
    pub acknowledged: bool,
    pub budget_reduction: f64,
    pub charged: f64,
}

/// Load to hand back after a regret.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Refund {
    pub override_id: String,
    pub task_id: String,
    pub amount: f64,
}

/// Owner of all override records.
#[derive(Debug, Clone)]
pub struct OverrideLedger {
    undo_window: Duration,
    overrides: BTreeMap<String, ReversibleOverride>,
}

impl OverrideLedger {
    pub fn new(undo_window: Duration) -> Self {
        Self {
            undo_window,
            overrides: BTreeMap::new(),
        }
    }

    /// Restore from exported records.
    pub fn with_overrides(undo_window: Duration, overrides: Vec<ReversibleOverride>) -> Self {
        Self {
            undo_window,
            overrides: overrides.into_iter().map(|o| (o.id.clone(), o)).collect(),
        }
    }

    pub fn export(&self) -> Vec<ReversibleOverride> {
        self.overrides.values().cloned().collect()
    }

    pub fn get(&self, id: &str) -> Option<&ReversibleOverride> {
        self.overrides.get(id)
    }

    /// Overrides in creation order.
    pub fn list(&self) -> Vec<&ReversibleOverride> {
        let mut all: Vec<&ReversibleOverride> = self.overrides.values().collect();
        all.sort_by_key(|o| o.created_at);
        all
    }

    /// The standing (non-regretted) override of `task_id` under `decision_id`.
    pub fn standing(&self, decision_id: &str, task_id: &str) -> Option<&ReversibleOverride> {
        self.overrides
            .values()
            .find(|o| !o.user_regretted && o.decision_id == decision_id && o.task_id == task_id)
    }

    /// Non-regretted overrides created in `[from, to)`.
    pub fn count_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> usize {
        self.overrides
            .values()
            .filter(|o| !o.user_regretted && o.created_at >= from && o.created_at < to)
            .count()
    }

    /// Create the record for a forced decision.
    pub fn record(&mut self, draft: OverrideDraft, now: DateTime<Utc>) -> ReversibleOverride {
        let record = ReversibleOverride {
            id: Uuid::new_v4().to_string(),
            task_id: draft.task_id,
            decision_id: draft.decision_id,
            invariant_touched: draft.invariant_touched,
            acknowledged: draft.acknowledged,
            reversible: true,
            undo_window_minutes: self.undo_window.num_minutes(),
            undo_available_until: now + self.undo_window,
            succeeded: None,
            user_regretted: false,
            budget_reduction: draft.budget_reduction,
            charged: draft.charged,
            created_at: now,
        };
        tracing::debug!(override_id = %record.id, task_id = %record.task_id, "override recorded");
        self.overrides.insert(record.id.clone(), record.clone());
        record
    }

    /// Regret an override inside its undo window.
    ///
    /// # Errors
    /// Fails if the override is unknown, already regretted, or permanent.
    pub fn regret(&mut self, id: &str, now: DateTime<Utc>) -> Result<Refund, OverrideError> {
        let record = self
            .overrides
            .get_mut(id)
            .ok_or_else(|| OverrideError::NotFound(id.to_string()))?;
        if record.user_regretted {
            return Err(OverrideError::AlreadyRegretted(id.to_string()));
        }
        if !record.can_undo(now) {
            record.reversible = false;
            return Err(OverrideError::UndoWindowClosed(id.to_string()));
        }

        record.user_regretted = true;
        record.reversible = false;
        tracing::info!(override_id = id, amount = record.charged, "override regretted");

        Ok(Refund {
            override_id: record.id.clone(),
            task_id: record.task_id.clone(),
            amount: record.charged,
        })
    }

    /// Record whether the forced task worked out. Allowed at any time.
    pub fn record_outcome(&mut self, id: &str, succeeded: bool) -> Result<(), OverrideError> {
        let record = self
            .overrides
            .get_mut(id)
            .ok_or_else(|| OverrideError::NotFound(id.to_string()))?;
        record.succeeded = Some(succeeded);
        Ok(())
    }

    /// Close expired undo windows and drop records older than `retention`.
    pub fn prune(&mut self, now: DateTime<Utc>, retention: Duration) -> usize {
        for record in self.overrides.values_mut() {
            if record.reversible && now >= record.undo_available_until {
                record.reversible = false;
            }
        }
        let before = self.overrides.len();
        let cutoff = now - retention;
        self.overrides.retain(|_, o| o.created_at >= cutoff);
        before - self.overrides.len()
    }
}
