//! Daily playlist: candidate tasks ranked by energy match, impact and
//! deadline proximity.
//!
//! Ordering is by score (descending), then earliest deadline (tasks without
//! one last), then input order. High-impact, keystone and budget flags are
//! informational and never change the order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::budget::{DailyBudget, LOAD_EPSILON};
use crate::config::PlaylistConfig;
use crate::records::{EnergyLevel, TaskRecord};

/// Adaptive weight names the playlist reads.
pub const ENERGY_WEIGHT: &str = "playlist.energy";
pub const IMPACT_WEIGHT: &str = "playlist.impact";
pub const DEADLINE_WEIGHT: &str = "playlist.deadline";

const KEYSTONE_BONUS: f64 = 0.2;
const HIGH_IMPACT_TAG_BONUS: f64 = 0.1;

/// Per-task factors, each in `[0, 1]`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PlaylistFactors {
    pub energy: f64,
    pub impact: f64,
    pub deadline: f64,
}

/// Normalized factor weights.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PlaylistWeights {
    pub energy: f64,
    pub impact: f64,
    pub deadline: f64,
}

impl PlaylistWeights {
    /// One third each.
    pub fn equal() -> Self {
        Self {
            energy: 1.0 / 3.0,
            impact: 1.0 / 3.0,
            deadline: 1.0 / 3.0,
        }
    }

    /// Scale to sum 1. Falls back to equal weights for unusable input.
    pub fn normalized(self) -> Self {
        let parts = [self.energy, self.impact, self.deadline];
        if parts.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Self::equal();
        }
        let sum: f64 = parts.iter().sum();
        if sum <= 0.0 {
            return Self::equal();
        }
        Self {
            energy: self.energy / sum,
            impact: self.impact / sum,
            deadline: self.deadline / sum,
        }
    }
}

impl Default for PlaylistWeights {
    fn default() -> Self {
        Self::equal()
    }
}

/// One ranked entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlaylistItem {
    pub task_id: String,
    pub title: String,
    pub score: f64,
    pub factors: PlaylistFactors,
    pub is_high_impact: bool,
    pub is_keystone_habit: bool,
    /// Cumulative load up to and including this item fits the remaining budget
    pub fits_budget: bool,
    pub load: f64,
}

/// Ranks candidate tasks once per planning cycle.
#[derive(Debug, Clone, Default)]
pub struct PlaylistGenerator {
    config: PlaylistConfig,
}

impl PlaylistGenerator {
    pub fn new(config: PlaylistConfig) -> Self {
        Self { config }
    }

    /// Rank `tasks` for a user at `energy`.
    ///
    /// The output is a permutation of the input ids.
    pub fn generate(
        &self,
        tasks: &[TaskRecord],
        budget: &DailyBudget,
        energy: EnergyLevel,
        weights: PlaylistWeights,
        now: DateTime<Utc>,
    ) -> Vec<PlaylistItem> {
        let weights = weights.normalized();

        let mut ranked: Vec<(usize, &TaskRecord, PlaylistFactors, f64)> = tasks
            .iter()
            .enumerate()
            .map(|(index, task)| {
                let factors = self.factors(task, energy, now);
                let score = weights.energy * factors.energy
                    + weights.impact * factors.impact
                    + weights.deadline * factors.deadline;
                let score = if score.is_finite() { score } else { 0.0 };
                (index, task, factors, score)
            })
            .collect();

        ranked.sort_by(|a, b| {
            b.3.total_cmp(&a.3)
                .then_with(|| compare_deadlines(a.1.deadline, b.1.deadline))
                .then_with(|| a.0.cmp(&b.0))
        });

        let mut cumulative = 0.0;
        let remaining = budget.remaining.max(0.0);
        ranked
            .into_iter()
            .map(|(_, task, factors, score)| {
                let load = task.estimated_load();
                let load = if load.is_finite() { load.max(0.0) } else { f64::INFINITY };
                cumulative += load;
                PlaylistItem {
                    task_id: task.id.clone(),
                    title: task.title.clone(),
                    score,
                    factors,
                    is_high_impact: factors.impact >= self.config.high_impact_threshold,
                    is_keystone_habit: self.is_keystone(task),
                    fits_budget: cumulative <= remaining + LOAD_EPSILON,
                    load,
                }
            })
            .collect()
    }

    /// Energy, impact and deadline factors for one task.
    pub fn factors(&self, task: &TaskRecord, energy: EnergyLevel, now: DateTime<Utc>) -> PlaylistFactors {
        let energy_match = 1.0 - (task.energy.as_unit() - energy.as_unit()).abs();

        let mut impact = task.priority.weight();
        if let Some(explicit) = task.impact.filter(|v| v.is_finite()) {
            impact = (impact + explicit.clamp(0.0, 1.0)) / 2.0;
        }
        if self.is_keystone(task) {
            impact += KEYSTONE_BONUS;
        }
        if task.has_tag(&["high-impact"]) {
            impact += HIGH_IMPACT_TAG_BONUS;
        }

        let deadline = match task.deadline {
            None => 0.0,
            Some(due) => {
                let hours_left = (due - now).num_seconds() as f64 / 3600.0;
                if hours_left <= 0.0 {
                    1.0
                } else if self.config.deadline_horizon_hours <= 0.0 {
                    0.0
                } else {
                    1.0 - hours_left / self.config.deadline_horizon_hours
                }
            }
        };

        PlaylistFactors {
            energy: energy_match.clamp(0.0, 1.0),
            impact: impact.clamp(0.0, 1.0),
            deadline: deadline.clamp(0.0, 1.0),
        }
    }

    fn is_keystone(&self, task: &TaskRecord) -> bool {
        let tags: Vec<&str> = self.config.keystone_tags.iter().map(String::as_str).collect();
        task.has_tag(&tags)
    }
}

/// Earlier deadline first; no deadline sorts last.
fn compare_deadlines(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
