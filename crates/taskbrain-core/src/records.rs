//! Typed records consumed from the storage collaborator.
//!
//! The core never loads or persists these itself. Text extraction, task
//! editing, and session tracking all happen elsewhere and arrive here as
//! plain values.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Task priority as recorded by the user.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl Priority {
    /// Impact weight used by the playlist (0.25-1.0).
    pub fn weight(self) -> f64 {
        match self {
            Priority::Low => 0.25,
            Priority::Medium => 0.5,
            Priority::High => 0.75,
            Priority::Critical => 1.0,
        }
    }

    /// Base override cost factor. Higher priority is cheaper to force.
    pub fn cost_factor(self) -> f64 {
        match self {
            Priority::Low => 0.65,
            Priority::Medium => 0.45,
            Priority::High => 0.25,
            Priority::Critical => 0.10,
        }
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Medium
    }
}

/// Energy level, used both for task requirements and the user's declared state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum EnergyLevel {
    /// Low energy (e.g., end of day)
    Low,
    /// Medium energy (default)
    Medium,
    /// High energy (e.g., morning)
    High,
}

impl EnergyLevel {
    /// Position on the unit interval: low 0.0, medium 0.5, high 1.0.
    pub fn as_unit(self) -> f64 {
        match self {
            EnergyLevel::Low => 0.0,
            EnergyLevel::Medium => 0.5,
            EnergyLevel::High => 1.0,
        }
    }
}

impl Default for EnergyLevel {
    fn default() -> Self {
        EnergyLevel::Medium
    }
}

impl std::str::FromStr for EnergyLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(EnergyLevel::Low),
            "medium" | "med" => Ok(EnergyLevel::Medium),
            "high" => Ok(EnergyLevel::High),
            other => Err(format!("unknown energy level: {other}")),
        }
    }
}

/// A task record as handed over by storage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskRecord {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub priority: Priority,
    /// Estimated load in budget units.
    pub effort: f64,
    /// Urgency (0.0-1.0)
    #[serde(default)]
    pub urgency: f64,
    /// Explicit impact rating (0.0-1.0), if the user gave one
    #[serde(default)]
    pub impact: Option<f64>,
    /// Energy the task demands
    #[serde(default)]
    pub energy: EnergyLevel,
    #[serde(default)]
    pub estimated_minutes: Option<u32>,
    #[serde(default)]
    pub deadline: Option<DateTime<Utc>>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl TaskRecord {
    /// Create a task with the given load and defaults elsewhere.
    pub fn new(id: impl Into<String>, effort: f64) -> Self {
        let id = id.into();
        Self {
            title: id.clone(),
            id,
            priority: Priority::default(),
            effort,
            urgency: 0.0,
            impact: None,
            energy: EnergyLevel::default(),
            estimated_minutes: None,
            deadline: None,
            tags: Vec::new(),
        }
    }

    /// Load this task draws from the daily budget.
    pub fn estimated_load(&self) -> f64 {
        self.effort
    }

    /// Whether any tag matches (case-insensitive).
    pub fn has_tag(&self, candidates: &[&str]) -> bool {
        self.tags.iter().any(|t| {
            let t = t.to_lowercase();
            candidates.iter().any(|c| t == *c)
        })
    }
}

/// A finished session as handed over by storage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionRecord {
    pub id: String,
    pub started_at: DateTime<Utc>,
    pub total_tasks: u32,
    pub completed_tasks: u32,
    /// Tasks started against a refusal
    #[serde(default)]
    pub forced_tasks: u32,
    /// Forced tasks that were completed
    #[serde(default)]
    pub forced_completed: u32,
    /// Completion ratio the plan expected (0.0-1.0)
    pub estimated_completion_ratio: f64,
    #[serde(default)]
    pub completed_task_ids: BTreeSet<String>,
}

impl SessionRecord {
    /// Fraction of planned tasks that were completed.
    pub fn actual_completion_ratio(&self) -> f64 {
        if self.total_tasks == 0 {
            return 0.0;
        }
        (self.completed_tasks as f64 / self.total_tasks as f64).clamp(0.0, 1.0)
    }

    /// Fraction of tasks that were forced.
    pub fn forcing_rate(&self) -> f64 {
        if self.total_tasks == 0 {
            return 0.0;
        }
        (self.forced_tasks as f64 / self.total_tasks as f64).clamp(0.0, 1.0)
    }
}

/// One day of behavioral history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BehaviorSnapshot {
    pub at: DateTime<Utc>,
    /// Used load divided by max load for the day
    pub load_ratio: f64,
    /// Reported sleep, if the user tracks it
    #[serde(default)]
    pub sleep_hours: Option<f64>,
    #[serde(default)]
    pub overrides: u32,
    pub planned_tasks: u32,
    pub completed_tasks: u32,
    /// Open tasks in the backlog at end of day
    #[serde(default)]
    pub pending_tasks: u32,
}

impl BehaviorSnapshot {
    /// Completion ratio for the day, `None` if nothing was planned.
    pub fn completion_ratio(&self) -> Option<f64> {
        if self.planned_tasks == 0 {
            None
        } else {
            Some((self.completed_tasks as f64 / self.planned_tasks as f64).clamp(0.0, 1.0))
        }
    }
}
