//! The Brain: single owner of every stateful component.
//!
//! A scheduling request runs to completion through [`Brain::decide`] before
//! the next one is admitted; all mutating methods take `&mut self`. Share a
//! brain across tasks through [`SharedBrain`].

use chrono::{DateTime, Duration, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::adaptive::{AdaptationVerdict, AdaptiveWeight, GuardState, OverfittingGuard, TickReport};
use crate::budget::cost::is_late_hours;
use crate::budget::{
    BudgetLedger, CommitReceipt, CostEngine, DailyBudget, Evaluation, EvaluationContext,
    OverrideCost, RefusalReason,
};
use crate::coach::{
    AdviceRequest, Advisor, CoachKillSwitch, CoachNote, CoachSafetyLayer, CoachState,
    OverrideDraft, Refund, ReversibleOverride,
};
use crate::config::BrainConfig;
use crate::error::{Result, ValidationError};
use crate::playlist::{
    PlaylistGenerator, PlaylistItem, PlaylistWeights, DEADLINE_WEIGHT, ENERGY_WEIGHT,
    IMPACT_WEIGHT,
};
use crate::protective::{
    BurnoutSignal, DetectorState, ExitKind, ProtectiveModeDetector, ProtectiveModeState,
    ProtectiveTransition,
};
use crate::quality::{QualityAlert, QualityMonitor, QualityRecord, QualitySummary};
use crate::records::{BehaviorSnapshot, EnergyLevel, SessionRecord, TaskRecord};
use crate::versioning::{self, DecisionStamp};

/// Adaptive feature feeding the override cost multiplier.
pub const OVERRIDE_PRESSURE: &str = "override_pressure";

/// Remaining share of the budget below which decisions turn strict.
const STRICT_REMAINING_RATIO: f64 = 0.2;

/// Brain behind an async mutex, for the maintenance loop and front ends.
pub type SharedBrain = Arc<Mutex<Brain>>;

/// One scheduling request from the session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SchedulingRequest {
    pub session_id: String,
    pub tasks: Vec<TaskRecord>,
    #[serde(default)]
    pub energy: EnergyLevel,
    /// Minutes the user says are left today
    #[serde(default)]
    pub available_minutes: Option<u32>,
}

/// Time-related inputs of a decision.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TemporalConstraints {
    pub now: DateTime<Utc>,
    pub late_hours: bool,
    pub available_minutes: Option<u32>,
}

/// What the brain knew about recent behavior.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BehaviorSummary {
    pub protective_active: bool,
    pub signals: BTreeSet<BurnoutSignal>,
    pub override_pressure: f64,
    pub overrides_today: usize,
    pub recent_quality: Option<f64>,
    pub quality_alert: bool,
}

/// Everything a decision was computed from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DecisionInputs {
    pub energy: EnergyLevel,
    pub budget: DailyBudget,
    pub temporal: TemporalConstraints,
    pub behavior: BehaviorSummary,
    pub tasks: Vec<TaskRecord>,
}

/// How much latitude the decision gives the user.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum DecisionMode {
    Strict,
    Assisted,
    Emergency,
}

impl DecisionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionMode::Strict => "STRICT",
            DecisionMode::Assisted => "ASSISTED",
            DecisionMode::Emergency => "EMERGENCY",
        }
    }
}

/// Human-readable account of a decision.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DecisionExplanation {
    pub summary: String,
    pub per_task: BTreeMap<String, String>,
}

/// Immutable result of one scheduling request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BrainDecision {
    pub id: String,
    pub session_id: String,
    pub inputs: DecisionInputs,
    /// True when every requested task was allowed
    pub allowed: bool,
    pub allowed_task_ids: BTreeSet<String>,
    pub rejected_task_ids: BTreeSet<String>,
    pub mode: DecisionMode,
    pub explanation: DecisionExplanation,
    pub refusals: BTreeMap<String, RefusalReason>,
    pub costs: BTreeMap<String, OverrideCost>,
    pub stamp: DecisionStamp,
}

impl BrainDecision {
    pub fn task(&self, task_id: &str) -> Option<&TaskRecord> {
        self.inputs.tasks.iter().find(|t| t.id == task_id)
    }
}

/// Result of forcing a refused task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ForcedTask {
    pub receipt: CommitReceipt,
    pub record: ReversibleOverride,
    pub cost: OverrideCost,
}

/// What recording a finished session changed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionOutcome {
    pub quality: QualityRecord,
    pub alert: Option<QualityAlert>,
    pub adaptations: Vec<AdaptationVerdict>,
}

/// What a maintenance pass did.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MaintenanceReport {
    pub protective: ProtectiveTransition,
    pub adaptive: TickReport,
    pub overrides_pruned: usize,
}

/// Read-only overview for front ends.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BrainStatus {
    pub budget: DailyBudget,
    pub protective: ProtectiveModeState,
    pub quality: QualitySummary,
    pub weights: Vec<AdaptiveWeight>,
    pub kill_switch: CoachKillSwitch,
}

/// Serializable snapshot of every stateful component.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BrainState {
    pub budget: DailyBudget,
    pub protective: DetectorState,
    #[serde(default)]
    pub quality: Vec<QualityRecord>,
    #[serde(default)]
    pub adaptive: GuardState,
    #[serde(default)]
    pub coach: CoachState,
    #[serde(default)]
    pub last_playlist: Vec<PlaylistItem>,
}

/// Rules a decision is stamped with.
#[derive(Serialize)]
struct RulesView<'a> {
    config: &'a BrainConfig,
    weights: BTreeMap<&'a str, f64>,
}

/// Facade over the budget, protective, quality, adaptive, coach and playlist
/// components.
#[derive(Debug)]
pub struct Brain {
    config: BrainConfig,
    engine: CostEngine,
    ledger: BudgetLedger,
    protective: ProtectiveModeDetector,
    quality: QualityMonitor,
    guard: OverfittingGuard,
    coach: CoachSafetyLayer,
    playlist: PlaylistGenerator,
    last_playlist: Vec<PlaylistItem>,
}

impl Brain {
    /// Fresh brain with a full budget.
    pub fn new(config: BrainConfig) -> Self {
        let state = BrainState {
            budget: DailyBudget::new(config.budget.default_max_load, config.budget.lock_threshold),
            protective: ProtectiveModeDetector::new(config.protective.clone()).export_state(),
            quality: Vec::new(),
            adaptive: GuardState::default(),
            coach: CoachState::default(),
            last_playlist: Vec::new(),
        };
        Self::from_state(config, state)
    }

    /// Restore from a snapshot produced by [`Brain::export_state`].
    pub fn from_state(config: BrainConfig, state: BrainState) -> Self {
        Self {
            engine: CostEngine::new(config.budget.clone()),
            ledger: BudgetLedger::new(state.budget),
            protective: ProtectiveModeDetector::from_state(config.protective.clone(), state.protective),
            quality: QualityMonitor::with_history(config.quality.clone(), state.quality),
            guard: OverfittingGuard::from_state(config.adaptive.clone(), state.adaptive),
            coach: CoachSafetyLayer::from_state(config.coach.clone(), state.coach),
            playlist: PlaylistGenerator::new(config.playlist.clone()),
            last_playlist: state.last_playlist,
            config,
        }
    }

    pub fn export_state(&self) -> BrainState {
        BrainState {
            budget: self.ledger.snapshot(),
            protective: self.protective.export_state(),
            quality: self.quality.history().cloned().collect(),
            adaptive: self.guard.export_state(),
            coach: self.coach.export_state(),
            last_playlist: self.last_playlist.clone(),
        }
    }

    /// Wrap in the shared handle.
    pub fn shared(self) -> SharedBrain {
        Arc::new(Mutex::new(self))
    }

    pub fn config(&self) -> &BrainConfig {
        &self.config
    }

    pub fn budget(&self) -> &DailyBudget {
        self.ledger.budget()
    }

    pub fn protective_state(&self) -> &ProtectiveModeState {
        self.protective.state()
    }

    pub fn coach(&self) -> &CoachSafetyLayer {
        &self.coach
    }

    pub fn last_playlist(&self) -> &[PlaylistItem] {
        &self.last_playlist
    }

    pub fn status(&self, now: DateTime<Utc>) -> BrainStatus {
        BrainStatus {
            budget: self.ledger.snapshot(),
            protective: self.protective.state().clone(),
            quality: self.quality.summary(now),
            weights: self.guard.weights().cloned().collect(),
            kill_switch: self.coach.kill_switch().clone(),
        }
    }

    /// Evaluate every task of a request and produce a stamped decision.
    ///
    /// Tasks are evaluated in request order against a projected budget, so
    /// the allowed set fits together. Nothing is committed.
    pub fn decide(&mut self, request: &SchedulingRequest, now: DateTime<Utc>) -> BrainDecision {
        self.protective.tick(now);
        self.protective.record_request(now);

        let inputs = self.decision_inputs(request, now);
        let protective_active = inputs.behavior.protective_active;
        let mut projected = inputs.budget.clone();

        let mut seen = BTreeSet::new();
        let mut allowed_task_ids = BTreeSet::new();
        let mut rejected_task_ids = BTreeSet::new();
        let mut refusals = BTreeMap::new();
        let mut costs = BTreeMap::new();
        let mut per_task = BTreeMap::new();

        for task in &request.tasks {
            if !seen.insert(task.id.clone()) {
                continue;
            }
            let ctx = EvaluationContext {
                budget: Some(projected.clone()),
                protective_active,
                energy: request.energy,
                now,
                override_pressure: inputs.behavior.override_pressure,
            };
            match self.engine.evaluate(task, &ctx) {
                Evaluation::Allowed { load, remaining_after } => {
                    per_task.insert(
                        task.id.clone(),
                        format!("fits: uses {load:.1}, leaving {:.1}", remaining_after.max(0.0)),
                    );
                    projected = project(&projected, load);
                    allowed_task_ids.insert(task.id.clone());
                }
                Evaluation::Refused { reason, cost } => {
                    per_task.insert(
                        task.id.clone(),
                        format!(
                            "refused: {}; forcing costs {:.0}% ({:?} warning)",
                            reason.describe(),
                            cost.total * 100.0,
                            cost.consequences.warning_level
                        ),
                    );
                    rejected_task_ids.insert(task.id.clone());
                    refusals.insert(task.id.clone(), reason);
                    costs.insert(task.id.clone(), cost);
                }
            }
        }

        let mode = self.decision_mode(&inputs);
        let summary = summarize(&inputs, mode, allowed_task_ids.len(), seen.len());
        let stamp = versioning::stamp(&self.rules_view(), &inputs, now);

        let decision = BrainDecision {
            id: Uuid::new_v4().to_string(),
            session_id: request.session_id.clone(),
            allowed: rejected_task_ids.is_empty(),
            allowed_task_ids,
            rejected_task_ids,
            mode,
            explanation: DecisionExplanation { summary, per_task },
            refusals,
            costs,
            stamp,
            inputs,
        };
        tracing::debug!(
            decision_id = %decision.id,
            mode = decision.mode.as_str(),
            allowed = decision.allowed_task_ids.len(),
            rejected = decision.rejected_task_ids.len(),
            "decision made"
        );
        decision
    }

    /// Commit an allowed task's load.
    pub fn activate(&mut self, decision: &BrainDecision, task_id: &str) -> Result<CommitReceipt> {
        let task = decision_task(decision, task_id)?;
        if let Some(reason) = decision.refusals.get(task_id) {
            return Err(ValidationError::Refused {
                task_id: task_id.to_string(),
                reason: reason.describe(),
            }
            .into());
        }
        Ok(self.ledger.activate(task)?)
    }

    /// Force a refused task at its priced cost.
    ///
    /// High-warning overrides need `acknowledged`.
    pub fn force(
        &mut self,
        decision: &BrainDecision,
        task_id: &str,
        acknowledged: bool,
        now: DateTime<Utc>,
    ) -> Result<ForcedTask> {
        let task = decision_task(decision, task_id)?;
        let (Some(cost), Some(reason)) = (decision.costs.get(task_id), decision.refusals.get(task_id)) else {
            return Err(ValidationError::NotRefused(task_id.to_string()).into());
        };
        if let Some(standing) = self.coach.overrides().standing(&decision.id, task_id) {
            return Err(ValidationError::AlreadyCommitted {
                task_id: task_id.to_string(),
                decision_id: decision.id.clone(),
                override_id: standing.id.clone(),
            }
            .into());
        }
        if cost.explanation_required && !acknowledged {
            return Err(ValidationError::AcknowledgmentRequired(task_id.to_string()).into());
        }

        let receipt = self.ledger.commit_override(task, cost);
        let record = self.coach.overrides_mut().record(
            OverrideDraft {
                task_id: task_id.to_string(),
                decision_id: decision.id.clone(),
                invariant_touched: invariant_name(reason).to_string(),
                acknowledged,
                budget_reduction: cost.consequences.budget_reduction,
                charged: receipt.charged,
            },
            now,
        );
        if cost.consequences.protection_disabled {
            tracing::info!(task_id, "protective limits bypassed by override");
        }

        Ok(ForcedTask {
            receipt,
            record,
            cost: cost.clone(),
        })
    }

    /// Undo an override inside its window and refund its charge.
    pub fn regret(&mut self, override_id: &str, now: DateTime<Utc>) -> Result<Refund> {
        let refund = self.coach.overrides_mut().regret(override_id, now)?;
        self.ledger.refund(refund.amount);
        Ok(refund)
    }

    /// Record whether a forced task worked out.
    pub fn record_override_outcome(&mut self, override_id: &str, succeeded: bool) -> Result<()> {
        Ok(self.coach.overrides_mut().record_outcome(override_id, succeeded)?)
    }

    /// Score a finished session and feed the adaptive features.
    pub fn record_session(&mut self, session: &SessionRecord, now: DateTime<Utc>) -> SessionOutcome {
        let quality = self.quality.record(session, now);
        let mut adaptations = Vec::new();

        if session.total_tasks > 0 {
            self.guard.observe(OVERRIDE_PRESSURE, session.forcing_rate(), now);
            adaptations.push(self.guard.propose(OVERRIDE_PRESSURE, 0.0, now));
        }

        let completed: Vec<&PlaylistItem> = self
            .last_playlist
            .iter()
            .filter(|item| session.completed_task_ids.contains(&item.task_id))
            .collect();
        if !completed.is_empty() {
            let n = completed.len() as f64;
            let means = [
                (ENERGY_WEIGHT, completed.iter().map(|i| i.factors.energy).sum::<f64>() / n),
                (IMPACT_WEIGHT, completed.iter().map(|i| i.factors.impact).sum::<f64>() / n),
                (DEADLINE_WEIGHT, completed.iter().map(|i| i.factors.deadline).sum::<f64>() / n),
            ];
            for (feature, value) in means {
                self.guard.observe(feature, value, now);
                adaptations.push(self.guard.propose(feature, 1.0 / 3.0, now));
            }
        }

        SessionOutcome {
            quality,
            alert: self.quality.alert(now),
            adaptations,
        }
    }

    /// Add a day of behavior history and re-run burnout detection.
    pub fn observe_behavior(&mut self, snapshot: BehaviorSnapshot, now: DateTime<Utc>) -> ProtectiveTransition {
        self.protective.observe(snapshot);
        self.protective.evaluate(now)
    }

    /// Leave protective mode after its minimum duration.
    pub fn acknowledge_protective_exit(&mut self, now: DateTime<Utc>) -> Result<ExitKind> {
        Ok(self.protective.acknowledge_exit(now)?)
    }

    /// Leave protective mode early on explicit user request.
    pub fn force_protective_exit(&mut self, now: DateTime<Utc>, reason: &str) -> Result<ExitKind> {
        Ok(self.protective.force_exit(now, reason)?)
    }

    /// Rank candidate tasks with the current adaptive weights.
    pub fn playlist(&mut self, tasks: &[TaskRecord], energy: EnergyLevel, now: DateTime<Utc>) -> Vec<PlaylistItem> {
        let set = self.guard.weight_set(&[
            (ENERGY_WEIGHT, 1.0 / 3.0),
            (IMPACT_WEIGHT, 1.0 / 3.0),
            (DEADLINE_WEIGHT, 1.0 / 3.0),
        ]);
        let weights = match set.as_slice() {
            [energy, impact, deadline] => PlaylistWeights {
                energy: *energy,
                impact: *impact,
                deadline: *deadline,
            },
            _ => PlaylistWeights::equal(),
        };
        let items = self
            .playlist
            .generate(tasks, self.ledger.budget(), energy, weights, now);
        self.last_playlist = items.clone();
        items
    }

    /// Ask the coach to annotate a decision. Never fails.
    pub async fn annotate<A: Advisor>(
        &mut self,
        decision: &BrainDecision,
        advisor: &A,
        cancel: &CancellationToken,
        now: DateTime<Utc>,
    ) -> Option<CoachNote> {
        let request = AdviceRequest {
            decision_id: decision.id.clone(),
            session_id: decision.session_id.clone(),
            summary: decision.explanation.summary.clone(),
            mode: decision.mode.as_str().to_string(),
            allowed_task_ids: decision.allowed_task_ids.iter().cloned().collect(),
            rejected_task_ids: decision.rejected_task_ids.iter().cloned().collect(),
            highest_warning: decision
                .costs
                .values()
                .map(|c| c.consequences.warning_level)
                .max(),
        };
        self.coach.annotate(advisor, request, cancel, now).await
    }

    /// Disable the coach for `duration` (or the configured default).
    pub fn disable_coach(
        &mut self,
        now: DateTime<Utc>,
        duration: Option<Duration>,
        reason: &str,
    ) -> Result<()> {
        Ok(self.coach.disable(now, duration, reason)?)
    }

    pub fn enable_coach(&mut self) {
        self.coach.enable();
    }

    /// Periodic maintenance: decay, expiry and pruning only.
    pub fn tick(&mut self, now: DateTime<Utc>) -> MaintenanceReport {
        let protective = self.protective.tick(now);
        let adaptive = self.guard.tick(now);
        self.quality.prune(now);
        let overrides_pruned = self.coach.tick(now);
        MaintenanceReport {
            protective,
            adaptive,
            overrides_pruned,
        }
    }

    /// Start a new planning cycle; `max_load` defaults to the configured one.
    pub fn reset_cycle(&mut self, max_load: Option<f64>) -> DailyBudget {
        let max_load = max_load.unwrap_or(self.config.budget.default_max_load);
        self.ledger.reset_for_new_cycle(max_load)
    }

    fn decision_inputs(&self, request: &SchedulingRequest, now: DateTime<Utc>) -> DecisionInputs {
        let day_start = now.date_naive().and_time(NaiveTime::MIN).and_utc();
        let recent = self.quality.means(now, self.config.quality.alert_window_days);
        let state = self.protective.state();

        DecisionInputs {
            energy: request.energy,
            budget: self.ledger.snapshot(),
            temporal: TemporalConstraints {
                now,
                late_hours: is_late_hours(now),
                available_minutes: request.available_minutes,
            },
            behavior: BehaviorSummary {
                protective_active: state.active,
                signals: state.signals.clone(),
                override_pressure: self
                    .guard
                    .weight(OVERRIDE_PRESSURE)
                    .filter(|p| p.is_finite())
                    .unwrap_or(0.0)
                    .clamp(0.0, 1.0),
                overrides_today: self.coach.overrides().count_between(day_start, now + Duration::seconds(1)),
                recent_quality: (recent.sample_count > 0).then_some(recent.overall_quality),
                quality_alert: self.quality.alert(now).is_some(),
            },
            tasks: request.tasks.clone(),
        }
    }

    fn decision_mode(&self, inputs: &DecisionInputs) -> DecisionMode {
        if inputs.behavior.protective_active {
            return DecisionMode::Emergency;
        }
        let budget = &inputs.budget;
        let scarce = budget.validate().is_err()
            || budget.remaining / budget.max_load < STRICT_REMAINING_RATIO;
        if inputs.behavior.quality_alert || scarce {
            DecisionMode::Strict
        } else {
            DecisionMode::Assisted
        }
    }

    fn rules_view(&self) -> RulesView<'_> {
        RulesView {
            config: &self.config,
            weights: self
                .guard
                .weights()
                .map(|w| (w.name.as_str(), w.value))
                .collect(),
        }
    }
}

fn decision_task<'a>(decision: &'a BrainDecision, task_id: &str) -> Result<&'a TaskRecord> {
    decision.task(task_id).ok_or_else(|| {
        ValidationError::UnknownTask {
            decision_id: decision.id.clone(),
            task_id: task_id.to_string(),
        }
        .into()
    })
}

fn invariant_name(reason: &RefusalReason) -> &'static str {
    match reason {
        RefusalReason::InsufficientBudget => "insufficient_budget",
        RefusalReason::Locked => "budget_locked",
        RefusalReason::ProtectiveLimit => "protective_limit",
        RefusalReason::MalformedContext(_) => "malformed_context",
    }
}

/// Budget after an allowed task, without committing anything.
fn project(budget: &DailyBudget, load: f64) -> DailyBudget {
    let used_load = (budget.used_load + load).min(budget.max_load);
    DailyBudget {
        used_load,
        remaining: budget.max_load - used_load,
        ..budget.clone()
    }
}

fn summarize(inputs: &DecisionInputs, mode: DecisionMode, allowed: usize, total: usize) -> String {
    let mut summary = format!(
        "{allowed} of {total} task(s) allowed in {} mode; {:.1} of {:.1} load remaining",
        mode.as_str(),
        inputs.budget.remaining,
        inputs.budget.max_load
    );
    if inputs.behavior.protective_active {
        summary.push_str("; protective mode is on");
    }
    if let Some(minutes) = inputs.temporal.available_minutes {
        summary.push_str(&format!("; about {minutes} min available"));
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use crate::records::Priority;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 7, 6, 10, 0, 0).unwrap()
    }

    fn task(id: &str, effort: f64, priority: Priority) -> TaskRecord {
        let mut t = TaskRecord::new(id, effort);
        t.priority = priority;
        t
    }

    fn request(tasks: Vec<TaskRecord>) -> SchedulingRequest {
        SchedulingRequest {
            session_id: "s1".to_string(),
            tasks,
            energy: EnergyLevel::Medium,
            available_minutes: None,
        }
    }

    #[test]
    fn allowed_set_fits_together() {
        let mut brain = Brain::new(BrainConfig::default());
        let decision = brain.decide(
            &request(vec![
                task("a", 50.0, Priority::Medium),
                task("b", 40.0, Priority::Medium),
                task("c", 30.0, Priority::Medium),
            ]),
            now(),
        );
        assert!(decision.allowed_task_ids.contains("a"));
        assert!(decision.allowed_task_ids.contains("b"));
        assert!(decision.rejected_task_ids.contains("c"));
        assert!(!decision.allowed);
        assert!(decision.costs.contains_key("c"));
        assert_eq!(decision.mode, DecisionMode::Assisted);
    }

    #[test]
    fn activate_refused_task_is_an_error() {
        let mut brain = Brain::new(BrainConfig::default());
        brain.ledger = BudgetLedger::new(DailyBudget::with_usage(100.0, 80.0, 0.95));
        let decision = brain.decide(&request(vec![task("big", 30.0, Priority::High)]), now());
        let err = brain.activate(&decision, "big").unwrap_err();
        assert!(matches!(err, CoreError::Validation(ValidationError::Refused { .. })));
    }

    #[test]
    fn force_then_regret_restores_budget() {
        let mut brain = Brain::new(BrainConfig::default());
        brain.ledger = BudgetLedger::new(DailyBudget::with_usage(100.0, 85.0, 0.95));
        let decision = brain.decide(&request(vec![task("big", 30.0, Priority::High)]), now());
        assert_eq!(decision.mode, DecisionMode::Strict);

        let forced = brain.force(&decision, "big", true, now()).unwrap();
        assert!(brain.budget().remaining >= 0.0);
        assert!(brain.budget().is_balanced());
        assert_eq!(forced.record.invariant_touched, "insufficient_budget");

        brain.regret(&forced.record.id, now() + Duration::minutes(5)).unwrap();
        assert!((brain.budget().used_load - 85.0).abs() < 1e-9);
        assert_eq!(brain.budget().overdraft, 0.0);
    }

    #[test]
    fn late_hours_input_matches_pricing_rule() {
        let mut brain = Brain::new(BrainConfig::default());
        let night = now().date_naive().and_hms_opt(23, 0, 0).unwrap().and_utc();
        let decision = brain.decide(&request(vec![task("a", 10.0, Priority::Low)]), night);
        assert!(decision.inputs.temporal.late_hours);
        let decision = brain.decide(&request(vec![task("a", 10.0, Priority::Low)]), now());
        assert!(!decision.inputs.temporal.late_hours);
    }

    #[test]
    fn forcing_twice_charges_once() {
        let mut brain = Brain::new(BrainConfig::default());
        brain.ledger = BudgetLedger::new(DailyBudget::with_usage(100.0, 85.0, 0.95));
        let decision = brain.decide(&request(vec![task("big", 30.0, Priority::High)]), now());

        let first = brain.force(&decision, "big", true, now()).unwrap();
        let after_first = brain.budget().clone();

        let err = brain.force(&decision, "big", true, now()).unwrap_err();
        match err {
            CoreError::Validation(ValidationError::AlreadyCommitted { override_id, .. }) => {
                assert_eq!(override_id, first.record.id)
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(brain.budget(), &after_first);
        assert_eq!(brain.coach().overrides().list().len(), 1);

        // A regretted override no longer blocks forcing again.
        brain.regret(&first.record.id, now()).unwrap();
        let second = brain.force(&decision, "big", true, now()).unwrap();
        assert_ne!(second.record.id, first.record.id);
        assert!((second.receipt.charged - first.receipt.charged).abs() < 1e-9);
    }

    #[test]
    fn force_allowed_task_is_rejected() {
        let mut brain = Brain::new(BrainConfig::default());
        let decision = brain.decide(&request(vec![task("a", 10.0, Priority::Low)]), now());
        let err = brain.force(&decision, "a", true, now()).unwrap_err();
        assert!(matches!(err, CoreError::Validation(ValidationError::NotRefused(_))));
        let err = brain.activate(&decision, "zzz").unwrap_err();
        assert!(matches!(err, CoreError::Validation(ValidationError::UnknownTask { .. })));
    }

    #[test]
    fn same_inputs_give_reproducible_stamps() {
        let mut a = Brain::new(BrainConfig::default());
        let mut b = Brain::new(BrainConfig::default());
        let tasks = vec![task("x", 10.0, Priority::Low), task("y", 20.0, Priority::High)];
        let mut reversed = tasks.clone();
        reversed.reverse();

        let d1 = a.decide(&request(tasks), now());
        let d2 = b.decide(&request(reversed), now());
        assert!(d1.stamp.is_reproducible_with(&d2.stamp));
    }

    #[test]
    fn state_round_trips_through_export() {
        let mut brain = Brain::new(BrainConfig::default());
        let decision = brain.decide(&request(vec![task("a", 10.0, Priority::Low)]), now());
        brain.activate(&decision, "a").unwrap();

        let restored = Brain::from_state(BrainConfig::default(), brain.export_state());
        assert_eq!(restored.budget(), brain.budget());
    }
}
