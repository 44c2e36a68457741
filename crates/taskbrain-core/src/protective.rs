//! Protective mode: burnout detection with a minimum-duration lock-in.
//!
//! ## States
//!
//! - **Inactive**: normal operation.
//! - **Active**: entered automatically when at least two burnout signals hold
//!   over the observation window. Biases the budget engine toward short,
//!   light tasks.
//!
//! Leaving Active needs either an acknowledged exit after `min_duration`, a
//! quiet period (no scheduling request for 24h) after `min_duration`, or an
//! explicit early exit by the user. There is no plain toggle.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, VecDeque};

use crate::config::{ProtectiveConfig, MAX_SPAN_DAYS, MAX_SPAN_HOURS};
use crate::error::ProtectiveError;
use crate::records::BehaviorSnapshot;

/// Hard lower bound for how long protective mode stays on.
pub const MIN_PROTECTIVE_HOURS: i64 = 24;

/// Named burnout indicators.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BurnoutSignal {
    ChronicOverload,
    SleepDebt,
    ConstantOverrides,
    ZeroCompletion,
    ErraticBehavior,
    TaskAccumulation,
}

impl BurnoutSignal {
    pub fn description(&self) -> &'static str {
        match self {
            BurnoutSignal::ChronicOverload => "Budget nearly exhausted day after day",
            BurnoutSignal::SleepDebt => "Reported sleep below healthy levels",
            BurnoutSignal::ConstantOverrides => "Refusals are overridden routinely",
            BurnoutSignal::ZeroCompletion => "Planned work is not getting done",
            BurnoutSignal::ErraticBehavior => "Completion swings wildly between days",
            BurnoutSignal::TaskAccumulation => "Backlog keeps growing",
        }
    }
}

/// Protective mode state exposed to the UI.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProtectiveModeState {
    pub active: bool,
    pub signals: BTreeSet<BurnoutSignal>,
    pub entered_at: Option<DateTime<Utc>>,
    /// Minimum time to stay active, in hours
    pub min_duration_hours: i64,
    /// Last scheduling request seen while active
    pub last_request_at: Option<DateTime<Utc>>,
    /// Number of explicit early exits by the user
    #[serde(default)]
    pub early_exits: u32,
}

impl ProtectiveModeState {
    fn inactive(min_duration_hours: i64) -> Self {
        Self {
            active: false,
            signals: BTreeSet::new(),
            entered_at: None,
            min_duration_hours,
            last_request_at: None,
            early_exits: 0,
        }
    }

    /// Earliest time an acknowledged exit is allowed.
    pub fn earliest_exit(&self) -> Option<DateTime<Utc>> {
        self.entered_at
            .map(|at| at + Duration::hours(self.min_duration_hours))
    }
}

/// How protective mode was left.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExitKind {
    Acknowledged,
    /// No request for the quiet period after the minimum duration
    QuietLapse,
    /// User left before the minimum duration elapsed
    UserForced { reason: String },
}

/// Result of [`ProtectiveModeDetector::evaluate`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "transition", rename_all = "snake_case")]
pub enum ProtectiveTransition {
    Unchanged,
    Entered { signals: BTreeSet<BurnoutSignal> },
    Exited { kind: ExitKind },
}

/// Serializable detector state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DetectorState {
    pub mode: ProtectiveModeState,
    pub window: Vec<BehaviorSnapshot>,
}

/// Sole owner of [`ProtectiveModeState`].
#[derive(Debug, Clone)]
pub struct ProtectiveModeDetector {
    config: ProtectiveConfig,
    state: ProtectiveModeState,
    window: VecDeque<BehaviorSnapshot>,
}

impl ProtectiveModeDetector {
    pub fn new(config: ProtectiveConfig) -> Self {
        let min_hours = config.min_duration_hours.clamp(MIN_PROTECTIVE_HOURS, MAX_SPAN_HOURS);
        Self {
            config,
            state: ProtectiveModeState::inactive(min_hours),
            window: VecDeque::new(),
        }
    }

    /// Restore from exported state.
    pub fn from_state(config: ProtectiveConfig, state: DetectorState) -> Self {
        let mut detector = Self::new(config);
        let min_hours = detector.state.min_duration_hours;
        detector.state = state.mode;
        detector.state.min_duration_hours = detector.state.min_duration_hours.clamp(min_hours, MAX_SPAN_HOURS);
        detector.window = state.window.into_iter().collect();
        detector
    }

    pub fn export_state(&self) -> DetectorState {
        DetectorState {
            mode: self.state.clone(),
            window: self.window.iter().cloned().collect(),
        }
    }

    pub fn state(&self) -> &ProtectiveModeState {
        &self.state
    }

    pub fn is_active(&self) -> bool {
        self.state.active
    }

    /// Add one day of behavior history and prune the window.
    pub fn observe(&mut self, snapshot: BehaviorSnapshot) {
        let now = snapshot.at;
        let pos = self
            .window
            .iter()
            .position(|s| s.at > snapshot.at)
            .unwrap_or(self.window.len());
        self.window.insert(pos, snapshot);
        self.prune(now);
    }

    /// Burnout signals currently true over the window.
    pub fn detect_signals(&self) -> BTreeSet<BurnoutSignal> {
        let cfg = &self.config;
        let samples: Vec<&BehaviorSnapshot> = self.window.iter().collect();
        let mut signals = BTreeSet::new();
        if samples.is_empty() {
            return signals;
        }

        let loads: Vec<f64> = samples.iter().map(|s| s.load_ratio).collect();
        if loads.len() >= 3 && mean(&loads) > cfg.overload_ratio {
            signals.insert(BurnoutSignal::ChronicOverload);
        }

        let sleep: Vec<f64> = samples.iter().filter_map(|s| s.sleep_hours).collect();
        if !sleep.is_empty() && mean(&sleep) < cfg.sleep_debt_hours {
            signals.insert(BurnoutSignal::SleepDebt);
        }

        let overrides: Vec<f64> = samples.iter().map(|s| s.overrides as f64).collect();
        if mean(&overrides) >= cfg.overrides_per_day {
            signals.insert(BurnoutSignal::ConstantOverrides);
        }

        let recent: Vec<&&BehaviorSnapshot> = samples.iter().rev().take(2).collect();
        if recent.len() == 2
            && recent
                .iter()
                .all(|s| s.planned_tasks > 0 && s.completed_tasks == 0)
        {
            signals.insert(BurnoutSignal::ZeroCompletion);
        }

        let ratios: Vec<f64> = samples.iter().filter_map(|s| s.completion_ratio()).collect();
        if ratios.len() >= 3 && sample_std_dev(&ratios) > cfg.erratic_std_dev {
            signals.insert(BurnoutSignal::ErraticBehavior);
        }

        if let (Some(first), Some(last)) = (samples.first(), samples.last()) {
            if last.pending_tasks >= first.pending_tasks.saturating_add(cfg.accumulation_growth)
                && samples.len() >= 2
            {
                signals.insert(BurnoutSignal::TaskAccumulation);
            }
        }

        signals
    }

    /// Run the state machine against the current window.
    pub fn evaluate(&mut self, now: DateTime<Utc>) -> ProtectiveTransition {
        self.prune(now);
        let signals = self.detect_signals();

        if self.state.active {
            // Signals may change while active; they never shorten the stay.
            self.state.signals = signals;
            return self.try_quiet_exit(now);
        }

        if signals.len() >= self.config.min_signals {
            self.state.active = true;
            self.state.entered_at = Some(now);
            self.state.last_request_at = None;
            self.state.signals = signals.clone();
            tracing::info!(?signals, "protective mode entered");
            return ProtectiveTransition::Entered { signals };
        }

        self.state.signals = signals;
        ProtectiveTransition::Unchanged
    }

    /// Note a scheduling request; used for the quiet-lapse exit.
    pub fn record_request(&mut self, now: DateTime<Utc>) {
        if self.state.active {
            self.state.last_request_at = Some(now);
        }
    }

    /// Exit after the minimum duration with explicit user acknowledgment.
    ///
    /// # Errors
    /// Fails if not active or the minimum duration has not elapsed.
    pub fn acknowledge_exit(&mut self, now: DateTime<Utc>) -> Result<ExitKind, ProtectiveError> {
        if !self.state.active {
            return Err(ProtectiveError::NotActive);
        }
        if let Some(until) = self.state.earliest_exit() {
            if now < until {
                return Err(ProtectiveError::MinDurationNotElapsed { until });
            }
        }
        self.deactivate(ExitKind::Acknowledged);
        Ok(ExitKind::Acknowledged)
    }

    /// Explicit early exit requested by the user.
    ///
    /// # Errors
    /// Fails if protective mode is not active.
    pub fn force_exit(&mut self, now: DateTime<Utc>, reason: &str) -> Result<ExitKind, ProtectiveError> {
        if !self.state.active {
            return Err(ProtectiveError::NotActive);
        }
        let early = self.state.earliest_exit().is_some_and(|until| now < until);
        if early {
            self.state.early_exits += 1;
        }
        let kind = ExitKind::UserForced {
            reason: reason.to_string(),
        };
        self.deactivate(kind.clone());
        Ok(kind)
    }

    /// Periodic maintenance: prune history and apply the quiet-lapse exit.
    pub fn tick(&mut self, now: DateTime<Utc>) -> ProtectiveTransition {
        self.prune(now);
        if self.state.active {
            self.try_quiet_exit(now)
        } else {
            ProtectiveTransition::Unchanged
        }
    }

    fn try_quiet_exit(&mut self, now: DateTime<Utc>) -> ProtectiveTransition {
        let Some(entered_at) = self.state.entered_at else {
            return ProtectiveTransition::Unchanged;
        };
        let min_elapsed = now >= entered_at + Duration::hours(self.state.min_duration_hours);
        let last_activity = self.state.last_request_at.unwrap_or(entered_at);
        let quiet_hours = self.config.quiet_exit_hours.clamp(MIN_PROTECTIVE_HOURS, MAX_SPAN_HOURS);
        let quiet = now - last_activity >= Duration::hours(quiet_hours);

        if min_elapsed && quiet {
            self.deactivate(ExitKind::QuietLapse);
            ProtectiveTransition::Exited {
                kind: ExitKind::QuietLapse,
            }
        } else {
            ProtectiveTransition::Unchanged
        }
    }

    fn deactivate(&mut self, kind: ExitKind) {
        tracing::info!(?kind, "protective mode exited");
        self.state.active = false;
        self.state.entered_at = None;
        self.state.last_request_at = None;
    }

    fn prune(&mut self, now: DateTime<Utc>) {
        let cutoff = now - Duration::days(self.config.window_days.clamp(1, MAX_SPAN_DAYS));
        while self.window.front().is_some_and(|s| s.at < cutoff) {
            self.window.pop_front();
        }
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample (n-1) standard deviation; 0 for fewer than two values.
pub(crate) fn sample_std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    var.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 1, 20, 0, 0).unwrap()
    }

    fn healthy(at: DateTime<Utc>) -> BehaviorSnapshot {
        BehaviorSnapshot {
            at,
            load_ratio: 0.6,
            sleep_hours: Some(7.5),
            overrides: 0,
            planned_tasks: 5,
            completed_tasks: 4,
            pending_tasks: 10,
        }
    }

    fn overloaded(at: DateTime<Utc>) -> BehaviorSnapshot {
        BehaviorSnapshot {
            at,
            load_ratio: 1.0,
            sleep_hours: Some(4.5),
            overrides: 1,
            planned_tasks: 5,
            completed_tasks: 3,
            pending_tasks: 10,
        }
    }

    fn burned_out_detector() -> ProtectiveModeDetector {
        let mut d = ProtectiveModeDetector::new(ProtectiveConfig::default());
        for i in 0..3 {
            d.observe(overloaded(t0() + Duration::days(i)));
        }
        d
    }

    #[test]
    fn healthy_history_stays_inactive() {
        let mut d = ProtectiveModeDetector::new(ProtectiveConfig::default());
        for i in 0..5 {
            d.observe(healthy(t0() + Duration::days(i)));
        }
        assert_eq!(d.evaluate(t0() + Duration::days(5)), ProtectiveTransition::Unchanged);
        assert!(!d.is_active());
    }

    #[test]
    fn single_signal_is_not_enough() {
        let mut d = ProtectiveModeDetector::new(ProtectiveConfig::default());
        for i in 0..3 {
            let mut s = healthy(t0() + Duration::days(i));
            s.sleep_hours = Some(4.0);
            d.observe(s);
        }
        assert_eq!(d.detect_signals().len(), 1);
        d.evaluate(t0() + Duration::days(3));
        assert!(!d.is_active());
    }

    #[test]
    fn two_signals_enter_protective_mode() {
        let mut d = burned_out_detector();
        let now = t0() + Duration::days(3);
        match d.evaluate(now) {
            ProtectiveTransition::Entered { signals } => {
                assert!(signals.contains(&BurnoutSignal::ChronicOverload));
                assert!(signals.contains(&BurnoutSignal::SleepDebt));
            }
            other => panic!("expected entry, got {other:?}"),
        }
        assert_eq!(d.state().entered_at, Some(now));
    }

    #[test]
    fn zero_completion_and_accumulation_detected() {
        let mut d = ProtectiveModeDetector::new(ProtectiveConfig::default());
        let mut a = healthy(t0());
        a.pending_tasks = 5;
        d.observe(a);
        for i in 1..3 {
            let mut s = healthy(t0() + Duration::days(i));
            s.completed_tasks = 0;
            s.pending_tasks = 5 + 8 * i as u32;
            d.observe(s);
        }
        let signals = d.detect_signals();
        assert!(signals.contains(&BurnoutSignal::ZeroCompletion));
        assert!(signals.contains(&BurnoutSignal::TaskAccumulation));
    }

    #[test]
    fn acknowledged_exit_blocked_before_min_duration() {
        let mut d = burned_out_detector();
        let entered = t0() + Duration::days(3);
        d.evaluate(entered);
        let err = d.acknowledge_exit(entered + Duration::hours(23)).unwrap_err();
        assert!(matches!(err, ProtectiveError::MinDurationNotElapsed { .. }));
        assert!(d.is_active());
        assert_eq!(d.acknowledge_exit(entered + Duration::hours(24)), Ok(ExitKind::Acknowledged));
        assert!(!d.is_active());
    }

    #[test]
    fn quiet_lapse_needs_no_recent_request() {
        let mut d = burned_out_detector();
        let entered = t0() + Duration::days(3);
        d.evaluate(entered);
        d.record_request(entered + Duration::hours(20));

        // Min duration passed, but a request came in 10h ago.
        assert_eq!(d.tick(entered + Duration::hours(30)), ProtectiveTransition::Unchanged);
        assert!(d.is_active());

        let transition = d.tick(entered + Duration::hours(44));
        assert_eq!(
            transition,
            ProtectiveTransition::Exited {
                kind: ExitKind::QuietLapse
            }
        );
    }

    #[test]
    fn force_exit_counts_early_exits() {
        let mut d = burned_out_detector();
        let entered = t0() + Duration::days(3);
        d.evaluate(entered);
        d.force_exit(entered + Duration::hours(1), "deadline tonight").unwrap();
        assert!(!d.is_active());
        assert_eq!(d.state().early_exits, 1);
        assert_eq!(d.force_exit(entered, "again"), Err(ProtectiveError::NotActive));
    }

    #[test]
    fn min_duration_cannot_be_configured_below_24h() {
        let config = ProtectiveConfig {
            min_duration_hours: 2,
            ..Default::default()
        };
        let d = ProtectiveModeDetector::new(config);
        assert_eq!(d.state().min_duration_hours, 24);
    }

    #[test]
    fn old_snapshots_are_pruned() {
        let mut d = ProtectiveModeDetector::new(ProtectiveConfig::default());
        d.observe(overloaded(t0()));
        d.observe(healthy(t0() + Duration::days(10)));
        assert_eq!(d.export_state().window.len(), 1);
    }

    #[test]
    fn sample_std_dev_matches_known_value() {
        let sd = sample_std_dev(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert!((sd - 2.138).abs() < 0.01);
    }
}
