//! Coach safety layer.
//!
//! Wraps an optional advisory step that may annotate a decision with a short
//! note. The advisory call races a hard timeout and a cancellation token;
//! anything other than a well-formed note within the timeout yields `None`
//! and the caller shows the raw decision.
//!
//! The layer also owns the manual kill switch, the explanation budget and the
//! reversible-override ledger.

pub mod overrides;

pub use overrides::{OverrideDraft, OverrideLedger, Refund, ReversibleOverride};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::future::Future;
use tokio_util::sync::CancellationToken;

use crate::budget::WarningLevel;
use crate::config::{CoachConfig, MAX_SPAN_DAYS, MAX_SPAN_MINUTES};
use crate::error::{AdvisorError, ValidationError};

/// What the advisor gets to see about a decision.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AdviceRequest {
    pub decision_id: String,
    pub session_id: String,
    pub summary: String,
    pub mode: String,
    pub allowed_task_ids: Vec<String>,
    pub rejected_task_ids: Vec<String>,
    /// Highest warning among the rejected tasks' override costs
    pub highest_warning: Option<WarningLevel>,
}

/// An optional source of coaching notes.
///
/// Responses are untrusted JSON; the layer validates their shape.
pub trait Advisor {
    fn advise(&self, request: AdviceRequest)
        -> impl Future<Output = Result<Value, AdvisorError>> + Send;
}

/// Local advisor that phrases the decision summary without any I/O.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateAdvisor;

impl Advisor for TemplateAdvisor {
    fn advise(&self, request: AdviceRequest)
        -> impl Future<Output = Result<Value, AdvisorError>> + Send {
        async move {
            let (message, tone) = match (request.rejected_task_ids.len(), request.highest_warning) {
                (0, _) => (
                    format!("All {} task(s) fit today. Keep the pace steady.", request.allowed_task_ids.len()),
                    "encouraging",
                ),
                (n, Some(WarningLevel::High)) => (
                    format!("{n} task(s) would overdraw today's budget heavily. Consider moving them to tomorrow."),
                    "cautious",
                ),
                (n, _) => (
                    format!("{n} task(s) did not fit. Forcing them borrows from tomorrow."),
                    "neutral",
                ),
            };
            Ok(serde_json::json!({ "message": message, "tone": tone }))
        }
    }
}

/// A validated note attached to a decision.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CoachNote {
    pub decision_id: String,
    pub message: String,
    pub tone: Option<String>,
    pub delivered_at: DateTime<Utc>,
}

/// Manual switch that disables the advisory step for a while.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CoachKillSwitch {
    pub is_active: bool,
    pub disabled_until: Option<DateTime<Utc>>,
    pub toggle_count: u32,
    pub reason_last_used: Option<String>,
}

impl CoachKillSwitch {
    /// Disable until `now + duration`. Fails when that instant is not representable.
    pub fn activate(
        &mut self,
        now: DateTime<Utc>,
        duration: Duration,
        reason: &str,
    ) -> Result<(), ValidationError> {
        let until = now
            .checked_add_signed(duration)
            .filter(|until| *until > now)
            .ok_or_else(|| ValidationError::InvalidValue {
                field: "duration".to_string(),
                message: format!("{} minutes is not a usable kill duration", duration.num_minutes()),
            })?;
        self.is_active = true;
        self.disabled_until = Some(until);
        self.toggle_count += 1;
        self.reason_last_used = Some(reason.to_string());
        tracing::info!(%until, reason, "coach disabled");
        Ok(())
    }

    pub fn deactivate(&mut self) {
        if self.is_active {
            self.toggle_count += 1;
            tracing::info!("coach re-enabled");
        }
        self.is_active = false;
        self.disabled_until = None;
    }

    /// Expiry is a time comparison; nothing flips the flag in the background.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.disabled_until.map_or(true, |until| now < until)
    }
}

/// Explanations delivered today, in total and per session.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ExplanationUsage {
    pub day: Option<NaiveDate>,
    pub today: u32,
    pub per_session: BTreeMap<String, u32>,
}

impl ExplanationUsage {
    fn roll(&mut self, now: DateTime<Utc>) {
        let today = now.date_naive();
        if self.day != Some(today) {
            self.day = Some(today);
            self.today = 0;
            self.per_session.clear();
        }
    }

    /// Explanations still available to `session_id` at `now`.
    pub fn remaining(&self, session_id: &str, now: DateTime<Utc>, config: &CoachConfig) -> u32 {
        let (today, session) = if self.day == Some(now.date_naive()) {
            (self.today, self.per_session.get(session_id).copied().unwrap_or(0))
        } else {
            (0, 0)
        };
        let by_day = config.max_explanations_per_day.saturating_sub(today);
        let by_session = config.max_explanations_per_session.saturating_sub(session);
        by_day.min(by_session)
    }

    fn consume(&mut self, session_id: &str, now: DateTime<Utc>) {
        self.roll(now);
        self.today += 1;
        *self.per_session.entry(session_id.to_string()).or_insert(0) += 1;
    }
}

/// Serializable coach state.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CoachState {
    pub kill_switch: CoachKillSwitch,
    pub usage: ExplanationUsage,
    pub overrides: Vec<ReversibleOverride>,
}

/// Owner of the kill switch, explanation usage and overrides.
#[derive(Debug, Clone)]
pub struct CoachSafetyLayer {
    config: CoachConfig,
    kill_switch: CoachKillSwitch,
    usage: ExplanationUsage,
    overrides: OverrideLedger,
}

impl CoachSafetyLayer {
    pub fn new(config: CoachConfig) -> Self {
        Self::from_state(config, CoachState::default())
    }

    pub fn from_state(config: CoachConfig, state: CoachState) -> Self {
        let window = Duration::minutes(config.undo_window_minutes.clamp(0, MAX_SPAN_MINUTES));
        Self {
            config,
            kill_switch: state.kill_switch,
            usage: state.usage,
            overrides: OverrideLedger::with_overrides(window, state.overrides),
        }
    }

    pub fn export_state(&self) -> CoachState {
        CoachState {
            kill_switch: self.kill_switch.clone(),
            usage: self.usage.clone(),
            overrides: self.overrides.export(),
        }
    }

    pub fn config(&self) -> &CoachConfig {
        &self.config
    }

    pub fn kill_switch(&self) -> &CoachKillSwitch {
        &self.kill_switch
    }

    /// Disable the advisor; `duration` defaults to `default_kill_minutes`.
    pub fn disable(
        &mut self,
        now: DateTime<Utc>,
        duration: Option<Duration>,
        reason: &str,
    ) -> Result<(), ValidationError> {
        let duration = duration.unwrap_or_else(|| {
            Duration::minutes(self.config.default_kill_minutes.clamp(1, MAX_SPAN_MINUTES))
        });
        self.kill_switch.activate(now, duration, reason)
    }

    pub fn enable(&mut self) {
        self.kill_switch.deactivate();
    }

    pub fn usage(&self) -> &ExplanationUsage {
        &self.usage
    }

    pub fn remaining_explanations(&self, session_id: &str, now: DateTime<Utc>) -> u32 {
        self.usage.remaining(session_id, now, &self.config)
    }

    pub fn overrides(&self) -> &OverrideLedger {
        &self.overrides
    }

    pub fn overrides_mut(&mut self) -> &mut OverrideLedger {
        &mut self.overrides
    }

    /// Ask the advisor for a note, bounded by the timeout and `cancel`.
    ///
    /// Returns `None` when disabled, out of explanation budget, cancelled,
    /// timed out, failed, or malformed. Budget is only consumed by a delivered
    /// note.
    pub async fn annotate<A: Advisor>(
        &mut self,
        advisor: &A,
        request: AdviceRequest,
        cancel: &CancellationToken,
        now: DateTime<Utc>,
    ) -> Option<CoachNote> {
        if self.kill_switch.is_active(now) {
            tracing::debug!("coach disabled by kill switch");
            return None;
        }
        if self.remaining_explanations(&request.session_id, now) == 0 {
            tracing::debug!(session_id = %request.session_id, "explanation budget exhausted");
            return None;
        }

        let decision_id = request.decision_id.clone();
        let session_id = request.session_id.clone();
        let timeout = std::time::Duration::from_millis(self.config.timeout_ms);

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!(%decision_id, "advisory call cancelled");
                return None;
            }
            result = tokio::time::timeout(timeout, advisor.advise(request)) => result,
        };

        let value = match outcome {
            Ok(Ok(value)) => value,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, %decision_id, "advisor failed");
                return None;
            }
            Err(_) => {
                tracing::warn!(timeout_ms = self.config.timeout_ms, %decision_id, "advisor timed out");
                return None;
            }
        };

        let Some((message, tone)) = parse_note(&value, self.config.max_message_chars) else {
            tracing::warn!(%decision_id, "advisor returned an invalid note");
            return None;
        };

        self.usage.consume(&session_id, now);
        Some(CoachNote {
            decision_id,
            message,
            tone,
            delivered_at: now,
        })
    }

    /// Close undo windows and drop old override records.
    pub fn tick(&mut self, now: DateTime<Utc>) -> usize {
        let retention = Duration::days(self.config.override_retention_days.clamp(1, MAX_SPAN_DAYS));
        self.overrides.prune(now, retention)
    }
}

/// Accept `{"message": <non-empty string>, "tone": <string>?}` only.
fn parse_note(value: &Value, max_chars: usize) -> Option<(String, Option<String>)> {
    let object = value.as_object()?;
    let message = object.get("message")?.as_str()?.trim();
    if message.is_empty() || message.chars().count() > max_chars {
        return None;
    }
    let tone = match object.get("tone") {
        None | Some(Value::Null) => None,
        Some(Value::String(t)) => Some(t.clone()),
        Some(_) => return None,
    };
    Some((message.to_string(), tone))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Instant;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()
    }

    fn request(session: &str) -> AdviceRequest {
        AdviceRequest {
            decision_id: "d1".to_string(),
            session_id: session.to_string(),
            summary: "2 allowed, 1 rejected".to_string(),
            mode: "ASSISTED".to_string(),
            allowed_task_ids: vec!["a".to_string(), "b".to_string()],
            rejected_task_ids: vec!["c".to_string()],
            highest_warning: Some(WarningLevel::Medium),
        }
    }

    struct Fixed {
        value: Value,
        calls: Arc<AtomicUsize>,
    }

    impl Fixed {
        fn new(value: Value) -> Self {
            Self {
                value,
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    impl Advisor for Fixed {
        fn advise(&self, _request: AdviceRequest)
            -> impl Future<Output = Result<Value, AdvisorError>> + Send {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let value = self.value.clone();
            async move { Ok(value) }
        }
    }

    struct Slow;

    impl Advisor for Slow {
        fn advise(&self, _request: AdviceRequest)
            -> impl Future<Output = Result<Value, AdvisorError>> + Send {
            async {
                tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                Ok(json!({"message": "too late"}))
            }
        }
    }

    struct Failing;

    impl Advisor for Failing {
        fn advise(&self, _request: AdviceRequest)
            -> impl Future<Output = Result<Value, AdvisorError>> + Send {
            async { Err(AdvisorError::Unavailable("offline".to_string())) }
        }
    }

    fn layer() -> CoachSafetyLayer {
        CoachSafetyLayer::new(CoachConfig {
            timeout_ms: 50,
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn valid_note_is_delivered_and_counted() {
        let mut coach = layer();
        let advisor = Fixed::new(json!({"message": "Take a break first.", "tone": "calm"}));
        let note = coach
            .annotate(&advisor, request("s1"), &CancellationToken::new(), now())
            .await
            .expect("note");
        assert_eq!(note.message, "Take a break first.");
        assert_eq!(note.tone.as_deref(), Some("calm"));
        assert_eq!(coach.usage().today, 1);
    }

    #[tokio::test]
    async fn slow_advisor_times_out_quickly() {
        let mut coach = layer();
        let started = Instant::now();
        let note = coach
            .annotate(&Slow, request("s1"), &CancellationToken::new(), now())
            .await;
        assert!(note.is_none());
        assert!(started.elapsed() < std::time::Duration::from_millis(50 + 500));
        assert_eq!(coach.usage().today, 0);
    }

    #[tokio::test]
    async fn cancelled_call_returns_none() {
        let mut coach = layer();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let advisor = Fixed::new(json!({"message": "hi"}));
        assert!(coach.annotate(&advisor, request("s1"), &cancel, now()).await.is_none());
        assert_eq!(coach.usage().today, 0);
    }

    #[tokio::test]
    async fn advisor_errors_and_bad_shapes_fall_back() {
        let mut coach = layer();
        let token = CancellationToken::new();
        assert!(coach.annotate(&Failing, request("s1"), &token, now()).await.is_none());

        for bad in [
            json!("just a string"),
            json!({"message": ""}),
            json!({"message": 42}),
            json!({"message": "ok", "tone": 3}),
            json!({"message": "x".repeat(281)}),
        ] {
            let advisor = Fixed::new(bad);
            assert!(coach.annotate(&advisor, request("s1"), &token, now()).await.is_none());
        }
        assert_eq!(coach.usage().today, 0);
    }

    #[tokio::test]
    async fn kill_switch_skips_advisor() {
        let mut coach = layer();
        coach.disable(now(), Some(Duration::hours(2)), "too chatty").unwrap();
        let advisor = Fixed::new(json!({"message": "hi"}));
        let calls = advisor.calls.clone();

        let token = CancellationToken::new();
        assert!(coach.annotate(&advisor, request("s1"), &token, now()).await.is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        // Expired by time comparison alone.
        let later = now() + Duration::hours(2);
        assert!(coach.annotate(&advisor, request("s1"), &token, later).await.is_some());
        assert_eq!(coach.kill_switch().toggle_count, 1);
    }

    #[tokio::test]
    async fn explanation_budget_limits_per_session_and_day() {
        let mut coach = layer();
        let advisor = Fixed::new(json!({"message": "hi"}));
        let token = CancellationToken::new();

        for _ in 0..3 {
            assert!(coach.annotate(&advisor, request("s1"), &token, now()).await.is_some());
        }
        assert!(coach.annotate(&advisor, request("s1"), &token, now()).await.is_none());
        assert_eq!(coach.remaining_explanations("s2", now()), 3);

        // New day resets both counters.
        let tomorrow = now() + Duration::days(1);
        assert_eq!(coach.remaining_explanations("s1", tomorrow), 3);
    }

    #[tokio::test]
    async fn template_advisor_produces_valid_notes() {
        let mut coach = layer();
        let note = coach
            .annotate(&TemplateAdvisor, request("s1"), &CancellationToken::new(), now())
            .await
            .expect("note");
        assert!(note.message.contains("did not fit"));
    }

    #[test]
    fn kill_switch_toggles_are_counted() {
        let mut switch = CoachKillSwitch::default();
        switch.activate(now(), Duration::minutes(30), "focus").unwrap();
        assert!(switch.is_active(now()));
        switch.deactivate();
        assert!(!switch.is_active(now()));
        assert_eq!(switch.toggle_count, 2);
        assert_eq!(switch.reason_last_used.as_deref(), Some("focus"));
    }

    #[test]
    fn kill_switch_rejects_unrepresentable_duration() {
        let mut switch = CoachKillSwitch::default();
        let huge = Duration::try_days(100_000_000).expect("in range for TimeDelta");
        assert!(matches!(
            switch.activate(now(), huge, "forever"),
            Err(ValidationError::InvalidValue { .. })
        ));
        assert!(switch.activate(now(), Duration::zero(), "instant").is_err());
        assert!(!switch.is_active(now()));
        assert_eq!(switch.toggle_count, 0);
    }

    #[tokio::test]
    async fn cancelling_a_pending_call_discards_its_result() {
        let mut coach = CoachSafetyLayer::new(CoachConfig {
            timeout_ms: 10_000,
            ..Default::default()
        });
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let note = coach.annotate(&Slow, request("s1"), &cancel, now()).await;
        assert!(note.is_none());
        assert!(started.elapsed() < std::time::Duration::from_secs(2));
        assert_eq!(coach.usage().today, 0);
        assert_eq!(coach.remaining_explanations("s1", now()), 3);
    }
}
