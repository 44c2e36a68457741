//! Adaptive per-feature weights with an overfitting guard.
//!
//! Two gates stand between an observation stream and a weight change:
//! the observation window must span at least `min_observation_days` calendar
//! days, and its sample standard deviation must not exceed `max_std_dev`.
//! A proposal failing either gate is dropped whole.
//!
//! Accepted adaptations expire `ttl_days` after their first acceptance, even
//! if evidence keeps supporting them. The evidence buffer of a purged feature
//! is discarded so that re-validation needs a fresh window.
//!
//! Decay is applied only by [`OverfittingGuard::tick`] (and right before an
//! update), never on read.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::config::{AdaptiveConfig, MAX_SPAN_DAYS};
use crate::protective::sample_std_dev;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Shortest observation span any configuration may ask for.
pub const MIN_OBSERVATION_DAYS: i64 = 30;

/// Loosest variance gate any configuration may ask for.
pub const MAX_STD_DEV: f64 = 0.3;

/// A named, decaying weight.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AdaptiveWeight {
    pub name: String,
    pub value: f64,
    pub updated_at: DateTime<Utc>,
    /// Last time forgetting was applied
    pub decayed_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// One observed value for a feature.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Observation {
    pub value: f64,
    pub at: DateTime<Utc>,
}

/// Why an adaptation was not applied.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RejectionReason {
    /// Observations cover too few calendar days
    InsufficientSpan { span_days: f64, required_days: i64 },
    /// Not enough samples to estimate variance
    TooFewSamples { count: usize },
    ExcessVariance { std_dev: f64, max_std_dev: f64 },
    NonFiniteObservation,
}

/// Statistics of a window that passed both gates.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct WindowStats {
    pub mean: f64,
    pub std_dev: f64,
    pub span_days: f64,
    pub sample_count: usize,
}

/// Outcome of a proposal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum AdaptationVerdict {
    Accepted {
        feature: String,
        previous: f64,
        new_value: f64,
        expires_at: DateTime<Utc>,
    },
    Rejected {
        feature: String,
        reason: RejectionReason,
    },
}

impl AdaptationVerdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, AdaptationVerdict::Accepted { .. })
    }
}

/// Check both gates over a window.
///
/// The span gate is calendar-based: the distance between the earliest and
/// latest observation, not the number of samples.
pub fn check_adaptation_window(
    window: &[Observation],
    config: &AdaptiveConfig,
) -> Result<WindowStats, RejectionReason> {
    if window.iter().any(|o| !o.value.is_finite()) {
        return Err(RejectionReason::NonFiniteObservation);
    }

    let first = window.iter().map(|o| o.at).min();
    let last = window.iter().map(|o| o.at).max();
    let span_days = match (first, last) {
        (Some(first), Some(last)) => (last - first).num_seconds() as f64 / SECONDS_PER_DAY,
        _ => 0.0,
    };
    let required_days = config.min_observation_days.max(MIN_OBSERVATION_DAYS);
    if span_days < required_days as f64 {
        return Err(RejectionReason::InsufficientSpan {
            span_days,
            required_days,
        });
    }

    if window.len() < 2 {
        return Err(RejectionReason::TooFewSamples { count: window.len() });
    }

    let values: Vec<f64> = window.iter().map(|o| o.value).collect();
    let std_dev = sample_std_dev(&values);
    let max_std_dev = config.max_std_dev.min(MAX_STD_DEV);
    if std_dev > max_std_dev {
        return Err(RejectionReason::ExcessVariance { std_dev, max_std_dev });
    }

    Ok(WindowStats {
        mean: values.iter().sum::<f64>() / values.len() as f64,
        std_dev,
        span_days,
        sample_count: values.len(),
    })
}

/// Boolean form of [`check_adaptation_window`].
pub fn is_adaptation_allowed(window: &[Observation], config: &AdaptiveConfig) -> bool {
    check_adaptation_window(window, config).is_ok()
}

/// What a maintenance tick did.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TickReport {
    pub decayed: usize,
    pub purged: Vec<String>,
}

/// Serializable guard state.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GuardState {
    pub weights: BTreeMap<String, AdaptiveWeight>,
    pub observations: BTreeMap<String, Vec<Observation>>,
}

/// Sole owner of all adaptive weights.
#[derive(Debug, Clone)]
pub struct OverfittingGuard {
    config: AdaptiveConfig,
    weights: BTreeMap<String, AdaptiveWeight>,
    observations: BTreeMap<String, Vec<Observation>>,
}

impl OverfittingGuard {
    pub fn new(config: AdaptiveConfig) -> Self {
        Self {
            config,
            weights: BTreeMap::new(),
            observations: BTreeMap::new(),
        }
    }

    pub fn from_state(config: AdaptiveConfig, state: GuardState) -> Self {
        Self {
            config,
            weights: state.weights,
            observations: state.observations,
        }
    }

    pub fn export_state(&self) -> GuardState {
        GuardState {
            weights: self.weights.clone(),
            observations: self.observations.clone(),
        }
    }

    /// Live weight value, if an adaptation is in force.
    pub fn weight(&self, name: &str) -> Option<f64> {
        self.weights.get(name).map(|w| w.value)
    }

    pub fn weights(&self) -> impl Iterator<Item = &AdaptiveWeight> {
        self.weights.values()
    }

    /// Normalized weights for a set of features.
    ///
    /// Features without a live adaptation use their default. If the result
    /// does not sum to a positive finite number, weights are equal.
    pub fn weight_set(&self, features: &[(&str, f64)]) -> Vec<f64> {
        if features.is_empty() {
            return Vec::new();
        }
        let raw: Vec<f64> = features
            .iter()
            .map(|(name, default)| self.weight(name).unwrap_or(*default).max(0.0))
            .collect();
        let sum: f64 = raw.iter().sum();
        if !sum.is_finite() || sum <= 0.0 {
            let equal = 1.0 / features.len() as f64;
            return vec![equal; features.len()];
        }
        raw.into_iter().map(|w| w / sum).collect()
    }

    fn buffer_retention(&self) -> Duration {
        let days = self.config.min_observation_days.clamp(MIN_OBSERVATION_DAYS, MAX_SPAN_DAYS);
        Duration::days(days * 2)
    }

    /// Buffer an observation for a feature.
    pub fn observe(&mut self, feature: &str, value: f64, at: DateTime<Utc>) {
        let retention = self.buffer_retention();
        let buffer = self.observations.entry(feature.to_string()).or_default();
        buffer.push(Observation { value, at });
        buffer.sort_by_key(|o| o.at);
        buffer.retain(|o| o.at >= at - retention);
    }

    /// Observations currently buffered for a feature.
    pub fn observations(&self, feature: &str) -> &[Observation] {
        self.observations
            .get(feature)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Try to adapt `feature` from its buffered observations.
    ///
    /// `baseline` is the starting value when no adaptation is live.
    pub fn propose(&mut self, feature: &str, baseline: f64, now: DateTime<Utc>) -> AdaptationVerdict {
        let window: Vec<Observation> = self
            .observations(feature)
            .iter()
            .copied()
            .filter(|o| o.at <= now)
            .collect();

        let stats = match check_adaptation_window(&window, &self.config) {
            Ok(stats) => stats,
            Err(reason) => {
                tracing::debug!(feature, ?reason, "adaptation rejected");
                return AdaptationVerdict::Rejected {
                    feature: feature.to_string(),
                    reason,
                };
            }
        };

        let rate = self.config.learning_rate;
        let ttl = Duration::days(self.config.ttl_days.clamp(1, MAX_SPAN_DAYS));
        let forgetting = self.config.forgetting_factor;

        let weight = self
            .weights
            .entry(feature.to_string())
            .or_insert_with(|| AdaptiveWeight {
                name: feature.to_string(),
                value: baseline,
                updated_at: now,
                decayed_at: now,
                expires_at: now + ttl,
            });
        decay_weight(weight, forgetting, now);

        let previous = weight.value;
        weight.value = previous * (1.0 - rate) + stats.mean * rate;
        weight.updated_at = now;

        tracing::info!(
            feature,
            previous,
            new_value = weight.value,
            samples = stats.sample_count,
            "adaptation accepted"
        );

        AdaptationVerdict::Accepted {
            feature: feature.to_string(),
            previous,
            new_value: weight.value,
            expires_at: weight.expires_at,
        }
    }

    /// Apply forgetting to every weight and purge expired adaptations.
    pub fn tick(&mut self, now: DateTime<Utc>) -> TickReport {
        let forgetting = self.config.forgetting_factor;
        let mut report = TickReport::default();

        for weight in self.weights.values_mut() {
            if decay_weight(weight, forgetting, now) {
                report.decayed += 1;
            }
        }

        let expired: Vec<String> = self
            .weights
            .values()
            .filter(|w| now >= w.expires_at)
            .map(|w| w.name.clone())
            .collect();
        for name in &expired {
            self.weights.remove(name);
            self.observations.remove(name);
            tracing::info!(feature = %name, "adaptation expired");
        }
        report.purged = expired;

        let retention = self.buffer_retention();
        for buffer in self.observations.values_mut() {
            buffer.retain(|o| o.at >= now - retention);
        }
        self.observations.retain(|_, buffer| !buffer.is_empty());

        report
    }
}

/// `value *= factor ^ days_since_last_decay`. Returns whether anything changed.
fn decay_weight(weight: &mut AdaptiveWeight, factor: f64, now: DateTime<Utc>) -> bool {
    let days = (now - weight.decayed_at).num_seconds() as f64 / SECONDS_PER_DAY;
    if days <= 0.0 {
        return false;
    }
    weight.value *= factor.powf(days);
    weight.decayed_at = now;
    true
}
