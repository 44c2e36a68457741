//! After-the-fact scoring of the brain's own decisions.
//!
//! Each finished session is scored once; the scores go into a bounded rolling
//! history that is only ever read in aggregate. An alert here is a monitoring
//! signal and never changes behavior by itself.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::config::{QualityConfig, MAX_SPAN_DAYS};
use crate::records::SessionRecord;

/// Per-session decision quality.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct DecisionQualityMetrics {
    /// Share of tasks forced against a refusal
    pub forcing_rate: f64,
    /// 1 minus the gap between expected and actual completion ratio
    pub completion_accuracy: f64,
    /// 1 minus overrides per task
    pub consistency_score: f64,
    /// Share of forced tasks that were not completed
    pub override_impact: f64,
    pub overall_quality: f64,
}

/// Score one session.
///
/// Starts at 1.0, takes 0.3 off for forcing above 50% (0.1 above 20%), a
/// further 0.2 when the completion estimate missed by more than 0.3, and
/// finally scales by `0.5 + accuracy / 2`.
pub fn calculate_decision_quality(session: &SessionRecord) -> DecisionQualityMetrics {
    if session.total_tasks == 0 {
        return DecisionQualityMetrics {
            forcing_rate: 0.0,
            completion_accuracy: 1.0,
            consistency_score: 1.0,
            override_impact: 0.0,
            overall_quality: 1.0,
        };
    }

    let forcing_rate = session.forcing_rate();
    let mut quality: f64 = 1.0;
    if forcing_rate > 0.5 {
        quality -= 0.3;
    } else if forcing_rate > 0.2 {
        quality -= 0.1;
    }

    let estimated = sanitize_ratio(session.estimated_completion_ratio);
    let gap = (estimated - session.actual_completion_ratio()).abs();
    let completion_accuracy = (1.0 - gap).max(0.0);
    if gap > 0.3 {
        quality -= 0.2;
    }

    let consistency_score =
        (1.0 - session.forced_tasks as f64 / session.total_tasks as f64).max(0.0);

    let override_impact = if session.forced_tasks == 0 {
        0.0
    } else {
        let done = session.forced_completed.min(session.forced_tasks);
        1.0 - done as f64 / session.forced_tasks as f64
    };

    let overall_quality = (quality * (0.5 + completion_accuracy * 0.5)).clamp(0.0, 1.0);

    DecisionQualityMetrics {
        forcing_rate,
        completion_accuracy,
        consistency_score,
        override_impact,
        overall_quality,
    }
}

fn sanitize_ratio(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// One entry of the rolling history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QualityRecord {
    pub session_id: String,
    pub recorded_at: DateTime<Utc>,
    pub metrics: DecisionQualityMetrics,
}

/// Raised when the trailing mean quality drops below the threshold.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QualityAlert {
    pub mean_quality: f64,
    pub threshold: f64,
    pub window_days: i64,
    pub sample_count: usize,
    pub message: String,
}

/// Mean of each metric over a window.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct MetricMeans {
    pub forcing_rate: f64,
    pub completion_accuracy: f64,
    pub consistency_score: f64,
    pub override_impact: f64,
    pub overall_quality: f64,
    pub sample_count: usize,
}

/// Read-side aggregation for display.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QualitySummary {
    pub trailing_week: MetricMeans,
    pub trailing_month: MetricMeans,
    /// Weekly minus monthly mean quality (positive = improving)
    pub trend: f64,
    pub alert: Option<QualityAlert>,
}

/// Owner of the rolling quality history.
#[derive(Debug, Clone)]
pub struct QualityMonitor {
    config: QualityConfig,
    history: VecDeque<QualityRecord>,
}

impl QualityMonitor {
    pub fn new(config: QualityConfig) -> Self {
        Self {
            config,
            history: VecDeque::new(),
        }
    }

    /// Restore from exported history.
    pub fn with_history(config: QualityConfig, history: Vec<QualityRecord>) -> Self {
        let mut history: Vec<QualityRecord> = history;
        history.sort_by_key(|r| r.recorded_at);
        Self {
            config,
            history: history.into(),
        }
    }

    pub fn history(&self) -> impl Iterator<Item = &QualityRecord> {
        self.history.iter()
    }

    /// Score a session and append it to the history.
    pub fn record(&mut self, session: &SessionRecord, now: DateTime<Utc>) -> QualityRecord {
        let record = QualityRecord {
            session_id: session.id.clone(),
            recorded_at: now,
            metrics: calculate_decision_quality(session),
        };
        tracing::debug!(
            session_id = %record.session_id,
            quality = record.metrics.overall_quality,
            "recorded decision quality"
        );
        self.history.push_back(record.clone());
        self.prune(now);
        record
    }

    /// Drop records older than the history window.
    pub fn prune(&mut self, now: DateTime<Utc>) {
        let cutoff = now - Duration::days(self.config.history_days.clamp(1, MAX_SPAN_DAYS));
        while self.history.front().is_some_and(|r| r.recorded_at < cutoff) {
            self.history.pop_front();
        }
    }

    /// Alert if the trailing-window mean is below the threshold.
    pub fn alert(&self, now: DateTime<Utc>) -> Option<QualityAlert> {
        let means = self.means(now, self.config.alert_window_days);
        if means.sample_count == 0 || means.overall_quality >= self.config.alert_threshold {
            return None;
        }
        Some(QualityAlert {
            mean_quality: means.overall_quality,
            threshold: self.config.alert_threshold,
            window_days: self.config.alert_window_days,
            sample_count: means.sample_count,
            message: format!(
                "Decision quality averaged {:.2} over the last {} days (threshold {:.2})",
                means.overall_quality, self.config.alert_window_days, self.config.alert_threshold
            ),
        })
    }

    /// Weekly and monthly aggregates plus the current alert.
    pub fn summary(&self, now: DateTime<Utc>) -> QualitySummary {
        let trailing_week = self.means(now, self.config.alert_window_days);
        let trailing_month = self.means(now, self.config.history_days);
        let trend = if trailing_week.sample_count > 0 && trailing_month.sample_count > 0 {
            trailing_week.overall_quality - trailing_month.overall_quality
        } else {
            0.0
        };
        QualitySummary {
            trailing_week,
            trailing_month,
            trend,
            alert: self.alert(now),
        }
    }

    /// Metric means over the last `days` days.
    pub fn means(&self, now: DateTime<Utc>, days: i64) -> MetricMeans {
        let cutoff = now - Duration::days(days.clamp(0, MAX_SPAN_DAYS));
        let window: Vec<&DecisionQualityMetrics> = self
            .history
            .iter()
            .filter(|r| r.recorded_at >= cutoff && r.recorded_at <= now)
            .map(|r| &r.metrics)
            .collect();

        if window.is_empty() {
            return MetricMeans::default();
        }

        let n = window.len() as f64;
        let avg = |f: fn(&DecisionQualityMetrics) -> f64| window.iter().map(|m| f(m)).sum::<f64>() / n;
        MetricMeans {
            forcing_rate: avg(|m| m.forcing_rate),
            completion_accuracy: avg(|m| m.completion_accuracy),
            consistency_score: avg(|m| m.consistency_score),
            override_impact: avg(|m| m.override_impact),
            overall_quality: avg(|m| m.overall_quality),
            sample_count: window.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::collections::BTreeSet;

    fn session(total: u32, completed: u32, forced: u32, estimated: f64) -> SessionRecord {
        SessionRecord {
            id: format!("s-{total}-{completed}-{forced}"),
            started_at: Utc.with_ymd_and_hms(2026, 4, 1, 9, 0, 0).unwrap(),
            total_tasks: total,
            completed_tasks: completed,
            forced_tasks: forced,
            forced_completed: 0,
            estimated_completion_ratio: estimated,
            completed_task_ids: BTreeSet::new(),
        }
    }

    #[test]
    fn perfect_session_scores_one() {
        let m = calculate_decision_quality(&session(10, 8, 0, 0.8));
        assert!((m.overall_quality - 1.0).abs() < 1e-9);
        assert!((m.completion_accuracy - 1.0).abs() < 1e-9);
        assert_eq!(m.consistency_score, 1.0);
    }

    #[test]
    fn heavy_forcing_takes_at_least_point_three() {
        // forcing 0.6 with perfect estimate: quality 0.7 before the multiplier.
        let m = calculate_decision_quality(&session(10, 8, 6, 0.8));
        assert!((m.forcing_rate - 0.6).abs() < 1e-9);
        assert!(m.overall_quality <= 0.7 + 1e-9);
        assert!((m.consistency_score - 0.4).abs() < 1e-9);
        assert_eq!(m.override_impact, 1.0);
    }

    #[test]
    fn moderate_forcing_takes_point_one() {
        let m = calculate_decision_quality(&session(10, 8, 3, 0.8));
        assert!((m.overall_quality - 0.9).abs() < 1e-9);
    }

    #[test]
    fn large_estimation_gap_is_penalized() {
        // estimated 0.9, actual 0.4: gap 0.5 → accuracy 0.5, quality 0.8 * 0.75
        let m = calculate_decision_quality(&session(10, 4, 0, 0.9));
        assert!((m.completion_accuracy - 0.5).abs() < 1e-9);
        assert!((m.overall_quality - 0.6).abs() < 1e-9);
    }

    #[test]
    fn empty_session_is_neutral() {
        let m = calculate_decision_quality(&session(0, 0, 0, 0.5));
        assert_eq!(m.overall_quality, 1.0);
    }

    #[test]
    fn alert_fires_on_low_weekly_mean() {
        let mut monitor = QualityMonitor::new(QualityConfig::default());
        let start = Utc.with_ymd_and_hms(2026, 4, 1, 18, 0, 0).unwrap();
        for i in 0..5 {
            monitor.record(&session(10, 1, 7, 0.9), start + Duration::days(i));
        }
        let alert = monitor.alert(start + Duration::days(5)).expect("alert");
        assert!(alert.mean_quality < 0.5);
        assert_eq!(alert.sample_count, 5);
    }

    #[test]
    fn no_alert_for_good_sessions_or_empty_history() {
        let mut monitor = QualityMonitor::new(QualityConfig::default());
        let now = Utc.with_ymd_and_hms(2026, 4, 1, 18, 0, 0).unwrap();
        assert!(monitor.alert(now).is_none());
        monitor.record(&session(10, 8, 0, 0.8), now);
        assert!(monitor.alert(now).is_none());
    }

    #[test]
    fn history_is_bounded_to_window() {
        let mut monitor = QualityMonitor::new(QualityConfig::default());
        let start = Utc.with_ymd_and_hms(2026, 1, 1, 18, 0, 0).unwrap();
        for i in 0..45 {
            monitor.record(&session(10, 8, 0, 0.8), start + Duration::days(i));
        }
        assert_eq!(monitor.history().count(), 31);
    }

    #[test]
    fn summary_reports_trend() {
        let mut monitor = QualityMonitor::new(QualityConfig::default());
        let start = Utc.with_ymd_and_hms(2026, 4, 1, 18, 0, 0).unwrap();
        for i in 0..20 {
            monitor.record(&session(10, 2, 7, 0.9), start + Duration::days(i));
        }
        for i in 20..27 {
            monitor.record(&session(10, 8, 0, 0.8), start + Duration::days(i));
        }
        let summary = monitor.summary(start + Duration::days(26));
        assert!(summary.trend > 0.0);
        assert_eq!(summary.trailing_month.sample_count, 27);
    }
}
