//! TOML-based brain configuration.
//!
//! Every tunable constant of the decision core lives here, including the
//! override undo window and the protective-mode minimum duration.
//!
//! Configuration is stored at `~/.config/taskbrain/brain.toml`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::adaptive::{MAX_STD_DEV, MIN_OBSERVATION_DAYS};
use crate::error::ConfigError;

/// Longest configurable span, in days. Keeps date arithmetic in range.
pub const MAX_SPAN_DAYS: i64 = 3_650;
pub const MAX_SPAN_HOURS: i64 = MAX_SPAN_DAYS * 24;
pub const MAX_SPAN_MINUTES: i64 = MAX_SPAN_HOURS * 60;

/// Budget & cost engine settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BudgetConfig {
    #[serde(default = "default_max_load")]
    pub default_max_load: f64,
    /// Usage ratio at which the budget locks (0.0-1.0)
    #[serde(default = "default_lock_threshold")]
    pub lock_threshold: f64,
    #[serde(default = "default_protective_cost_floor")]
    pub protective_cost_floor: f64,
    /// Share of remaining budget usable while protective mode is active
    #[serde(default = "default_protective_capacity_factor")]
    pub protective_capacity_factor: f64,
    #[serde(default = "default_protective_max_session_minutes")]
    pub protective_max_session_minutes: u32,
    #[serde(default = "default_degraded_cost_total")]
    pub degraded_cost_total: f64,
}

/// Protective-mode detector settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProtectiveConfig {
    #[serde(default = "default_window_days")]
    pub window_days: i64,
    /// Raised to 24 if configured lower.
    #[serde(default = "default_min_duration_hours")]
    pub min_duration_hours: i64,
    /// Inactivity after which protective mode may lapse on its own
    #[serde(default = "default_quiet_exit_hours")]
    pub quiet_exit_hours: i64,
    #[serde(default = "default_min_signals")]
    pub min_signals: usize,
    #[serde(default = "default_overload_ratio")]
    pub overload_ratio: f64,
    #[serde(default = "default_sleep_debt_hours")]
    pub sleep_debt_hours: f64,
    #[serde(default = "default_override_threshold")]
    pub overrides_per_day: f64,
    #[serde(default = "default_erratic_std_dev")]
    pub erratic_std_dev: f64,
    #[serde(default = "default_accumulation_growth")]
    pub accumulation_growth: u32,
}

/// Decision-quality monitor settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QualityConfig {
    #[serde(default = "default_history_days")]
    pub history_days: i64,
    #[serde(default = "default_alert_window_days")]
    pub alert_window_days: i64,
    #[serde(default = "default_alert_threshold")]
    pub alert_threshold: f64,
}

/// Adaptive-learning guard settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AdaptiveConfig {
    /// Per-day multiplicative decay
    #[serde(default = "default_forgetting_factor")]
    pub forgetting_factor: f64,
    /// Weight given to the observed value on update
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
    #[serde(default = "default_min_observation_days")]
    pub min_observation_days: i64,
    #[serde(default = "default_max_std_dev")]
    pub max_std_dev: f64,
    #[serde(default = "default_ttl_days")]
    pub ttl_days: i64,
}

/// Coach safety layer settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CoachConfig {
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_max_per_session")]
    pub max_explanations_per_session: u32,
    #[serde(default = "default_max_per_day")]
    pub max_explanations_per_day: u32,
    #[serde(default = "default_undo_window_minutes")]
    pub undo_window_minutes: i64,
    #[serde(default = "default_max_message_chars")]
    pub max_message_chars: usize,
    #[serde(default = "default_kill_minutes")]
    pub default_kill_minutes: i64,
    /// How long settled overrides are kept around for audit
    #[serde(default = "default_override_retention_days")]
    pub override_retention_days: i64,
}

/// Playlist generator settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlaylistConfig {
    #[serde(default = "default_deadline_horizon_hours")]
    pub deadline_horizon_hours: f64,
    #[serde(default = "default_high_impact_threshold")]
    pub high_impact_threshold: f64,
    #[serde(default = "default_keystone_tags")]
    pub keystone_tags: Vec<String>,
}

/// Brain configuration.
///
/// Serialized to/from TOML at `~/.config/taskbrain/brain.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct BrainConfig {
    #[serde(default)]
    pub budget: BudgetConfig,
    #[serde(default)]
    pub protective: ProtectiveConfig,
    #[serde(default)]
    pub quality: QualityConfig,
    #[serde(default)]
    pub adaptive: AdaptiveConfig,
    #[serde(default)]
    pub coach: CoachConfig,
    #[serde(default)]
    pub playlist: PlaylistConfig,
}

// Default functions
fn default_max_load() -> f64 {
    100.0
}
fn default_lock_threshold() -> f64 {
    0.95
}
fn default_protective_cost_floor() -> f64 {
    0.6
}
fn default_protective_capacity_factor() -> f64 {
    0.7
}
fn default_protective_max_session_minutes() -> u32 {
    25
}
fn default_degraded_cost_total() -> f64 {
    0.9
}
fn default_window_days() -> i64 {
    7
}
fn default_min_duration_hours() -> i64 {
    24
}
fn default_quiet_exit_hours() -> i64 {
    24
}
fn default_min_signals() -> usize {
    2
}
fn default_overload_ratio() -> f64 {
    0.9
}
fn default_sleep_debt_hours() -> f64 {
    6.0
}
fn default_override_threshold() -> f64 {
    3.0
}
fn default_erratic_std_dev() -> f64 {
    0.35
}
fn default_accumulation_growth() -> u32 {
    10
}
fn default_history_days() -> i64 {
    30
}
fn default_alert_window_days() -> i64 {
    7
}
fn default_alert_threshold() -> f64 {
    0.5
}
fn default_forgetting_factor() -> f64 {
    0.95
}
fn default_learning_rate() -> f64 {
    0.3
}
fn default_min_observation_days() -> i64 {
    30
}
fn default_max_std_dev() -> f64 {
    0.3
}
fn default_ttl_days() -> i64 {
    60
}
fn default_timeout_ms() -> u64 {
    200
}
fn default_max_per_session() -> u32 {
    3
}
fn default_max_per_day() -> u32 {
    10
}
fn default_undo_window_minutes() -> i64 {
    60
}
fn default_max_message_chars() -> usize {
    280
}
fn default_kill_minutes() -> i64 {
    24 * 60
}
fn default_override_retention_days() -> i64 {
    30
}
fn default_deadline_horizon_hours() -> f64 {
    72.0
}
fn default_high_impact_threshold() -> f64 {
    0.7
}
fn default_keystone_tags() -> Vec<String> {
    vec!["keystone".into(), "keystone-habit".into(), "keystone_habit".into()]
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            default_max_load: default_max_load(),
            lock_threshold: default_lock_threshold(),
            protective_cost_floor: default_protective_cost_floor(),
            protective_capacity_factor: default_protective_capacity_factor(),
            protective_max_session_minutes: default_protective_max_session_minutes(),
            degraded_cost_total: default_degraded_cost_total(),
        }
    }
}

impl Default for ProtectiveConfig {
    fn default() -> Self {
        Self {
            window_days: default_window_days(),
            min_duration_hours: default_min_duration_hours(),
            quiet_exit_hours: default_quiet_exit_hours(),
            min_signals: default_min_signals(),
            overload_ratio: default_overload_ratio(),
            sleep_debt_hours: default_sleep_debt_hours(),
            overrides_per_day: default_override_threshold(),
            erratic_std_dev: default_erratic_std_dev(),
            accumulation_growth: default_accumulation_growth(),
        }
    }
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            history_days: default_history_days(),
            alert_window_days: default_alert_window_days(),
            alert_threshold: default_alert_threshold(),
        }
    }
}

impl Default for AdaptiveConfig {
    fn default() -> Self {
        Self {
            forgetting_factor: default_forgetting_factor(),
            learning_rate: default_learning_rate(),
            min_observation_days: default_min_observation_days(),
            max_std_dev: default_max_std_dev(),
            ttl_days: default_ttl_days(),
        }
    }
}

impl Default for CoachConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            max_explanations_per_session: default_max_per_session(),
            max_explanations_per_day: default_max_per_day(),
            undo_window_minutes: default_undo_window_minutes(),
            max_message_chars: default_max_message_chars(),
            default_kill_minutes: default_kill_minutes(),
            override_retention_days: default_override_retention_days(),
        }
    }
}

impl Default for PlaylistConfig {
    fn default() -> Self {
        Self {
            deadline_horizon_hours: default_deadline_horizon_hours(),
            high_impact_threshold: default_high_impact_threshold(),
            keystone_tags: default_keystone_tags(),
        }
    }
}

/// Returns the taskbrain data directory, creating it if needed.
///
/// `TASKBRAIN_HOME` wins when set. Otherwise `~/.config/taskbrain[-dev]/`,
/// with the `-dev` suffix when `TASKBRAIN_ENV=dev`.
///
/// # Errors
/// Returns an error if the directory cannot be created.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let dir = match std::env::var_os("TASKBRAIN_HOME") {
        Some(home) => PathBuf::from(home),
        None => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");
            let env = std::env::var("TASKBRAIN_ENV").unwrap_or_else(|_| "production".to_string());
            if env == "dev" {
                base_dir.join("taskbrain-dev")
            } else {
                base_dir.join("taskbrain")
            }
        }
    };

    std::fs::create_dir_all(&dir).map_err(|e| ConfigError::DataDir(e.to_string()))?;
    Ok(dir)
}

impl BrainConfig {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let unknown = || ConfigError::UnknownKey(key.to_string());
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        let mut parts = key.split('.').peekable();
        if key.is_empty() {
            return Err(unknown());
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            let is_leaf = parts.peek().is_none();
            if is_leaf {
                let obj = current.as_object_mut().ok_or_else(unknown)?;
                let existing = obj.get(part).ok_or_else(unknown)?;

                let new_value = match existing {
                    serde_json::Value::Bool(_) => serde_json::Value::Bool(
                        value.parse::<bool>().map_err(|e| invalid(e.to_string()))?,
                    ),
                    serde_json::Value::Number(_) => {
                        if let Ok(n) = value.parse::<u64>() {
                            serde_json::Value::Number(n.into())
                        } else if let Ok(n) = value.parse::<f64>() {
                            serde_json::Number::from_f64(n)
                                .map(serde_json::Value::Number)
                                .ok_or_else(|| invalid(format!("cannot parse '{value}' as number")))?
                        } else {
                            return Err(invalid(format!("cannot parse '{value}' as number")));
                        }
                    }
                    serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                        serde_json::from_str(value).map_err(|e| invalid(e.to_string()))?
                    }
                    _ => serde_json::Value::String(value.into()),
                };

                obj.insert(part.to_string(), new_value);
                return Ok(());
            }

            current = current.get_mut(part).ok_or_else(unknown)?;
        }

        Err(unknown())
    }

    /// Default config file location.
    ///
    /// # Errors
    /// Returns an error if the data directory is unavailable.
    pub fn path() -> Result<PathBuf, ConfigError> {
        Ok(data_dir()?.join("brain.toml"))
    }

    /// Load from the default location, writing defaults if absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::path()?;
        if path.exists() {
            Self::load_from(&path)
        } else {
            let cfg = Self::default();
            cfg.save_to(&path)?;
            Ok(cfg)
        }
    }

    /// Load from an explicit path.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, parsed, or fails validation.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::LoadFailed {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let cfg: BrainConfig = toml::from_str(&content).map_err(|e| ConfigError::LoadFailed {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Persist to the default location.
    ///
    /// # Errors
    /// Returns an error if the config cannot be serialized or written to disk.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::path()?)
    }

    /// Persist to an explicit path.
    ///
    /// # Errors
    /// Returns an error if the config cannot be serialized or written to disk.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| save_failed(e.to_string()))?;
        Ok(())
    }

    /// Load from disk, returning default on error.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_default()
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Set a config value by key without persisting it.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown, the value cannot be parsed,
    /// or the result fails validation. `self` is untouched on error.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut json = serde_json::to_value(&*self).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        let updated: BrainConfig =
            serde_json::from_value(json).map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            })?;
        updated.validate()?;
        *self = updated;
        Ok(())
    }

    /// Check ranges that the engines rely on.
    ///
    /// # Errors
    /// Returns the first offending key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        fn check(ok: bool, key: &str, message: &str) -> Result<(), ConfigError> {
            if ok {
                Ok(())
            } else {
                Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    message: message.to_string(),
                })
            }
        }

        let unit = |v: f64| v.is_finite() && (0.0..=1.0).contains(&v);
        check(
            self.budget.default_max_load.is_finite() && self.budget.default_max_load > 0.0,
            "budget.default_max_load",
            "must be positive",
        )?;
        check(unit(self.budget.lock_threshold), "budget.lock_threshold", "must be within 0..1")?;
        check(
            unit(self.budget.protective_cost_floor),
            "budget.protective_cost_floor",
            "must be within 0..1",
        )?;
        check(
            unit(self.budget.protective_capacity_factor),
            "budget.protective_capacity_factor",
            "must be within 0..1",
        )?;
        let days = |v: i64| (1..=MAX_SPAN_DAYS).contains(&v);
        let hours = |v: i64| (0..=MAX_SPAN_HOURS).contains(&v);
        let minutes = |v: i64| (0..=MAX_SPAN_MINUTES).contains(&v);
        check(days(self.protective.window_days), "protective.window_days", "must be 1..=3650")?;
        check(
            hours(self.protective.min_duration_hours),
            "protective.min_duration_hours",
            "must be 0..=87600",
        )?;
        check(
            hours(self.protective.quiet_exit_hours),
            "protective.quiet_exit_hours",
            "must be 0..=87600",
        )?;
        check(self.protective.min_signals > 0, "protective.min_signals", "must be positive")?;
        check(days(self.quality.history_days), "quality.history_days", "must be 1..=3650")?;
        check(
            self.quality.alert_window_days > 0
                && self.quality.alert_window_days <= self.quality.history_days,
            "quality.alert_window_days",
            "must be positive and within history_days",
        )?;
        check(
            self.adaptive.forgetting_factor > 0.0 && self.adaptive.forgetting_factor <= 1.0,
            "adaptive.forgetting_factor",
            "must be within (0, 1]",
        )?;
        check(unit(self.adaptive.learning_rate), "adaptive.learning_rate", "must be within 0..1")?;
        check(
            (MIN_OBSERVATION_DAYS..=MAX_SPAN_DAYS).contains(&self.adaptive.min_observation_days),
            "adaptive.min_observation_days",
            "must be 30..=3650",
        )?;
        check(
            self.adaptive.max_std_dev > 0.0 && self.adaptive.max_std_dev <= MAX_STD_DEV,
            "adaptive.max_std_dev",
            "must be within (0, 0.3]",
        )?;
        check(days(self.adaptive.ttl_days), "adaptive.ttl_days", "must be 1..=3650")?;
        check(self.coach.timeout_ms > 0, "coach.timeout_ms", "must be positive")?;
        check(
            minutes(self.coach.undo_window_minutes),
            "coach.undo_window_minutes",
            "must be 0..=5256000",
        )?;
        check(
            minutes(self.coach.default_kill_minutes) && self.coach.default_kill_minutes > 0,
            "coach.default_kill_minutes",
            "must be 1..=5256000",
        )?;
        check(
            days(self.coach.override_retention_days),
            "coach.override_retention_days",
            "must be 1..=3650",
        )?;
        check(
            self.playlist.deadline_horizon_hours > 0.0,
            "playlist.deadline_horizon_hours",
            "must be positive",
        )?;
        Ok(())
    }
}
