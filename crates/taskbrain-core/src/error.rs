//! Core error types for taskbrain-core.
//!
//! Only operations that a caller can act on return errors. Degradation paths
//! (malformed budgets, advisory failures, rejected adaptations) are not errors
//! and never surface here.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for taskbrain-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Reversible override errors
    #[error("Override error: {0}")]
    Override(#[from] OverrideError),

    /// Protective mode errors
    #[error("Protective mode error: {0}")]
    Protective(#[from] ProtectiveError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Unknown dot-path key
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    /// Data directory could not be resolved or created
    #[error("Data directory unavailable: {0}")]
    DataDir(String),
}

/// Validation errors.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// Task load does not fit the remaining budget
    #[error("Task '{task_id}' needs {needed} load units but only {remaining} remain")]
    InsufficientBudget {
        task_id: String,
        needed: f64,
        remaining: f64,
    },

    /// Task is not part of the decision
    #[error("Task '{task_id}' is not part of decision {decision_id}")]
    UnknownTask { decision_id: String, task_id: String },

    /// Task was not rejected, so there is nothing to override
    #[error("Task '{0}' was not refused; activate it instead of overriding")]
    NotRefused(String),

    /// Task was refused; it can only be forced
    #[error("Task '{task_id}' was refused ({reason}); force it to proceed")]
    Refused { task_id: String, reason: String },

    /// Task was already forced under this decision
    #[error("Task '{task_id}' was already forced under decision {decision_id} (override {override_id})")]
    AlreadyCommitted {
        task_id: String,
        decision_id: String,
        override_id: String,
    },

    /// High-warning override forced without acknowledging its cost
    #[error("Forcing task '{0}' needs an explicit acknowledgment of its cost")]
    AcknowledgmentRequired(String),

    /// Invalid value
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },
}

/// Reversible override errors.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum OverrideError {
    /// No override with this id
    #[error("Override not found: {0}")]
    NotFound(String),

    /// Undo window has passed; the override is permanent
    #[error("Undo window for override {0} has closed")]
    UndoWindowClosed(String),

    /// Override was already regretted
    #[error("Override {0} was already regretted")]
    AlreadyRegretted(String),
}

/// Protective mode errors.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ProtectiveError {
    /// Exit requested while protective mode is not active
    #[error("Protective mode is not active")]
    NotActive,

    /// Acknowledged exit requested before the minimum duration
    #[error("Protective mode must stay active until {until}")]
    MinDurationNotElapsed { until: chrono::DateTime<chrono::Utc> },
}

/// Advisory step failures. Always swallowed by the coach layer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AdvisorError {
    /// Advisor cannot be reached
    #[error("Advisor unavailable: {0}")]
    Unavailable(String),

    /// Advisor ran but failed
    #[error("Advisor failed: {0}")]
    Failed(String),
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
