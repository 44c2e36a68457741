//! # Taskbrain Core Library
//!
//! The adaptive task-governance core. It decides how many and which tasks a
//! user may schedule, prices overriding that decision, detects burnout-like
//! behavior, scores its own decisions after the fact, and adapts its weights
//! over time without chasing noise. It also ranks the day's tasks into a
//! playlist.
//!
//! The core persists nothing and renders nothing: it consumes typed records
//! and emits typed, serializable decisions. The `taskbrain` CLI is a thin
//! front end over the same library.
//!
//! ## Architecture
//!
//! - **Budget & Cost Engine** ([`budget`]): fit checks and override pricing;
//!   the [`BudgetLedger`] is the only writer of the [`DailyBudget`]
//! - **Protective mode** ([`protective`]): burnout detection with a
//!   minimum-duration lock-in
//! - **Decision quality** ([`quality`]): per-session scoring and alerts
//! - **Adaptive weights** ([`adaptive`]): decayed weights behind an
//!   overfitting guard
//! - **Versioning** ([`versioning`]): reproducibility stamps
//! - **Coach** ([`coach`]): bounded advisory notes, kill switch, reversible
//!   overrides
//! - **Playlist** ([`playlist`]): daily ranking
//! - **Brain** ([`brain`]): facade owning one of each stateful component
//! - **Maintenance** ([`maintenance`]): periodic `tick` loop

pub mod adaptive;
pub mod brain;
pub mod budget;
pub mod coach;
pub mod config;
pub mod error;
pub mod maintenance;
pub mod playlist;
pub mod protective;
pub mod quality;
pub mod records;
pub mod versioning;

pub use adaptive::{AdaptationVerdict, AdaptiveWeight, OverfittingGuard, RejectionReason};
pub use brain::{
    Brain, BrainDecision, BrainState, BrainStatus, DecisionMode, ForcedTask, MaintenanceReport,
    SchedulingRequest, SessionOutcome, SharedBrain,
};
pub use budget::{
    BudgetLedger, CostEngine, CostType, DailyBudget, Evaluation, EvaluationContext,
    OverrideConsequences, OverrideCost, RefusalReason, WarningLevel,
};
pub use coach::{
    AdviceRequest, Advisor, CoachKillSwitch, CoachNote, CoachSafetyLayer, ReversibleOverride,
    TemplateAdvisor,
};
pub use config::{data_dir, BrainConfig};
pub use error::{
    AdvisorError, ConfigError, CoreError, OverrideError, ProtectiveError, ValidationError,
};
pub use playlist::{PlaylistFactors, PlaylistGenerator, PlaylistItem, PlaylistWeights};
pub use protective::{BurnoutSignal, ExitKind, ProtectiveModeDetector, ProtectiveModeState};
pub use quality::{calculate_decision_quality, DecisionQualityMetrics, QualityAlert, QualityMonitor};
pub use records::{BehaviorSnapshot, EnergyLevel, Priority, SessionRecord, TaskRecord};
pub use versioning::{DecisionStamp, ReproducibilityReport, BRAIN_VERSION};
