//! Subcommands and the state file they share.
//!
//! Each invocation loads `state.json` from the data directory, runs one
//! operation on the brain, and writes the state back. The last decision is
//! kept next to it so `activate` and `override` can refer to its tasks.

pub mod budget;
pub mod coach;
pub mod config;
pub mod decide;
pub mod maintain;
pub mod overrides;
pub mod playlist;
pub mod protective;
pub mod session;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use taskbrain_core::{data_dir, Brain, BrainConfig, BrainDecision, BrainState};

pub type CliResult = Result<(), Box<dyn std::error::Error>>;

const STATE_FILE: &str = "state.json";
const DECISION_FILE: &str = "last_decision.json";

fn state_path() -> Result<PathBuf, Box<dyn std::error::Error>> {
    Ok(data_dir()?.join(STATE_FILE))
}

fn decision_path() -> Result<PathBuf, Box<dyn std::error::Error>> {
    Ok(data_dir()?.join(DECISION_FILE))
}

/// Current time, or `TASKBRAIN_NOW` (RFC 3339) when set.
pub fn now() -> Result<DateTime<Utc>, Box<dyn std::error::Error>> {
    match std::env::var("TASKBRAIN_NOW") {
        Ok(raw) => Ok(DateTime::parse_from_rfc3339(&raw)
            .map_err(|e| format!("invalid TASKBRAIN_NOW '{raw}': {e}"))?
            .with_timezone(&Utc)),
        Err(_) => Ok(Utc::now()),
    }
}

/// Load the brain from the state file, or start fresh.
pub fn load_brain() -> Result<Brain, Box<dyn std::error::Error>> {
    let config = BrainConfig::load()?;
    let path = state_path()?;
    if !path.exists() {
        return Ok(Brain::new(config));
    }
    let state: BrainState = read_json(&path)?;
    Ok(Brain::from_state(config, state))
}

pub fn save_brain(brain: &Brain) -> CliResult {
    let json = serde_json::to_string_pretty(&brain.export_state())?;
    std::fs::write(state_path()?, json)?;
    Ok(())
}

pub fn load_last_decision() -> Result<BrainDecision, Box<dyn std::error::Error>> {
    let path = decision_path()?;
    if !path.exists() {
        return Err("no decision recorded yet; run `taskbrain decide` first".into());
    }
    read_json(&path)
}

pub fn save_last_decision(decision: &BrainDecision) -> CliResult {
    let json = serde_json::to_string_pretty(decision)?;
    std::fs::write(decision_path()?, json)?;
    Ok(())
}

/// Read a JSON file into `T`.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, Box<dyn std::error::Error>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("cannot read {}: {e}", path.display()))?;
    let value = serde_json::from_str(&content)
        .map_err(|e| format!("cannot parse {}: {e}", path.display()))?;
    Ok(value)
}

pub fn print_json<T: Serialize>(value: &T) -> CliResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// `taskbrain status`
pub fn status() -> CliResult {
    let brain = load_brain()?;
    print_json(&brain.status(now()?))
}
