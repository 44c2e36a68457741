use std::path::Path;
use taskbrain_core::SessionRecord;

use super::{load_brain, now, print_json, read_json, save_brain, CliResult};

/// `taskbrain session <file>`
pub fn run(file: &Path) -> CliResult {
    let session: SessionRecord = read_json(file)?;
    let mut brain = load_brain()?;
    let outcome = brain.record_session(&session, now()?);
    save_brain(&brain)?;
    print_json(&outcome)
}

/// `taskbrain quality`
pub fn quality() -> CliResult {
    let brain = load_brain()?;
    print_json(&brain.status(now()?).quality)
}
