use clap::Subcommand;
use std::path::PathBuf;
use taskbrain_core::BehaviorSnapshot;

use super::{load_brain, now, print_json, read_json, save_brain, CliResult};

#[derive(Subcommand)]
pub enum ProtectiveAction {
    /// Print protective mode state as JSON
    Status,
    /// Feed behavior snapshots (JSON object or array) and re-evaluate
    Observe {
        /// Path to the snapshot file
        file: PathBuf,
    },
    /// Leave protective mode
    Exit {
        /// Leave before the minimum duration has elapsed
        #[arg(long)]
        force: bool,
        /// Why (recorded with a forced exit)
        #[arg(long, default_value = "user request")]
        reason: String,
    },
}

#[derive(serde::Deserialize)]
#[serde(untagged)]
enum Snapshots {
    Many(Vec<BehaviorSnapshot>),
    One(BehaviorSnapshot),
}

pub fn run(action: ProtectiveAction) -> CliResult {
    let mut brain = load_brain()?;
    let now = now()?;

    match action {
        ProtectiveAction::Status => print_json(brain.protective_state())?,
        ProtectiveAction::Observe { file } => {
            let snapshots = match read_json::<Snapshots>(&file)? {
                Snapshots::Many(all) => all,
                Snapshots::One(one) => vec![one],
            };
            let mut transitions = Vec::new();
            for snapshot in snapshots {
                transitions.push(brain.observe_behavior(snapshot, now));
            }
            save_brain(&brain)?;
            print_json(&transitions)?;
        }
        ProtectiveAction::Exit { force, reason } => {
            let kind = if force {
                brain.force_protective_exit(now, &reason)?
            } else {
                brain.acknowledge_protective_exit(now)?
            };
            save_brain(&brain)?;
            print_json(&kind)?;
        }
    }
    Ok(())
}
