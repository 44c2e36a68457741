use chrono::Duration;
use clap::Subcommand;
use serde::Serialize;

use super::{load_brain, now, print_json, save_brain, CliResult};

#[derive(Subcommand)]
pub enum CoachAction {
    /// Disable the coach for a while
    Kill {
        /// Minutes to stay disabled (defaults to coach.default_kill_minutes)
        #[arg(long)]
        minutes: Option<i64>,
        /// Why
        #[arg(long, default_value = "manual")]
        reason: String,
    },
    /// Re-enable the coach
    Revive,
    /// Print kill switch and explanation budget
    Status {
        /// Session to report the remaining explanations for
        #[arg(long, default_value = "cli")]
        session: String,
    },
}

#[derive(Serialize)]
struct CoachStatus<'a> {
    disabled: bool,
    kill_switch: &'a taskbrain_core::CoachKillSwitch,
    explanations_remaining: u32,
}

pub fn run(action: CoachAction) -> CliResult {
    let mut brain = load_brain()?;
    let now = now()?;

    match action {
        CoachAction::Kill { minutes, reason } => {
            let duration = match minutes {
                Some(m) if m > 0 => Some(
                    Duration::try_minutes(m).ok_or_else(|| format!("minutes out of range: {m}"))?,
                ),
                Some(m) => return Err(format!("minutes must be positive, got {m}").into()),
                None => None,
            };
            brain.disable_coach(now, duration, &reason)?;
            save_brain(&brain)?;
            println!("coach disabled");
        }
        CoachAction::Revive => {
            brain.enable_coach();
            save_brain(&brain)?;
            println!("coach enabled");
        }
        CoachAction::Status { session } => {
            let coach = brain.coach();
            print_json(&CoachStatus {
                disabled: coach.kill_switch().is_active(now),
                kill_switch: coach.kill_switch(),
                explanations_remaining: coach.remaining_explanations(&session, now),
            })?;
        }
    }
    Ok(())
}
