//! `activate`, `override`, `regret` and `outcome`.

use clap::Args;

use super::{load_brain, load_last_decision, now, print_json, save_brain, CliResult};

#[derive(Args)]
pub struct OverrideArgs {
    /// Task ID from the last decision
    pub task_id: String,
    /// Confirm the override cost (required for HIGH warnings)
    #[arg(long)]
    pub ack: bool,
}

#[derive(Args)]
pub struct OutcomeArgs {
    /// Override ID
    pub override_id: String,
    /// The forced task did not work out
    #[arg(long)]
    pub failed: bool,
}

pub fn activate(task_id: &str) -> CliResult {
    let decision = load_last_decision()?;
    let mut brain = load_brain()?;
    let receipt = brain.activate(&decision, task_id)?;
    save_brain(&brain)?;
    print_json(&receipt)
}

pub fn force(args: OverrideArgs) -> CliResult {
    let decision = load_last_decision()?;
    let mut brain = load_brain()?;
    let forced = brain.force(&decision, &args.task_id, args.ack, now()?)?;
    save_brain(&brain)?;
    print_json(&forced)
}

pub fn regret(override_id: &str) -> CliResult {
    let mut brain = load_brain()?;
    let refund = brain.regret(override_id, now()?)?;
    save_brain(&brain)?;
    print_json(&refund)
}

pub fn outcome(args: OutcomeArgs) -> CliResult {
    let mut brain = load_brain()?;
    brain.record_override_outcome(&args.override_id, !args.failed)?;
    save_brain(&brain)?;
    println!("ok");
    Ok(())
}
