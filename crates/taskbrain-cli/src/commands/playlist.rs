use clap::Args;
use std::path::PathBuf;
use taskbrain_core::{EnergyLevel, TaskRecord};

use super::{load_brain, now, print_json, read_json, save_brain, CliResult};

#[derive(Args)]
pub struct PlaylistArgs {
    /// Path to a JSON array of task records
    pub tasks: PathBuf,
    /// Current energy: low, medium, high
    #[arg(long, default_value = "medium")]
    pub energy: EnergyLevel,
    /// Print as JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

pub fn run(args: PlaylistArgs) -> CliResult {
    let tasks: Vec<TaskRecord> = read_json(&args.tasks)?;
    let mut brain = load_brain()?;
    let items = brain.playlist(&tasks, args.energy, now()?);
    save_brain(&brain)?;

    if args.json {
        return print_json(&items);
    }

    for (rank, item) in items.iter().enumerate() {
        let mut flags = Vec::new();
        if item.is_high_impact {
            flags.push("high-impact");
        }
        if item.is_keystone_habit {
            flags.push("keystone");
        }
        if !item.fits_budget {
            flags.push("over-budget");
        }
        println!(
            "{:>2}. {:<24} score={:.3} energy={:.2} impact={:.2} deadline={:.2} {}",
            rank + 1,
            item.task_id,
            item.score,
            item.factors.energy,
            item.factors.impact,
            item.factors.deadline,
            flags.join(",")
        );
    }
    Ok(())
}
