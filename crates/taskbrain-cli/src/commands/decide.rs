use clap::Args;
use serde::Serialize;
use std::path::PathBuf;
use taskbrain_core::{BrainDecision, CoachNote, EnergyLevel, SchedulingRequest, TaskRecord, TemplateAdvisor};
use tokio_util::sync::CancellationToken;

use super::{load_brain, now, print_json, read_json, save_brain, save_last_decision, CliResult};

#[derive(Args)]
pub struct DecideArgs {
    /// Path to a JSON array of task records
    pub tasks: PathBuf,
    /// Current energy: low, medium, high
    #[arg(long, default_value = "medium")]
    pub energy: EnergyLevel,
    /// Session the request belongs to
    #[arg(long, default_value = "cli")]
    pub session: String,
    /// Minutes left today
    #[arg(long)]
    pub minutes: Option<u32>,
    /// Ask the built-in coach for a note
    #[arg(long)]
    pub coach: bool,
}

#[derive(Serialize)]
struct DecideOutput<'a> {
    decision: &'a BrainDecision,
    note: Option<CoachNote>,
}

pub fn run(args: DecideArgs) -> CliResult {
    let tasks: Vec<TaskRecord> = read_json(&args.tasks)?;
    let now = now()?;
    let mut brain = load_brain()?;

    let request = SchedulingRequest {
        session_id: args.session,
        tasks,
        energy: args.energy,
        available_minutes: args.minutes,
    };
    let decision = brain.decide(&request, now);

    let note = if args.coach {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()?;
        let cancel = CancellationToken::new();
        runtime.block_on(brain.annotate(&decision, &TemplateAdvisor, &cancel, now))
    } else {
        None
    };

    save_brain(&brain)?;
    save_last_decision(&decision)?;
    print_json(&DecideOutput {
        decision: &decision,
        note,
    })
}
