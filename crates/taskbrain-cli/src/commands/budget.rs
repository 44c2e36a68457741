use clap::Subcommand;

use super::{load_brain, print_json, save_brain, CliResult};

#[derive(Subcommand)]
pub enum BudgetAction {
    /// Print the current budget as JSON
    Show,
    /// Start a new planning cycle
    Reset {
        /// Max load for the new cycle (defaults to budget.default_max_load)
        #[arg(long)]
        max_load: Option<f64>,
    },
}

pub fn run(action: BudgetAction) -> CliResult {
    let mut brain = load_brain()?;
    match action {
        BudgetAction::Show => print_json(brain.budget())?,
        BudgetAction::Reset { max_load } => {
            if let Some(max) = max_load {
                if !max.is_finite() || max <= 0.0 {
                    return Err(format!("max load must be positive, got {max}").into());
                }
            }
            let budget = brain.reset_cycle(max_load);
            save_brain(&brain)?;
            print_json(&budget)?;
        }
    }
    Ok(())
}
