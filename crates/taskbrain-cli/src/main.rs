use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "taskbrain", version, about = "Taskbrain CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Daily load budget
    Budget {
        #[command(subcommand)]
        action: commands::budget::BudgetAction,
    },
    /// Evaluate tasks from a JSON file and record the decision
    Decide(commands::decide::DecideArgs),
    /// Commit an allowed task from the last decision
    Activate {
        /// Task ID
        task_id: String,
    },
    /// Force a refused task from the last decision
    Override(commands::overrides::OverrideArgs),
    /// Undo an override inside its undo window
    Regret {
        /// Override ID
        override_id: String,
    },
    /// Record whether a forced task worked out
    Outcome(commands::overrides::OutcomeArgs),
    /// Rank tasks from a JSON file into today's playlist
    Playlist(commands::playlist::PlaylistArgs),
    /// Record a finished session from a JSON file
    Session {
        /// Path to a session record (JSON)
        file: std::path::PathBuf,
    },
    /// Decision quality summary
    Quality,
    /// Protective mode
    Protective {
        #[command(subcommand)]
        action: commands::protective::ProtectiveAction,
    },
    /// Coach kill switch
    Coach {
        #[command(subcommand)]
        action: commands::coach::CoachAction,
    },
    /// Run maintenance (decay, expiry, pruning)
    Maintain(commands::maintain::MaintainArgs),
    /// Print the full brain status as JSON
    Status,
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Budget { action } => commands::budget::run(action),
        Commands::Decide(args) => commands::decide::run(args),
        Commands::Activate { task_id } => commands::overrides::activate(&task_id),
        Commands::Override(args) => commands::overrides::force(args),
        Commands::Regret { override_id } => commands::overrides::regret(&override_id),
        Commands::Outcome(args) => commands::overrides::outcome(args),
        Commands::Playlist(args) => commands::playlist::run(args),
        Commands::Session { file } => commands::session::run(&file),
        Commands::Quality => commands::session::quality(),
        Commands::Protective { action } => commands::protective::run(action),
        Commands::Coach { action } => commands::coach::run(action),
        Commands::Maintain(args) => commands::maintain::run(args),
        Commands::Status => commands::status(),
        Commands::Config { action } => commands::config::run(action),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
