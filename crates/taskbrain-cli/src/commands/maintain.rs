use clap::Args;
use std::time::Duration;
use taskbrain_core::{maintenance, Brain};
use tokio_util::sync::CancellationToken;

use super::{load_brain, now, print_json, save_brain, CliResult};

#[derive(Args)]
pub struct MaintainArgs {
    /// Keep the maintenance loop running for this many seconds
    #[arg(long)]
    pub watch_secs: Option<u64>,
    /// Loop period in milliseconds (with --watch-secs)
    #[arg(long, default_value_t = 60_000)]
    pub interval_ms: u64,
}

pub fn run(args: MaintainArgs) -> CliResult {
    let mut brain = load_brain()?;

    let Some(secs) = args.watch_secs else {
        let report = brain.tick(now()?);
        save_brain(&brain)?;
        return print_json(&report);
    };

    if args.interval_ms == 0 {
        return Err("--interval-ms must be positive".into());
    }

    let config = brain.config().clone();
    let shared = brain.shared();
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_time()
        .build()?;

    let state = rt.block_on(async {
        let cancel = CancellationToken::new();
        let handle = maintenance::spawn(
            shared.clone(),
            Duration::from_millis(args.interval_ms),
            cancel.clone(),
        );
        tokio::time::sleep(Duration::from_secs(secs)).await;
        cancel.cancel();
        if let Err(e) = handle.await {
            tracing::warn!(error = %e, "maintenance loop ended abnormally");
        }
        shared.lock().await.export_state()
    });

    save_brain(&Brain::from_state(config, state))?;
    println!("maintenance ran for {secs}s");
    Ok(())
}
