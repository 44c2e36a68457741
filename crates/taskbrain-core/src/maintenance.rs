//! Background maintenance loop.
//!
//! Periodically takes the brain lock just long enough to run
//! [`Brain::tick`](crate::Brain::tick): weight decay, adaptation expiry,
//! protective quiet-lapse, history and override pruning. It never makes or
//! alters decisions.

use chrono::Utc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::brain::SharedBrain;

/// Spawn the loop; it stops when `cancel` fires.
pub fn spawn(brain: SharedBrain, period: Duration, cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(run(brain, period, cancel))
}

/// Run the loop on the current task until `cancel` fires.
pub async fn run(brain: SharedBrain, period: Duration, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    tracing::debug!(period_ms = period.as_millis() as u64, "maintenance loop started");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::debug!("maintenance loop cancelled");
                break;
            }
            _ = interval.tick() => {
                let report = brain.lock().await.tick(Utc::now());
                if !report.adaptive.purged.is_empty() || report.overrides_pruned > 0 {
                    tracing::debug!(
                        purged = report.adaptive.purged.len(),
                        overrides_pruned = report.overrides_pruned,
                        "maintenance pass"
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brain::Brain;
    use crate::config::BrainConfig;

    #[tokio::test]
    async fn loop_stops_on_cancel() {
        let brain = Brain::new(BrainConfig::default()).shared();
        let cancel = CancellationToken::new();
        let handle = spawn(brain.clone(), Duration::from_millis(10), cancel.clone());

        tokio::time::sleep(Duration::from_millis(35)).await;
        cancel.cancel();
        let joined = tokio::time::timeout(Duration::from_secs(2), handle).await;
        assert!(joined.is_ok(), "maintenance loop did not stop");

        // Lock is free again after shutdown.
        assert!(brain.try_lock().is_ok());
    }
}
