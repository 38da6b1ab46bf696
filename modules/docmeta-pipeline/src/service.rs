use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use crate::batch::{BatchOrchestrator, BatchOutcome};

/// Start a batch every `interval` until `shutdown` resolves.
///
/// Each tick spawns its own run, so a slow batch can still be in flight when
/// the next tick fires; the orchestrator's guard turns that tick into a skip.
/// On shutdown, runs already started are awaited.
pub async fn run_service(
    orchestrator: Arc<BatchOrchestrator>,
    interval: Duration,
    only_new: bool,
    shutdown: impl Future<Output = ()>,
) -> Result<()> {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut runs = JoinSet::new();
    tokio::pin!(shutdown);

    info!(interval_secs = interval.as_secs(), only_new, "Service started");

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = ticker.tick() => {
                while runs.try_join_next().is_some() {}
                let orchestrator = orchestrator.clone();
                runs.spawn(async move {
                    match orchestrator.run_batch(only_new).await {
                        Ok(BatchOutcome::Completed(stats)) => info!("Scheduled batch finished. {stats}"),
                        Ok(BatchOutcome::Skipped) => {}
                        Err(e) => error!(error = %e, "Scheduled batch failed"),
                    }
                });
            }
        }
    }

    info!(in_flight = runs.len(), "Shutdown requested, waiting for running batches");
    while let Some(joined) = runs.join_next().await {
        if let Err(e) = joined {
            error!(error = %e, "Batch task aborted");
        }
    }
    info!("Service stopped");
    Ok(())
}
