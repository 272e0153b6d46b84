// src/scheduler.rs
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::TrendError;
use crate::pipeline::Pipeline;

/// Spawn the periodic refresh. The first tick fires immediately.
/// Cancelling `shutdown` stops the loop and aborts a refresh in flight.
pub fn spawn_refresh_ticker(
    pipeline: Arc<Pipeline>,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }
            match pipeline.refresh(&shutdown).await {
                Ok(ranked) => {
                    tracing::info!(target: "trends", ranked = ranked.len(), "scheduled refresh");
                }
                Err(TrendError::Cancelled) => break,
                Err(e) => {
                    tracing::error!(target: "trends", error = %e, "scheduled refresh failed");
                }
            }
        }
        tracing::info!(target: "trends", "refresh ticker stopped");
    })
}
