use crate::services::sync::SyncEngine;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{MissedTickBehavior, interval};

/// Perpetual background task that runs one sync cycle per interval.
///
/// Cycle errors are logged and swallowed; nothing that happens inside a
/// cycle may terminate the schedule. Overlap with manual triggers is
/// impossible because the engine serializes cycles internally.
pub struct BackgroundWorker {
    engine: Arc<SyncEngine>,
    period: Duration,
    shutdown: watch::Receiver<bool>,
}

impl BackgroundWorker {
    pub fn new(engine: Arc<SyncEngine>, period: Duration, shutdown: watch::Receiver<bool>) -> Self {
        Self {
            engine,
            period,
            shutdown,
        }
    }

    pub async fn run(mut self) {
        tracing::info!("🚀 Sync worker started (every {:?})", self.period);

        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; the first real cycle should
        // wait a full period.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = self.shutdown.changed() => {
                    tracing::info!("🛑 Sync worker shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    match self.engine.run_cycle().await {
                        Ok(outcome) if outcome.total == 0 => {
                            tracing::debug!("no images to push");
                        }
                        Ok(outcome) => {
                            tracing::info!(
                                total = outcome.total,
                                succeeded = outcome.succeeded,
                                failed = outcome.failed.len(),
                                "sync cycle finished"
                            );
                        }
                        Err(e) => {
                            tracing::error!("sync cycle aborted: {e}");
                        }
                    }
                }
            }
        }
    }
}
