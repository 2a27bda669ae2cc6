//! Background worker that triggers a global pass on a fixed interval
//!
//! The first pass runs one full interval after start. A tick that lands
//! while a manual pass holds the run-lock is dropped like any other
//! conflicting trigger.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::{RunTrigger, TierOptimizer};

/// Handle to a running scheduler
#[derive(Debug)]
pub struct SchedulerHandle {
    stop: watch::Sender<bool>,
    worker: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Start the worker on the current tokio runtime
    pub fn spawn(optimizer: Arc<TierOptimizer>, interval: Duration) -> Self {
        let (stop, mut stopped) = watch::channel(false);

        let worker = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = stopped.changed() => break,
                }

                // Run detached so stopping the loop never drops a pass mid-migration
                let optimizer = Arc::clone(&optimizer);
                let pass = tokio::spawn(async move {
                    optimizer.run_pass(None, RunTrigger::Scheduled).await
                });
                match pass.await {
                    Ok(report) => tracing::debug!(
                        run_id = %report.run_id,
                        status = ?report.status,
                        "Scheduled pass finished"
                    ),
                    Err(e) => tracing::error!(error = %e, "Scheduled pass task failed"),
                }
            }

            tracing::info!("Optimizer scheduler stopped");
        });

        tracing::info!(interval_secs = interval.as_secs(), "Optimizer scheduler started");
        Self { stop, worker }
    }

    pub fn is_running(&self) -> bool {
        !self.worker.is_finished()
    }

    /// Stop the worker, waiting for a pass in progress to return
    ///
    /// Cancel the optimizer first to make that wait short.
    pub async fn shutdown(self) {
        let _ = self.stop.send(true);
        if let Err(e) = self.worker.await {
            tracing::error!(error = %e, "Optimizer scheduler task failed");
        }
    }
}
