//! Scheduler module for running monitoring cycles.
//!
//! A `Scheduler` ticks on a fixed interval and hands each tick to the
//! `CycleRunner`, which checks the due targets through the bounded
//! `Dispatcher` and folds results with the `aggregate` functions.

pub mod aggregate;
mod check;
mod cycle;
mod dispatcher;

pub use check::*;
pub use cycle::*;
pub use dispatcher::*;

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Periodic trigger for monitoring cycles.
pub struct Scheduler {
    runner: Arc<CycleRunner>,
    interval: Duration,
    stop_tx: broadcast::Sender<()>,
}

impl Scheduler {
    pub fn new(runner: Arc<CycleRunner>, interval: Duration) -> Self {
        let (stop_tx, _) = broadcast::channel(1);
        Self {
            runner,
            interval,
            stop_tx,
        }
    }

    /// Start the tick loop. The first cycle runs immediately.
    ///
    /// Cycles never overlap: a tick that arrives while a cycle is still
    /// running is skipped.
    pub fn start(&self) -> JoinHandle<()> {
        let runner = self.runner.clone();
        let period = self.interval;
        let mut stop_rx = self.stop_tx.subscribe();

        tracing::info!("Scheduler: Starting with a {:?} cycle interval", period);

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = stop_rx.recv() => break,
                    _ = interval.tick() => {
                        // Failures are already logged by the runner; the next tick retries.
                        let _ = runner.run_cycle().await;
                    }
                }
            }

            tracing::info!("Scheduler: Stopped");
        })
    }

    /// Stop the tick loop once the current cycle, if any, finishes.
    pub fn stop(&self) {
        let _ = self.stop_tx.send(());
    }
}
