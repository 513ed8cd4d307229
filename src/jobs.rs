//! Periodic background tasks: the limit-order matcher and the snapshot
//! refresher.
//!
//! Both run on the tokio runtime until [`BackgroundTasks::close`] flips the
//! shared shutdown flag.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::ExchangeError;
use crate::orders::OrderEngine;
use crate::price::{PriceOracle, SnapshotPlan};

/// Handles to the running background tasks.
pub struct BackgroundTasks {
    shutdown: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl BackgroundTasks {
    /// Starts the matcher and the snapshot refresher.
    pub fn spawn(
        engine: Arc<OrderEngine>,
        oracle: Arc<PriceOracle>,
        match_interval: Duration,
        snapshot_refresh: Duration,
    ) -> Self {
        let (shutdown, rx) = watch::channel(false);
        let handles = vec![
            spawn_matcher(engine, match_interval, rx.clone()),
            spawn_snapshot_refresher(oracle, SnapshotPlan::defaults(), snapshot_refresh, rx),
        ];
        Self { shutdown, handles }
    }

    /// Signals shutdown and waits for every task to stop.
    pub async fn close(self) {
        // Receivers only disappear once their task has exited.
        let _ = self.shutdown.send(true);
        for handle in self.handles {
            if let Err(e) = handle.await {
                warn!("Background task ended abnormally: {e}");
            }
        }
        info!("Background tasks stopped");
    }
}

/// Runs a matcher pass every `period` until shutdown.
pub fn spawn_matcher(
    engine: Arc<OrderEngine>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = ticker.tick() => match engine.run_pass().await {
                    Ok(report) if !report.executions.is_empty() || !report.failures.is_empty() => {
                        info!(
                            price = %report.price,
                            examined = report.examined,
                            executed = report.executions.len(),
                            failed = report.failures.len(),
                            "Matcher pass settled orders"
                        );
                    }
                    Ok(_) => {}
                    Err(ExchangeError::NotFound(_)) => {
                        warn!("No price available, skipping matcher pass");
                    }
                    Err(e) => warn!("Matcher pass failed: {e}"),
                },
                _ = shutdown.changed() => break,
            }
        }
        info!("Order matcher shutting down");
    })
}

/// Recomputes every snapshot in `plans` every `period` until shutdown.
pub fn spawn_snapshot_refresher(
    oracle: Arc<PriceOracle>,
    plans: Vec<SnapshotPlan>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    for plan in &plans {
                        if let Err(e) = oracle.refresh_snapshot(plan).await {
                            warn!(interval = plan.interval, "Snapshot refresh failed: {e}");
                        }
                    }
                }
                _ = shutdown.changed() => break,
            }
        }
        info!("Snapshot refresher shutting down");
    })
}
