//! Periodic driver of crawl runs.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tracing::{info, warn};

use super::engine::{AdvanceOutcome, CrawlEngine};
use crate::models::DataSource;

/// Counts from one scheduler tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub created: usize,
    pub advanced: usize,
    pub idle: usize,
    pub superseded: usize,
    pub failed: usize,
}

pub struct Scheduler {
    engine: Arc<CrawlEngine>,
    auto_start: Vec<DataSource>,
    interval: Duration,
}

impl Scheduler {
    pub fn new(engine: Arc<CrawlEngine>, auto_start: Vec<DataSource>, interval: Duration) -> Self {
        Self {
            engine,
            auto_start,
            interval,
        }
    }

    /// Start runs for idle targets, then advance every schedulable run once.
    pub async fn tick(&self) -> TickReport {
        let mut report = TickReport::default();
        let repo = self.engine.repository();

        for &target in &self.auto_start {
            match repo.has_open_run(target) {
                Ok(true) => {}
                Ok(false) => match self.engine.create_run(target) {
                    Ok(_) => report.created += 1,
                    Err(e) => {
                        warn!("Failed to start {} run: {}", target, e);
                        report.failed += 1;
                    }
                },
                Err(e) => {
                    warn!("Failed to check open runs for {}: {}", target, e);
                    report.failed += 1;
                }
            }
        }

        let runs = match repo.schedulable_runs() {
            Ok(runs) => runs,
            Err(e) => {
                warn!("Failed to list schedulable runs: {}", e);
                report.failed += 1;
                return report;
            }
        };

        let results = join_all(runs.iter().map(|run| self.engine.advance(run.id))).await;
        for (run, result) in runs.iter().zip(results) {
            match result {
                Ok(AdvanceOutcome::Advanced { .. }) => report.advanced += 1,
                Ok(AdvanceOutcome::Idle(_)) => report.idle += 1,
                Ok(AdvanceOutcome::Superseded) => report.superseded += 1,
                Err(e) => {
                    warn!(run_id = run.id, "Advance failed: {}", e);
                    report.failed += 1;
                }
            }
        }

        report
    }

    /// Tick on the configured interval until Ctrl-C.
    pub async fn run(&self) {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let report = self.tick().await;
                    info!(
                        created = report.created,
                        advanced = report.advanced,
                        idle = report.idle,
                        superseded = report.superseded,
                        failed = report.failed,
                        "Scheduler tick"
                    );
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Scheduler stopping");
                    break;
                }
            }
        }
    }
}
