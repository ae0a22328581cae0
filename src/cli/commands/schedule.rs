//! Scheduler command.

use std::sync::Arc;
use std::time::Duration;

use console::style;

use crate::cli::helpers::build_engine;
use crate::config::{parse_target, Settings};
use crate::crawler::Scheduler;

pub async fn cmd_schedule(
    settings: &Settings,
    once: bool,
    interval: Option<u64>,
    targets: &[String],
) -> anyhow::Result<()> {
    let engine = Arc::new(build_engine(settings)?);

    let auto_start = if targets.is_empty() {
        settings.auto_start.clone()
    } else {
        targets
            .iter()
            .map(|t| parse_target(t))
            .collect::<Result<Vec<_>, _>>()?
    };
    let interval = interval
        .map(|secs| Duration::from_secs(secs.max(1)))
        .unwrap_or_else(|| settings.scheduler_interval());

    let scheduler = Scheduler::new(engine, auto_start, interval);

    if once {
        let report = scheduler.tick().await;
        println!(
            "{} created {}, advanced {}, idle {}, superseded {}, failed {}",
            style("✓").green(),
            report.created,
            report.advanced,
            report.idle,
            report.superseded,
            report.failed
        );
        return Ok(());
    }

    println!(
        "{} Scheduling every {}s (Ctrl-C to stop)",
        style("→").cyan(),
        interval.as_secs()
    );
    scheduler.run().await;
    Ok(())
}
