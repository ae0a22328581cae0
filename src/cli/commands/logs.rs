//! Event log commands.

use console::style;

use crate::cli::helpers::{format_time, open_logs, print_page_footer};
use crate::config::Settings;

pub async fn cmd_logs_list(settings: &Settings, page: u64) -> anyhow::Result<()> {
    let logs = open_logs(settings)?;
    let heads = logs.chain_heads(page)?;

    if heads.items.is_empty() {
        println!("{} No log entries yet", style("!").yellow());
        return Ok(());
    }

    for entry in &heads.items {
        println!(
            "{:>6}  {}  {}",
            entry.id,
            style(format_time(&entry.created)).dim(),
            entry.message
        );
    }

    print_page_footer(&heads, "deckcrawl logs list");
    Ok(())
}

pub async fn cmd_logs_show(
    settings: &Settings,
    entry_id: i64,
    hops: Option<u32>,
) -> anyhow::Result<()> {
    let logs = open_logs(settings)?;
    let hops = hops.unwrap_or(settings.log_max_hops);
    let chain = logs.read_chain(entry_id, hops)?;

    if chain.first().is_some_and(|entry| !entry.is_head()) {
        println!(
            "{}",
            style(format!("(earlier entries beyond {hops} hops not shown)")).dim()
        );
    }
    for entry in &chain {
        let line = format!(
            "{:>6}  {}  {}",
            entry.id,
            format_time(&entry.created),
            entry.message
        );
        if entry.id == entry_id {
            println!("{}", style(line).bold());
        } else {
            println!("{}", line);
        }
    }
    Ok(())
}
