//! Shared helper functions for CLI commands.

use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Utc};
use console::style;

use crate::config::Settings;
use crate::crawler::{CrawlEngine, HttpDriver};
use crate::models::{RunState, StateCode};
use crate::repository::{CrawlRepository, LogRepository, Page};

/// Open the crawl repository, requiring an initialized database.
pub fn open_repo(settings: &Settings) -> anyhow::Result<CrawlRepository> {
    if !settings.database_exists() {
        anyhow::bail!(
            "No database at {}. Run 'deckcrawl init' first.",
            settings.database_path().display()
        );
    }
    Ok(CrawlRepository::new(&settings.database_path())?)
}

pub fn open_logs(settings: &Settings) -> anyhow::Result<LogRepository> {
    open_repo(settings)?;
    Ok(LogRepository::new(&settings.database_path())?)
}

/// Build an engine backed by the HTTP driver.
pub fn build_engine(settings: &Settings) -> anyhow::Result<CrawlEngine> {
    let repo = open_repo(settings)?;
    let driver = HttpDriver::new(
        settings.endpoints.clone(),
        settings.user_agent.as_deref(),
        settings.request_timeout(),
        settings.request_delay(),
    )
    .context("Failed to create HTTP client")?;
    Ok(CrawlEngine::new(repo, Arc::new(driver)))
}

/// State name colored by how much attention it needs.
pub fn styled_state(state: &RunState) -> String {
    let name = state.code().as_str();
    match state.code() {
        StateCode::Complete => style(name).green().to_string(),
        StateCode::Error => style(name).red().bold().to_string(),
        StateCode::Cancelled => style(name).dim().to_string(),
        StateCode::NotStarted => style(name).cyan().to_string(),
        _ => style(name).yellow().to_string(),
    }
}

pub fn format_time(time: &DateTime<Utc>) -> String {
    time.format("%Y-%m-%d %H:%M:%S").to_string()
}

pub fn format_cutoff(cutoff: Option<&DateTime<Utc>>) -> String {
    cutoff
        .map(format_time)
        .unwrap_or_else(|| "none (crawl to exhaustion)".to_string())
}

/// "Page 1 of 3" footer with a hint for the next page.
pub fn print_page_footer<T>(page: &Page<T>, command: &str) {
    println!();
    print!(
        "{}",
        style(format!(
            "Page {} of {} ({} total)",
            page.number, page.num_pages, page.total
        ))
        .dim()
    );
    if page.has_previous() {
        print!(
            "{}",
            style(format!("  prev: {} --page {}", command, page.number - 1)).dim()
        );
    }
    if page.has_next() {
        print!(
            "{}",
            style(format!("  next: {} --page {}", command, page.number + 1)).dim()
        );
    }
    println!();
}
