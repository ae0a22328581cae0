//! Crawl run commands.

use chrono::{DateTime, Utc};
use console::style;

use crate::cli::helpers::{
    build_engine, format_cutoff, format_time, open_logs, open_repo, print_page_footer,
    styled_state,
};
use crate::config::{parse_target, Settings};
use crate::crawler::AdvanceOutcome;
use crate::models::CrawlRun;

/// How a new run picks its discovery cutoff.
pub enum Cutoff {
    /// Newest deck update already ingested for the target.
    NewestKnown,
    At(DateTime<Utc>),
    None,
}

fn require_run(run: Option<CrawlRun>, run_id: i64) -> anyhow::Result<CrawlRun> {
    run.ok_or_else(|| anyhow::anyhow!("Run {} not found", run_id))
}

pub async fn cmd_run_new(settings: &Settings, target: &str, cutoff: Cutoff) -> anyhow::Result<()> {
    let target = parse_target(target)?;
    let repo = open_repo(settings)?;

    let run = match cutoff {
        Cutoff::NewestKnown => repo.create_run(target, Utc::now())?,
        Cutoff::At(at) => repo.create_run_with_cutoff(target, Utc::now(), Some(at))?,
        Cutoff::None => repo.create_run_with_cutoff(target, Utc::now(), None)?,
    };

    println!("{} Created {}", style("✓").green(), run);
    println!(
        "  {:<16} {}",
        "Searching back:",
        format_cutoff(run.search_back_to.as_ref())
    );
    Ok(())
}

pub async fn cmd_run_list(settings: &Settings, page: u64) -> anyhow::Result<()> {
    let repo = open_repo(settings)?;
    let runs = repo.list_runs(page)?;

    if runs.items.is_empty() {
        println!("{} No runs yet", style("!").yellow());
        return Ok(());
    }

    println!(
        "{:>6}  {:<10}  {:<17}  {:<24}  {}",
        style("ID").bold(),
        style("Target").bold(),
        style("Started").bold(),
        style("State").bold(),
        style("Ledger").bold()
    );
    for run in &runs.items {
        let summary = repo.ledger_summary(run.id)?;
        println!(
            "{:>6}  {:<10}  {:<17}  {:<24}  {}/{}",
            run.id,
            run.target.as_str(),
            run.start_time.format("%Y-%m-%d %H:%M"),
            styled_state(&run.state),
            summary.fetched,
            summary.observed
        );
    }

    print_page_footer(&runs, "deckcrawl run list");
    Ok(())
}

pub async fn cmd_run_show(settings: &Settings, run_id: i64, ledger: bool) -> anyhow::Result<()> {
    let repo = open_repo(settings)?;
    let run = require_run(repo.get_run(run_id)?, run_id)?;
    let summary = repo.ledger_summary(run_id)?;

    println!("\n{}", style(run.to_string()).bold());
    println!("{}", "-".repeat(40));
    println!("{:<16} {}", "State:", styled_state(&run.state));
    if let Some(note) = run.state.note() {
        println!("{:<16} {}", "Note:", style(note).red());
    }
    if let Some(resume) = run.state.resume_point() {
        println!(
            "{:<16} {} ({})",
            "Cursor:",
            resume.next_fetch,
            resume.phase.as_str()
        );
    }
    println!(
        "{:<16} {}",
        "Searching back:",
        format_cutoff(run.search_back_to.as_ref())
    );
    println!("{:<16} {}", "Decks observed:", summary.observed);
    println!("{:<16} {}", "Decklists:", summary.fetched);
    println!("{:<16} {}", "Pending:", summary.pending());

    let mut controls = Vec::new();
    if run.state.note().is_some() {
        controls.push("clear");
    }
    if run.allows_search_infinite() {
        controls.push("infinite");
    }
    if run.can_cancel() {
        controls.push("cancel");
    }
    if !controls.is_empty() {
        let hints: Vec<String> = controls
            .iter()
            .map(|c| format!("deckcrawl run {c} {run_id}"))
            .collect();
        println!("{:<16} {}", "Controls:", style(hints.join(", ")).dim());
    }

    if ledger {
        println!("\n{}", style("Ledger").bold());
        for result in repo.results_for_run(run_id)? {
            let mark = if result.got_cards {
                style("✓").green()
            } else {
                style("·").dim()
            };
            let cards = match repo.get_deck(result.deck_id)?.and_then(|d| d.card_list) {
                Some(list) if result.got_cards => format!("{:>4} cards", list.card_count()),
                _ => " ".repeat(10),
            };
            println!(
                "  {} {:>6}  {}  {}  {}",
                mark,
                result.id,
                format_time(&result.updated_time),
                cards,
                result.url
            );
        }
    }

    if let Some(tail) = run.log_tail {
        let logs = open_logs(settings)?;
        println!("\n{}", style("Log").bold());
        for entry in logs.read_chain(tail, settings.log_max_hops)? {
            println!(
                "  {}  {}",
                style(format_time(&entry.created)).dim(),
                entry.message
            );
        }
    }

    Ok(())
}

pub async fn cmd_run_advance(settings: &Settings, run_id: i64, steps: usize) -> anyhow::Result<()> {
    let engine = build_engine(settings)?;
    let mut performed = 0;

    loop {
        match engine.advance(run_id).await? {
            AdvanceOutcome::Advanced { from, to } => {
                performed += 1;
                if from != to {
                    println!("  {} {} -> {}", style("→").cyan(), from, to);
                }
            }
            AdvanceOutcome::Idle(state) => {
                println!("{} Run {} is {}", style("!").yellow(), run_id, state);
                break;
            }
            AdvanceOutcome::Superseded => {
                println!(
                    "{} Run {} changed while working; nothing was written",
                    style("!").yellow(),
                    run_id
                );
                break;
            }
        }
        if steps != 0 && performed >= steps {
            break;
        }
    }

    let run = require_run(engine.repository().get_run(run_id)?, run_id)?;
    println!(
        "{} {} unit(s) of work; run {} is {}",
        style("✓").green(),
        performed,
        run_id,
        styled_state(&run.state)
    );
    Ok(())
}

pub async fn cmd_run_clear(settings: &Settings, run_id: i64) -> anyhow::Result<()> {
    let engine = build_engine(settings)?;
    let run = engine.clear_error(run_id)?;
    println!(
        "{} Cleared error; run {} is {}",
        style("✓").green(),
        run_id,
        styled_state(&run.state)
    );
    Ok(())
}

pub async fn cmd_run_infinite(settings: &Settings, run_id: i64) -> anyhow::Result<()> {
    let engine = build_engine(settings)?;
    engine.remove_cutoff(run_id)?;
    println!(
        "{} Run {} will crawl to exhaustion",
        style("✓").green(),
        run_id
    );
    Ok(())
}

pub async fn cmd_run_cancel(settings: &Settings, run_id: i64) -> anyhow::Result<()> {
    let engine = build_engine(settings)?;
    engine.cancel(run_id)?;
    println!("{} Cancelled run {}", style("✓").green(), run_id);
    Ok(())
}

pub async fn cmd_run_delete(settings: &Settings, run_id: i64, confirm: bool) -> anyhow::Result<()> {
    let repo = open_repo(settings)?;
    let run = require_run(repo.get_run(run_id)?, run_id)?;

    if !confirm {
        let summary = repo.ledger_summary(run_id)?;
        println!(
            "{} This will delete {} and its {} ledger entries.",
            style("!").yellow(),
            run,
            summary.observed
        );
        println!("  Use --confirm to proceed.");
        return Ok(());
    }

    repo.delete_run(run_id)?;
    println!("{} Deleted {}", style("✓").green(), run);
    Ok(())
}
