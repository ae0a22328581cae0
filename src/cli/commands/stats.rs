//! Aggregate statistics commands.

use console::style;

use crate::cli::helpers::{format_time, open_repo};
use crate::config::Settings;
use crate::models::SiteStat;

fn print_stat(stat: &SiteStat) {
    println!("{:<20} {}", "Computed:", format_time(&stat.created));
    println!("{:<20} {}", "Decks:", stat.deck_count);
    println!("{:<20} {}", "Decks with cards:", stat.decks_with_cards);
}

pub async fn cmd_stats_update(settings: &Settings) -> anyhow::Result<()> {
    let repo = open_repo(settings)?;
    let stat = repo.recompute_stats()?;
    println!("{} Stats updated", style("✓").green());
    print_stat(&stat);
    Ok(())
}

pub async fn cmd_stats_show(settings: &Settings) -> anyhow::Result<()> {
    let repo = open_repo(settings)?;
    match repo.latest_stats()? {
        Some(stat) => print_stat(&stat),
        None => println!(
            "{} No stats yet. Run 'deckcrawl stats update'.",
            style("!").yellow()
        ),
    }
    Ok(())
}
