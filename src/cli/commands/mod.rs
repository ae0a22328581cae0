//! CLI commands implementation.
//!
//! This module contains the CLI parser and dispatches to command-specific modules.

mod init;
mod logs;
mod run;
mod schedule;
mod stats;

use std::path::PathBuf;

use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};

use crate::config::{load_settings, LoadOptions};

#[derive(Parser)]
#[command(name = "deckcrawl")]
#[command(about = "Resumable decklist crawler")]
#[command(version)]
pub struct Cli {
    /// Data directory (overrides config file)
    #[arg(long, global = true, env = "DECKCRAWL_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Config file path (overrides auto-discovery)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the data directory and database
    Init,

    /// Manage crawl runs
    Run {
        #[command(subcommand)]
        command: RunCommands,
    },

    /// Browse the event log
    Logs {
        #[command(subcommand)]
        command: LogCommands,
    },

    /// Keep advancing runs on an interval until interrupted
    Schedule {
        /// Run a single tick and exit
        #[arg(long)]
        once: bool,
        /// Seconds between ticks (overrides config)
        #[arg(short, long)]
        interval: Option<u64>,
        /// Keep a run open for these targets (overrides config)
        #[arg(short, long = "target")]
        targets: Vec<String>,
    },

    /// Aggregate deck statistics
    Stats {
        #[command(subcommand)]
        command: StatsCommands,
    },
}

#[derive(Subcommand)]
enum RunCommands {
    /// Create a new run for a target
    New {
        /// Target to crawl (archidekt, moxfield)
        target: String,
        /// Crawl back to this date (YYYY-MM-DD) instead of the newest known deck
        #[arg(long, conflicts_with = "no_cutoff")]
        since: Option<NaiveDate>,
        /// Crawl to exhaustion
        #[arg(long)]
        no_cutoff: bool,
    },

    /// List runs, newest first
    List {
        #[arg(short, long, default_value = "1")]
        page: u64,
    },

    /// Show a run with its ledger counts and log
    Show {
        run_id: i64,
        /// Also list every ledger entry
        #[arg(long)]
        ledger: bool,
    },

    /// Perform units of work on a run
    Advance {
        run_id: i64,
        /// Number of units of work (0 = until the run stops)
        #[arg(short = 'n', long, default_value = "1")]
        steps: usize,
    },

    /// Clear an errored run so it resumes
    Clear { run_id: i64 },

    /// Remove the cutoff of a run that has not started
    Infinite { run_id: i64 },

    /// Cancel a run
    Cancel { run_id: i64 },

    /// Delete a run and its ledger
    Delete {
        run_id: i64,
        #[arg(long)]
        confirm: bool,
    },
}

#[derive(Subcommand)]
enum LogCommands {
    /// List chain heads, newest first
    List {
        #[arg(short, long, default_value = "1")]
        page: u64,
    },

    /// Show the chain around an entry
    Show {
        entry_id: i64,
        /// Hops to walk in each direction (overrides config)
        #[arg(long)]
        hops: Option<u32>,
    },
}

#[derive(Subcommand)]
enum StatsCommands {
    /// Recompute and store a snapshot
    Update,
    /// Show the latest snapshot
    Show,
}

fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(chrono::NaiveTime::MIN).and_utc()
}

/// Run the CLI.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let options = LoadOptions {
        config_path: cli.config,
        data_dir: cli.data_dir,
    };
    let (settings, _config) = load_settings(options).await?;

    match cli.command {
        Commands::Init => init::cmd_init(&settings).await,
        Commands::Run { command } => match command {
            RunCommands::New {
                target,
                since,
                no_cutoff,
            } => {
                let cutoff = match (since, no_cutoff) {
                    (_, true) => run::Cutoff::None,
                    (Some(date), false) => run::Cutoff::At(start_of_day(date)),
                    (None, false) => run::Cutoff::NewestKnown,
                };
                run::cmd_run_new(&settings, &target, cutoff).await
            }
            RunCommands::List { page } => run::cmd_run_list(&settings, page).await,
            RunCommands::Show { run_id, ledger } => {
                run::cmd_run_show(&settings, run_id, ledger).await
            }
            RunCommands::Advance { run_id, steps } => {
                run::cmd_run_advance(&settings, run_id, steps).await
            }
            RunCommands::Clear { run_id } => run::cmd_run_clear(&settings, run_id).await,
            RunCommands::Infinite { run_id } => run::cmd_run_infinite(&settings, run_id).await,
            RunCommands::Cancel { run_id } => run::cmd_run_cancel(&settings, run_id).await,
            RunCommands::Delete { run_id, confirm } => {
                run::cmd_run_delete(&settings, run_id, confirm).await
            }
        },
        Commands::Logs { command } => match command {
            LogCommands::List { page } => logs::cmd_logs_list(&settings, page).await,
            LogCommands::Show { entry_id, hops } => {
                logs::cmd_logs_show(&settings, entry_id, hops).await
            }
        },
        Commands::Schedule {
            once,
            interval,
            targets,
        } => schedule::cmd_schedule(&settings, once, interval, &targets).await,
        Commands::Stats { command } => match command {
            StatsCommands::Update => stats::cmd_stats_update(&settings).await,
            StatsCommands::Show => stats::cmd_stats_show(&settings).await,
        },
    }
}
