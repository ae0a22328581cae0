//! Crawl run repository: runs, the deck result ledger, and site stats.

mod helpers;
mod ledger;
mod runs;
mod stats;

pub use runs::{RunTransaction, RUNS_PAGINATOR};

use std::path::{Path, PathBuf};

use rusqlite::Connection;

use super::Result;

/// SQLite-backed repository for crawl runs and their ledgers.
#[derive(Debug, Clone)]
pub struct CrawlRepository {
    db_path: PathBuf,
}

impl CrawlRepository {
    /// Create a new crawl repository.
    pub fn new(db_path: &Path) -> Result<Self> {
        let repo = Self {
            db_path: db_path.to_path_buf(),
        };
        repo.init_schema()?;
        Ok(repo)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub(crate) fn connect(&self) -> Result<Connection> {
        super::connect(&self.db_path)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.connect()?;
        super::log::init_schema(&conn)?;
        conn.execute_batch(
            r#"
            -- Decks known locally, one per external reference
            CREATE TABLE IF NOT EXISTS decks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                target TEXT NOT NULL,
                url TEXT NOT NULL,
                updated_time TEXT NOT NULL,
                card_list TEXT,
                cards_fetched_at TEXT,
                created_at TEXT NOT NULL,

                UNIQUE(target, url)
            );

            -- One row per ingestion sweep
            CREATE TABLE IF NOT EXISTS crawl_runs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                crawl_start_time TEXT NOT NULL,
                search_back_to TEXT,
                target TEXT NOT NULL,
                state INTEGER NOT NULL DEFAULT 0,
                note TEXT NOT NULL DEFAULT '',
                next_fetch TEXT NOT NULL DEFAULT '',
                cursor_phase TEXT,
                log_tail INTEGER REFERENCES log_entries(id)
            );

            -- Per-run deck observations
            CREATE TABLE IF NOT EXISTS deck_crawl_results (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                url TEXT NOT NULL,
                deck_id INTEGER NOT NULL REFERENCES decks(id) ON DELETE CASCADE,
                updated_time TEXT NOT NULL,
                got_cards INTEGER NOT NULL DEFAULT 0,
                run_id INTEGER NOT NULL REFERENCES crawl_runs(id) ON DELETE CASCADE,

                UNIQUE(run_id, url)
            );

            -- Aggregate snapshots
            CREATE TABLE IF NOT EXISTS site_stats (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                created TEXT NOT NULL,
                deck_count INTEGER NOT NULL,
                decks_with_cards INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_crawl_runs_state
                ON crawl_runs(state);
            CREATE INDEX IF NOT EXISTS idx_crawl_runs_target_start
                ON crawl_runs(target, crawl_start_time);
            CREATE INDEX IF NOT EXISTS idx_deck_crawl_results_pending
                ON deck_crawl_results(run_id, got_cards, id);
            CREATE INDEX IF NOT EXISTS idx_deck_crawl_results_deck
                ON deck_crawl_results(deck_id);
        "#,
        )?;
        Ok(())
    }
}
