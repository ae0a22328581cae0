//! Deck models and per-run deck observations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::DataSource;

/// A deck known locally, created the first time any run observes it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deck {
    pub id: i64,
    pub target: DataSource,
    /// External deck reference, unique per target.
    pub url: String,
    /// Latest externally-reported update time.
    pub updated_time: DateTime<Utc>,
    /// Card list from the most recent successful decklist fetch.
    pub card_list: Option<Decklist>,
    pub cards_fetched_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// One card line of a decklist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardEntry {
    pub name: String,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
}

fn default_quantity() -> u32 {
    1
}

/// A full decklist as returned by a crawl driver.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decklist {
    pub cards: Vec<CardEntry>,
}

impl Decklist {
    /// Total number of cards, counting quantities.
    pub fn card_count(&self) -> u32 {
        self.cards.iter().map(|c| c.quantity).sum()
    }
}

/// One observation of one external deck within one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeckCrawlResult {
    pub id: i64,
    pub run_id: i64,
    pub deck_id: i64,
    pub url: String,
    /// Source's last-modified time at observation.
    pub updated_time: DateTime<Utc>,
    pub got_cards: bool,
}

/// Outcome of recording an observation in the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observation {
    pub result_id: i64,
    pub deck_id: i64,
    /// The deck was unknown locally before this observation.
    pub deck_created: bool,
    /// First observation of this URL within the run.
    pub first_in_run: bool,
}

/// Ledger counts for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSummary {
    pub observed: u64,
    pub fetched: u64,
}

impl LedgerSummary {
    pub fn pending(&self) -> u64 {
        self.observed.saturating_sub(self.fetched)
    }
}
