//! Data models for deckcrawl.

mod crawl_run;
mod data_source;
mod deck;
mod log_entry;
mod site_stat;

pub use crawl_run::{
    CrawlRun, CursorPhase, InvalidState, ResumePoint, RunState, StateCode, StateColumns,
};
pub use data_source::DataSource;
pub use deck::{CardEntry, Deck, DeckCrawlResult, Decklist, LedgerSummary, Observation};
pub use log_entry::LogEntry;
pub use site_stat::SiteStat;
