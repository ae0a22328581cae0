//! Crawl run orchestration and the drivers it talks to.

mod cursor;
mod driver;
mod engine;
mod error;
mod http;
mod locks;
mod recovery;
mod scheduler;

pub use cursor::{split_at_cutoff, CutoffSplit, LedgerCursor};
pub use driver::{CrawlDriver, DeckPage, DeckRef, DriverError};
pub use engine::{AdvanceOutcome, CrawlEngine};
pub use error::CrawlError;
pub use http::HttpDriver;
pub use locks::RunLocks;
pub use scheduler::{Scheduler, TickReport};
