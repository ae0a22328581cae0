//! Crawl driver contract: the network side of a crawl run.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::{DataSource, Decklist};

/// One deck reference returned by a discovery page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeckRef {
    pub url: String,
    pub updated_time: DateTime<Utc>,
}

/// One page of discovery results.
#[derive(Debug, Clone, Default)]
pub struct DeckPage {
    /// Items in the order the source enumerates them (newest first).
    pub items: Vec<DeckRef>,
    /// Locator of the following page, `None` when exhausted.
    pub next_cursor: Option<String>,
}

#[derive(Debug, Error)]
pub enum DriverError {
    /// The source could not be reached at all; retrying later may work.
    #[error("source unreachable: {0}")]
    Unreachable(String),
    /// The source answered but the request failed.
    #[error("request failed: {0}")]
    Failed(String),
    /// The cursor handed to the driver is not one it understands.
    #[error("malformed cursor '{0}'")]
    MalformedCursor(String),
}

/// Fetches deck references and decklists from an external source.
#[async_trait]
pub trait CrawlDriver: Send + Sync {
    /// Locator of the first discovery page for `target`.
    fn start_cursor(&self, target: DataSource) -> String;

    async fn list_decks(&self, target: DataSource, cursor: &str)
        -> Result<DeckPage, DriverError>;

    async fn fetch_decklist(&self, url: &str) -> Result<Decklist, DriverError>;
}
