use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Snapshot of aggregate counts over ingested decks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteStat {
    pub id: i64,
    pub created: DateTime<Utc>,
    pub deck_count: u64,
    pub decks_with_cards: u64,
}
