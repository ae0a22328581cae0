//! Row parsing helpers for crawl repository.

use chrono::{DateTime, Utc};
use rusqlite::types::Type;

use crate::models::{CrawlRun, DataSource, Deck, DeckCrawlResult, Decklist, RunState, SiteStat};
use crate::repository::{get_datetime, get_datetime_opt, RepositoryError};

/// Raw `crawl_runs` columns, validated by [`RunRow::into_run`].
pub struct RunRow {
    id: i64,
    start_time: DateTime<Utc>,
    search_back_to: Option<DateTime<Utc>>,
    target: String,
    state: i64,
    note: String,
    next_fetch: String,
    cursor_phase: Option<String>,
    log_tail: Option<i64>,
}

impl RunRow {
    pub fn into_run(self) -> Result<CrawlRun, RepositoryError> {
        let corrupt = |reason: String| RepositoryError::CorruptRun {
            run_id: self.id,
            reason,
        };

        let target = DataSource::from_str(&self.target)
            .ok_or_else(|| corrupt(format!("unknown target '{}'", self.target)))?;
        let state = RunState::from_columns(self.state, self.note, self.next_fetch, self.cursor_phase)
            .map_err(|e| corrupt(e.to_string()))?;

        Ok(CrawlRun {
            id: self.id,
            start_time: self.start_time,
            search_back_to: self.search_back_to,
            target,
            state,
            log_tail: self.log_tail,
        })
    }
}

/// Parse a database row into a RunRow.
pub fn row_to_run_row(row: &rusqlite::Row) -> rusqlite::Result<RunRow> {
    Ok(RunRow {
        id: row.get("id")?,
        start_time: get_datetime(row, "crawl_start_time")?,
        search_back_to: get_datetime_opt(row, "search_back_to")?,
        target: row.get("target")?,
        state: row.get("state")?,
        note: row.get("note")?,
        next_fetch: row.get("next_fetch")?,
        cursor_phase: row.get("cursor_phase")?,
        log_tail: row.get("log_tail")?,
    })
}

/// Parse a database row into a DeckCrawlResult.
pub fn row_to_crawl_result(row: &rusqlite::Row) -> rusqlite::Result<DeckCrawlResult> {
    Ok(DeckCrawlResult {
        id: row.get("id")?,
        run_id: row.get("run_id")?,
        deck_id: row.get("deck_id")?,
        url: row.get("url")?,
        updated_time: get_datetime(row, "updated_time")?,
        got_cards: row.get::<_, i32>("got_cards")? != 0,
    })
}

/// Parse a database row into a Deck.
pub fn row_to_deck(row: &rusqlite::Row) -> rusqlite::Result<Deck> {
    let target: String = row.get("target")?;
    let target = DataSource::from_str(&target).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            1,
            Type::Text,
            format!("unknown target '{target}'").into(),
        )
    })?;

    let card_list = row
        .get::<_, Option<String>>("card_list")?
        .map(|json| serde_json::from_str::<Decklist>(&json))
        .transpose()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e)))?;

    Ok(Deck {
        id: row.get("id")?,
        target,
        url: row.get("url")?,
        updated_time: get_datetime(row, "updated_time")?,
        card_list,
        cards_fetched_at: get_datetime_opt(row, "cards_fetched_at")?,
        created_at: get_datetime(row, "created_at")?,
    })
}

/// Parse a database row into a SiteStat.
pub fn row_to_site_stat(row: &rusqlite::Row) -> rusqlite::Result<SiteStat> {
    Ok(SiteStat {
        id: row.get("id")?,
        created: get_datetime(row, "created")?,
        deck_count: row.get::<_, i64>("deck_count")? as u64,
        decks_with_cards: row.get::<_, i64>("decks_with_cards")? as u64,
    })
}
