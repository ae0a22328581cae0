//! Deck result ledger: per-run observations of external decks.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::helpers::{row_to_crawl_result, row_to_deck};
use super::runs::load_run;
use super::CrawlRepository;
use crate::models::{
    CrawlRun, DataSource, Deck, DeckCrawlResult, Decklist, LedgerSummary, Observation,
};
use crate::repository::{format_datetime, get_datetime_opt, immediate, RepositoryError, Result};

/// Newest update time among decks whose decklist an earlier run fetched.
pub(crate) fn newest_known_update(
    conn: &Connection,
    target: DataSource,
) -> Result<Option<DateTime<Utc>>> {
    let newest = conn.query_row(
        r#"
        SELECT MAX(r.updated_time) AS newest
        FROM deck_crawl_results r
        JOIN crawl_runs c ON c.id = r.run_id
        WHERE c.target = ?1 AND r.got_cards = 1
        "#,
        params![target.as_str()],
        |row| get_datetime_opt(row, "newest"),
    )?;
    Ok(newest)
}

/// Record that `run` saw `url` with the given update time.
///
/// Idempotent per `(run, url)`: a repeat observation only refreshes the
/// update time of the existing entry.
pub(crate) fn record_observation(
    conn: &Connection,
    run: &CrawlRun,
    url: &str,
    updated_time: DateTime<Utc>,
) -> Result<Observation> {
    let updated = format_datetime(&updated_time);

    let deck_id: Option<i64> = conn
        .query_row(
            "SELECT id FROM decks WHERE target = ?1 AND url = ?2",
            params![run.target.as_str(), url],
            |row| row.get(0),
        )
        .optional()?;

    let (deck_id, deck_created) = match deck_id {
        Some(id) => {
            // Fixed-width timestamps, so the text maximum is the newest.
            conn.execute(
                "UPDATE decks SET updated_time = MAX(updated_time, ?1) WHERE id = ?2",
                params![updated, id],
            )?;
            (id, false)
        }
        None => {
            conn.execute(
                r#"
                INSERT INTO decks (target, url, updated_time, created_at)
                VALUES (?1, ?2, ?3, ?4)
                "#,
                params![
                    run.target.as_str(),
                    url,
                    updated,
                    format_datetime(&Utc::now())
                ],
            )?;
            (conn.last_insert_rowid(), true)
        }
    };

    let result_id: Option<i64> = conn
        .query_row(
            "SELECT id FROM deck_crawl_results WHERE run_id = ?1 AND url = ?2",
            params![run.id, url],
            |row| row.get(0),
        )
        .optional()?;

    let (result_id, first_in_run) = match result_id {
        Some(id) => {
            conn.execute(
                "UPDATE deck_crawl_results SET updated_time = ?1 WHERE id = ?2",
                params![updated, id],
            )?;
            (id, false)
        }
        None => {
            conn.execute(
                r#"
                INSERT INTO deck_crawl_results (url, deck_id, updated_time, got_cards, run_id)
                VALUES (?1, ?2, ?3, 0, ?4)
                "#,
                params![url, deck_id, updated, run.id],
            )?;
            (conn.last_insert_rowid(), true)
        }
    };

    Ok(Observation {
        result_id,
        deck_id,
        deck_created,
        first_in_run,
    })
}

/// Flag a ledger entry as fetched and store the card list on its deck.
///
/// Returns `false` when the entry was already fetched; nothing is written then.
pub(crate) fn mark_fetched(conn: &Connection, result_id: i64, decklist: &Decklist) -> Result<bool> {
    let deck_id: i64 = conn.query_row(
        "SELECT deck_id FROM deck_crawl_results WHERE id = ?",
        params![result_id],
        |row| row.get(0),
    )?;

    let flipped = conn.execute(
        "UPDATE deck_crawl_results SET got_cards = 1 WHERE id = ? AND got_cards = 0",
        params![result_id],
    )?;
    if flipped == 0 {
        return Ok(false);
    }

    conn.execute(
        "UPDATE decks SET card_list = ?1, cards_fetched_at = ?2 WHERE id = ?3",
        params![
            serde_json::to_string(decklist)?,
            format_datetime(&Utc::now()),
            deck_id
        ],
    )?;
    Ok(true)
}

/// Lowest-id unfetched entry of `run_id` after `after_id`.
pub(crate) fn next_pending(
    conn: &Connection,
    run_id: i64,
    after_id: i64,
) -> Result<Option<DeckCrawlResult>> {
    let result = conn
        .query_row(
            r#"
            SELECT * FROM deck_crawl_results
            WHERE run_id = ?1 AND id > ?2 AND got_cards = 0
            ORDER BY id
            LIMIT 1
            "#,
            params![run_id, after_id],
            row_to_crawl_result,
        )
        .optional()?;
    Ok(result)
}

impl CrawlRepository {
    /// Record an observation outside an orchestrated unit of work.
    pub fn record_observation(
        &self,
        run_id: i64,
        url: &str,
        updated_time: DateTime<Utc>,
    ) -> Result<Observation> {
        let conn = self.connect()?;
        immediate(&conn, |conn| {
            let run = load_run(conn, run_id)?
                .ok_or(RepositoryError::Database(rusqlite::Error::QueryReturnedNoRows))?;
            record_observation(conn, &run, url, updated_time)
        })
    }

    pub fn mark_fetched(&self, result_id: i64, decklist: &Decklist) -> Result<bool> {
        let conn = self.connect()?;
        immediate(&conn, |conn| mark_fetched(conn, result_id, decklist))
    }

    pub fn next_pending(&self, run_id: i64, after_id: i64) -> Result<Option<DeckCrawlResult>> {
        next_pending(&self.connect()?, run_id, after_id)
    }

    /// The cutoff a new run for `target` would start with.
    pub fn newest_known_update(&self, target: DataSource) -> Result<Option<DateTime<Utc>>> {
        newest_known_update(&self.connect()?, target)
    }

    /// All ledger entries of a run in observation order.
    pub fn results_for_run(&self, run_id: i64) -> Result<Vec<DeckCrawlResult>> {
        let conn = self.connect()?;
        let mut stmt =
            conn.prepare("SELECT * FROM deck_crawl_results WHERE run_id = ? ORDER BY id")?;
        let results = stmt
            .query_map(params![run_id], row_to_crawl_result)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(results)
    }

    pub fn ledger_summary(&self, run_id: i64) -> Result<LedgerSummary> {
        let conn = self.connect()?;
        let (observed, fetched): (i64, i64) = conn.query_row(
            r#"
            SELECT COUNT(*), COALESCE(SUM(got_cards), 0)
            FROM deck_crawl_results
            WHERE run_id = ?
            "#,
            params![run_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok(LedgerSummary {
            observed: observed as u64,
            fetched: fetched as u64,
        })
    }

    pub fn get_deck(&self, deck_id: i64) -> Result<Option<Deck>> {
        let conn = self.connect()?;
        let deck = conn
            .query_row(
                "SELECT * FROM decks WHERE id = ?",
                params![deck_id],
                row_to_deck,
            )
            .optional()?;
        Ok(deck)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CardEntry;
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn setup() -> (CrawlRepository, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let repo = CrawlRepository::new(&dir.path().join("test.db")).unwrap();
        (repo, dir)
    }

    fn decklist() -> Decklist {
        Decklist {
            cards: vec![
                CardEntry {
                    name: "Sol Ring".to_string(),
                    quantity: 1,
                },
                CardEntry {
                    name: "Island".to_string(),
                    quantity: 30,
                },
            ],
        }
    }

    #[test]
    fn test_record_observation_is_idempotent_per_run() {
        let (repo, _dir) = setup();
        let run = repo.create_run(DataSource::Archidekt, Utc::now()).unwrap();
        let first_seen = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let seen_again = Utc.with_ymd_and_hms(2024, 3, 2, 0, 0, 0).unwrap();

        let first = repo
            .record_observation(run.id, "https://decks.test/a", first_seen)
            .unwrap();
        let second = repo
            .record_observation(run.id, "https://decks.test/a", seen_again)
            .unwrap();

        assert!(first.deck_created && first.first_in_run);
        assert!(!second.deck_created && !second.first_in_run);
        assert_eq!(first.result_id, second.result_id);

        let results = repo.results_for_run(run.id).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].updated_time, seen_again);
    }

    #[test]
    fn test_known_deck_is_not_new_in_later_run() {
        let (repo, _dir) = setup();
        let url = "https://decks.test/a";
        let first = repo.create_run(DataSource::Archidekt, Utc::now()).unwrap();
        let second = repo.create_run(DataSource::Archidekt, Utc::now()).unwrap();

        let a = repo.record_observation(first.id, url, Utc::now()).unwrap();
        let b = repo.record_observation(second.id, url, Utc::now()).unwrap();

        assert!(a.deck_created);
        assert!(!b.deck_created);
        assert!(b.first_in_run);
        assert_eq!(a.deck_id, b.deck_id);
        assert_ne!(a.result_id, b.result_id);
    }

    #[test]
    fn test_deck_update_time_never_moves_back() {
        let (repo, _dir) = setup();
        let url = "https://decks.test/a";
        let newer = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let older = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let first = repo.create_run(DataSource::Archidekt, Utc::now()).unwrap();
        let second = repo.create_run(DataSource::Archidekt, Utc::now()).unwrap();

        let obs = repo.record_observation(first.id, url, newer).unwrap();
        repo.record_observation(second.id, url, older).unwrap();

        let deck = repo.get_deck(obs.deck_id).unwrap().unwrap();
        assert_eq!(deck.updated_time, newer);
        assert_eq!(repo.results_for_run(second.id).unwrap()[0].updated_time, older);
    }

    #[test]
    fn test_mark_fetched_is_idempotent() {
        let (repo, _dir) = setup();
        let run = repo.create_run(DataSource::Moxfield, Utc::now()).unwrap();
        let obs = repo
            .record_observation(run.id, "https://decks.test/b", Utc::now())
            .unwrap();

        assert!(repo.mark_fetched(obs.result_id, &decklist()).unwrap());
        assert!(!repo.mark_fetched(obs.result_id, &Decklist::default()).unwrap());

        let deck = repo.get_deck(obs.deck_id).unwrap().unwrap();
        assert_eq!(deck.card_list.unwrap().card_count(), 31);
        assert!(deck.cards_fetched_at.is_some());

        let summary = repo.ledger_summary(run.id).unwrap();
        assert_eq!((summary.observed, summary.fetched, summary.pending()), (1, 1, 0));
    }

    #[test]
    fn test_next_pending_skips_fetched_and_earlier() {
        let (repo, _dir) = setup();
        let run = repo.create_run(DataSource::Archidekt, Utc::now()).unwrap();
        let ids: Vec<i64> = ["a", "b", "c"]
            .iter()
            .map(|name| {
                repo.record_observation(run.id, &format!("https://decks.test/{name}"), Utc::now())
                    .unwrap()
                    .result_id
            })
            .collect();
        repo.mark_fetched(ids[0], &decklist()).unwrap();

        assert_eq!(repo.next_pending(run.id, 0).unwrap().unwrap().id, ids[1]);
        assert_eq!(repo.next_pending(run.id, ids[1]).unwrap().unwrap().id, ids[2]);
        assert!(repo.next_pending(run.id, ids[2]).unwrap().is_none());
    }
}
