//! Aggregate deck statistics snapshots.

use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use super::helpers::row_to_site_stat;
use super::CrawlRepository;
use crate::models::SiteStat;
use crate::repository::{format_datetime, Result};

impl CrawlRepository {
    /// Count decks and store a new snapshot.
    pub fn recompute_stats(&self) -> Result<SiteStat> {
        let conn = self.connect()?;
        let (deck_count, decks_with_cards): (i64, i64) = conn.query_row(
            r#"
            SELECT COUNT(*), COUNT(card_list)
            FROM decks
            "#,
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        let created = Utc::now();
        conn.execute(
            r#"
            INSERT INTO site_stats (created, deck_count, decks_with_cards)
            VALUES (?1, ?2, ?3)
            "#,
            params![format_datetime(&created), deck_count, decks_with_cards],
        )?;

        Ok(SiteStat {
            id: conn.last_insert_rowid(),
            created,
            deck_count: deck_count as u64,
            decks_with_cards: decks_with_cards as u64,
        })
    }

    pub fn latest_stats(&self) -> Result<Option<SiteStat>> {
        let conn = self.connect()?;
        let stat = conn
            .query_row(
                "SELECT * FROM site_stats ORDER BY id DESC LIMIT 1",
                [],
                row_to_site_stat,
            )
            .optional()?;
        Ok(stat)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DataSource, Decklist};
    use tempfile::tempdir;

    #[test]
    fn test_recompute_counts_decks_with_cards() {
        let dir = tempdir().unwrap();
        let repo = CrawlRepository::new(&dir.path().join("test.db")).unwrap();
        assert!(repo.latest_stats().unwrap().is_none());

        let run = repo.create_run(DataSource::Archidekt, Utc::now()).unwrap();
        let a = repo
            .record_observation(run.id, "https://decks.test/a", Utc::now())
            .unwrap();
        repo.record_observation(run.id, "https://decks.test/b", Utc::now())
            .unwrap();
        repo.mark_fetched(a.result_id, &Decklist::default()).unwrap();

        let stat = repo.recompute_stats().unwrap();
        assert_eq!((stat.deck_count, stat.decks_with_cards), (2, 1));
        assert_eq!(repo.latest_stats().unwrap().unwrap().id, stat.id);
    }
}
