//! Crawl run lifecycle: creation, lookup, listing and locked updates.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::helpers::row_to_run_row;
use super::ledger;
use super::CrawlRepository;
use crate::models::{CrawlRun, DataSource, Decklist, LogEntry, Observation, RunState};
use crate::repository::log::append_entry;
use crate::repository::pagination::{Page, Paginator};
use crate::repository::{format_datetime, immediate, RepositoryError, Result};

/// Runs shown per listing page.
pub const RUNS_PAGINATOR: Paginator = Paginator::new(8, 3);

/// State codes the scheduler still has work for.
const SCHEDULABLE_STATES: &str = "(0, 1, 2, 3, 4)";

pub(crate) fn load_run(conn: &Connection, run_id: i64) -> Result<Option<CrawlRun>> {
    let row = conn
        .query_row(
            "SELECT * FROM crawl_runs WHERE id = ?",
            params![run_id],
            row_to_run_row,
        )
        .optional()?;
    row.map(|r| r.into_run()).transpose()
}

fn load_runs(conn: &Connection, sql: &str, params: impl rusqlite::Params) -> Result<Vec<CrawlRun>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, row_to_run_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    rows.into_iter().map(|r| r.into_run()).collect()
}

/// A write transaction scoped to one run.
///
/// Holds the run row as it was when the transaction began; state and cutoff
/// changes are staged and written when the transaction finishes. Ledger
/// writes and log appends happen immediately inside the same transaction.
pub struct RunTransaction<'c> {
    conn: &'c Connection,
    run: CrawlRun,
    state: RunState,
    search_back_to: Option<DateTime<Utc>>,
    log_tail: Option<i64>,
}

impl<'c> RunTransaction<'c> {
    fn new(conn: &'c Connection, run: CrawlRun) -> Self {
        Self {
            conn,
            state: run.state.clone(),
            search_back_to: run.search_back_to,
            log_tail: run.log_tail,
            run,
        }
    }

    /// The run as read under the lock.
    pub fn run(&self) -> &CrawlRun {
        &self.run
    }

    /// The staged state.
    pub fn state(&self) -> &RunState {
        &self.state
    }

    /// Stage a move to `state`.
    ///
    /// Only edges of the run state graph are accepted, checked against the
    /// previously staged state, and a fetching state must carry a cursor.
    pub fn set_state(&mut self, state: RunState) -> Result<()> {
        let (from, to) = (self.state.code(), state.code());
        if from != to && !from.can_transition_to(to) {
            return Err(RepositoryError::IllegalTransition {
                run_id: self.run.id,
                from,
                to,
            });
        }
        if matches!(
            state,
            RunState::FetchingDecks { .. } | RunState::FetchingDecklists { .. }
        ) && state.next_fetch().is_empty()
        {
            return Err(RepositoryError::MissingCursor {
                run_id: self.run.id,
                state: to,
            });
        }
        self.state = state;
        Ok(())
    }

    pub fn clear_search_back_to(&mut self) {
        self.search_back_to = None;
    }

    /// Append a message to this run's log chain.
    pub fn log(&mut self, message: impl AsRef<str>) -> Result<LogEntry> {
        let entry = append_entry(self.conn, self.log_tail, message.as_ref())?;
        self.log_tail = Some(entry.id);
        Ok(entry)
    }

    pub fn record_observation(
        &mut self,
        url: &str,
        updated_time: DateTime<Utc>,
    ) -> Result<Observation> {
        ledger::record_observation(self.conn, &self.run, url, updated_time)
    }

    pub fn mark_fetched(&mut self, result_id: i64, decklist: &Decklist) -> Result<bool> {
        ledger::mark_fetched(self.conn, result_id, decklist)
    }

    /// Whether any unfetched ledger entry of this run sits after `after_id`.
    pub fn has_pending_after(&self, after_id: i64) -> Result<bool> {
        Ok(ledger::next_pending(self.conn, self.run.id, after_id)?.is_some())
    }

    fn finish(self) -> Result<CrawlRun> {
        let cols = self.state.to_columns();
        self.conn.execute(
            r#"
            UPDATE crawl_runs SET
                state = ?1,
                note = ?2,
                next_fetch = ?3,
                cursor_phase = ?4,
                search_back_to = ?5,
                log_tail = ?6
            WHERE id = ?7
            "#,
            params![
                cols.state,
                cols.note,
                cols.next_fetch,
                cols.cursor_phase,
                self.search_back_to.as_ref().map(format_datetime),
                self.log_tail,
                self.run.id,
            ],
        )?;

        Ok(CrawlRun {
            state: self.state,
            search_back_to: self.search_back_to,
            log_tail: self.log_tail,
            ..self.run
        })
    }
}

impl CrawlRepository {
    /// Create a run whose cutoff is the newest deck update already ingested
    /// for `target`.
    pub fn create_run(&self, target: DataSource, start_time: DateTime<Utc>) -> Result<CrawlRun> {
        let conn = self.connect()?;
        let cutoff = ledger::newest_known_update(&conn, target)?;
        self.create_run_with_cutoff(target, start_time, cutoff)
    }

    /// Create a run with an explicit cutoff (`None` crawls to exhaustion).
    pub fn create_run_with_cutoff(
        &self,
        target: DataSource,
        start_time: DateTime<Utc>,
        search_back_to: Option<DateTime<Utc>>,
    ) -> Result<CrawlRun> {
        let conn = self.connect()?;
        immediate(&conn, |conn| {
            conn.execute(
                r#"
                INSERT INTO crawl_runs (crawl_start_time, search_back_to, target, state)
                VALUES (?1, ?2, ?3, ?4)
                "#,
                params![
                    format_datetime(&start_time),
                    search_back_to.as_ref().map(format_datetime),
                    target.as_str(),
                    RunState::NotStarted.code().as_i64(),
                ],
            )?;
            let run_id = conn.last_insert_rowid();

            let cutoff = match search_back_to {
                Some(t) => t.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
                None => "the beginning".to_string(),
            };
            let head = append_entry(
                conn,
                None,
                &format!("Run {run_id} created for {target}; searching back to {cutoff}"),
            )?;
            conn.execute(
                "UPDATE crawl_runs SET log_tail = ?1 WHERE id = ?2",
                params![head.id, run_id],
            )?;

            load_run(conn, run_id)?.ok_or(RepositoryError::Database(
                rusqlite::Error::QueryReturnedNoRows,
            ))
        })
    }

    pub fn get_run(&self, run_id: i64) -> Result<Option<CrawlRun>> {
        load_run(&self.connect()?, run_id)
    }

    /// Runs newest first.
    pub fn list_runs(&self, page: u64) -> Result<Page<CrawlRun>> {
        let conn = self.connect()?;
        let total: i64 = conn.query_row("SELECT COUNT(*) FROM crawl_runs", [], |row| row.get(0))?;
        let total = total as u64;
        let window = RUNS_PAGINATOR.window(total, page);

        let runs = load_runs(
            &conn,
            r#"
            SELECT * FROM crawl_runs
            ORDER BY crawl_start_time DESC, id DESC
            LIMIT ?1 OFFSET ?2
            "#,
            params![window.limit as i64, window.offset as i64],
        )?;

        Ok(RUNS_PAGINATOR.page(window, total, runs))
    }

    /// Runs the scheduler should advance, oldest first.
    pub fn schedulable_runs(&self) -> Result<Vec<CrawlRun>> {
        let conn = self.connect()?;
        load_runs(
            &conn,
            &format!("SELECT * FROM crawl_runs WHERE state IN {SCHEDULABLE_STATES} ORDER BY id"),
            [],
        )
    }

    /// Whether `target` has a run that is neither complete nor cancelled.
    pub fn has_open_run(&self, target: DataSource) -> Result<bool> {
        let conn = self.connect()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM crawl_runs WHERE target = ? AND state NOT IN (5, 98)",
            params![target.as_str()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Delete a run and, by cascade, its ledger.
    pub fn delete_run(&self, run_id: i64) -> Result<bool> {
        let conn = self.connect()?;
        let deleted = conn.execute("DELETE FROM crawl_runs WHERE id = ?", params![run_id])?;
        Ok(deleted > 0)
    }

    /// Apply `f` to a run under an exclusive write lock.
    ///
    /// The run row is re-read after the lock is taken. Staged changes are
    /// written only if `f` succeeds; returns `None` if the run does not exist.
    pub fn update_run<T, E>(
        &self,
        run_id: i64,
        f: impl FnOnce(&mut RunTransaction<'_>) -> std::result::Result<T, E>,
    ) -> std::result::Result<Option<(T, CrawlRun)>, E>
    where
        E: From<RepositoryError>,
    {
        let conn = self.connect()?;
        immediate(&conn, |conn| {
            let Some(run) = load_run(conn, run_id)? else {
                return Ok(None);
            };
            let mut tx = RunTransaction::new(conn, run);
            let value = f(&mut tx)?;
            let run = tx.finish()?;
            Ok(Some((value, run)))
        })
    }
}
