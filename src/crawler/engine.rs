//! Crawl run orchestration.
//!
//! Each call to [`CrawlEngine::advance`] performs one bounded unit of work
//! for one run: a single discovery page or a single decklist. The driver is
//! awaited outside any database transaction; the result is then committed in
//! one `BEGIN IMMEDIATE` transaction that first checks the run is still in
//! the state the work was planned from.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use super::cursor::{split_at_cutoff, LedgerCursor};
use super::driver::{CrawlDriver, DeckPage, DriverError};
use super::error::CrawlError;
use super::locks::RunLocks;
use crate::models::{CrawlRun, DataSource, Decklist, RunState, StateCode};
use crate::repository::{CrawlRepository, RepositoryError, RunTransaction};

/// What a call to `advance` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvanceOutcome {
    /// Nothing to do: the run is terminal or waiting on an operator.
    Idle(StateCode),
    /// One unit of work was committed.
    Advanced { from: StateCode, to: StateCode },
    /// The run changed underneath the unit of work, which was discarded.
    Superseded,
}

/// Drives crawl runs through their phases.
pub struct CrawlEngine {
    pub(super) repo: CrawlRepository,
    driver: Arc<dyn CrawlDriver>,
    locks: RunLocks,
}

impl CrawlEngine {
    pub fn new(repo: CrawlRepository, driver: Arc<dyn CrawlDriver>) -> Self {
        Self {
            repo,
            driver,
            locks: RunLocks::new(),
        }
    }

    pub fn repository(&self) -> &CrawlRepository {
        &self.repo
    }

    /// Start a new run for `target` with the cutoff derived from the ledger.
    pub fn create_run(&self, target: DataSource) -> Result<CrawlRun, CrawlError> {
        let run = self.repo.create_run(target, Utc::now())?;
        info!(
            run_id = run.id,
            search_back_to = ?run.search_back_to,
            "Created {} run",
            target
        );
        Ok(run)
    }

    /// Perform one unit of work for `run_id`.
    ///
    /// Driver failures never surface here; they are persisted as an ERROR
    /// state or a skipped item. Only database failures are returned.
    pub async fn advance(&self, run_id: i64) -> Result<AdvanceOutcome, CrawlError> {
        let guard = self.locks.acquire(run_id).await;
        let outcome = self.advance_locked(run_id).await;
        drop(guard);
        self.locks.forget(run_id);
        outcome
    }

    async fn advance_locked(&self, run_id: i64) -> Result<AdvanceOutcome, CrawlError> {
        let run = self
            .repo
            .get_run(run_id)?
            .ok_or(CrawlError::RunNotFound(run_id))?;

        match &run.state {
            RunState::Complete | RunState::Cancelled | RunState::Error { .. } => {
                debug!(run_id, state = %run.state, "Nothing to advance");
                Ok(AdvanceOutcome::Idle(run.state.code()))
            }
            RunState::NotStarted => self.start_discovery(&run),
            RunState::FetchingDecks { next_fetch } => self.fetch_decks(&run, next_fetch).await,
            RunState::DoneFetchingDecks => self.start_decklists(&run),
            RunState::FetchingDecklists { next_fetch } => {
                self.fetch_decklist(&run, next_fetch).await
            }
            RunState::DoneFetchingDecklists => self.commit(&run, finish_decklists),
        }
    }

    fn start_discovery(&self, run: &CrawlRun) -> Result<AdvanceOutcome, CrawlError> {
        let cursor = self.driver.start_cursor(run.target);
        if cursor.is_empty() {
            return self.fail(run, format!("No start page known for {}", run.target));
        }
        self.commit(run, |tx| {
            tx.log(format!("Starting deck discovery at {cursor}"))?;
            tx.set_state(RunState::FetchingDecks { next_fetch: cursor })
        })
    }

    async fn fetch_decks(
        &self,
        run: &CrawlRun,
        cursor: &str,
    ) -> Result<AdvanceOutcome, CrawlError> {
        let page = match self.driver.list_decks(run.target, cursor).await {
            Ok(page) => page,
            Err(e) => return self.fail(run, format!("Deck discovery failed at {cursor}: {e}")),
        };
        if page.next_cursor.as_deref() == Some(cursor) {
            return self.fail(run, format!("Source returned {cursor} as its own next page"));
        }

        let DeckPage { items, next_cursor } = page;
        let next_cursor = next_cursor.filter(|next| !next.is_empty());
        let listed = items.len();
        let split = split_at_cutoff(items, run.search_back_to);

        self.commit(run, |tx| {
            let mut new_decks = 0;
            for item in &split.accepted {
                let obs = tx.record_observation(&item.url, item.updated_time)?;
                if obs.deck_created {
                    new_decks += 1;
                }
                debug!(run_id = tx.run().id, url = %item.url, new = obs.deck_created, "Observed deck");
            }
            tx.log(format!(
                "Page {cursor}: {listed} listed, {} recorded, {new_decks} new",
                split.accepted.len()
            ))?;

            match next_cursor {
                _ if split.reached => {
                    let cutoff = tx
                        .run()
                        .search_back_to
                        .map(|t| t.to_rfc3339())
                        .unwrap_or_default();
                    tx.log(format!("Reached decks updated before {cutoff}; discovery done"))?;
                    tx.set_state(RunState::DoneFetchingDecks)
                }
                None => {
                    tx.log("No further pages; discovery done")?;
                    tx.set_state(RunState::DoneFetchingDecks)
                }
                Some(next) => tx.set_state(RunState::FetchingDecks { next_fetch: next }),
            }
        })
    }

    fn start_decklists(&self, run: &CrawlRun) -> Result<AdvanceOutcome, CrawlError> {
        self.commit(run, |tx| {
            tx.log("Fetching decklists for observed decks")?;
            tx.set_state(RunState::FetchingDecklists {
                next_fetch: LedgerCursor::START.to_string(),
            })
        })
    }

    async fn fetch_decklist(
        &self,
        run: &CrawlRun,
        cursor: &str,
    ) -> Result<AdvanceOutcome, CrawlError> {
        let Some(position) = LedgerCursor::parse(cursor) else {
            return self.fail(run, format!("Malformed ledger cursor '{cursor}'"));
        };
        let Some(item) = self.repo.next_pending(run.id, position.0)? else {
            return self.commit(run, finish_decklists);
        };

        let fetched: Result<Decklist, DriverError> = self.driver.fetch_decklist(&item.url).await;
        if let Err(e @ (DriverError::Unreachable(_) | DriverError::MalformedCursor(_))) = &fetched {
            return self.fail(run, format!("Decklist fetch for {} failed: {e}", item.url));
        }

        self.commit(run, |tx| {
            match fetched {
                Ok(decklist) => {
                    tx.mark_fetched(item.id, &decklist)?;
                    debug!(
                        run_id = tx.run().id,
                        url = %item.url,
                        cards = decklist.card_count(),
                        "Fetched decklist"
                    );
                }
                Err(e) => {
                    warn!(run_id = tx.run().id, url = %item.url, "Skipping decklist: {}", e);
                    tx.log(format!("Skipped decklist {}: {e}", item.url))?;
                }
            }

            if tx.has_pending_after(item.id)? {
                tx.set_state(RunState::FetchingDecklists {
                    next_fetch: LedgerCursor(item.id).to_string(),
                })
            } else {
                finish_decklists(tx)
            }
        })
    }

    /// Move the run to ERROR, keeping its cursor.
    fn fail(&self, run: &CrawlRun, note: String) -> Result<AdvanceOutcome, CrawlError> {
        warn!(run_id = run.id, "{}", note);
        self.commit(run, |tx| {
            tx.log(&note)?;
            let errored = tx.state().errored(note);
            tx.set_state(errored)
        })
    }

    /// Commit a unit of work planned from `seen`.
    ///
    /// Nothing is written if the run's state is no longer the one the work
    /// was planned from, or if the run was deleted.
    fn commit(
        &self,
        seen: &CrawlRun,
        work: impl FnOnce(&mut RunTransaction<'_>) -> Result<(), RepositoryError>,
    ) -> Result<AdvanceOutcome, CrawlError> {
        let committed = self.repo.update_run(seen.id, |tx| -> Result<bool, CrawlError> {
            if tx.run().state != seen.state {
                return Ok(false);
            }
            work(tx)?;
            Ok(true)
        })?;

        let outcome = match committed {
            Some((true, run)) => {
                let (from, to) = (seen.state.code(), run.state.code());
                if from != to {
                    info!(run_id = run.id, "{} -> {}", from, to);
                }
                AdvanceOutcome::Advanced { from, to }
            }
            Some((false, _)) | None => {
                info!(run_id = seen.id, "Run changed during unit of work; discarding");
                AdvanceOutcome::Superseded
            }
        };
        Ok(outcome)
    }
}

/// Close the decklist phase and complete the run.
fn finish_decklists(tx: &mut RunTransaction<'_>) -> Result<(), RepositoryError> {
    if tx.state().code() != StateCode::DoneFetchingDecklists {
        tx.log("No pending decklists; decklist fetch done")?;
        tx.set_state(RunState::DoneFetchingDecklists)?;
    }
    tx.log("Run complete")?;
    tx.set_state(RunState::Complete)
}
