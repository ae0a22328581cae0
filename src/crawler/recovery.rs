//! Operator controls: clear an error, drop the cutoff, cancel.
//!
//! Controls run in a single transaction and never wait on the per-run lock
//! held by `advance`, so a cancel lands even while a fetch is in flight; the
//! in-flight unit of work is then discarded at commit.

use tracing::info;

use super::engine::CrawlEngine;
use super::error::CrawlError;
use crate::models::{CrawlRun, CursorPhase, ResumePoint, RunState};
use crate::repository::RunTransaction;

fn invalid(tx: &RunTransaction<'_>, action: &'static str) -> CrawlError {
    CrawlError::InvalidTransition {
        run_id: tx.run().id,
        action,
        state: tx.state().code(),
    }
}

impl CrawlEngine {
    fn control(
        &self,
        run_id: i64,
        f: impl FnOnce(&mut RunTransaction<'_>) -> Result<(), CrawlError>,
    ) -> Result<CrawlRun, CrawlError> {
        self.repo
            .update_run(run_id, f)?
            .map(|((), run)| run)
            .ok_or(CrawlError::RunNotFound(run_id))
    }

    /// Leave ERROR, resuming the phase that owned the preserved cursor.
    pub fn clear_error(&self, run_id: i64) -> Result<CrawlRun, CrawlError> {
        let run = self.control(run_id, |tx| {
            let RunState::Error { note, resume } = tx.state().clone() else {
                return Err(invalid(tx, "clear the error of"));
            };

            let next = match resume {
                Some(ResumePoint {
                    phase: CursorPhase::Decks,
                    next_fetch,
                }) => RunState::FetchingDecks { next_fetch },
                Some(ResumePoint {
                    phase: CursorPhase::Decklists,
                    next_fetch,
                }) => RunState::FetchingDecklists { next_fetch },
                None => RunState::NotStarted,
            };
            tx.log(format!("Error cleared by operator ({note}); resuming in {next}"))?;
            tx.set_state(next)?;
            Ok(())
        })?;

        info!(run_id, state = %run.state, "Cleared run error");
        Ok(run)
    }

    /// Drop the discovery cutoff so the run crawls to exhaustion.
    pub fn remove_cutoff(&self, run_id: i64) -> Result<CrawlRun, CrawlError> {
        let run = self.control(run_id, |tx| {
            if *tx.state() != RunState::NotStarted {
                return Err(invalid(tx, "remove the cutoff of"));
            }
            if tx.run().search_back_to.is_some() {
                tx.clear_search_back_to();
                tx.log("Cutoff removed by operator; crawling to exhaustion")?;
            }
            Ok(())
        })?;

        info!(run_id, "Removed run cutoff");
        Ok(run)
    }

    /// Cancel a run. Cancelling a cancelled run does nothing.
    pub fn cancel(&self, run_id: i64) -> Result<CrawlRun, CrawlError> {
        let run = self.control(run_id, |tx| match tx.state() {
            RunState::Cancelled => Ok(()),
            RunState::Complete => Err(invalid(tx, "cancel")),
            previous => {
                let message = format!("Cancelled by operator (was {previous})");
                tx.log(message)?;
                tx.set_state(RunState::Cancelled)?;
                Ok(())
            }
        })?;

        info!(run_id, "Cancelled run");
        Ok(run)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use tempfile::tempdir;

    use crate::crawler::{CrawlDriver, DeckPage, DriverError};
    use crate::models::{DataSource, Decklist, StateCode};
    use crate::repository::{CrawlRepository, LogRepository, RepositoryError, DEFAULT_MAX_HOPS};

    struct NullDriver;

    #[async_trait]
    impl CrawlDriver for NullDriver {
        fn start_cursor(&self, _target: DataSource) -> String {
            "page:1".to_string()
        }

        async fn list_decks(
            &self,
            _target: DataSource,
            _cursor: &str,
        ) -> Result<DeckPage, DriverError> {
            Ok(DeckPage::default())
        }

        async fn fetch_decklist(&self, _url: &str) -> Result<Decklist, DriverError> {
            Ok(Decklist::default())
        }
    }

    fn setup() -> (CrawlEngine, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let repo = CrawlRepository::new(&dir.path().join("test.db")).unwrap();
        (CrawlEngine::new(repo, Arc::new(NullDriver)), dir)
    }

    fn force_state(engine: &CrawlEngine, run_id: i64, state: RunState) {
        engine
            .repository()
            .update_run(run_id, |tx| -> Result<(), RepositoryError> {
                tx.set_state(state)
            })
            .unwrap();
    }

    #[test]
    fn test_clear_without_cursor_restarts() {
        let (engine, _dir) = setup();
        let run = engine.create_run(DataSource::Archidekt).unwrap();
        force_state(
            &engine,
            run.id,
            RunState::Error {
                note: "boom".to_string(),
                resume: None,
            },
        );

        let cleared = engine.clear_error(run.id).unwrap();
        assert_eq!(cleared.state, RunState::NotStarted);
    }

    #[test]
    fn test_clear_requires_error() {
        let (engine, _dir) = setup();
        let run = engine.create_run(DataSource::Archidekt).unwrap();

        assert!(matches!(
            engine.clear_error(run.id),
            Err(CrawlError::InvalidTransition {
                state: StateCode::NotStarted,
                ..
            })
        ));
    }

    #[test]
    fn test_remove_cutoff_only_before_start() {
        let (engine, _dir) = setup();
        let cutoff = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let run = engine
            .repository()
            .create_run_with_cutoff(DataSource::Moxfield, Utc::now(), Some(cutoff))
            .unwrap();
        assert!(run.allows_search_infinite());

        let cleared = engine.remove_cutoff(run.id).unwrap();
        assert!(cleared.search_back_to.is_none());

        force_state(
            &engine,
            run.id,
            RunState::Error {
                note: "boom".to_string(),
                resume: None,
            },
        );
        assert!(matches!(
            engine.remove_cutoff(run.id),
            Err(CrawlError::InvalidTransition {
                state: StateCode::Error,
                ..
            })
        ));
    }

    #[test]
    fn test_cancel_is_idempotent_and_logged() {
        let (engine, dir) = setup();
        let run = engine.create_run(DataSource::Archidekt).unwrap();

        let cancelled = engine.cancel(run.id).unwrap();
        let again = engine.cancel(run.id).unwrap();
        assert_eq!(cancelled.state, RunState::Cancelled);
        assert_eq!(again.log_tail, cancelled.log_tail);

        let logs = LogRepository::new(&dir.path().join("test.db")).unwrap();
        let chain = logs
            .read_chain(cancelled.log_tail.unwrap(), DEFAULT_MAX_HOPS)
            .unwrap();
        assert_eq!(chain.len(), 2);
        assert!(chain[1].message.contains("Cancelled by operator"));
    }

    #[tokio::test]
    async fn test_cannot_cancel_complete_run() {
        let (engine, _dir) = setup();
        let run = engine.create_run(DataSource::Archidekt).unwrap();
        for _ in 0..4 {
            engine.advance(run.id).await.unwrap();
        }
        let complete = engine.repository().get_run(run.id).unwrap().unwrap();
        assert_eq!(complete.state, RunState::Complete);
        assert!(!complete.can_cancel());

        assert!(matches!(
            engine.cancel(run.id),
            Err(CrawlError::InvalidTransition { action: "cancel", .. })
        ));
    }

    #[test]
    fn test_missing_run() {
        let (engine, _dir) = setup();
        assert!(matches!(engine.cancel(404), Err(CrawlError::RunNotFound(404))));
    }
}
