use thiserror::Error;

use crate::models::StateCode;
use crate::repository::RepositoryError;

#[derive(Debug, Error)]
pub enum CrawlError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error("Run {0} not found")]
    RunNotFound(i64),
    #[error("Cannot {action} run {run_id} in state {state}")]
    InvalidTransition {
        run_id: i64,
        action: &'static str,
        state: StateCode,
    },
}
