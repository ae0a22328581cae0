//! Repository layer for SQLite persistence.
//!
//! Repositories hold the database path and open a connection per operation.
//! Writes that must be consistent with a run's state go through a single
//! `BEGIN IMMEDIATE` transaction, which is also what serializes writers
//! across processes.

pub mod crawl;
pub mod log;
pub mod pagination;

pub use crawl::{CrawlRepository, RunTransaction};
pub use log::{LogRepository, DEFAULT_MAX_HOPS};
pub use pagination::{Page, Paginator};

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::Connection;
use thiserror::Error;

use crate::models::StateCode;

/// How long a connection waits on a locked database before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Corrupt run {run_id}: {reason}")]
    CorruptRun { run_id: i64, reason: String },
    #[error("Log entry {0} does not exist")]
    MissingLogEntry(i64),
    #[error("Log entry {0} already has a follower")]
    ChainConflict(i64),
    #[error("Run {run_id} cannot move from {from} to {to}")]
    IllegalTransition {
        run_id: i64,
        from: StateCode,
        to: StateCode,
    },
    #[error("Run {run_id} cannot enter {state} without a cursor")]
    MissingCursor { run_id: i64, state: StateCode },
}

pub type Result<T> = std::result::Result<T, RepositoryError>;

/// Open a connection with the pragmas every repository relies on.
pub fn connect(db_path: &Path) -> Result<Connection> {
    let conn = Connection::open(db_path)?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    conn.pragma_update(None, "foreign_keys", true)?;
    Ok(conn)
}

/// Run `f` inside a `BEGIN IMMEDIATE` transaction.
///
/// Commits when `f` succeeds, rolls back otherwise.
pub fn immediate<T, E>(
    conn: &Connection,
    f: impl FnOnce(&Connection) -> std::result::Result<T, E>,
) -> std::result::Result<T, E>
where
    E: From<RepositoryError>,
{
    conn.execute_batch("BEGIN IMMEDIATE")
        .map_err(|e| E::from(RepositoryError::from(e)))?;

    match f(conn) {
        Ok(value) => {
            if let Err(e) = conn.execute_batch("COMMIT") {
                let _ = conn.execute_batch("ROLLBACK");
                return Err(E::from(RepositoryError::from(e)));
            }
            Ok(value)
        }
        Err(e) => {
            let _ = conn.execute_batch("ROLLBACK");
            Err(e)
        }
    }
}

/// Fixed-width RFC 3339 so text ordering matches time ordering.
pub fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Read a required datetime column, failing the row on bad text.
pub(crate) fn get_datetime(row: &rusqlite::Row, column: &str) -> rusqlite::Result<DateTime<Utc>> {
    let text: String = row.get(column)?;
    parse_column(row, column, &text)
}

/// Read a nullable datetime column.
pub(crate) fn get_datetime_opt(
    row: &rusqlite::Row,
    column: &str,
) -> rusqlite::Result<Option<DateTime<Utc>>> {
    match row.get::<_, Option<String>>(column)? {
        Some(text) => parse_column(row, column, &text).map(Some),
        None => Ok(None),
    }
}

fn parse_column(row: &rusqlite::Row, column: &str, text: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            let idx = row.as_ref().column_index(column).unwrap_or(0);
            rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
        })
}
