//! Event log chain repository.
//!
//! Entries live in one table indexed by id; each entry points back at the
//! entry it follows. A follower must point at an existing, older entry that
//! has no follower yet, so chains never branch and never cycle.

use std::path::{Path, PathBuf};

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use super::pagination::{Page, Paginator};
use super::{format_datetime, get_datetime, immediate, RepositoryError, Result};
use crate::models::LogEntry;

/// Default bound on hops walked in either direction by `read_chain`.
pub const DEFAULT_MAX_HOPS: u32 = 10;

/// Chain heads shown per listing page.
pub const HEADS_PAGINATOR: Paginator = Paginator::new(10, 3);

pub(crate) fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS log_entries (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            created TEXT NOT NULL,
            message TEXT NOT NULL,
            follows INTEGER UNIQUE REFERENCES log_entries(id)
        );

        CREATE INDEX IF NOT EXISTS idx_log_entries_heads
            ON log_entries(id) WHERE follows IS NULL;
    "#,
    )?;
    Ok(())
}

fn row_to_log_entry(row: &rusqlite::Row) -> rusqlite::Result<LogEntry> {
    Ok(LogEntry {
        id: row.get("id")?,
        created: get_datetime(row, "created")?,
        message: row.get("message")?,
        follows: row.get("follows")?,
    })
}

pub(crate) fn get_entry(conn: &Connection, id: i64) -> Result<Option<LogEntry>> {
    let entry = conn
        .query_row(
            "SELECT * FROM log_entries WHERE id = ?",
            params![id],
            row_to_log_entry,
        )
        .optional()?;
    Ok(entry)
}

fn follower_of(conn: &Connection, id: i64) -> Result<Option<LogEntry>> {
    let entry = conn
        .query_row(
            "SELECT * FROM log_entries WHERE follows = ?",
            params![id],
            row_to_log_entry,
        )
        .optional()?;
    Ok(entry)
}

/// Append an entry after `follows` (or start a new chain).
///
/// Callers must already hold a write transaction on `conn`.
pub(crate) fn append_entry(
    conn: &Connection,
    follows: Option<i64>,
    message: &str,
) -> Result<LogEntry> {
    if let Some(prev) = follows {
        if get_entry(conn, prev)?.is_none() {
            return Err(RepositoryError::MissingLogEntry(prev));
        }
        if follower_of(conn, prev)?.is_some() {
            return Err(RepositoryError::ChainConflict(prev));
        }
    }

    let created = Utc::now();
    conn.execute(
        "INSERT INTO log_entries (created, message, follows) VALUES (?1, ?2, ?3)",
        params![format_datetime(&created), message, follows],
    )?;

    let entry = LogEntry {
        id: conn.last_insert_rowid(),
        created,
        message: message.to_string(),
        follows,
    };
    debug!(id = entry.id, follows = ?entry.follows, "{}", entry.message);
    Ok(entry)
}

/// SQLite-backed repository for diagnostic log chains.
pub struct LogRepository {
    db_path: PathBuf,
}

impl LogRepository {
    pub fn new(db_path: &Path) -> Result<Self> {
        let repo = Self {
            db_path: db_path.to_path_buf(),
        };
        init_schema(&repo.connect()?)?;
        Ok(repo)
    }

    fn connect(&self) -> Result<Connection> {
        super::connect(&self.db_path)
    }

    /// Append a message after `follows`, or start a new chain with `None`.
    pub fn append(&self, follows: Option<i64>, message: &str) -> Result<LogEntry> {
        let conn = self.connect()?;
        immediate(&conn, |conn| append_entry(conn, follows, message))
    }

    pub fn get(&self, id: i64) -> Result<Option<LogEntry>> {
        get_entry(&self.connect()?, id)
    }

    /// Reconstruct the chain around `id` in creation order.
    ///
    /// Walks at most `max_hops` entries back towards the head and at most
    /// `max_hops` entries forward from `id`; each hop is one indexed lookup.
    pub fn read_chain(&self, id: i64, max_hops: u32) -> Result<Vec<LogEntry>> {
        let conn = self.connect()?;
        let start = get_entry(&conn, id)?.ok_or(RepositoryError::MissingLogEntry(id))?;

        let mut chain = Vec::new();
        let mut prev = start.follows;
        for _ in 0..max_hops {
            let Some(prev_id) = prev else { break };
            let entry =
                get_entry(&conn, prev_id)?.ok_or(RepositoryError::MissingLogEntry(prev_id))?;
            prev = entry.follows;
            chain.push(entry);
        }
        chain.reverse();

        let mut current = start.id;
        chain.push(start);
        for _ in 0..max_hops {
            let Some(next) = follower_of(&conn, current)? else {
                break;
            };
            current = next.id;
            chain.push(next);
        }

        Ok(chain)
    }

    /// Chain heads, newest first.
    pub fn chain_heads(&self, page: u64) -> Result<Page<LogEntry>> {
        let conn = self.connect()?;
        let total: i64 = conn.query_row(
            "SELECT COUNT(*) FROM log_entries WHERE follows IS NULL",
            [],
            |row| row.get(0),
        )?;
        let total = total as u64;
        let window = HEADS_PAGINATOR.window(total, page);

        let mut stmt = conn.prepare(
            r#"
            SELECT * FROM log_entries
            WHERE follows IS NULL
            ORDER BY id DESC
            LIMIT ?1 OFFSET ?2
        "#,
        )?;
        let heads = stmt
            .query_map(
                params![window.limit as i64, window.offset as i64],
                row_to_log_entry,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(HEADS_PAGINATOR.page(window, total, heads))
    }
}
