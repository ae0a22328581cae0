//! Schema Tests
//!
//! Verifies the on-disk layout created by the repositories: tables, columns,
//! uniqueness constraints, and that re-opening a database leaves it unchanged.

use std::collections::{BTreeMap, BTreeSet};

use rusqlite::{Connection, Result as SqliteResult};

use deckcrawl::repository::{CrawlRepository, LogRepository};

#[derive(Debug, Clone, PartialEq, Eq)]
struct ColumnInfo {
    col_type: String,
    not_null: bool,
}

/// Extract table columns from a SQLite connection
fn extract_tables(conn: &Connection) -> SqliteResult<BTreeMap<String, BTreeMap<String, ColumnInfo>>> {
    let mut tables = BTreeMap::new();

    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
    )?;
    let table_names: Vec<String> = stmt
        .query_map([], |row| row.get(0))?
        .collect::<SqliteResult<Vec<_>>>()?;

    for table_name in table_names {
        let mut pragma = conn.prepare(&format!("PRAGMA table_info(\"{}\")", table_name))?;
        let columns = pragma
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(1)?,
                    ColumnInfo {
                        col_type: row.get::<_, String>(2)?.to_uppercase(),
                        not_null: row.get(3)?,
                    },
                ))
            })?
            .collect::<SqliteResult<BTreeMap<_, _>>>()?;
        tables.insert(table_name, columns);
    }

    Ok(tables)
}

/// Column sets of every unique index (explicit or from a UNIQUE constraint)
fn extract_unique_indexes(conn: &Connection, table: &str) -> SqliteResult<BTreeSet<Vec<String>>> {
    let mut list = conn.prepare(&format!("PRAGMA index_list(\"{}\")", table))?;
    let unique_names: Vec<String> = list
        .query_map([], |row| Ok((row.get::<_, String>(1)?, row.get::<_, bool>(2)?)))?
        .filter_map(|r| match r {
            Ok((name, true)) => Some(Ok(name)),
            Ok(_) => None,
            Err(e) => Some(Err(e)),
        })
        .collect::<SqliteResult<Vec<_>>>()?;

    let mut uniques = BTreeSet::new();
    for name in unique_names {
        let mut info = conn.prepare(&format!("PRAGMA index_info(\"{}\")", name))?;
        let columns = info
            .query_map([], |row| row.get::<_, String>(2))?
            .collect::<SqliteResult<Vec<_>>>()?;
        uniques.insert(columns);
    }
    Ok(uniques)
}

fn columns(list: &[&str]) -> Vec<String> {
    list.iter().map(|c| c.to_string()).collect()
}

#[test]
fn test_expected_tables_and_columns() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("deckcrawl.db");
    CrawlRepository::new(&path).unwrap();

    let conn = Connection::open(&path).unwrap();
    let tables = extract_tables(&conn).unwrap();

    assert_eq!(
        tables.keys().map(String::as_str).collect::<Vec<_>>(),
        [
            "crawl_runs",
            "deck_crawl_results",
            "decks",
            "log_entries",
            "site_stats"
        ]
    );

    let runs = &tables["crawl_runs"];
    for column in [
        "crawl_start_time",
        "search_back_to",
        "target",
        "state",
        "note",
        "next_fetch",
        "cursor_phase",
        "log_tail",
    ] {
        assert!(runs.contains_key(column), "crawl_runs.{column} missing");
    }
    assert_eq!(runs["state"].col_type, "INTEGER");
    assert!(runs["state"].not_null);
    assert!(!runs["search_back_to"].not_null);

    assert!(!tables["log_entries"]["follows"].not_null);
    assert!(tables["deck_crawl_results"]["got_cards"].not_null);
}

#[test]
fn test_uniqueness_constraints() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("deckcrawl.db");
    CrawlRepository::new(&path).unwrap();
    let conn = Connection::open(&path).unwrap();

    assert!(extract_unique_indexes(&conn, "log_entries")
        .unwrap()
        .contains(&columns(&["follows"])));
    assert!(extract_unique_indexes(&conn, "deck_crawl_results")
        .unwrap()
        .contains(&columns(&["run_id", "url"])));
    assert!(extract_unique_indexes(&conn, "decks")
        .unwrap()
        .contains(&columns(&["target", "url"])));
}

#[test]
fn test_reopening_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("deckcrawl.db");

    CrawlRepository::new(&path).unwrap();
    let before = extract_tables(&Connection::open(&path).unwrap()).unwrap();

    CrawlRepository::new(&path).unwrap();
    LogRepository::new(&path).unwrap();
    let after = extract_tables(&Connection::open(&path).unwrap()).unwrap();

    assert_eq!(before, after);
}
