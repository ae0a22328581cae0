//! Shared fixtures for crawl run integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use tempfile::TempDir;
use tokio::sync::Notify;

use deckcrawl::crawler::{AdvanceOutcome, CrawlDriver, CrawlEngine, DeckPage, DeckRef, DriverError};
use deckcrawl::models::{CardEntry, DataSource, Decklist};
use deckcrawl::repository::CrawlRepository;

pub const START: &str = "page:1";

/// Scripted reply for one driver call.
#[derive(Debug, Clone)]
pub enum Reply<T> {
    Ok(T),
    Unreachable,
    Failed,
}

impl<T: Clone> Reply<T> {
    fn to_result(&self, what: &str) -> Result<T, DriverError> {
        match self {
            Reply::Ok(value) => Ok(value.clone()),
            Reply::Unreachable => Err(DriverError::Unreachable(format!("{what}: connection refused"))),
            Reply::Failed => Err(DriverError::Failed(format!("{what}: 404 Not Found"))),
        }
    }
}

/// Blocks driver calls until released, announcing each one.
#[derive(Default)]
pub struct Gate {
    pub entered: Notify,
    pub release: Notify,
}

/// In-memory driver answering from scripted pages and decklists.
#[derive(Default)]
pub struct ScriptedDriver {
    pages: Mutex<HashMap<String, Reply<DeckPage>>>,
    decklists: Mutex<HashMap<String, Reply<Decklist>>>,
    calls: Mutex<Vec<String>>,
    start: Option<String>,
    pub gate: Option<Gate>,
}

impl ScriptedDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gated() -> Self {
        Self {
            gate: Some(Gate::default()),
            ..Self::default()
        }
    }

    /// A driver whose start locator is `start` instead of [`START`].
    pub fn starting_at(start: &str) -> Self {
        Self {
            start: Some(start.to_string()),
            ..Self::default()
        }
    }

    pub fn set_page(&self, cursor: &str, reply: Reply<DeckPage>) {
        self.pages
            .lock()
            .unwrap()
            .insert(cursor.to_string(), reply);
    }

    pub fn set_decklist(&self, url: &str, reply: Reply<Decklist>) {
        self.decklists
            .lock()
            .unwrap()
            .insert(url.to_string(), reply);
    }

    /// Cursors and URLs requested so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    async fn pass_gate(&self) {
        if let Some(gate) = &self.gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }
    }
}

#[async_trait]
impl CrawlDriver for ScriptedDriver {
    fn start_cursor(&self, _target: DataSource) -> String {
        self.start.clone().unwrap_or_else(|| START.to_string())
    }

    async fn list_decks(&self, _target: DataSource, cursor: &str) -> Result<DeckPage, DriverError> {
        self.calls.lock().unwrap().push(cursor.to_string());
        self.pass_gate().await;
        let reply = self.pages.lock().unwrap().get(cursor).cloned();
        match reply {
            Some(reply) => reply.to_result(cursor),
            None => Err(DriverError::Failed(format!("no page scripted for {cursor}"))),
        }
    }

    async fn fetch_decklist(&self, url: &str) -> Result<Decklist, DriverError> {
        self.calls.lock().unwrap().push(url.to_string());
        self.pass_gate().await;
        let reply = self.decklists.lock().unwrap().get(url).cloned();
        match reply {
            Some(reply) => reply.to_result(url),
            None => Err(DriverError::Failed(format!("no decklist scripted for {url}"))),
        }
    }
}

pub struct Fixture {
    pub dir: TempDir,
    pub driver: Arc<ScriptedDriver>,
    pub engine: Arc<CrawlEngine>,
}

impl Fixture {
    pub fn new(driver: ScriptedDriver) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let repo = CrawlRepository::new(&dir.path().join("deckcrawl.db")).unwrap();
        let driver = Arc::new(driver);
        let engine = Arc::new(CrawlEngine::new(repo, driver.clone()));
        Self {
            dir,
            driver,
            engine,
        }
    }

    pub fn repo(&self) -> &CrawlRepository {
        self.engine.repository()
    }

    pub fn db_path(&self) -> std::path::PathBuf {
        self.dir.path().join("deckcrawl.db")
    }

    /// Advance until the run stops making progress; returns the steps taken.
    pub async fn advance_until_idle(&self, run_id: i64) -> usize {
        let mut steps = 0;
        loop {
            match self.engine.advance(run_id).await.unwrap() {
                AdvanceOutcome::Advanced { .. } => steps += 1,
                _ => return steps,
            }
            assert!(steps < 100, "run {run_id} never settled");
        }
    }
}

pub fn at(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 0, 0, 0).unwrap()
}

pub fn deck(url: &str, updated_time: DateTime<Utc>) -> DeckRef {
    DeckRef {
        url: url.to_string(),
        updated_time,
    }
}

pub fn page(items: Vec<DeckRef>, next: Option<&str>) -> Reply<DeckPage> {
    Reply::Ok(DeckPage {
        items,
        next_cursor: next.map(String::from),
    })
}

pub fn cards(names: &[&str]) -> Reply<Decklist> {
    Reply::Ok(Decklist {
        cards: names
            .iter()
            .map(|name| CardEntry {
                name: name.to_string(),
                quantity: 1,
            })
            .collect(),
    })
}
