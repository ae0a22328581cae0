//! Crawl run models and the run state machine's states.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::DataSource;

/// Persisted state code of a crawl run.
///
/// The numeric values are the on-disk representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StateCode {
    NotStarted,
    FetchingDecks,
    DoneFetchingDecks,
    FetchingDecklists,
    DoneFetchingDecklists,
    Complete,
    Cancelled,
    Error,
}

impl StateCode {
    pub fn as_i64(&self) -> i64 {
        match self {
            Self::NotStarted => 0,
            Self::FetchingDecks => 1,
            Self::DoneFetchingDecks => 2,
            Self::FetchingDecklists => 3,
            Self::DoneFetchingDecklists => 4,
            Self::Complete => 5,
            Self::Cancelled => 98,
            Self::Error => 99,
        }
    }

    pub fn from_i64(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::NotStarted),
            1 => Some(Self::FetchingDecks),
            2 => Some(Self::DoneFetchingDecks),
            3 => Some(Self::FetchingDecklists),
            4 => Some(Self::DoneFetchingDecklists),
            5 => Some(Self::Complete),
            98 => Some(Self::Cancelled),
            99 => Some(Self::Error),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "NOT_STARTED",
            Self::FetchingDecks => "FETCHING_DECKS",
            Self::DoneFetchingDecks => "DONE_FETCHING_DECKS",
            Self::FetchingDecklists => "FETCHING_DECKLISTS",
            Self::DoneFetchingDecklists => "DONE_FETCHING_DECKLISTS",
            Self::Complete => "COMPLETE",
            Self::Cancelled => "CANCELLED",
            Self::Error => "ERROR",
        }
    }

    /// COMPLETE and CANCELLED absorb: nothing leaves them.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Cancelled)
    }

    /// Whether `next` is an edge of the run state graph.
    ///
    /// Leaving ERROR is only possible through operator recovery, which lands
    /// in NOT_STARTED or in the phase that owned the preserved cursor.
    pub fn can_transition_to(&self, next: StateCode) -> bool {
        use StateCode::*;

        match (*self, next) {
            (Complete | Cancelled, _) => false,
            (_, Cancelled) => true,
            (Error, NotStarted | FetchingDecks | FetchingDecklists) => true,
            (Error, _) => false,
            (_, Error) => true,
            (NotStarted, FetchingDecks) => true,
            (FetchingDecks, FetchingDecks | DoneFetchingDecks) => true,
            (DoneFetchingDecks, FetchingDecklists) => true,
            (FetchingDecklists, FetchingDecklists | DoneFetchingDecklists) => true,
            (DoneFetchingDecklists, Complete) => true,
            _ => false,
        }
    }
}

impl fmt::Display for StateCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Phase that owns a resumption cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CursorPhase {
    /// Cursor points into the external source's pagination.
    Decks,
    /// Cursor points into the run's own ledger.
    Decklists,
}

impl CursorPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Decks => "decks",
            Self::Decklists => "decklists",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "decks" => Some(Self::Decks),
            "decklists" => Some(Self::Decklists),
            _ => None,
        }
    }
}

/// Cursor preserved by an errored run so recovery can resume mid-phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumePoint {
    pub phase: CursorPhase,
    pub next_fetch: String,
}

/// Current phase of a crawl run together with the data that phase owns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunState {
    NotStarted,
    FetchingDecks { next_fetch: String },
    DoneFetchingDecks,
    FetchingDecklists { next_fetch: String },
    DoneFetchingDecklists,
    Complete,
    Cancelled,
    Error {
        note: String,
        resume: Option<ResumePoint>,
    },
}

/// Column values a [`RunState`] is persisted as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateColumns<'a> {
    pub state: i64,
    pub note: &'a str,
    pub next_fetch: &'a str,
    pub cursor_phase: Option<&'static str>,
}

/// A persisted state that no [`RunState`] can represent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidState {
    #[error("unknown run state code {0}")]
    UnknownCode(i64),
    #[error("{0} run has no cursor")]
    MissingCursor(StateCode),
    #[error("errored run has no note")]
    MissingNote,
    #[error("unknown cursor phase '{0}'")]
    UnknownPhase(String),
}

impl RunState {
    pub fn code(&self) -> StateCode {
        match self {
            Self::NotStarted => StateCode::NotStarted,
            Self::FetchingDecks { .. } => StateCode::FetchingDecks,
            Self::DoneFetchingDecks => StateCode::DoneFetchingDecks,
            Self::FetchingDecklists { .. } => StateCode::FetchingDecklists,
            Self::DoneFetchingDecklists => StateCode::DoneFetchingDecklists,
            Self::Complete => StateCode::Complete,
            Self::Cancelled => StateCode::Cancelled,
            Self::Error { .. } => StateCode::Error,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.code().is_terminal()
    }

    /// The resumption cursor, empty when not mid-phase.
    pub fn next_fetch(&self) -> &str {
        match self {
            Self::FetchingDecks { next_fetch } | Self::FetchingDecklists { next_fetch } => {
                next_fetch
            }
            Self::Error {
                resume: Some(resume),
                ..
            } => &resume.next_fetch,
            _ => "",
        }
    }

    pub fn note(&self) -> Option<&str> {
        match self {
            Self::Error { note, .. } => Some(note),
            _ => None,
        }
    }

    /// The cursor of the in-progress phase, if this state owns one.
    pub fn resume_point(&self) -> Option<ResumePoint> {
        match self {
            Self::FetchingDecks { next_fetch } => Some(ResumePoint {
                phase: CursorPhase::Decks,
                next_fetch: next_fetch.clone(),
            }),
            Self::FetchingDecklists { next_fetch } => Some(ResumePoint {
                phase: CursorPhase::Decklists,
                next_fetch: next_fetch.clone(),
            }),
            Self::Error { resume, .. } => resume.clone(),
            _ => None,
        }
    }

    /// ERROR state that keeps this state's cursor.
    pub fn errored(&self, note: impl Into<String>) -> RunState {
        RunState::Error {
            note: note.into(),
            resume: self.resume_point(),
        }
    }

    pub fn to_columns(&self) -> StateColumns<'_> {
        let (note, cursor_phase) = match self {
            Self::Error { note, resume } => (note.as_str(), resume.as_ref().map(|r| r.phase)),
            Self::FetchingDecks { .. } => ("", Some(CursorPhase::Decks)),
            Self::FetchingDecklists { .. } => ("", Some(CursorPhase::Decklists)),
            _ => ("", None),
        };

        StateColumns {
            state: self.code().as_i64(),
            note,
            next_fetch: self.next_fetch(),
            cursor_phase: cursor_phase.map(|p| p.as_str()),
        }
    }

    /// Rebuild a state from its persisted columns.
    ///
    /// An errored row with a cursor but no recorded phase resumes discovery.
    pub fn from_columns(
        code: i64,
        note: String,
        next_fetch: String,
        cursor_phase: Option<String>,
    ) -> Result<Self, InvalidState> {
        let code = StateCode::from_i64(code).ok_or(InvalidState::UnknownCode(code))?;

        let require_cursor = |next_fetch: String| {
            if next_fetch.is_empty() {
                Err(InvalidState::MissingCursor(code))
            } else {
                Ok(next_fetch)
            }
        };

        Ok(match code {
            StateCode::NotStarted => Self::NotStarted,
            StateCode::FetchingDecks => Self::FetchingDecks {
                next_fetch: require_cursor(next_fetch)?,
            },
            StateCode::DoneFetchingDecks => Self::DoneFetchingDecks,
            StateCode::FetchingDecklists => Self::FetchingDecklists {
                next_fetch: require_cursor(next_fetch)?,
            },
            StateCode::DoneFetchingDecklists => Self::DoneFetchingDecklists,
            StateCode::Complete => Self::Complete,
            StateCode::Cancelled => Self::Cancelled,
            StateCode::Error => {
                if note.trim().is_empty() {
                    return Err(InvalidState::MissingNote);
                }
                let resume = if next_fetch.is_empty() {
                    None
                } else {
                    let phase = match cursor_phase {
                        Some(p) => {
                            CursorPhase::from_str(&p).ok_or(InvalidState::UnknownPhase(p))?
                        }
                        None => CursorPhase::Decks,
                    };
                    Some(ResumePoint { phase, next_fetch })
                };
                Self::Error { note, resume }
            }
        })
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.code(), f)
    }
}

/// One attempted ingestion sweep against one data source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlRun {
    pub id: i64,
    pub start_time: DateTime<Utc>,
    /// Discovery stops at the first deck updated before this time.
    pub search_back_to: Option<DateTime<Utc>>,
    pub target: DataSource,
    pub state: RunState,
    /// Most recent entry of this run's log chain.
    pub log_tail: Option<i64>,
}

impl CrawlRun {
    /// Whether the operator may still drop the discovery cutoff.
    pub fn allows_search_infinite(&self) -> bool {
        self.state == RunState::NotStarted && self.search_back_to.is_some()
    }

    pub fn can_cancel(&self) -> bool {
        !self.state.is_terminal()
    }
}

impl fmt::Display for CrawlRun {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Run {} [{}] ({})",
            self.id,
            self.target,
            self.start_time.format("%Y-%m-%d %H:%M")
        )
    }
}
