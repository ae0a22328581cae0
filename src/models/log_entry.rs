use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One diagnostic record in an append-only chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: i64,
    pub created: DateTime<Utc>,
    pub message: String,
    /// The entry this one follows; `None` for a chain head.
    pub follows: Option<i64>,
}

impl LogEntry {
    pub fn is_head(&self) -> bool {
        self.follows.is_none()
    }
}
