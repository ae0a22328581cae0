//! Resumption cursors and the discovery cutoff.

use std::fmt;

use chrono::{DateTime, Utc};

use super::driver::DeckRef;

const LEDGER_PREFIX: &str = "ledger:";

/// Position within a run's own ledger: the id of the last entry processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerCursor(pub i64);

impl LedgerCursor {
    pub const START: LedgerCursor = LedgerCursor(0);

    pub fn parse(s: &str) -> Option<Self> {
        let id = s.strip_prefix(LEDGER_PREFIX)?.parse::<i64>().ok()?;
        (id >= 0).then_some(Self(id))
    }
}

impl fmt::Display for LedgerCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{LEDGER_PREFIX}{}", self.0)
    }
}

/// A discovery page split at the cutoff.
#[derive(Debug, Default)]
pub struct CutoffSplit {
    /// Items before the first one older than the cutoff.
    pub accepted: Vec<DeckRef>,
    /// Whether an item older than the cutoff was found.
    pub reached: bool,
}

/// Keep items up to the first one updated strictly before `cutoff`.
pub fn split_at_cutoff(items: Vec<DeckRef>, cutoff: Option<DateTime<Utc>>) -> CutoffSplit {
    let Some(cutoff) = cutoff else {
        return CutoffSplit {
            accepted: items,
            reached: false,
        };
    };

    match items.iter().position(|item| item.updated_time < cutoff) {
        Some(stop) => {
            let mut accepted = items;
            accepted.truncate(stop);
            CutoffSplit {
                accepted,
                reached: true,
            }
        }
        None => CutoffSplit {
            accepted: items,
            reached: false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn deck(url: &str, y: i32, m: u32, d: u32) -> DeckRef {
        DeckRef {
            url: url.to_string(),
            updated_time: Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_ledger_cursor_parse() {
        assert_eq!(LedgerCursor::parse("ledger:0"), Some(LedgerCursor::START));
        assert_eq!(LedgerCursor::parse("ledger:42"), Some(LedgerCursor(42)));
        assert_eq!(LedgerCursor(42).to_string(), "ledger:42");
        assert_eq!(LedgerCursor::parse("ledger:-1"), None);
        assert_eq!(LedgerCursor::parse("ledger:"), None);
        assert_eq!(LedgerCursor::parse("https://example.com/?page=2"), None);
    }

    #[test]
    fn test_split_stops_at_first_old_item() {
        let cutoff = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let page = vec![
            deck("a", 2024, 3, 1),
            deck("b", 2023, 12, 1),
            deck("c", 2024, 2, 1),
        ];

        let split = split_at_cutoff(page, Some(cutoff));
        assert!(split.reached);
        assert_eq!(split.accepted, vec![deck("a", 2024, 3, 1)]);
    }

    #[test]
    fn test_item_at_cutoff_is_kept() {
        let cutoff = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let split = split_at_cutoff(vec![deck("a", 2024, 1, 1)], Some(cutoff));
        assert!(!split.reached);
        assert_eq!(split.accepted.len(), 1);
    }

    #[test]
    fn test_no_cutoff_keeps_everything() {
        let split = split_at_cutoff(vec![deck("a", 1999, 1, 1)], None);
        assert!(!split.reached);
        assert_eq!(split.accepted.len(), 1);
    }
}
