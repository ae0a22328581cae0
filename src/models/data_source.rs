//! External deck sources a crawl run can target.

use std::fmt;

use serde::{Deserialize, Serialize};

/// External data source crawled by a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    Archidekt,
    Moxfield,
}

impl DataSource {
    pub const ALL: [DataSource; 2] = [Self::Archidekt, Self::Moxfield];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Archidekt => "archidekt",
            Self::Moxfield => "moxfield",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "archidekt" => Some(Self::Archidekt),
            "moxfield" => Some(Self::Moxfield),
            _ => None,
        }
    }

    /// Human-readable name.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Archidekt => "Archidekt",
            Self::Moxfield => "Moxfield",
        }
    }
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}
