use std::{fmt, str::FromStr, sync::Arc};

use serde::{Deserialize, Serialize};
use thiserror::Error;

mod store;
mod synchronizer;

pub use store::{ListChanges, PolicyStore};
pub use synchronizer::SyncState;

pub const IGNORED_NUMBERS_KEY: &str = "ignored-numbers";
pub const BLOCKED_NUMBERS_KEY: &str = "blocked-numbers";

/// Snapshot of one configured list. Cloning is cheap; the entries are shared.
pub type FilterList = Arc<[String]>;

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("policy store has been shut down")]
    StoreClosed,
    #[error("unknown list key '{0}'")]
    UnknownList(String),
}

/// Outcome of evaluating one incoming call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Continue,
    Ignore,
    Hangup,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ListKind {
    #[serde(rename = "ignored-numbers")]
    Ignored,
    #[serde(rename = "blocked-numbers")]
    Blocked,
}

impl ListKind {
    pub const ALL: [ListKind; 2] = [ListKind::Ignored, ListKind::Blocked];

    pub fn key(self) -> &'static str {
        match self {
            ListKind::Ignored => IGNORED_NUMBERS_KEY,
            ListKind::Blocked => BLOCKED_NUMBERS_KEY,
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            ListKind::Ignored => 0,
            ListKind::Blocked => 1,
        }
    }
}

impl fmt::Display for ListKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for ListKind {
    type Err = PolicyError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            IGNORED_NUMBERS_KEY => Ok(ListKind::Ignored),
            BLOCKED_NUMBERS_KEY => Ok(ListKind::Blocked),
            other => Err(PolicyError::UnknownList(other.to_string())),
        }
    }
}
