use std::{io, path::PathBuf};

use thiserror::Error;

use crate::policy::ListKind;

mod file;
mod memory;

pub use file::FileListSource;
pub use memory::MemoryListSource;

/// Invoked by a source whenever the value behind a key may have changed.
pub type ChangeCallback = Box<dyn Fn(ListKind) + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("configuration source unavailable: {0}")]
    Unavailable(String),
    #[error("malformed value for '{key}': {reason}")]
    Malformed { key: &'static str, reason: String },
    #[error("failed to watch '{path}'")]
    Watch {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },
    #[error("failed to read '{path}'")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Keeps a change registration alive. Dropping it unregisters the callback.
pub struct Subscription {
    _guard: Option<Box<dyn Send>>,
}

impl Subscription {
    pub fn new<G: Send + 'static>(guard: G) -> Self {
        Self {
            _guard: Some(Box::new(guard)),
        }
    }

    /// A registration that never fires.
    pub fn inert() -> Self {
        Self { _guard: None }
    }
}

/// Push-notifying store the filter lists are read from.
///
/// Implementations are called from the synchronizer thread only. Change
/// callbacks may fire on any thread.
pub trait ListSource: Send + Sync + 'static {
    fn open(&self) -> Result<(), SourceError> {
        Ok(())
    }

    /// Returns `Ok(None)` when the key is unset.
    fn get_list(&self, kind: ListKind) -> Result<Option<Vec<String>>, SourceError>;

    fn subscribe(
        &self,
        kind: ListKind,
        on_change: ChangeCallback,
    ) -> Result<Subscription, SourceError>;
}
