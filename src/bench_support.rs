use std::sync::Arc;

use tokio::runtime::Runtime;
use tracing::debug;
use voicecall_filter::{ListKind, MemoryListSource, PolicyStore, SyncState};

// Re-export so benches only need this crate.
pub use voicecall_filter;

pub struct FilterBenchFixture {
    pub store: Arc<PolicyStore>,
    pub source: MemoryListSource,
    pub ignored: Vec<String>,
    pub blocked: Vec<String>,
}

impl FilterBenchFixture {
    /// Store whose lists hold `ignored_len` and `blocked_len` distinct
    /// numbers, loaded before the synchronizer starts.
    pub fn new(ignored_len: usize, blocked_len: usize) -> Self {
        let ignored = numbers("06", ignored_len);
        let blocked = numbers("+336", blocked_len);

        let source = MemoryListSource::new();
        source.set_list(ListKind::Ignored, Some(ignored.clone()));
        source.set_list(ListKind::Blocked, Some(blocked.clone()));

        let store = Arc::new(PolicyStore::new(Arc::new(source.clone())));
        let runtime = Runtime::new().expect("tokio runtime");
        let state = runtime.block_on(store.ready());
        assert_eq!(state, SyncState::Waiting, "synchronizer failed to start");
        debug!(ignored_len, blocked_len, "bench fixture ready");

        Self {
            store,
            source,
            ignored,
            blocked,
        }
    }

    /// Last entry of the ignored list, the slowest ignored hit.
    pub fn last_ignored(&self) -> &str {
        self.ignored.last().map(String::as_str).unwrap_or_default()
    }

    /// Last entry of the blocked list, scanned after the whole ignored list.
    pub fn last_blocked(&self) -> &str {
        self.blocked.last().map(String::as_str).unwrap_or_default()
    }
}

fn numbers(prefix: &str, count: usize) -> Vec<String> {
    (0..count).map(|idx| format!("{prefix}{idx:08}")).collect()
}
