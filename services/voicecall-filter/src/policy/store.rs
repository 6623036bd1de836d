use std::sync::{Arc, RwLock};

use tokio::sync::watch;
use tracing::{debug, error};

use super::{
    synchronizer::{ListSynchronizer, SyncState},
    Decision, FilterList, ListKind, PolicyError,
};
use crate::source::ListSource;

/// The two lists as last fetched from the source. `None` means unset.
#[derive(Debug, Default)]
pub(super) struct PolicySnapshot {
    lists: [Option<FilterList>; 2],
}

impl PolicySnapshot {
    pub(super) fn replace(&mut self, kind: ListKind, list: Option<Vec<String>>) {
        self.lists[kind.index()] = list.map(FilterList::from);
    }

    fn get(&self, kind: ListKind) -> Option<&FilterList> {
        self.lists[kind.index()].as_ref()
    }

    fn contains(&self, kind: ListKind, number: &str) -> bool {
        self.get(kind)
            .is_some_and(|list| list.iter().any(|entry| entry == number))
    }

    fn clear(&mut self) {
        self.lists = Default::default();
    }
}

/// Call-admission policy backed by the ignored and blocked number lists.
///
/// Construction starts a background synchronizer that keeps the lists in
/// step with the [`ListSource`]. Evaluation and the accessors only ever read
/// memory already held by the store. If the source cannot be reached the
/// lists stay empty and every call continues.
pub struct PolicyStore {
    snapshot: Arc<RwLock<PolicySnapshot>>,
    changes: [watch::Receiver<()>; 2],
    synchronizer: ListSynchronizer,
}

impl PolicyStore {
    pub fn new(source: Arc<dyn ListSource>) -> Self {
        let snapshot = Arc::new(RwLock::new(PolicySnapshot::default()));
        let (ignored_tx, ignored_rx) = watch::channel(());
        let (blocked_tx, blocked_rx) = watch::channel(());

        let synchronizer =
            ListSynchronizer::start(Arc::clone(&snapshot), source, [ignored_tx, blocked_tx]);

        Self {
            snapshot,
            changes: [ignored_rx, blocked_rx],
            synchronizer,
        }
    }

    /// Decides what to do with an incoming call from `number`.
    ///
    /// The ignored list is checked first, so a number present in both lists
    /// is ignored rather than hung up on.
    pub fn evaluate(&self, number: &str) -> Decision {
        let decision = match self.snapshot.read() {
            Ok(snapshot) => {
                if snapshot.contains(ListKind::Ignored, number) {
                    Decision::Ignore
                } else if snapshot.contains(ListKind::Blocked, number) {
                    Decision::Hangup
                } else {
                    Decision::Continue
                }
            }
            Err(_) => {
                error!(number, "policy snapshot lock poisoned; letting call through");
                Decision::Continue
            }
        };

        debug!(number, decision = ?decision, "incoming call evaluated");
        decision
    }

    /// Current list for `kind`, or `None` when it is unset or empty.
    pub fn numbers(&self, kind: ListKind) -> Option<FilterList> {
        let snapshot = self.snapshot.read().ok()?;
        snapshot
            .get(kind)
            .filter(|list| !list.is_empty())
            .map(Arc::clone)
    }

    pub fn ignored_numbers(&self) -> Option<FilterList> {
        self.numbers(ListKind::Ignored)
    }

    pub fn blocked_numbers(&self) -> Option<FilterList> {
        self.numbers(ListKind::Blocked)
    }

    /// Observer handle for "list changed" signals on `kind`. Only changes
    /// published after this call are reported.
    pub fn subscribe(&self, kind: ListKind) -> ListChanges {
        let mut receiver = self.changes[kind.index()].clone();
        receiver.borrow_and_update();
        ListChanges { receiver }
    }

    pub fn state(&self) -> SyncState {
        self.synchronizer.state()
    }

    /// Every state the synchronizer has passed through, oldest first.
    pub fn state_history(&self) -> Vec<SyncState> {
        self.synchronizer.history()
    }

    /// Resolves once the initial load and subscription are done, or once the
    /// synchronizer has given up.
    pub async fn ready(&self) -> SyncState {
        self.synchronizer.ready().await
    }

    /// Stops and joins the synchronizer, then drops the lists. Calling it
    /// again is a no-op.
    pub fn shutdown(&self) {
        self.synchronizer.stop();

        match self.snapshot.write() {
            Ok(mut snapshot) => snapshot.clear(),
            Err(poisoned) => poisoned.into_inner().clear(),
        }
    }
}

impl Drop for PolicyStore {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Payload-less change signal for one list. Consecutive changes that were not
/// yet observed collapse into one; read the new value through the store.
#[derive(Debug, Clone)]
pub struct ListChanges {
    receiver: watch::Receiver<()>,
}

impl ListChanges {
    /// Waits for the next change. Fails once the synchronizer has stopped.
    pub async fn changed(&mut self) -> Result<(), PolicyError> {
        self.receiver
            .changed()
            .await
            .map_err(|_| PolicyError::StoreClosed)
    }

    pub fn has_changed(&self) -> Result<bool, PolicyError> {
        self.receiver
            .has_changed()
            .map_err(|_| PolicyError::StoreClosed)
    }
}
