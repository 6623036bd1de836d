use std::{
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock},
    thread::{self, JoinHandle},
};

use serde::Serialize;
use tokio::{
    runtime::Builder,
    sync::{watch, Notify},
};
use tracing::{debug, error, info, warn};

use super::{store::PolicySnapshot, ListKind};
use crate::source::{ListSource, Subscription};

const THREAD_NAME: &str = "list-sync";

/// Lifecycle of the background synchronizer. `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    Starting,
    Subscribing,
    Waiting,
    Stopping,
    Stopped,
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncState::Starting => "starting",
            SyncState::Subscribing => "subscribing",
            SyncState::Waiting => "waiting",
            SyncState::Stopping => "stopping",
            SyncState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

struct Lifecycle {
    stop_requested: bool,
    state: SyncState,
    history: Vec<SyncState>,
}

/// Lists whose source reported a change that has not been fetched yet. One
/// flag per list, so repeated notifications collapse into a single fetch.
#[derive(Default)]
struct PendingChanges {
    lists: Mutex<[bool; 2]>,
    notify: Notify,
}

impl PendingChanges {
    fn mark(&self, kind: ListKind) {
        self.lists.lock().unwrap_or_else(PoisonError::into_inner)[kind.index()] = true;
        self.notify.notify_one();
    }

    fn take(&self) -> [bool; 2] {
        std::mem::take(&mut *self.lists.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

/// Stop flag and state, shared between the store and the worker thread.
struct SyncControl {
    lifecycle: Mutex<Lifecycle>,
    wake: Notify,
    state_tx: watch::Sender<SyncState>,
}

impl SyncControl {
    fn new() -> Self {
        let (state_tx, _) = watch::channel(SyncState::Starting);
        Self {
            lifecycle: Mutex::new(Lifecycle {
                stop_requested: false,
                state: SyncState::Starting,
                history: vec![SyncState::Starting],
            }),
            wake: Notify::new(),
            state_tx,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, lifecycle: &mut Lifecycle, next: SyncState) {
        if lifecycle.state == next || lifecycle.state == SyncState::Stopped {
            return;
        }
        debug!(from = %lifecycle.state, to = %next, "list synchronizer state change");
        lifecycle.state = next;
        lifecycle.history.push(next);
        self.state_tx.send_replace(next);
    }

    /// Moves to `next` unless a stop was requested, in which case the worker
    /// moves to `Stopping` instead and must unwind.
    fn advance(&self, next: SyncState) -> bool {
        let mut lifecycle = self.lock();
        if lifecycle.stop_requested {
            self.set_state(&mut lifecycle, SyncState::Stopping);
            return false;
        }
        self.set_state(&mut lifecycle, next);
        true
    }

    fn transition(&self, next: SyncState) {
        let mut lifecycle = self.lock();
        self.set_state(&mut lifecycle, next);
    }

    fn stop_requested(&self) -> bool {
        self.lock().stop_requested
    }

    fn request_stop(&self) {
        self.lock().stop_requested = true;
        // Leaves a permit behind if the worker is not parked yet.
        self.wake.notify_one();
    }

    fn state(&self) -> SyncState {
        self.lock().state
    }

    fn history(&self) -> Vec<SyncState> {
        self.lock().history.clone()
    }
}

/// Owns the background thread that mirrors the source into the snapshot.
pub(super) struct ListSynchronizer {
    control: Arc<SyncControl>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl ListSynchronizer {
    pub(super) fn start(
        snapshot: Arc<RwLock<PolicySnapshot>>,
        source: Arc<dyn ListSource>,
        publishers: [watch::Sender<()>; 2],
    ) -> Self {
        let control = Arc::new(SyncControl::new());
        let worker = Worker {
            snapshot,
            source,
            publishers,
            control: Arc::clone(&control),
        };

        let handle = match thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn(move || worker.run())
        {
            Ok(handle) => Some(handle),
            Err(err) => {
                error!(
                    error = %err,
                    "failed to spawn list synchronizer; number lists stay empty"
                );
                control.transition(SyncState::Stopped);
                None
            }
        };

        Self {
            control,
            worker: Mutex::new(handle),
        }
    }

    pub(super) fn state(&self) -> SyncState {
        self.control.state()
    }

    pub(super) fn history(&self) -> Vec<SyncState> {
        self.control.history()
    }

    pub(super) async fn ready(&self) -> SyncState {
        let mut state_rx = self.control.state_tx.subscribe();
        let result = state_rx
            .wait_for(|state| matches!(state, SyncState::Waiting | SyncState::Stopped))
            .await
            .map(|state| *state);
        result.unwrap_or(SyncState::Stopped)
    }

    /// Requests a stop and joins the worker. Later calls return immediately.
    pub(super) fn stop(&self) {
        let handle = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(handle) = handle else {
            return;
        };

        self.control.request_stop();

        if handle.join().is_err() {
            error!("list synchronizer thread panicked");
            self.control.transition(SyncState::Stopped);
        }
        info!("list synchronizer stopped");
    }
}

struct Worker {
    snapshot: Arc<RwLock<PolicySnapshot>>,
    source: Arc<dyn ListSource>,
    publishers: [watch::Sender<()>; 2],
    control: Arc<SyncControl>,
}

impl Worker {
    fn run(self) {
        let control = Arc::clone(&self.control);
        match Builder::new_current_thread().enable_all().build() {
            Ok(runtime) => runtime.block_on(self.sync()),
            Err(err) => {
                error!(
                    error = %err,
                    "failed to build synchronizer runtime; number lists stay empty"
                );
            }
        }
        control.transition(SyncState::Stopped);
    }

    async fn sync(self) {
        if let Err(err) = self.source.open() {
            warn!(error = %err, "list source unavailable; number lists stay empty");
            self.control.transition(SyncState::Stopping);
            return;
        }

        if !self.control.advance(SyncState::Subscribing) {
            return;
        }

        // Subscribe before the initial fetch so a change racing the fetch is
        // left pending instead of lost.
        let pending = Arc::new(PendingChanges::default());
        let mut subscriptions: Vec<Subscription> = Vec::with_capacity(ListKind::ALL.len());
        for kind in ListKind::ALL {
            let pending = Arc::clone(&pending);
            let on_change = Box::new(move |changed: ListKind| pending.mark(changed));
            match self.source.subscribe(kind, on_change) {
                Ok(subscription) => subscriptions.push(subscription),
                Err(err) => warn!(
                    list = %kind,
                    error = %err,
                    "failed to subscribe; list will not follow source changes"
                ),
            }
        }

        if !self.refresh_lists([true; 2]) {
            self.control.transition(SyncState::Stopping);
            return;
        }

        if !self.control.advance(SyncState::Waiting) {
            return;
        }
        info!(
            subscriptions = subscriptions.len(),
            "list synchronizer waiting for changes"
        );

        loop {
            tokio::select! {
                biased;
                _ = self.control.wake.notified() => {
                    if self.control.stop_requested() {
                        break;
                    }
                }
                _ = pending.notify.notified() => {
                    if !self.refresh_lists(pending.take()) {
                        break;
                    }
                }
            }
        }

        self.control.transition(SyncState::Stopping);
        drop(subscriptions);
    }

    /// Refreshes every flagged list. Returns `false` without fetching further
    /// once a stop has been requested.
    fn refresh_lists(&self, flagged: [bool; 2]) -> bool {
        for kind in ListKind::ALL {
            if !flagged[kind.index()] {
                continue;
            }
            if self.control.stop_requested() {
                debug!(list = %kind, "stop requested; skipping fetch");
                return false;
            }
            self.refresh(kind);
        }
        true
    }

    /// Fetches `kind`, swaps it into the snapshot, then signals observers.
    fn refresh(&self, kind: ListKind) {
        let list = match self.source.get_list(kind) {
            Ok(list) => list,
            Err(err) => {
                warn!(list = %kind, error = %err, "failed to fetch list; treating as unset");
                None
            }
        };
        let entries = list.as_ref().map_or(0, Vec::len);

        match self.snapshot.write() {
            Ok(mut snapshot) => snapshot.replace(kind, list),
            Err(_) => {
                error!(list = %kind, "policy snapshot lock poisoned; update dropped");
                return;
            }
        }

        debug!(list = %kind, entries, "list snapshot replaced");
        self.publishers[kind.index()].send_replace(());
    }
}
