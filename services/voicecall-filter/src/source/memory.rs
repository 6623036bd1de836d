use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
};

use tracing::debug;

use super::{ChangeCallback, ListSource, SourceError, Subscription};
use crate::policy::ListKind;

/// In-process list source. Writes notify subscribers synchronously on the
/// writer's thread.
#[derive(Clone, Default)]
pub struct MemoryListSource {
    inner: Arc<Mutex<MemoryState>>,
}

#[derive(Default)]
struct MemoryState {
    lists: HashMap<ListKind, Vec<String>>,
    callbacks: Vec<Registration>,
    next_id: u64,
    failing_fetches: HashSet<ListKind>,
    unavailable: bool,
}

struct Registration {
    id: u64,
    kind: ListKind,
    callback: Arc<ChangeCallback>,
}

struct RegistrationGuard {
    id: u64,
    state: Weak<Mutex<MemoryState>>,
}

impl Drop for RegistrationGuard {
    fn drop(&mut self) {
        if let Some(state) = self.state.upgrade() {
            lock(&state).callbacks.retain(|reg| reg.id != self.id);
        }
    }
}

impl MemoryListSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `values` under `kind` (`None` unsets the key) and fires the
    /// change callbacks registered for it.
    pub fn set_list<I, S>(&self, kind: ListKind, values: Option<I>)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let callbacks: Vec<Arc<ChangeCallback>> = {
            let mut state = lock(&self.inner);
            match values {
                Some(values) => {
                    state
                        .lists
                        .insert(kind, values.into_iter().map(Into::into).collect());
                }
                None => {
                    state.lists.remove(&kind);
                }
            }
            state
                .callbacks
                .iter()
                .filter(|reg| reg.kind == kind)
                .map(|reg| Arc::clone(&reg.callback))
                .collect()
        };

        debug!(list = %kind, subscribers = callbacks.len(), "memory source updated");
        for callback in callbacks {
            callback(kind);
        }
    }

    /// Makes the next `get_list` for `kind` fail once.
    pub fn fail_next_fetch(&self, kind: ListKind) {
        lock(&self.inner).failing_fetches.insert(kind);
    }

    /// Makes `open` fail, as if the backing store could not be reached.
    pub fn set_unavailable(&self, unavailable: bool) {
        lock(&self.inner).unavailable = unavailable;
    }

    pub fn subscriber_count(&self, kind: ListKind) -> usize {
        lock(&self.inner)
            .callbacks
            .iter()
            .filter(|reg| reg.kind == kind)
            .count()
    }
}

impl ListSource for MemoryListSource {
    fn open(&self) -> Result<(), SourceError> {
        if lock(&self.inner).unavailable {
            return Err(SourceError::Unavailable(
                "memory source marked unavailable".to_string(),
            ));
        }
        Ok(())
    }

    fn get_list(&self, kind: ListKind) -> Result<Option<Vec<String>>, SourceError> {
        let mut state = lock(&self.inner);
        if state.failing_fetches.remove(&kind) {
            return Err(SourceError::Unavailable(format!(
                "injected fetch failure for '{kind}'"
            )));
        }
        Ok(state.lists.get(&kind).cloned())
    }

    fn subscribe(
        &self,
        kind: ListKind,
        on_change: ChangeCallback,
    ) -> Result<Subscription, SourceError> {
        let mut state = lock(&self.inner);
        let id = state.next_id;
        state.next_id += 1;
        state.callbacks.push(Registration {
            id,
            kind,
            callback: Arc::new(on_change),
        });

        Ok(Subscription::new(RegistrationGuard {
            id,
            state: Arc::downgrade(&self.inner),
        }))
    }
}

fn lock(state: &Mutex<MemoryState>) -> MutexGuard<'_, MemoryState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn unset_and_empty_lists_are_distinct() {
        let source = MemoryListSource::new();
        assert_eq!(source.get_list(ListKind::Ignored).unwrap(), None);

        source.set_list(ListKind::Ignored, Some(Vec::<String>::new()));
        assert_eq!(source.get_list(ListKind::Ignored).unwrap(), Some(vec![]));

        source.set_list(ListKind::Ignored, None::<Vec<String>>);
        assert_eq!(source.get_list(ListKind::Ignored).unwrap(), None);
    }

    #[test]
    fn callbacks_fire_per_key_until_unsubscribed() {
        let source = MemoryListSource::new();
        let fired = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&fired);
        let subscription = source
            .subscribe(
                ListKind::Blocked,
                Box::new(move |kind| {
                    assert_eq!(kind, ListKind::Blocked);
                    counter.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();

        source.set_list(ListKind::Ignored, Some(["1"]));
        source.set_list(ListKind::Blocked, Some(["2"]));
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        drop(subscription);
        assert_eq!(source.subscriber_count(ListKind::Blocked), 0);
        source.set_list(ListKind::Blocked, Some(["3"]));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn injected_fetch_failure_happens_once() {
        let source = MemoryListSource::new();
        source.set_list(ListKind::Ignored, Some(["123"]));
        source.fail_next_fetch(ListKind::Ignored);

        assert!(matches!(
            source.get_list(ListKind::Ignored),
            Err(SourceError::Unavailable(_))
        ));
        assert_eq!(
            source.get_list(ListKind::Ignored).unwrap(),
            Some(vec!["123".to_string()])
        );
    }
}
