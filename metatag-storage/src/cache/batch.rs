//! Aggregate observation of several keys.

use super::entry::{same_ref, FetchStatus, QuerySnapshot, QueryStatus};
use super::event::{CacheEvent, CacheEventKind};
use super::observer::Observer;
use super::store::{CacheStore, WeakCacheStore};
use metatag_core::LoaderError;
use metatag_events::BoundListener;
use serde::Serialize;
use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

/// Combined state of a list of keys, aligned with the observed list.
#[derive(Debug)]
pub struct BatchSnapshot<V> {
    pub data: Vec<Option<Rc<V>>>,
    pub errors: Vec<Option<LoaderError>>,
    /// `Loading` if any key is loading, `Success` if all are, else `Error`.
    pub status: QueryStatus,
    /// `Fetching` if any key is fetching, `Idle` if all are, else `Paused`.
    pub fetch_status: FetchStatus,
}

impl<V> BatchSnapshot<V> {
    pub fn from_snapshots(snapshots: &[QuerySnapshot<V>]) -> Self {
        let status = if snapshots.iter().any(QuerySnapshot::is_loading) {
            QueryStatus::Loading
        } else if snapshots.iter().all(QuerySnapshot::is_success) {
            QueryStatus::Success
        } else {
            QueryStatus::Error
        };
        let fetch_status = if snapshots.iter().any(QuerySnapshot::is_fetching) {
            FetchStatus::Fetching
        } else if snapshots.iter().all(|s| s.fetch_status == FetchStatus::Idle) {
            FetchStatus::Idle
        } else {
            FetchStatus::Paused
        };
        Self {
            data: snapshots.iter().map(|s| s.value.clone()).collect(),
            errors: snapshots.iter().map(|s| s.error.clone()).collect(),
            status,
            fetch_status,
        }
    }

    /// Whether both aggregates hold the same allocations and statuses.
    pub fn same_as(&self, other: &Self) -> bool {
        self.status == other.status
            && self.fetch_status == other.fetch_status
            && self.errors == other.errors
            && compare_by_ref(&self.data, &other.data)
    }
}

/// Position-wise identity comparison of optional values.
pub fn compare_by_ref<V>(old: &[Option<Rc<V>>], new: &[Option<Rc<V>>]) -> bool {
    old.len() == new.len() && old.iter().zip(new).all(|(a, b)| same_ref(a, b))
}

struct Aggregate<P, V> {
    store: WeakCacheStore<P, V>,
    keys: Vec<String>,
    members: HashSet<String>,
    current: RefCell<Rc<BatchSnapshot<V>>>,
    version: Cell<u64>,
}

impl<P, V> Aggregate<P, V>
where
    P: Serialize + Clone + 'static,
    V: 'static,
{
    fn refresh(&self) -> Rc<BatchSnapshot<V>> {
        let Some(store) = self.store.upgrade() else {
            return Rc::clone(&self.current.borrow());
        };
        let snapshots: Vec<QuerySnapshot<V>> =
            self.keys.iter().map(|k| store.snapshot_by_key(k)).collect();
        let next = BatchSnapshot::from_snapshots(&snapshots);
        let mut current = self.current.borrow_mut();
        if !current.same_as(&next) {
            *current = Rc::new(next);
            self.version.set(self.version.get() + 1);
        }
        Rc::clone(&current)
    }

    fn on_event(&self, event: &CacheEvent<P, V>) {
        if self.members.contains(event.key()) {
            self.refresh();
        }
    }
}

/// Observes a list of keys and keeps an aggregate [`BatchSnapshot`].
///
/// The aggregate is recomputed whenever one of the keys changes status or
/// data. An unchanged recomputation keeps the previous allocation, so
/// callers can compare snapshots with `Rc::ptr_eq`.
pub struct BatchObserver<P, V>
where
    P: Serialize + Clone + 'static,
    V: 'static,
{
    observers: Vec<Observer<P, V>>,
    aggregate: Rc<Aggregate<P, V>>,
    _listeners: Vec<BoundListener<CacheEventKind, CacheEvent<P, V>, ()>>,
}

impl<P, V> BatchObserver<P, V>
where
    P: Serialize + Clone + 'static,
    V: 'static,
{
    pub(crate) fn new(store: &CacheStore<P, V>, list: Vec<P>) -> Self {
        let keys: Vec<String> = list.iter().map(|p| store.key_of(p)).collect();
        let aggregate = Rc::new(Aggregate {
            store: store.downgrade(),
            members: keys.iter().cloned().collect(),
            current: RefCell::new(Rc::new(BatchSnapshot::from_snapshots(&[]))),
            keys,
            version: Cell::new(0),
        });

        let listeners = [
            CacheEventKind::QueryAdded,
            CacheEventKind::QueryUpdated,
            CacheEventKind::QueryRemoved,
            CacheEventKind::DataChange,
        ]
        .into_iter()
        .map(|kind| {
            let weak = Rc::downgrade(&aggregate);
            BoundListener::attach_sync(store.events(), kind, move |event: &CacheEvent<P, V>| {
                if let Some(aggregate) = weak.upgrade() {
                    aggregate.on_event(event);
                }
            })
        })
        .collect();

        let observers = list.into_iter().map(|p| store.observe(p)).collect();
        aggregate.refresh();
        Self {
            observers,
            aggregate,
            _listeners: listeners,
        }
    }

    /// Current aggregate.
    pub fn snapshot(&self) -> Rc<BatchSnapshot<V>> {
        self.aggregate.refresh()
    }

    /// Number of times the aggregate allocation has been replaced.
    pub fn version(&self) -> u64 {
        self.aggregate.version.get()
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    pub fn observers(&self) -> &[Observer<P, V>] {
        &self.observers
    }
}

impl<P, V> fmt::Debug for BatchObserver<P, V>
where
    P: Serialize + Clone + 'static,
    V: 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchObserver")
            .field("keys", &self.aggregate.keys)
            .field("version", &self.aggregate.version.get())
            .finish()
    }
}
