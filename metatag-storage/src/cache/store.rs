//! Reactive keyed cache store.
//!
//! A [`CacheStore`] owns the values of one namespace. Values are held as
//! `Rc<V>` and a `DataChange` event fires exactly when a write stores a
//! different allocation than the one it replaces; contents are never
//! compared here.
//!
//! Misses go through the namespace's [`BatchLoader`], so a store must be
//! driven from within a `tokio::task::LocalSet`.
//!
//! Entries nobody observes are released once the configured retention has
//! elapsed. Expired entries are collected before every operation that reads
//! the entry map, and [`CacheStore::spawn_gc`] collects them on a timer.

use super::batch::BatchObserver;
use super::derived::{DerivedCache, SideTable};
use super::entry::{same_ref, CacheEntry, FetchStatus, QuerySnapshot, QueryStatus};
use super::event::{CacheEvent, CacheEventKind};
use super::observer::Observer;
use super::trigger::ChangeTrigger;
use crate::loader::{BatchLoader, LoadResult};
use futures_util::future::join_all;
use metatag_core::{CacheConfig, CacheError, CacheKey, LoaderError};
use metatag_events::EventEmitter;
use serde::Serialize;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::rc::{Rc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Event hub of one store.
pub type CacheEvents<P, V> = EventEmitter<CacheEventKind, CacheEvent<P, V>>;

/// Entry and observer totals of one namespace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NamespaceStats {
    pub namespace: String,
    pub entries: usize,
    pub observers: usize,
    pub fetching: usize,
    pub invalidated: usize,
}

/// Entry state captured when a fetch starts.
#[derive(Debug, Clone, Copy)]
struct FetchTicket {
    generation: u64,
    writes: u64,
}

pub(crate) struct StoreInner<P, V> {
    namespace: String,
    config: CacheConfig,
    loader: BatchLoader<P, V>,
    entries: RefCell<HashMap<String, CacheEntry<P, V>>>,
    events: CacheEvents<P, V>,
    derived: DerivedCache,
    generations: Cell<u64>,
}

/// Cache of one namespace. Cloning yields another handle to the same store.
pub struct CacheStore<P, V> {
    inner: Rc<StoreInner<P, V>>,
}

impl<P, V> Clone for CacheStore<P, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<P, V> fmt::Debug for CacheStore<P, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheStore")
            .field("namespace", &self.inner.namespace)
            .field("entries", &self.inner.entries.borrow().len())
            .finish()
    }
}

/// Non-owning store handle.
pub struct WeakCacheStore<P, V> {
    inner: Weak<StoreInner<P, V>>,
}

impl<P, V> Clone for WeakCacheStore<P, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Weak::clone(&self.inner),
        }
    }
}

impl<P, V> WeakCacheStore<P, V> {
    pub fn upgrade(&self) -> Option<CacheStore<P, V>> {
        self.inner.upgrade().map(|inner| CacheStore { inner })
    }
}

impl<P, V> CacheStore<P, V>
where
    P: Serialize + Clone + 'static,
    V: 'static,
{
    /// Create a store for `namespace` backed by `loader`.
    pub fn new(namespace: impl Into<String>, loader: BatchLoader<P, V>, config: CacheConfig) -> Self {
        let namespace = namespace.into();
        Self {
            inner: Rc::new(StoreInner {
                events: EventEmitter::new(format!("cache:{}", namespace)),
                namespace,
                config,
                loader,
                entries: RefCell::new(HashMap::new()),
                derived: DerivedCache::new(),
                generations: Cell::new(0),
            }),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.inner.namespace
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    pub fn loader(&self) -> &BatchLoader<P, V> {
        &self.inner.loader
    }

    /// Lifecycle and data events of this store.
    pub fn events(&self) -> &CacheEvents<P, V> {
        &self.inner.events
    }

    pub fn downgrade(&self) -> WeakCacheStore<P, V> {
        WeakCacheStore {
            inner: Rc::downgrade(&self.inner),
        }
    }

    /// Canonical key of `params` in this namespace.
    pub fn key_of(&self, params: &P) -> String {
        self.inner.key_of(params)
    }

    // ========================================================================
    // READS
    // ========================================================================

    /// Current value, without subscribing or fetching.
    pub fn get(&self, params: &P) -> Option<Rc<V>> {
        self.inner.collect_garbage();
        let key = self.key_of(params);
        self.inner
            .entries
            .borrow()
            .get(&key)
            .and_then(|e| e.value.clone())
    }

    /// Current state of the entry for `params`, if there is one.
    pub fn snapshot(&self, params: &P) -> Option<QuerySnapshot<V>> {
        self.inner.collect_garbage();
        let key = self.key_of(params);
        self.inner.entries.borrow().get(&key).map(CacheEntry::snapshot)
    }

    pub(crate) fn snapshot_by_key(&self, key: &str) -> QuerySnapshot<V> {
        self.inner
            .entries
            .borrow()
            .get(key)
            .map(CacheEntry::snapshot)
            .unwrap_or_else(|| QuerySnapshot::absent(key.to_string()))
    }

    pub fn contains(&self, params: &P) -> bool {
        self.inner.collect_garbage();
        let key = self.key_of(params);
        self.inner.entries.borrow().contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.inner.collect_garbage();
        self.inner.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn observer_count(&self, params: &P) -> usize {
        let key = self.key_of(params);
        self.inner
            .entries
            .borrow()
            .get(&key)
            .map_or(0, |e| e.observer_count)
    }

    pub fn stats(&self) -> NamespaceStats {
        self.inner.stats()
    }

    // ========================================================================
    // WRITES
    // ========================================================================

    /// Store `value` for `params`. Returns whether a `DataChange` fired.
    pub fn write(&self, params: P, value: Rc<V>) -> bool {
        self.inner.collect_garbage();
        let key = self.key_of(&params);
        self.inner.commit(params, key, Some(value))
    }

    /// Store the result of `update` applied to the current value.
    ///
    /// An updater returning `None` leaves the entry untouched.
    pub fn write_with<F>(&self, params: P, update: F) -> bool
    where
        F: FnOnce(Option<&Rc<V>>) -> Option<Rc<V>>,
    {
        let current = self.get(&params);
        match update(current.as_ref()) {
            Some(next) => {
                let key = self.key_of(&params);
                self.inner.commit(params, key, Some(next))
            }
            None => false,
        }
    }

    /// Alias of [`CacheStore::write_with`].
    pub fn set<F>(&self, params: P, update: F) -> bool
    where
        F: FnOnce(Option<&Rc<V>>) -> Option<Rc<V>>,
    {
        self.write_with(params, update)
    }

    /// Delete the entry for `params`.
    pub fn remove(&self, params: &P) -> bool {
        let key = self.key_of(params);
        let removed = self.inner.entries.borrow_mut().remove(&key);
        match removed {
            Some(entry) => {
                tracing::debug!(namespace = %self.inner.namespace, key = %key, "entry removed");
                self.inner.emit_removed(entry);
                true
            }
            None => false,
        }
    }

    /// Drop every entry of this namespace.
    pub fn clear(&self) {
        self.inner.clear();
    }

    /// Mark the entry for `params` (or every entry) stale.
    ///
    /// Data is kept. Observed entries refetch right away when the config
    /// allows it; the others are paused until their next observer arrives.
    /// Returns the number of entries invalidated.
    pub fn invalidate(&self, params: Option<&P>) -> usize {
        self.inner.collect_garbage();
        let only = params.map(|p| self.key_of(p));
        let refetch_enabled = self.inner.config.refetch_on_invalidate;
        let mut updates = Vec::new();
        let mut refetch = Vec::new();
        {
            let mut entries = self.inner.entries.borrow_mut();
            for entry in entries.values_mut() {
                if only.as_ref().is_some_and(|k| *k != entry.key) {
                    continue;
                }
                entry.invalidated = true;
                if entry.observer_count > 0 {
                    if refetch_enabled && entry.fetch_status != FetchStatus::Fetching {
                        refetch.push(entry.params.clone());
                    }
                } else if entry.fetch_status != FetchStatus::Fetching {
                    entry.fetch_status = FetchStatus::Paused;
                }
                updates.push(CacheEvent::QueryUpdated {
                    key: entry.key.clone(),
                    params: entry.params.clone(),
                    status: entry.status,
                    fetch_status: entry.fetch_status,
                });
            }
        }
        let count = updates.len();
        tracing::debug!(
            namespace = %self.inner.namespace,
            invalidated = count,
            refetching = refetch.len(),
            "entries invalidated"
        );
        for event in updates {
            self.inner.emit(event);
        }
        for params in refetch {
            self.spawn_fetch(params);
        }
        count
    }

    // ========================================================================
    // FETCHES
    // ========================================================================

    /// Cached value if present and fresh, otherwise one loader round-trip.
    pub async fn fetch_query(&self, params: P) -> Result<Rc<V>, CacheError> {
        self.inner.collect_garbage();
        let key = self.key_of(&params);
        let cached = {
            let entries = self.inner.entries.borrow();
            entries.get(&key).and_then(|e| {
                if e.is_stale(self.inner.config.stale_time) {
                    None
                } else {
                    e.value.clone()
                }
            })
        };
        match cached {
            Some(value) => Ok(value),
            None => self.start_fetch(params).await,
        }
    }

    /// Always go to the loader, overwriting the entry on success.
    pub async fn fetch_remote(&self, params: P) -> Result<Rc<V>, CacheError> {
        self.start_fetch(params).await
    }

    /// [`CacheStore::fetch_query`] for many keys; failures become `None`.
    pub async fn batch_fetch_query(&self, list: Vec<P>) -> Vec<Option<Rc<V>>> {
        let results = join_all(list.into_iter().map(|p| self.fetch_query(p))).await;
        results
            .into_iter()
            .map(|result| match result {
                Ok(value) => Some(value),
                Err(e) => {
                    tracing::error!(namespace = %self.inner.namespace, error = %e, "batch_fetch_query failed");
                    None
                }
            })
            .collect()
    }

    /// [`CacheStore::fetch_remote`] for many keys. Keys that fail are
    /// invalidated and come back as `None`.
    pub async fn batch_fetch_remote(&self, list: Vec<P>) -> Vec<Option<Rc<V>>> {
        let results = join_all(list.iter().cloned().map(|p| self.fetch_remote(p))).await;
        list.iter()
            .zip(results)
            .map(|(params, result)| match result {
                Ok(value) => Some(value),
                Err(e) => {
                    tracing::warn!(namespace = %self.inner.namespace, error = %e, "batch_fetch_remote miss");
                    self.invalidate(Some(params));
                    None
                }
            })
            .collect()
    }

    /// Begin a fetch now and return the future that settles it.
    ///
    /// The load request joins the loader's current ledger before this
    /// returns.
    pub(crate) fn start_fetch(&self, params: P) -> impl Future<Output = Result<Rc<V>, CacheError>> {
        let key = self.key_of(&params);
        let ticket = self.inner.begin_fetch(&params, &key);
        let request = self.inner.loader.try_load(params.clone());
        let store = self.clone();
        async move {
            let result = request.await;
            store.inner.finish_fetch(params, key, ticket, result)
        }
    }

    /// Fetch in the background; failures are recorded on the entry.
    pub(crate) fn spawn_fetch(&self, params: P) {
        let fetch = self.start_fetch(params);
        let namespace = self.inner.namespace.clone();
        tokio::task::spawn_local(async move {
            if let Err(e) = fetch.await {
                tracing::debug!(namespace = %namespace, error = %e, "background fetch settled with error");
            }
        });
    }

    // ========================================================================
    // OBSERVERS
    // ========================================================================

    /// Subscribe to `params`.
    ///
    /// The first observer of a missing key, and any observer of a stale or
    /// paused key, triggers a fetch. The count drops again when the returned
    /// guard is dropped.
    pub fn observe(&self, params: P) -> Observer<P, V> {
        self.inner.collect_garbage();
        let key = self.key_of(&params);
        let stale_time = self.inner.config.stale_time;
        let (created, generation, previous, count, needs_fetch) = {
            let mut entries = self.inner.entries.borrow_mut();
            let created = !entries.contains_key(&key);
            let entry = entries.entry(key.clone()).or_insert_with(|| {
                CacheEntry::new(key.clone(), params.clone(), self.inner.next_generation())
            });
            let previous = entry.observer_count;
            entry.observer_count += 1;
            entry.release_deadline = None;
            let needs_fetch =
                entry.fetch_status != FetchStatus::Fetching && entry.is_stale(stale_time);
            (
                created,
                entry.generation,
                previous,
                entry.observer_count,
                needs_fetch,
            )
        };
        if created {
            self.inner.emit(CacheEvent::QueryAdded {
                key: key.clone(),
                params: params.clone(),
            });
        }
        self.inner.emit(CacheEvent::ObserverCountChange {
            key: key.clone(),
            params: params.clone(),
            count,
            previous,
        });
        if needs_fetch {
            self.spawn_fetch(params.clone());
        }
        Observer::new(self.clone(), key, params, generation)
    }

    /// Observe every key in `list` as one aggregate.
    pub fn observe_many(&self, list: Vec<P>) -> BatchObserver<P, V> {
        BatchObserver::new(self, list)
    }

    /// Observe `params` and return the side table of its current value.
    pub fn observe_with_cache(&self, params: P) -> (Observer<P, V>, Option<Rc<SideTable>>) {
        let observer = self.observe(params);
        let table = observer.value().map(|v| self.derived_cache(&v));
        (observer, table)
    }

    pub(crate) fn release(&self, key: &str, generation: u64) {
        let event = {
            let mut entries = self.inner.entries.borrow_mut();
            let Some(entry) = entries.get_mut(key) else {
                tracing::trace!(namespace = %self.inner.namespace, key, "observer outlived its entry");
                return;
            };
            if entry.generation != generation {
                return;
            }
            if entry.observer_count == 0 {
                tracing::warn!(namespace = %self.inner.namespace, key, "observer count underflow ignored");
                return;
            }
            let previous = entry.observer_count;
            entry.observer_count -= 1;
            if entry.observer_count == 0 {
                entry.release_deadline = self.inner.deadline();
            }
            CacheEvent::ObserverCountChange {
                key: entry.key.clone(),
                params: entry.params.clone(),
                count: entry.observer_count,
                previous,
            }
        };
        self.inner.emit(event);
    }

    /// Bump a counter whenever `check` accepts a `DataChange`.
    pub fn change_trigger<F>(&self, check: F) -> ChangeTrigger<P, V>
    where
        F: Fn(&P, Option<&Rc<V>>, Option<&Rc<V>>) -> bool + 'static,
    {
        ChangeTrigger::new(self, check)
    }

    // ========================================================================
    // DERIVED DATA AND RETENTION
    // ========================================================================

    /// Side table tied to the identity of `value`.
    pub fn derived_cache(&self, value: &Rc<V>) -> Rc<SideTable> {
        self.inner.derived.table_for(value)
    }

    /// Release every unobserved entry whose retention has elapsed.
    pub fn collect_garbage(&self) -> usize {
        self.inner.collect_garbage()
    }

    /// Collect garbage every `period` until the store is dropped.
    pub fn spawn_gc(&self, period: Duration) -> JoinHandle<()> {
        let weak = self.downgrade();
        tokio::task::spawn_local(async move {
            loop {
                tokio::time::sleep(period).await;
                match weak.upgrade() {
                    Some(store) => {
                        store.collect_garbage();
                    }
                    None => break,
                }
            }
        })
    }
}

impl<P, V> StoreInner<P, V>
where
    P: Serialize + Clone + 'static,
    V: 'static,
{
    fn key_of(&self, params: &P) -> String {
        CacheKey::new(self.namespace.as_str(), params).hash()
    }

    fn next_generation(&self) -> u64 {
        let next = self.generations.get() + 1;
        self.generations.set(next);
        next
    }

    fn deadline(&self) -> Option<Instant> {
        self.config.retention.map(|retention| Instant::now() + retention)
    }

    fn emit(&self, event: CacheEvent<P, V>) {
        let _ = self.events.dispatch(&event.kind(), &event);
    }

    fn emit_removed(&self, entry: CacheEntry<P, V>) {
        self.emit(CacheEvent::QueryRemoved {
            key: entry.key.clone(),
            params: entry.params.clone(),
        });
        if entry.value.is_some() {
            self.emit(CacheEvent::DataChange {
                key: entry.key,
                params: entry.params,
                new: None,
                old: entry.value,
            });
        }
    }

    /// Store a value, emitting lifecycle and change events.
    fn commit(&self, params: P, key: String, value: Option<Rc<V>>) -> bool {
        let (created, old, status, fetch_status) = {
            let mut entries = self.entries.borrow_mut();
            let created = !entries.contains_key(&key);
            let entry = entries
                .entry(key.clone())
                .or_insert_with(|| CacheEntry::new(key.clone(), params.clone(), self.next_generation()));
            let old = std::mem::replace(&mut entry.value, value.clone());
            entry.writes += 1;
            entry.status = QueryStatus::Success;
            entry.error = None;
            entry.invalidated = false;
            entry.updated_at = Some(chrono::Utc::now());
            entry.fetched_at = Some(Instant::now());
            if entry.fetch_status == FetchStatus::Paused {
                entry.fetch_status = FetchStatus::Idle;
            }
            if entry.observer_count == 0 {
                entry.release_deadline = self.deadline();
            }
            (created, old, entry.status, entry.fetch_status)
        };

        if created {
            self.emit(CacheEvent::QueryAdded {
                key: key.clone(),
                params: params.clone(),
            });
        } else {
            self.emit(CacheEvent::QueryUpdated {
                key: key.clone(),
                params: params.clone(),
                status,
                fetch_status,
            });
        }

        let changed = !same_ref(&old, &value);
        if changed {
            tracing::trace!(namespace = %self.namespace, key = %key, "data changed");
            self.emit(CacheEvent::DataChange {
                key,
                params,
                new: value,
                old,
            });
        }
        changed
    }

    /// Mark the entry as fetching, creating it if needed.
    fn begin_fetch(&self, params: &P, key: &str) -> FetchTicket {
        let (created, ticket, status) = {
            let mut entries = self.entries.borrow_mut();
            let created = !entries.contains_key(key);
            let entry = entries.entry(key.to_string()).or_insert_with(|| {
                let mut entry = CacheEntry::new(key.to_string(), params.clone(), self.next_generation());
                entry.release_deadline = self.deadline();
                entry
            });
            entry.fetch_status = FetchStatus::Fetching;
            if entry.value.is_none() {
                entry.status = QueryStatus::Loading;
            }
            let ticket = FetchTicket {
                generation: entry.generation,
                writes: entry.writes,
            };
            (created, ticket, entry.status)
        };
        tracing::debug!(namespace = %self.namespace, key, "fetch started");
        if created {
            self.emit(CacheEvent::QueryAdded {
                key: key.to_string(),
                params: params.clone(),
            });
        } else {
            self.emit(CacheEvent::QueryUpdated {
                key: key.to_string(),
                params: params.clone(),
                status,
                fetch_status: FetchStatus::Fetching,
            });
        }
        ticket
    }

    fn finish_fetch(
        &self,
        params: P,
        key: String,
        ticket: FetchTicket,
        result: LoadResult<V>,
    ) -> Result<Rc<V>, CacheError> {
        let (alive, superseded) = match self.entries.borrow().get(&key) {
            Some(entry) if entry.generation == ticket.generation => {
                (true, entry.writes != ticket.writes)
            }
            _ => (false, false),
        };
        if !alive {
            tracing::debug!(namespace = %self.namespace, key = %key, "fetch result dropped for removed entry");
            return Err(CacheError::Removed { key });
        }
        if superseded {
            return self.settle_superseded(params, key, result);
        }

        let error = match result {
            Ok(Some(value)) => {
                if let Some(entry) = self.entries.borrow_mut().get_mut(&key) {
                    entry.fetch_status = FetchStatus::Idle;
                }
                self.commit(params, key, Some(Rc::clone(&value)));
                return Ok(value);
            }
            Ok(None) => LoaderError::EmptyResult { key: key.clone() },
            Err(e) => e,
        };

        let (status, fetch_status) = {
            let mut entries = self.entries.borrow_mut();
            match entries.get_mut(&key) {
                Some(entry) => {
                    entry.status = QueryStatus::Error;
                    entry.error = Some(error.clone());
                    entry.fetch_status = FetchStatus::Idle;
                    (entry.status, entry.fetch_status)
                }
                None => (QueryStatus::Error, FetchStatus::Idle),
            }
        };
        tracing::warn!(namespace = %self.namespace, key = %key, error = %error, "fetch failed");
        self.emit(CacheEvent::QueryUpdated {
            key: key.clone(),
            params,
            status,
            fetch_status,
        });
        Err(CacheError::LoadFailed { key, source: error })
    }

    /// Settle a fetch whose entry was written while it ran: the written
    /// value stays and only the fetch status goes back to idle.
    fn settle_superseded(
        &self,
        params: P,
        key: String,
        result: LoadResult<V>,
    ) -> Result<Rc<V>, CacheError> {
        let (current, status) = {
            let mut entries = self.entries.borrow_mut();
            match entries.get_mut(&key) {
                Some(entry) => {
                    entry.fetch_status = FetchStatus::Idle;
                    (entry.value.clone(), entry.status)
                }
                None => (None, QueryStatus::Success),
            }
        };
        tracing::debug!(namespace = %self.namespace, key = %key, "fetch result dropped for newer write");
        self.emit(CacheEvent::QueryUpdated {
            key: key.clone(),
            params,
            status,
            fetch_status: FetchStatus::Idle,
        });
        match (current, result) {
            (Some(value), _) | (None, Ok(Some(value))) => Ok(value),
            (None, Ok(None)) => Err(CacheError::LoadFailed {
                source: LoaderError::EmptyResult { key: key.clone() },
                key,
            }),
            (None, Err(source)) => Err(CacheError::LoadFailed { key, source }),
        }
    }

    fn collect_garbage(&self) -> usize {
        let now = Instant::now();
        let expired: Vec<CacheEntry<P, V>> = {
            let mut entries = self.entries.borrow_mut();
            let keys: Vec<String> = entries
                .iter()
                .filter(|(_, e)| e.is_expired(now))
                .map(|(k, _)| k.clone())
                .collect();
            keys.iter().filter_map(|k| entries.remove(k)).collect()
        };
        let count = expired.len();
        if count > 0 {
            tracing::debug!(namespace = %self.namespace, released = count, "unobserved entries released");
        }
        for entry in expired {
            self.emit_removed(entry);
        }
        count
    }

    fn clear(&self) {
        let drained: Vec<CacheEntry<P, V>> = self
            .entries
            .borrow_mut()
            .drain()
            .map(|(_, entry)| entry)
            .collect();
        tracing::debug!(namespace = %self.namespace, removed = drained.len(), "namespace cleared");
        for entry in drained {
            self.emit_removed(entry);
        }
    }

    fn stats(&self) -> NamespaceStats {
        self.collect_garbage();
        let entries = self.entries.borrow();
        NamespaceStats {
            namespace: self.namespace.clone(),
            entries: entries.len(),
            observers: entries.values().map(|e| e.observer_count).sum(),
            fetching: entries
                .values()
                .filter(|e| e.fetch_status == FetchStatus::Fetching)
                .count(),
            invalidated: entries.values().filter(|e| e.invalidated).count(),
        }
    }
}

/// Type-erased view of a store, used by the client registry.
pub(crate) trait ManagedStore {
    fn namespace(&self) -> &str;
    fn stats(&self) -> NamespaceStats;
    fn clear(&self);
    fn collect_garbage(&self) -> usize;
}

impl<P, V> ManagedStore for StoreInner<P, V>
where
    P: Serialize + Clone + 'static,
    V: 'static,
{
    fn namespace(&self) -> &str {
        &self.namespace
    }

    fn stats(&self) -> NamespaceStats {
        StoreInner::stats(self)
    }

    fn clear(&self) {
        StoreInner::clear(self)
    }

    fn collect_garbage(&self) -> usize {
        StoreInner::collect_garbage(self)
    }
}

impl<P, V> CacheStore<P, V>
where
    P: Serialize + Clone + 'static,
    V: 'static,
{
    pub(crate) fn managed(&self) -> Weak<dyn ManagedStore> {
        let weak: Weak<StoreInner<P, V>> = Rc::downgrade(&self.inner);
        weak as Weak<dyn ManagedStore>
    }
}
