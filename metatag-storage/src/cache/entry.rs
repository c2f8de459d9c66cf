//! Cache entries and their status.

use chrono::{DateTime, Utc};
use metatag_core::LoaderError;
use serde::Serialize;
use std::rc::Rc;
use std::time::Duration;
use tokio::time::Instant;

/// Data status of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryStatus {
    /// No value has been stored yet.
    Loading,
    Success,
    /// The last fetch failed.
    Error,
}

/// Fetch activity of an entry, independent of [`QueryStatus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchStatus {
    Fetching,
    /// Invalidated with nobody observing; refetches on the next observe.
    Paused,
    Idle,
}

/// One cached key.
#[derive(Debug)]
pub(crate) struct CacheEntry<P, V> {
    pub key: String,
    pub params: P,
    pub value: Option<Rc<V>>,
    pub status: QueryStatus,
    pub fetch_status: FetchStatus,
    pub observer_count: usize,
    pub invalidated: bool,
    pub updated_at: Option<DateTime<Utc>>,
    pub fetched_at: Option<Instant>,
    pub error: Option<LoaderError>,
    /// Distinguishes this entry from earlier entries under the same key.
    pub generation: u64,
    /// Bumped on every stored value; a fetch started before a later write
    /// does not overwrite it.
    pub writes: u64,
    /// Removal deadline while nobody observes the entry.
    pub release_deadline: Option<Instant>,
}

impl<P, V> CacheEntry<P, V> {
    pub fn new(key: String, params: P, generation: u64) -> Self {
        Self {
            key,
            params,
            value: None,
            status: QueryStatus::Loading,
            fetch_status: FetchStatus::Idle,
            observer_count: 0,
            invalidated: false,
            updated_at: None,
            fetched_at: None,
            error: None,
            generation,
            writes: 0,
            release_deadline: None,
        }
    }

    /// Whether a read should go back to the loader.
    pub fn is_stale(&self, stale_time: Option<Duration>) -> bool {
        if self.invalidated || self.value.is_none() {
            return true;
        }
        match (stale_time, self.fetched_at) {
            (Some(limit), Some(at)) => at.elapsed() >= limit,
            _ => false,
        }
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        self.observer_count == 0
            && self.fetch_status != FetchStatus::Fetching
            && self.release_deadline.is_some_and(|deadline| deadline <= now)
    }

    pub fn snapshot(&self) -> QuerySnapshot<V> {
        QuerySnapshot {
            key: self.key.clone(),
            value: self.value.clone(),
            status: self.status,
            fetch_status: self.fetch_status,
            observer_count: self.observer_count,
            invalidated: self.invalidated,
            updated_at: self.updated_at,
            error: self.error.clone(),
        }
    }
}

/// Point-in-time view of an entry.
#[derive(Debug)]
pub struct QuerySnapshot<V> {
    pub key: String,
    pub value: Option<Rc<V>>,
    pub status: QueryStatus,
    pub fetch_status: FetchStatus,
    pub observer_count: usize,
    pub invalidated: bool,
    pub updated_at: Option<DateTime<Utc>>,
    pub error: Option<LoaderError>,
}

impl<V> Clone for QuerySnapshot<V> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            value: self.value.clone(),
            status: self.status,
            fetch_status: self.fetch_status,
            observer_count: self.observer_count,
            invalidated: self.invalidated,
            updated_at: self.updated_at,
            error: self.error.clone(),
        }
    }
}

impl<V> QuerySnapshot<V> {
    /// Snapshot of a key the store has no entry for.
    pub fn absent(key: String) -> Self {
        Self {
            key,
            value: None,
            status: QueryStatus::Loading,
            fetch_status: FetchStatus::Idle,
            observer_count: 0,
            invalidated: false,
            updated_at: None,
            error: None,
        }
    }

    pub fn is_loading(&self) -> bool {
        self.status == QueryStatus::Loading
    }

    pub fn is_success(&self) -> bool {
        self.status == QueryStatus::Success
    }

    pub fn is_error(&self) -> bool {
        self.status == QueryStatus::Error
    }

    pub fn is_fetching(&self) -> bool {
        self.fetch_status == FetchStatus::Fetching
    }
}

/// Whether two optional values are the same allocation (or both absent).
pub fn same_ref<V>(a: &Option<Rc<V>>, b: &Option<Rc<V>>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => Rc::ptr_eq(a, b),
        _ => false,
    }
}
