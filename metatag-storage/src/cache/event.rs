//! Store lifecycle and data events.

use super::entry::{FetchStatus, QueryStatus};
use std::rc::Rc;

/// Dispatch key of a [`CacheEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheEventKind {
    QueryAdded,
    QueryUpdated,
    QueryRemoved,
    ObserverCountChange,
    DataChange,
}

/// Event published by a cache store.
///
/// Every variant carries the canonical key and the parameters it was built
/// from.
#[derive(Debug)]
pub enum CacheEvent<P, V> {
    QueryAdded {
        key: String,
        params: P,
    },
    QueryUpdated {
        key: String,
        params: P,
        status: QueryStatus,
        fetch_status: FetchStatus,
    },
    QueryRemoved {
        key: String,
        params: P,
    },
    ObserverCountChange {
        key: String,
        params: P,
        count: usize,
        previous: usize,
    },
    /// The stored value became a different allocation.
    DataChange {
        key: String,
        params: P,
        new: Option<Rc<V>>,
        old: Option<Rc<V>>,
    },
}

impl<P, V> CacheEvent<P, V> {
    pub fn kind(&self) -> CacheEventKind {
        match self {
            CacheEvent::QueryAdded { .. } => CacheEventKind::QueryAdded,
            CacheEvent::QueryUpdated { .. } => CacheEventKind::QueryUpdated,
            CacheEvent::QueryRemoved { .. } => CacheEventKind::QueryRemoved,
            CacheEvent::ObserverCountChange { .. } => CacheEventKind::ObserverCountChange,
            CacheEvent::DataChange { .. } => CacheEventKind::DataChange,
        }
    }

    pub fn key(&self) -> &str {
        match self {
            CacheEvent::QueryAdded { key, .. }
            | CacheEvent::QueryUpdated { key, .. }
            | CacheEvent::QueryRemoved { key, .. }
            | CacheEvent::ObserverCountChange { key, .. }
            | CacheEvent::DataChange { key, .. } => key,
        }
    }

    pub fn params(&self) -> &P {
        match self {
            CacheEvent::QueryAdded { params, .. }
            | CacheEvent::QueryUpdated { params, .. }
            | CacheEvent::QueryRemoved { params, .. }
            | CacheEvent::ObserverCountChange { params, .. }
            | CacheEvent::DataChange { params, .. } => params,
        }
    }
}
