//! Reactive keyed cache.
//!
//! One [`CacheStore`] per namespace, created through a [`CacheClient`].
//! Stores publish [`CacheEvent`]s on a [`metatag_events::EventEmitter`];
//! [`Observer`], [`BatchObserver`] and [`ChangeTrigger`] are the subscriber
//! side.

mod batch;
mod client;
mod derived;
mod entry;
mod event;
mod observer;
mod store;
mod trigger;

pub use batch::{compare_by_ref, BatchObserver, BatchSnapshot};
pub use client::{CacheClient, ClientStats};
pub use derived::{DerivedCache, SideTable};
pub use entry::{same_ref, FetchStatus, QuerySnapshot, QueryStatus};
pub use event::{CacheEvent, CacheEventKind};
pub use observer::Observer;
pub use store::{CacheEvents, CacheStore, NamespaceStats, WeakCacheStore};
pub use trigger::ChangeTrigger;
