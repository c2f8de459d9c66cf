//! METATAG Storage - Loader, Cache and Tag Tree
//!
//! The runtime half of metatag: a deduplicating batch loader, a reactive
//! keyed cache built on it, and the tag tree operation table with its
//! persistence backends. Everything here is single-threaded and expects to
//! run inside a `tokio::task::LocalSet`.

pub mod cache;
pub mod loader;
pub mod persist;
pub mod tag_tree;
pub mod telemetry;

pub use cache::{
    compare_by_ref, same_ref, BatchObserver, BatchSnapshot, CacheClient, CacheEvent,
    CacheEventKind, CacheEvents, CacheStore, ChangeTrigger, ClientStats, DerivedCache,
    FetchStatus, NamespaceStats, Observer, QuerySnapshot, QueryStatus, SideTable,
    WeakCacheStore,
};
pub use loader::{
    BatchFetch, BatchLoadHelper, BatchLoadTicket, BatchLoader, BatchLoaderBuilder, FnBatchFetch,
    FnFetch, LoadHooks, LoadResult, NoHooks, Proxy, SingleFetch,
};
pub use persist::{decode_tree, encode_tree, FileStorage, MemoryStorage, TreeStorage};
pub use tag_tree::{FlatView, TagTree, TreeStore, TAG_TREE_NAMESPACE};
pub use telemetry::init_tracing;
