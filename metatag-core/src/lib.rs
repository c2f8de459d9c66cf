//! METATAG Core - Shared Types
//!
//! Error taxonomy, configuration, cache-key canonicalization and the
//! two-level tag tree. Everything here is synchronous and free of I/O; the
//! event, loader and cache layers build on top of it.

pub mod config;
pub mod error;
pub mod key;
pub mod node;
pub mod tree;

pub use config::{CacheConfig, LogConfig};
pub use error::{
    CacheError, ConfigError, LoaderError, MetatagError, MetatagResult, PersistError, TreeError,
};
pub use key::{compare_params_list, compare_slices_by_ref, decode_key, hash_key, CacheKey};
pub use node::{validate_id, Node, NodeFields, NodePatch, NodeRef, NodeSeq, ID_PREFIX};
