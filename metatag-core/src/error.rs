//! Error types for metatag operations

use thiserror::Error;

/// Errors raised by fetch functions plugged into the batch loader.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LoaderError {
    #[error("Fetch failed: {reason}")]
    FetchFailed { reason: String },

    #[error("Fetch returned no data for key {key}")]
    EmptyResult { key: String },

    #[error("Batch fetch returned {got} results for {expected} inputs")]
    BatchLengthMismatch { expected: usize, got: usize },

    #[error("Loader dropped before ticket {key} settled")]
    Dropped { key: String },
}

impl LoaderError {
    /// Shorthand for a fetch failure with a free-form reason.
    pub fn fetch_failed(reason: impl Into<String>) -> Self {
        Self::FetchFailed {
            reason: reason.into(),
        }
    }
}

/// Cache store errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Load failed for key {key}: {source}")]
    LoadFailed {
        key: String,
        #[source]
        source: LoaderError,
    },

    #[error("Entry {key} was removed while a fetch was in flight")]
    Removed { key: String },

    #[error("Namespace already registered: {namespace}")]
    DuplicateNamespace { namespace: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Failed to parse configuration: {reason}")]
    Parse { reason: String },
}

/// Tag tree validation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TreeError {
    #[error("Invalid node id {id:?}: only ASCII letters and digits are allowed")]
    InvalidId { id: String },

    #[error("Node id already exists: {id}")]
    DuplicateId { id: String },
}

/// Persistence errors for the load/save collaborator.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PersistError {
    #[error("Malformed tree document: {reason}")]
    Malformed { reason: String },

    #[error("I/O failure on {key}: {reason}")]
    Io { key: String, reason: String },

    #[error("Failed to encode tree: {reason}")]
    Encode { reason: String },
}

/// Master error type for all metatag errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MetatagError {
    #[error("Loader error: {0}")]
    Loader(#[from] LoaderError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Tree error: {0}")]
    Tree(#[from] TreeError),

    #[error("Persist error: {0}")]
    Persist(#[from] PersistError),
}

/// Result type alias for metatag operations.
pub type MetatagResult<T> = Result<T, MetatagError>;

// =============================================================================
// TESTS
// =============================================================================
