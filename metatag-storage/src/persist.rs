//! Tree persistence.
//!
//! The tree document is a JSON array of node records. Storage backends only
//! move opaque bytes under a string key.

use metatag_core::{tree, Node, NodeSeq, PersistError};
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

// ============================================================================
// STORAGE TRAIT
// ============================================================================

/// Byte storage the tree is hydrated from and persisted to.
pub trait TreeStorage {
    /// Bytes stored under `key`, or `None` if nothing was saved yet.
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, PersistError>;

    fn save(&self, key: &str, bytes: &[u8]) -> Result<(), PersistError>;
}

// ============================================================================
// DOCUMENT CODEC
// ============================================================================

/// Parse a tree document. Every record goes through the node normalizer.
pub fn decode_tree(bytes: &[u8]) -> Result<NodeSeq, PersistError> {
    let value: Value = serde_json::from_slice(bytes).map_err(|e| PersistError::Malformed {
        reason: e.to_string(),
    })?;
    let records = value.as_array().ok_or_else(|| PersistError::Malformed {
        reason: format!("expected a JSON array, found {}", kind_of(&value)),
    })?;
    Ok(tree::from_nodes(
        records.iter().map(Node::root_from_value).collect(),
    ))
}

pub fn encode_tree(tree: &NodeSeq) -> Result<Vec<u8>, PersistError> {
    serde_json::to_vec_pretty(tree.as_ref()).map_err(|e| PersistError::Encode {
        reason: e.to_string(),
    })
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

// ============================================================================
// BACKENDS
// ============================================================================

/// In-memory storage.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    slots: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.slots.read().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TreeStorage for MemoryStorage {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, PersistError> {
        let slots = self.slots.read().map_err(|e| PersistError::Io {
            key: key.to_string(),
            reason: e.to_string(),
        })?;
        Ok(slots.get(key).cloned())
    }

    fn save(&self, key: &str, bytes: &[u8]) -> Result<(), PersistError> {
        let mut slots = self.slots.write().map_err(|e| PersistError::Io {
            key: key.to_string(),
            reason: e.to_string(),
        })?;
        slots.insert(key.to_string(), bytes.to_vec());
        Ok(())
    }
}

/// One file per key inside a directory.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file backing `key`.
    pub fn path_for(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{}.json", name))
    }
}

impl TreeStorage for FileStorage {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, PersistError> {
        match fs::read(self.path_for(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(PersistError::Io {
                key: key.to_string(),
                reason: e.to_string(),
            }),
        }
    }

    fn save(&self, key: &str, bytes: &[u8]) -> Result<(), PersistError> {
        let io = |e: std::io::Error| PersistError::Io {
            key: key.to_string(),
            reason: e.to_string(),
        };
        fs::create_dir_all(&self.dir).map_err(io)?;
        let path = self.path_for(key);
        let staging = path.with_extension("json.tmp");
        fs::write(&staging, bytes).map_err(io)?;
        fs::rename(&staging, &path).map_err(io)?;
        tracing::debug!(key, path = %path.display(), bytes = bytes.len(), "tree saved");
        Ok(())
    }
}
