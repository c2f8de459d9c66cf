//! Observer guard.

use super::entry::QuerySnapshot;
use super::store::CacheStore;
use serde::Serialize;
use std::fmt;
use std::rc::Rc;

/// Holds one observer slot on a cache entry.
///
/// While any observer is alive the entry is never released. Dropping the
/// guard gives the slot back; an entry that has since been removed is left
/// alone.
pub struct Observer<P, V>
where
    P: Serialize + Clone + 'static,
    V: 'static,
{
    store: CacheStore<P, V>,
    key: String,
    params: P,
    generation: u64,
}

impl<P, V> Observer<P, V>
where
    P: Serialize + Clone + 'static,
    V: 'static,
{
    pub(crate) fn new(store: CacheStore<P, V>, key: String, params: P, generation: u64) -> Self {
        Self {
            store,
            key,
            params,
            generation,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn params(&self) -> &P {
        &self.params
    }

    pub fn store(&self) -> &CacheStore<P, V> {
        &self.store
    }

    /// Current state of the observed entry.
    pub fn snapshot(&self) -> QuerySnapshot<V> {
        self.store.snapshot_by_key(&self.key)
    }

    pub fn value(&self) -> Option<Rc<V>> {
        self.snapshot().value
    }
}

impl<P, V> Drop for Observer<P, V>
where
    P: Serialize + Clone + 'static,
    V: 'static,
{
    fn drop(&mut self) {
        self.store.release(&self.key, self.generation);
    }
}

impl<P, V> fmt::Debug for Observer<P, V>
where
    P: Serialize + Clone + 'static,
    V: 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observer")
            .field("namespace", &self.store.namespace())
            .field("key", &self.key)
            .finish()
    }
}
