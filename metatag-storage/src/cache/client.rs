//! Cache client: the registry of namespace stores.

use super::store::{CacheStore, ManagedStore, NamespaceStats};
use crate::loader::BatchLoader;
use metatag_core::{CacheConfig, CacheError, MetatagResult};
use serde::Serialize;
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Totals across every live namespace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClientStats {
    pub namespaces: Vec<NamespaceStats>,
    pub entries: usize,
    pub observers: usize,
}

struct ClientInner {
    config: CacheConfig,
    stores: RefCell<Vec<Weak<dyn ManagedStore>>>,
}

/// Explicit cache context.
///
/// Build one at start-up and create every namespace store through it. A
/// namespace may be registered once while its store is alive. Cloning
/// yields another handle to the same client.
#[derive(Clone)]
pub struct CacheClient {
    inner: Rc<ClientInner>,
}

impl CacheClient {
    pub fn new(config: CacheConfig) -> MetatagResult<Self> {
        config.validate()?;
        Ok(Self {
            inner: Rc::new(ClientInner {
                config,
                stores: RefCell::new(Vec::new()),
            }),
        })
    }

    /// Client configured from `METATAG_CACHE_*` environment variables.
    pub fn from_env() -> MetatagResult<Self> {
        Self::new(CacheConfig::from_env()?)
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    /// Create the store for `namespace` with the client's config.
    pub fn store<P, V>(
        &self,
        namespace: impl Into<String>,
        loader: BatchLoader<P, V>,
    ) -> Result<CacheStore<P, V>, CacheError>
    where
        P: Serialize + Clone + 'static,
        V: 'static,
    {
        self.store_with_config(namespace, loader, self.inner.config.clone())
    }

    /// Create the store for `namespace` with its own config.
    pub fn store_with_config<P, V>(
        &self,
        namespace: impl Into<String>,
        loader: BatchLoader<P, V>,
        config: CacheConfig,
    ) -> Result<CacheStore<P, V>, CacheError>
    where
        P: Serialize + Clone + 'static,
        V: 'static,
    {
        let namespace = namespace.into();
        let mut stores = self.inner.stores.borrow_mut();
        stores.retain(|s| s.strong_count() > 0);
        let taken = stores
            .iter()
            .filter_map(Weak::upgrade)
            .any(|s| s.namespace() == namespace);
        if taken {
            return Err(CacheError::DuplicateNamespace { namespace });
        }
        let store = CacheStore::new(namespace, loader, config);
        stores.push(store.managed());
        tracing::debug!(namespace = %store.namespace(), "namespace registered");
        Ok(store)
    }

    /// Names of the live namespaces, in registration order.
    pub fn namespaces(&self) -> Vec<String> {
        self.live().iter().map(|s| s.namespace().to_string()).collect()
    }

    pub fn stats(&self) -> ClientStats {
        let namespaces: Vec<NamespaceStats> = self.live().iter().map(|s| s.stats()).collect();
        ClientStats {
            entries: namespaces.iter().map(|n| n.entries).sum(),
            observers: namespaces.iter().map(|n| n.observers).sum(),
            namespaces,
        }
    }

    /// Drop every entry of every namespace.
    pub fn clear(&self) {
        for store in self.live() {
            store.clear();
        }
    }

    pub fn collect_garbage(&self) -> usize {
        self.live().iter().map(|s| s.collect_garbage()).sum()
    }

    /// Collect garbage across namespaces every `period` until the client is
    /// dropped. Must be called within a `LocalSet`.
    pub fn spawn_gc(&self, period: Duration) -> JoinHandle<()> {
        let weak = Rc::downgrade(&self.inner);
        tokio::task::spawn_local(async move {
            loop {
                tokio::time::sleep(period).await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                let released = CacheClient { inner }.collect_garbage();
                if released > 0 {
                    tracing::trace!(released, "client sweep");
                }
            }
        })
    }

    fn live(&self) -> Vec<Rc<dyn ManagedStore>> {
        self.inner
            .stores
            .borrow()
            .iter()
            .filter_map(Weak::upgrade)
            .collect()
    }
}

impl fmt::Debug for CacheClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheClient")
            .field("config", &self.inner.config)
            .field("namespaces", &self.namespaces())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::task::LocalSet;

    fn loader(name: &str) -> BatchLoader<u32, String> {
        BatchLoader::builder(name)
            .single_fn(|n: u32| async move { Ok(Some(format!("value-{}", n))) })
            .build()
            .unwrap()
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = CacheConfig::new().with_retention(Duration::ZERO);
        assert!(CacheClient::new(config).is_err());
    }

    #[test]
    fn test_duplicate_namespace_is_rejected() {
        let client = CacheClient::new(CacheConfig::default()).unwrap();
        let _first = client.store("word-type", loader("a")).unwrap();
        let second = client.store("word-type", loader("b"));
        assert!(matches!(
            second,
            Err(CacheError::DuplicateNamespace { ref namespace }) if namespace == "word-type"
        ));
    }

    #[test]
    fn test_namespace_is_free_again_after_drop() {
        let client = CacheClient::new(CacheConfig::default()).unwrap();
        let first = client.store("word-type", loader("a")).unwrap();
        drop(first);
        assert!(client.namespaces().is_empty());
        assert!(client.store("word-type", loader("b")).is_ok());
    }

    #[tokio::test]
    async fn test_stats_and_clear() {
        LocalSet::new()
            .run_until(async {
                let client = CacheClient::new(CacheConfig::default()).unwrap();
                let words = client.store("words", loader("words")).unwrap();
                let tags = client.store("tags", loader("tags")).unwrap();
                words.write(1, Rc::new("one".to_string()));
                words.write(2, Rc::new("two".to_string()));
                let _observer = tags.observe(9);

                let stats = client.stats();
                assert_eq!(client.namespaces(), vec!["words", "tags"]);
                assert_eq!(stats.entries, 3);
                assert_eq!(stats.observers, 1);

                client.clear();
                assert_eq!(client.stats().entries, 0);
            })
            .await;
    }
}
