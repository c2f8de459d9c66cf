//! METATAG Test Utilities
//!
//! Shared test infrastructure for the metatag workspace:
//! - Counting fetch mocks for the batch loader
//! - An event recorder for cache stores
//! - Proptest generators for nodes and trees
//! - Tree fixtures and a `LocalSet` runner

pub use metatag_core::{
    tree, CacheConfig, LoaderError, MetatagError, Node, NodePatch, NodeRef, NodeSeq,
};
pub use metatag_storage::{
    BatchLoader, CacheClient, CacheEvent, CacheEventKind, CacheStore, MemoryStorage, TagTree,
};

use async_trait::async_trait;
use metatag_storage::{BatchFetch, SingleFetch};
use std::cell::{Cell, RefCell};
use std::future::Future;
use std::rc::Rc;

// ============================================================================
// RUNTIME
// ============================================================================

/// Run `future` to completion inside a fresh `LocalSet`.
pub async fn run_local<F: Future>(future: F) -> F::Output {
    tokio::task::LocalSet::new().run_until(future).await
}

// ============================================================================
// MOCK FETCHERS
// ============================================================================

/// Single fetch backed by a synchronous function, counting every call.
pub struct CountingFetch<I, D> {
    respond: Box<dyn Fn(&I) -> Result<Option<D>, LoaderError>>,
    calls: Rc<Cell<usize>>,
    inputs: Rc<RefCell<Vec<I>>>,
}

impl<I: Clone, D> CountingFetch<I, D> {
    pub fn new(respond: impl Fn(&I) -> Result<Option<D>, LoaderError> + 'static) -> Self {
        Self {
            respond: Box::new(respond),
            calls: Rc::new(Cell::new(0)),
            inputs: Rc::new(RefCell::new(Vec::new())),
        }
    }

    /// Shared call counter; stays valid after the fetch moves into a loader.
    pub fn calls(&self) -> Rc<Cell<usize>> {
        Rc::clone(&self.calls)
    }

    /// Every input seen, in call order.
    pub fn inputs(&self) -> Rc<RefCell<Vec<I>>> {
        Rc::clone(&self.inputs)
    }
}

#[async_trait(?Send)]
impl<I: Clone + 'static, D: 'static> SingleFetch<I, D> for CountingFetch<I, D> {
    async fn fetch(&self, input: &I) -> Result<Option<D>, LoaderError> {
        self.calls.set(self.calls.get() + 1);
        self.inputs.borrow_mut().push(input.clone());
        (self.respond)(input)
    }
}

/// Batch fetch backed by a per-item function, counting every call.
///
/// With `fail_with` set, every batch call fails as a whole.
pub struct CountingBatchFetch<I, D> {
    respond: Box<dyn Fn(&I) -> Option<D>>,
    fail_with: Option<LoaderError>,
    batches: Rc<RefCell<Vec<Vec<I>>>>,
}

impl<I: Clone, D> CountingBatchFetch<I, D> {
    pub fn new(respond: impl Fn(&I) -> Option<D> + 'static) -> Self {
        Self {
            respond: Box::new(respond),
            fail_with: None,
            batches: Rc::new(RefCell::new(Vec::new())),
        }
    }

    pub fn failing(error: LoaderError) -> Self {
        Self {
            respond: Box::new(|_| None),
            fail_with: Some(error),
            batches: Rc::new(RefCell::new(Vec::new())),
        }
    }

    /// Inputs of every batch call, in call order.
    pub fn batches(&self) -> Rc<RefCell<Vec<Vec<I>>>> {
        Rc::clone(&self.batches)
    }
}

#[async_trait(?Send)]
impl<I: Clone + 'static, D: 'static> BatchFetch<I, D> for CountingBatchFetch<I, D> {
    async fn fetch_batch(&self, inputs: &[I]) -> Result<Vec<Option<D>>, LoaderError> {
        self.batches.borrow_mut().push(inputs.to_vec());
        if let Some(error) = &self.fail_with {
            return Err(error.clone());
        }
        Ok(inputs.iter().map(|i| (self.respond)(i)).collect())
    }
}

// ============================================================================
// EVENT RECORDER
// ============================================================================

/// One recorded cache event, reduced to what tests compare.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recorded {
    pub kind: CacheEventKind,
    pub key: String,
    /// `(previous, count)` for observer count changes.
    pub counts: Option<(usize, usize)>,
}

/// Records every event a store publishes.
pub struct EventRecorder {
    log: Rc<RefCell<Vec<Recorded>>>,
}

impl EventRecorder {
    pub fn attach<P, V>(store: &CacheStore<P, V>) -> Self
    where
        P: serde::Serialize + Clone + 'static,
        V: 'static,
    {
        let log = Rc::new(RefCell::new(Vec::new()));
        for kind in [
            CacheEventKind::QueryAdded,
            CacheEventKind::QueryUpdated,
            CacheEventKind::QueryRemoved,
            CacheEventKind::ObserverCountChange,
            CacheEventKind::DataChange,
        ] {
            let log = Rc::clone(&log);
            store.events().on(kind, move |event: &CacheEvent<P, V>| {
                let counts = match event {
                    CacheEvent::ObserverCountChange {
                        count, previous, ..
                    } => Some((*previous, *count)),
                    _ => None,
                };
                log.borrow_mut().push(Recorded {
                    kind: event.kind(),
                    key: event.key().to_string(),
                    counts,
                });
            });
        }
        Self { log }
    }

    pub fn events(&self) -> Vec<Recorded> {
        self.log.borrow().clone()
    }

    pub fn count(&self, kind: CacheEventKind) -> usize {
        self.log.borrow().iter().filter(|r| r.kind == kind).count()
    }

    /// `(previous, count)` of every observer count change, in order.
    pub fn observer_transitions(&self) -> Vec<(usize, usize)> {
        self.log.borrow().iter().filter_map(|r| r.counts).collect()
    }

    pub fn clear(&self) {
        self.log.borrow_mut().clear();
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    use super::*;
    use proptest::collection::vec;
    use proptest::prelude::*;

    /// Generate a valid node id.
    pub fn arb_node_id() -> impl Strategy<Value = String> {
        "WTK[0-9A-Za-z]{1,8}"
    }

    /// Generate a childless node.
    pub fn arb_leaf() -> impl Strategy<Value = Node> {
        (arb_node_id(), "[a-z ]{0,12}", "#[0-9a-f]{6}", any::<bool>()).prop_map(
            |(id, name, color, hidden)| {
                Node::new(id)
                    .with_name(name)
                    .with_color(color)
                    .with_hidden(hidden)
            },
        )
    }

    /// Generate a root node with up to `max_children` children.
    pub fn arb_root(max_children: usize) -> impl Strategy<Value = Node> {
        (arb_leaf(), vec(arb_leaf(), 0..=max_children)).prop_map(|(root, children)| {
            if children.is_empty() {
                root
            } else {
                root.with_children(children)
            }
        })
    }

    /// Generate a two-level tree.
    pub fn arb_tree() -> impl Strategy<Value = NodeSeq> {
        vec(arb_root(4), 0..8).prop_map(tree::from_nodes)
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    use super::*;

    /// Flat tree `WTK01`, `WTK02`, `WTK03`.
    pub fn three_roots() -> NodeSeq {
        tree::from_nodes(vec![
            Node::new("WTK01").with_name("noun"),
            Node::new("WTK02").with_name("verb"),
            Node::new("WTK03").with_name("adjective"),
        ])
    }

    /// Tree where `WTK01` has two children.
    pub fn nested() -> NodeSeq {
        tree::from_nodes(vec![
            Node::new("WTK01").with_name("noun").with_children(vec![
                Node::new("WTK11").with_name("person"),
                Node::new("WTK12").with_name("place"),
            ]),
            Node::new("WTK02").with_name("verb"),
        ])
    }

    /// Saved document form of [`nested`], with loosely shaped records.
    pub fn nested_document() -> serde_json::Value {
        serde_json::json!([
            {"typeKey": "WTK01", "name": "noun", "children": [
                {"typeKey": "WTK11", "name": "person"},
                {"typeKey": "WTK12", "name": "place", "hidden": false}
            ]},
            {"typeKey": "WTK02", "name": "verb", "color": null}
        ])
    }

    /// Client with default settings.
    pub fn client() -> CacheClient {
        CacheClient::new(CacheConfig::default()).expect("default config is valid")
    }

    /// Tag tree registered on a fresh client and seeded with `seed`.
    pub fn tag_tree(seed: NodeSeq) -> (CacheClient, TagTree) {
        let client = client();
        let tree = TagTree::new(&client).expect("fresh client has no tag tree");
        tree.replace_all(seed);
        (client, tree)
    }

    pub fn ids(tree: &NodeSeq) -> Vec<&str> {
        tree.iter().map(|n| n.id.as_str()).collect()
    }
}
