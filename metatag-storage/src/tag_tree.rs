//! Tag tree bound to the cache.
//!
//! [`TagTree`] is the fixed operation table over the `word-type` cache entry.
//! Every operation reads the current tree, applies one pure transformation
//! from [`metatag_core::tree`] and writes the result back only when it is a
//! new sequence, so each effective change produces exactly one `DataChange`.

use crate::cache::{CacheClient, CacheStore, Observer};
use crate::loader::BatchLoader;
use crate::persist::{decode_tree, encode_tree, TreeStorage};
use metatag_core::{
    tree, validate_id, MetatagResult, Node, NodePatch, NodeRef, NodeSeq, PersistError, TreeError,
};
use std::fmt;
use std::rc::Rc;

/// Namespace (and storage key) of the tag tree.
pub const TAG_TREE_NAMESPACE: &str = "word-type";

/// Store holding the tree under the unit key.
pub type TreeStore = CacheStore<(), Vec<NodeRef>>;

/// Display-order view of the tree: `(parent, node)` pairs.
pub type FlatView = Vec<(Option<usize>, NodeRef)>;

#[derive(Clone)]
pub struct TagTree {
    store: TreeStore,
}

impl TagTree {
    /// Register the tree namespace on `client`. The tree is never released.
    pub fn new(client: &CacheClient) -> MetatagResult<Self> {
        let loader = BatchLoader::builder(TAG_TREE_NAMESPACE)
            .single_fn(|_: ()| async { Ok(Some(Vec::new())) })
            .build()?;
        let config = client.config().clone().retain_forever();
        let store = client.store_with_config(TAG_TREE_NAMESPACE, loader, config)?;
        Ok(Self { store })
    }

    /// Wrap an existing store.
    pub fn from_store(store: TreeStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &TreeStore {
        &self.store
    }

    /// Current tree; an empty sequence before anything was stored.
    pub fn current(&self) -> NodeSeq {
        self.store.get(&()).unwrap_or_else(tree::empty)
    }

    pub fn observe(&self) -> Observer<(), Vec<NodeRef>> {
        self.store.observe(())
    }

    // ========================================================================
    // LOOKUP
    // ========================================================================

    /// Root position of `id`.
    pub fn index_of_id(&self, id: &str) -> Option<usize> {
        tree::index_of_id(&self.current(), id)
    }

    /// `(parent, index)` of `id` on either level.
    pub fn locate_id(&self, id: &str) -> Option<(Option<usize>, usize)> {
        tree::locate_id(&self.current(), id)
    }

    pub fn node_at(&self, index: usize, parent: Option<usize>) -> Option<NodeRef> {
        tree::node_at(&self.current(), index, parent).cloned()
    }

    /// Roots followed by their children, memoized per tree value.
    pub fn flatten(&self) -> Rc<FlatView> {
        let current = self.current();
        self.store
            .derived_cache(&current)
            .get_or_init(|| tree::flatten(&current))
    }

    // ========================================================================
    // MUTATIONS
    // ========================================================================

    pub fn swap(&self, i: usize, j: usize, parent: Option<usize>) -> bool {
        self.apply("swap", |t| tree::swap_adjacent(t, i, j, parent))
    }

    pub fn move_up(&self, index: usize, parent: Option<usize>) -> bool {
        self.apply("move_up", |t| tree::move_up(t, index, parent))
    }

    pub fn move_down(&self, index: usize, parent: Option<usize>) -> bool {
        self.apply("move_down", |t| tree::move_down(t, index, parent))
    }

    /// Append `node` to the roots or to the children of `parent`.
    ///
    /// Ids must be alphanumeric and unique across both levels. Returns
    /// `Ok(false)` when `parent` does not exist.
    pub fn insert(&self, node: Node, parent: Option<usize>) -> Result<bool, TreeError> {
        validate_id(&node.id)?;
        let current = self.current();
        if tree::locate_id(&current, &node.id).is_some() {
            return Err(TreeError::DuplicateId { id: node.id });
        }
        Ok(self.apply("insert", |t| tree::insert(t, node, parent)))
    }

    pub fn update_at(&self, index: usize, patch: &NodePatch, parent: Option<usize>) -> bool {
        self.apply("update_at", |t| tree::update_at(t, index, patch, parent))
    }

    pub fn remove_at(&self, index: usize, parent: Option<usize>) -> bool {
        self.apply("remove_at", |t| tree::remove_at(t, index, parent))
    }

    pub fn hide(&self, index: usize, parent: Option<usize>) -> bool {
        self.update_at(index, &NodePatch::default().hidden(true), parent)
    }

    pub fn show(&self, index: usize, parent: Option<usize>) -> bool {
        self.update_at(index, &NodePatch::default().hidden(false), parent)
    }

    /// Apply `f` to every node; see [`tree::batch_transform`].
    pub fn batch_transform<F>(&self, f: F) -> bool
    where
        F: FnMut(&Node, usize, Option<usize>) -> Node,
    {
        self.apply("batch_transform", |t| Some(tree::batch_transform(t, f)))
    }

    pub fn hide_all(&self) -> bool {
        self.batch_transform(|node, _, _| node.clone().with_hidden(true))
    }

    pub fn show_all(&self) -> bool {
        self.batch_transform(|node, _, _| node.clone().with_hidden(false))
    }

    /// Store `next` as the whole tree.
    pub fn replace_all(&self, next: NodeSeq) -> bool {
        self.store.write((), next)
    }

    // ========================================================================
    // PERSISTENCE
    // ========================================================================

    /// Load the saved tree from `storage`. Returns whether a document was
    /// found.
    pub fn hydrate(&self, storage: &dyn TreeStorage) -> Result<bool, PersistError> {
        match storage.load(TAG_TREE_NAMESPACE)? {
            Some(bytes) => {
                let loaded = decode_tree(&bytes)?;
                tracing::info!(roots = loaded.len(), "tag tree hydrated");
                self.replace_all(loaded);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Save the current tree to `storage`.
    pub fn persist(&self, storage: &dyn TreeStorage) -> Result<(), PersistError> {
        let current = self.current();
        storage.save(TAG_TREE_NAMESPACE, &encode_tree(&current)?)?;
        tracing::info!(roots = current.len(), "tag tree persisted");
        Ok(())
    }

    /// Run one pure operation and store its result if it is a new tree.
    fn apply<F>(&self, op: &'static str, f: F) -> bool
    where
        F: FnOnce(&NodeSeq) -> Option<NodeSeq>,
    {
        let current = self.current();
        match f(&current) {
            None => {
                tracing::debug!(op, "tree operation not applicable");
                false
            }
            Some(next) if Rc::ptr_eq(&next, &current) => true,
            Some(next) => {
                self.store.write((), next);
                true
            }
        }
    }
}

impl fmt::Debug for TagTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TagTree")
            .field("roots", &self.current().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persist::MemoryStorage;
    use metatag_core::CacheConfig;

    fn tag_tree() -> (CacheClient, TagTree) {
        let client = CacheClient::new(CacheConfig::default()).unwrap();
        let tree = TagTree::new(&client).unwrap();
        tree.replace_all(tree::from_nodes(vec![
            Node::new("WTK01").with_name("noun").with_children(vec![Node::new("WTK05")]),
            Node::new("WTK02").with_name("verb"),
        ]));
        (client, tree)
    }

    fn ids(tree: &TagTree) -> Vec<String> {
        tree.current().iter().map(|n| n.id.clone()).collect()
    }

    #[test]
    fn test_second_tree_on_same_client_is_rejected() {
        let (client, _tree) = tag_tree();
        assert!(TagTree::new(&client).is_err());
    }

    #[test]
    fn test_moves_and_no_ops() {
        let (_client, tree) = tag_tree();
        let before = tree.current();
        assert!(!tree.move_up(0, None));
        assert!(!tree.move_down(1, None));
        assert!(Rc::ptr_eq(&before, &tree.current()));

        assert!(tree.move_down(0, None));
        assert_eq!(ids(&tree), vec!["WTK02", "WTK01"]);
        assert_eq!(tree.index_of_id("WTK01"), Some(1));
    }

    #[test]
    fn test_insert_rejects_bad_and_duplicate_ids() {
        let (_client, tree) = tag_tree();
        assert!(matches!(
            tree.insert(Node::new("WTK-9"), None),
            Err(TreeError::InvalidId { .. })
        ));
        assert!(matches!(
            tree.insert(Node::new("WTK05"), None),
            Err(TreeError::DuplicateId { .. })
        ));
        assert_eq!(tree.insert(Node::new("WTK07"), Some(9)), Ok(false));
        assert_eq!(tree.insert(Node::new("WTK07"), Some(1)), Ok(true));
        assert_eq!(tree.locate_id("WTK07"), Some((Some(1), 0)));
    }

    #[test]
    fn test_unchanged_update_keeps_reference() {
        let (_client, tree) = tag_tree();
        let before = tree.current();
        assert!(tree.update_at(1, &NodePatch::default().name("verb"), None));
        assert!(Rc::ptr_eq(&before, &tree.current()));
        assert!(tree.hide(0, Some(0)));
        assert!(tree.node_at(0, Some(0)).unwrap().hidden);
        assert!(Rc::ptr_eq(&before[1], &tree.current()[1]));
    }

    #[test]
    fn test_hide_all_and_show_all() {
        let (_client, tree) = tag_tree();
        assert!(tree.hide_all());
        assert!(tree.flatten().iter().all(|(_, n)| n.hidden));
        let hidden = tree.current();
        tree.hide_all();
        assert!(Rc::ptr_eq(&hidden, &tree.current()));
        tree.show_all();
        assert!(tree.flatten().iter().all(|(_, n)| !n.hidden));
    }

    #[test]
    fn test_flatten_is_memoized_per_tree() {
        let (_client, tree) = tag_tree();
        let first = tree.flatten();
        assert_eq!(first.len(), 3);
        assert!(Rc::ptr_eq(&first, &tree.flatten()));
        tree.remove_at(0, Some(0));
        let second = tree.flatten();
        assert!(!Rc::ptr_eq(&first, &second));
        assert_eq!(second.len(), 2);
    }

    #[test]
    fn test_persist_then_hydrate() {
        let (_client, tree) = tag_tree();
        let storage = MemoryStorage::new();
        let fresh_client = CacheClient::new(CacheConfig::default()).unwrap();
        let fresh = TagTree::new(&fresh_client).unwrap();
        assert_eq!(fresh.hydrate(&storage), Ok(false));

        tree.persist(&storage).unwrap();
        assert_eq!(fresh.hydrate(&storage), Ok(true));
        assert_eq!(*fresh.current(), *tree.current());
    }
}
