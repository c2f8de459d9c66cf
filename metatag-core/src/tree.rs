//! Structural-sharing mutations over the two-level tag tree.
//!
//! The tree is an ordered root sequence where each root may own an ordered
//! child sequence; children never have children of their own. Every operation
//! here is pure: the input is never modified, a new root sequence is returned,
//! and every node or sequence whose content did not change keeps its original
//! `Rc`. Addressing is `(index)` for roots and `(index, Some(parent))` for the
//! children of root `parent`.
//!
//! Operations that cannot apply (an index or parent out of range) return
//! `None` instead of failing. Operations that apply but change nothing return
//! the input sequence itself, so the cache layer can detect "no change" by
//! comparing pointers.

use crate::{Node, NodePatch, NodeRef, NodeSeq};
use std::rc::Rc;

/// Build a root sequence from owned nodes.
pub fn from_nodes(nodes: Vec<Node>) -> NodeSeq {
    Rc::new(nodes.into_iter().map(|n| Rc::new(as_root(n))).collect())
}

/// An empty root sequence.
pub fn empty() -> NodeSeq {
    Rc::new(Vec::new())
}

/// Position of the root node with `id`.
pub fn index_of_id(tree: &NodeSeq, id: &str) -> Option<usize> {
    tree.iter().position(|n| n.id == id)
}

/// Locate `id` on either level: `(parent, index)`.
pub fn locate_id(tree: &NodeSeq, id: &str) -> Option<(Option<usize>, usize)> {
    for (i, root) in tree.iter().enumerate() {
        if root.id == id {
            return Some((None, i));
        }
        if let Some(children) = &root.children {
            if let Some(j) = children.iter().position(|c| c.id == id) {
                return Some((Some(i), j));
            }
        }
    }
    None
}

/// The node at an address.
pub fn node_at(tree: &NodeSeq, index: usize, parent: Option<usize>) -> Option<&NodeRef> {
    sequence(tree, parent)?.get(index)
}

/// Swap two neighbouring entries of one sequence. This is the primitive
/// behind [`move_up`] and [`move_down`]; `None` unless `i` and `j` are
/// adjacent and in range.
pub fn swap_adjacent(tree: &NodeSeq, i: usize, j: usize, parent: Option<usize>) -> Option<NodeSeq> {
    let seq = sequence(tree, parent)?;
    if i.abs_diff(j) != 1 || i.max(j) >= seq.len() {
        return None;
    }
    let mut next = seq.to_vec();
    next.swap(i, j);
    Some(replace_sequence(tree, parent, next))
}

/// Move an entry one position toward the front.
pub fn move_up(tree: &NodeSeq, index: usize, parent: Option<usize>) -> Option<NodeSeq> {
    let prev = index.checked_sub(1)?;
    swap_adjacent(tree, prev, index, parent)
}

/// Move an entry one position toward the back.
pub fn move_down(tree: &NodeSeq, index: usize, parent: Option<usize>) -> Option<NodeSeq> {
    swap_adjacent(tree, index, index.checked_add(1)?, parent)
}

/// Append a node to the roots, or to the children of `parent`.
///
/// Nodes appended as children lose any children of their own.
pub fn insert(tree: &NodeSeq, node: Node, parent: Option<usize>) -> Option<NodeSeq> {
    match parent {
        None => {
            let mut next = tree.to_vec();
            next.push(Rc::new(as_root(node)));
            Some(Rc::new(next))
        }
        Some(p) => {
            let owner = tree.get(p)?;
            let mut children = owner
                .children
                .as_ref()
                .map(|c| c.to_vec())
                .unwrap_or_default();
            children.push(Rc::new(node.into_leaf()));
            Some(replace_sequence(tree, Some(p), children))
        }
    }
}

/// Merge `patch` into the addressed node.
///
/// When the merge leaves every field as it was, the input tree is returned.
pub fn update_at(
    tree: &NodeSeq,
    index: usize,
    patch: &NodePatch,
    parent: Option<usize>,
) -> Option<NodeSeq> {
    let seq = sequence(tree, parent)?;
    let current = seq.get(index)?;
    let merged = current.merged(patch);
    if merged == **current {
        return Some(Rc::clone(tree));
    }
    let mut next = seq.to_vec();
    next[index] = Rc::new(merged);
    Some(replace_sequence(tree, parent, next))
}

/// Splice the addressed node out of its sequence.
pub fn remove_at(tree: &NodeSeq, index: usize, parent: Option<usize>) -> Option<NodeSeq> {
    let seq = sequence(tree, parent)?;
    if index >= seq.len() {
        return None;
    }
    let mut next = seq.to_vec();
    next.remove(index);
    Some(replace_sequence(tree, parent, next))
}

/// Apply `f` to every root and then to every child of the transformed root.
///
/// `f` receives the node, its index and its parent index. A result that equals
/// its input by content is discarded in favor of the original `Rc`, so an
/// identity transform returns the input tree itself.
pub fn batch_transform<F>(tree: &NodeSeq, mut f: F) -> NodeSeq
where
    F: FnMut(&Node, usize, Option<usize>) -> Node,
{
    let mut changed = false;
    let mut next = Vec::with_capacity(tree.len());

    for (i, root) in tree.iter().enumerate() {
        let mut candidate = f(root, i, None);
        candidate.children = candidate
            .children
            .take()
            .map(|children| transform_children(&children, i, &mut f));

        if candidate == **root {
            next.push(Rc::clone(root));
        } else {
            changed = true;
            next.push(Rc::new(candidate));
        }
    }

    if changed {
        Rc::new(next)
    } else {
        Rc::clone(tree)
    }
}

/// Roots and children in display order: each root followed by its children.
pub fn flatten(tree: &NodeSeq) -> Vec<(Option<usize>, NodeRef)> {
    let mut out = Vec::new();
    for (i, root) in tree.iter().enumerate() {
        out.push((None, Rc::clone(root)));
        if let Some(children) = &root.children {
            out.extend(children.iter().map(|c| (Some(i), Rc::clone(c))));
        }
    }
    out
}

fn transform_children<F>(children: &NodeSeq, parent: usize, f: &mut F) -> NodeSeq
where
    F: FnMut(&Node, usize, Option<usize>) -> Node,
{
    let mut changed = false;
    let mut next = Vec::with_capacity(children.len());
    for (j, child) in children.iter().enumerate() {
        let candidate = f(child, j, Some(parent)).into_leaf();
        if candidate == **child {
            next.push(Rc::clone(child));
        } else {
            changed = true;
            next.push(Rc::new(candidate));
        }
    }
    if changed {
        Rc::new(next)
    } else {
        Rc::clone(children)
    }
}

fn sequence(tree: &NodeSeq, parent: Option<usize>) -> Option<&[NodeRef]> {
    match parent {
        None => Some(tree.as_slice()),
        Some(p) => tree.get(p)?.children.as_deref().map(Vec::as_slice),
    }
}

/// Rebuild the path from the root sequence down to the edited sequence.
fn replace_sequence(tree: &NodeSeq, parent: Option<usize>, seq: Vec<NodeRef>) -> NodeSeq {
    match parent {
        None => Rc::new(seq),
        Some(p) => {
            let mut roots = tree.to_vec();
            let owner = Node {
                children: Some(Rc::new(seq)),
                ..(*roots[p]).clone()
            };
            roots[p] = Rc::new(owner);
            Rc::new(roots)
        }
    }
}

/// Strip grandchildren from a node headed for the root level.
fn as_root(mut node: Node) -> Node {
    if let Some(children) = node.children.take() {
        let flattened: Vec<NodeRef> = children
            .iter()
            .map(|c| {
                if c.children.is_some() {
                    Rc::new((**c).clone().into_leaf())
                } else {
                    Rc::clone(c)
                }
            })
            .collect();
        node.children = Some(Rc::new(flattened));
    }
    node
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ids(tree: &NodeSeq) -> Vec<&str> {
        tree.iter().map(|n| n.id.as_str()).collect()
    }

    fn abc() -> NodeSeq {
        from_nodes(vec![Node::new("A"), Node::new("B"), Node::new("C")])
    }

    fn with_children() -> NodeSeq {
        from_nodes(vec![
            Node::new("P0").with_children(vec![Node::new("C0"), Node::new("C1"), Node::new("C2")]),
            Node::new("P1"),
        ])
    }

    #[test]
    fn test_swap_shares_untouched_nodes() {
        let tree = abc();
        let next = swap_adjacent(&tree, 0, 1, None).unwrap();
        assert_eq!(ids(&next), vec!["B", "A", "C"]);
        assert!(!Rc::ptr_eq(&tree, &next));
        assert!(Rc::ptr_eq(&tree[2], &next[2]));
        assert!(Rc::ptr_eq(&tree[0], &next[1]));
        assert_eq!(ids(&tree), vec!["A", "B", "C"]);
    }

    #[test]
    fn test_swap_out_of_range_is_noop() {
        let tree = abc();
        assert!(swap_adjacent(&tree, 2, 3, None).is_none());
        assert!(swap_adjacent(&tree, 0, 1, Some(9)).is_none());
        assert!(swap_adjacent(&tree, 0, 1, Some(0)).is_none());
    }

    #[test]
    fn test_swap_requires_neighbours() {
        let tree = abc();
        assert!(swap_adjacent(&tree, 0, 2, None).is_none());
        assert!(swap_adjacent(&tree, 1, 1, None).is_none());
        let next = swap_adjacent(&tree, 2, 1, None).unwrap();
        assert_eq!(ids(&next), vec!["A", "C", "B"]);
    }

    #[test]
    fn test_move_bounds() {
        let tree = abc();
        assert!(move_up(&tree, 0, None).is_none());
        assert!(move_down(&tree, 2, None).is_none());
        assert_eq!(ids(&move_up(&tree, 2, None).unwrap()), vec!["A", "C", "B"]);
        assert_eq!(ids(&move_down(&tree, 0, None).unwrap()), vec!["B", "A", "C"]);
    }

    #[test]
    fn test_child_swap_rebuilds_only_its_parent() {
        let tree = with_children();
        let next = move_down(&tree, 0, Some(0)).unwrap();
        let children = next[0].children.as_ref().unwrap();
        assert_eq!(ids(children), vec!["C1", "C0", "C2"]);
        assert!(!Rc::ptr_eq(&tree[0], &next[0]));
        assert!(Rc::ptr_eq(&tree[1], &next[1]));
        let old_children = tree[0].children.as_ref().unwrap();
        assert!(Rc::ptr_eq(&old_children[2], &children[2]));
    }

    #[test]
    fn test_insert_root_and_child() {
        let tree = abc();
        let next = insert(&tree, Node::new("D"), None).unwrap();
        assert_eq!(ids(&next), vec!["A", "B", "C", "D"]);
        assert!(Rc::ptr_eq(&tree[0], &next[0]));

        let next = insert(&tree, Node::new("A0").with_children(vec![Node::new("x")]), Some(0))
            .unwrap();
        let children = next[0].children.as_ref().unwrap();
        assert_eq!(ids(children), vec!["A0"]);
        assert!(children[0].children.is_none());

        assert!(insert(&tree, Node::new("Z"), Some(3)).is_none());
    }

    #[test]
    fn test_update_unchanged_returns_same_tree() {
        let tree = abc();
        let same = update_at(&tree, 1, &NodePatch::default(), None).unwrap();
        assert!(Rc::ptr_eq(&tree, &same));

        let same = update_at(&tree, 1, &NodePatch::default().name(""), None).unwrap();
        assert!(Rc::ptr_eq(&tree, &same));

        let next = update_at(&tree, 1, &NodePatch::default().name("Boost"), None).unwrap();
        assert_eq!(next[1].fields.name, "Boost");
        assert!(Rc::ptr_eq(&tree[0], &next[0]));
        assert!(update_at(&tree, 3, &NodePatch::default(), None).is_none());
    }

    #[test]
    fn test_update_child() {
        let tree = with_children();
        let next = update_at(&tree, 1, &NodePatch::default().hidden(true), Some(0)).unwrap();
        let children = next[0].children.as_ref().unwrap();
        assert!(children[1].hidden);
        assert!(Rc::ptr_eq(&tree[1], &next[1]));
    }

    #[test]
    fn test_remove_at() {
        let tree = abc();
        let next = remove_at(&tree, 1, None).unwrap();
        assert_eq!(ids(&next), vec!["A", "C"]);
        assert!(remove_at(&tree, 3, None).is_none());

        let tree = with_children();
        let next = remove_at(&tree, 0, Some(0)).unwrap();
        assert_eq!(ids(next[0].children.as_ref().unwrap()), vec!["C1", "C2"]);
    }

    #[test]
    fn test_batch_identity_keeps_every_reference() {
        let tree = with_children();
        let same = batch_transform(&tree, |n, _, _| n.clone());
        assert!(Rc::ptr_eq(&tree, &same));
        assert!(Rc::ptr_eq(
            tree[0].children.as_ref().unwrap(),
            same[0].children.as_ref().unwrap()
        ));
    }

    #[test]
    fn test_batch_transform_children_only() {
        let tree = with_children();
        let next = batch_transform(&tree, |n, j, parent| {
            if parent.is_some() && j == 1 {
                n.clone().with_hidden(true)
            } else {
                n.clone()
            }
        });
        assert!(!Rc::ptr_eq(&tree, &next));
        assert!(Rc::ptr_eq(&tree[1], &next[1]));
        let old_children = tree[0].children.as_ref().unwrap();
        let children = next[0].children.as_ref().unwrap();
        assert!(Rc::ptr_eq(&old_children[0], &children[0]));
        assert!(children[1].hidden);
    }

    #[test]
    fn test_locate_and_flatten() {
        let tree = with_children();
        assert_eq!(index_of_id(&tree, "P1"), Some(1));
        assert_eq!(index_of_id(&tree, "C1"), None);
        assert_eq!(locate_id(&tree, "C1"), Some((Some(0), 1)));
        assert_eq!(locate_id(&tree, "nope"), None);

        let flat: Vec<_> = flatten(&tree)
            .into_iter()
            .map(|(p, n)| (p, n.id.clone()))
            .collect();
        assert_eq!(flat[0], (None, "P0".to_string()));
        assert_eq!(flat[1], (Some(0), "C0".to_string()));
        assert_eq!(flat[4], (None, "P1".to_string()));
        assert_eq!(node_at(&tree, 2, Some(0)).unwrap().id, "C2");
    }

    fn arb_tree() -> impl Strategy<Value = NodeSeq> {
        prop::collection::vec(
            ("[A-Z]{3}[0-9]{2}", prop::collection::vec("[a-z]{1,4}", 0..4), any::<bool>()),
            0..6,
        )
        .prop_map(|roots| {
            from_nodes(
                roots
                    .into_iter()
                    .map(|(id, children, hidden)| {
                        let node = Node::new(id).with_hidden(hidden);
                        if children.is_empty() {
                            node
                        } else {
                            node.with_children(children.into_iter().map(Node::new).collect())
                        }
                    })
                    .collect(),
            )
        })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// An identity transform never allocates a new sequence.
        #[test]
        fn prop_identity_transform_is_pointer_equal(tree in arb_tree()) {
            let same = batch_transform(&tree, |n, _, _| n.clone());
            prop_assert!(Rc::ptr_eq(&tree, &same));
        }

        /// Moving down then up restores the original content.
        #[test]
        fn prop_move_down_up_roundtrip(tree in arb_tree(), index in 0usize..6) {
            if let Some(moved) = move_down(&tree, index, None) {
                let back = move_up(&moved, index + 1, None).unwrap();
                prop_assert_eq!(&*back, &*tree);
            } else {
                prop_assert!(index + 1 >= tree.len());
            }
        }

        /// Removing a root leaves every other root's reference intact.
        #[test]
        fn prop_remove_shares_survivors(tree in arb_tree(), index in 0usize..6) {
            match remove_at(&tree, index, None) {
                Some(next) => {
                    prop_assert_eq!(next.len(), tree.len() - 1);
                    for (k, node) in next.iter().enumerate() {
                        let original = if k < index { k } else { k + 1 };
                        prop_assert!(Rc::ptr_eq(node, &tree[original]));
                    }
                }
                None => prop_assert!(index >= tree.len()),
            }
        }
    }
}
