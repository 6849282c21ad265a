//! Hash-addressed lookup of existing nodes and insert positions

use crate::operation::HashKey;
use pagetree_dom::{NodeId, Tree};
use std::collections::HashMap;

/// Maps target hash keys to nodes of the existing tree. Filled from the
/// pairing and extended with every node a `Create` adds.
#[derive(Debug, Clone, Default)]
pub struct HashIndex {
    nodes: HashMap<HashKey, NodeId>,
}

impl HashIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: HashKey, id: NodeId) {
        self.nodes.insert(key, id);
    }

    pub fn get(&self, key: &HashKey) -> Option<NodeId> {
        self.nodes.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Where a node goes: before `sibling` in `parent`, or at the end
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsertPosition {
    pub parent: NodeId,
    pub sibling: Option<NodeId>,
}

/// Resolve `parent_hash` and the first resolvable hash among
/// `sibling_hashes`. `None` when the parent is not in the existing tree.
pub fn find_insert_position(
    tree: &Tree,
    index: &HashIndex,
    parent_hash: &HashKey,
    sibling_hashes: &[HashKey],
) -> Option<InsertPosition> {
    let parent = index.get(parent_hash).filter(|id| tree.contains(*id))?;
    let sibling = sibling_hashes
        .iter()
        .filter_map(|hash| index.get(hash))
        .find(|id| tree.contains(*id));
    Some(InsertPosition { parent, sibling })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pagetree_dom::{NodeKind, NodeSnapshot};

    fn key(s: &str) -> HashKey {
        HashKey(s.to_string())
    }

    #[test]
    fn test_first_resolvable_sibling_wins() {
        let snapshot = NodeSnapshot::new(NodeKind::page("p")).with_children(vec![
            NodeSnapshot::new(NodeKind::element("a")),
            NodeSnapshot::new(NodeKind::element("b")),
        ]);
        let mut tree = Tree::new();
        let page = tree.import_snapshot(&snapshot).unwrap();
        let (a, b) = (tree.children(page)[0], tree.children(page)[1]);

        let mut index = HashIndex::new();
        index.insert(key("page"), page);
        index.insert(key("a"), a);
        index.insert(key("b"), b);

        let position =
            find_insert_position(&tree, &index, &key("page"), &[key("gone"), key("b"), key("a")]);
        assert_eq!(
            position,
            Some(InsertPosition {
                parent: page,
                sibling: Some(b)
            })
        );

        let last = find_insert_position(&tree, &index, &key("page"), &[]);
        assert_eq!(last.map(|p| p.sibling), Some(None));
    }

    #[test]
    fn test_unknown_parent_has_no_position() {
        let tree = Tree::new();
        let index = HashIndex::new();
        assert_eq!(find_insert_position(&tree, &index, &key("x"), &[]), None);
    }
}
