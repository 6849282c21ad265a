//! # Diff computation
//!
//! Pairs the nodes of a target tree with nodes of the existing tree and
//! derives the operations that converge the existing tree on the target.
//!
//! ```text
//!   target child ──► identical subtree anywhere in existing?   ──► pair whole subtree
//!        │ no
//!        ▼
//!   same kind/tag among unclaimed children of paired parent?   ──► pair, Update if content differs
//!        │ no
//!        ▼
//!   Create
//! ```
//!
//! Existing nodes left unpaired are deleted (top-most only). Every child
//! list that does not already line up gets one `Move` per child, emitted
//! right to left so each anchor sibling is already in place.

use crate::errors::{DiffError, DiffResult};
use crate::operation::{HashKey, MergeOperation};
use crate::position::HashIndex;
use pagetree_dom::{comparable_spec, format_hash, merkle_hashes, NodeId, NodeKind, NodeSpec, Tree};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Operations plus the hash index they are resolved against
#[derive(Debug, Clone)]
pub struct MergePlan {
    pub operations: Vec<MergeOperation>,
    pub index: HashIndex,
}

/// Content used for equality, the same view the hashes cover
fn normalized(spec: NodeSpec) -> NodeSpec {
    comparable_spec(spec)
}

fn shallow_match(a: &NodeKind, b: &NodeKind) -> bool {
    match (a, b) {
        (NodeKind::Element { tag: x, .. }, NodeKind::Element { tag: y, .. }) => x == y,
        _ => a.same_kind(b),
    }
}

struct Differ<'a> {
    existing: &'a Tree,
    target: &'a Tree,
    existing_hashes: HashMap<NodeId, u32>,
    target_hashes: HashMap<NodeId, u32>,
    keys: HashMap<NodeId, HashKey>,
    /// Existing nodes by Merkle hash, in preorder
    candidates: HashMap<u32, Vec<NodeId>>,
    claimed: HashSet<NodeId>,
    pairs: HashMap<NodeId, NodeId>,
    exact: HashSet<NodeId>,
    /// Non-exact target parents, in preorder
    parents: Vec<NodeId>,
    creates: Vec<MergeOperation>,
    updates: Vec<MergeOperation>,
}

impl<'a> Differ<'a> {
    fn new(existing: &'a Tree, existing_root: NodeId, target: &'a Tree, target_root: NodeId) -> Self {
        let existing_hashes = merkle_hashes(existing, existing_root);
        let target_hashes = merkle_hashes(target, target_root);

        let mut candidates: HashMap<u32, Vec<NodeId>> = HashMap::new();
        for id in existing.descendants(existing_root) {
            if let Some(hash) = existing_hashes.get(&id) {
                candidates.entry(*hash).or_default().push(id);
            }
        }

        let mut keys = HashMap::new();
        let mut occurrences: HashMap<u32, usize> = HashMap::new();
        let mut order = vec![target_root];
        order.extend(target.descendants(target_root));
        for id in order {
            let Some(hash) = target_hashes.get(&id) else {
                continue;
            };
            let seen = occurrences.entry(*hash).or_default();
            let key = match *seen {
                0 => format_hash(*hash),
                n => format!("{}#{}", format_hash(*hash), n),
            };
            *seen += 1;
            keys.insert(id, HashKey(key));
        }

        Self {
            existing,
            target,
            existing_hashes,
            target_hashes,
            keys,
            candidates,
            claimed: HashSet::new(),
            pairs: HashMap::new(),
            exact: HashSet::new(),
            parents: Vec::new(),
            creates: Vec::new(),
            updates: Vec::new(),
        }
    }

    fn key(&self, target_id: NodeId) -> HashKey {
        self.keys
            .get(&target_id)
            .cloned()
            .unwrap_or_else(|| HashKey(target_id.to_string()))
    }

    fn target_spec(&self, id: NodeId) -> Option<NodeSpec> {
        self.target.get(id).map(|n| n.spec())
    }

    fn existing_spec(&self, id: NodeId) -> Option<NodeSpec> {
        self.existing.get(id).map(|n| n.spec())
    }

    fn deep_equal(&self, target_id: NodeId, existing_id: NodeId) -> bool {
        let (Some(t), Some(e)) = (self.target.get(target_id), self.existing.get(existing_id)) else {
            return false;
        };
        if normalized(t.spec()) != normalized(e.spec()) || t.children().len() != e.children().len() {
            return false;
        }
        t.children()
            .iter()
            .zip(e.children())
            .all(|(tc, ec)| self.deep_equal(*tc, *ec))
    }

    fn subtree_unclaimed(&self, existing_id: NodeId) -> bool {
        !self.claimed.contains(&existing_id)
            && self
                .existing
                .descendants(existing_id)
                .all(|d| !self.claimed.contains(&d))
    }

    fn find_exact(&self, target_id: NodeId, prefer_parent: Option<NodeId>) -> Option<NodeId> {
        let hash = self.target_hashes.get(&target_id)?;
        let list = self.candidates.get(hash)?;
        let usable = |e: &NodeId| {
            self.existing_hashes.get(e) == Some(hash)
                && self.subtree_unclaimed(*e)
                && self.deep_equal(target_id, *e)
        };

        if let Some(parent) = prefer_parent {
            if let Some(found) = list
                .iter()
                .filter(|e| self.existing.parent(**e) == Some(parent))
                .find(|e| usable(*e))
            {
                return Some(*found);
            }
        }
        list.iter().find(|e| usable(*e)).copied()
    }

    fn find_shallow(&self, target_id: NodeId, existing_parent: NodeId) -> Option<NodeId> {
        let target_node = self.target.get(target_id)?;
        self.existing
            .children(existing_parent)
            .iter()
            .copied()
            .filter(|ec| !self.claimed.contains(ec))
            .find(|ec| {
                self.existing
                    .get(*ec)
                    .map(|n| shallow_match(n.kind(), target_node.kind()))
                    .unwrap_or(false)
            })
    }

    fn claim_exact(&mut self, target_id: NodeId, existing_id: NodeId) {
        self.claimed.insert(existing_id);
        self.pairs.insert(target_id, existing_id);
        self.exact.insert(target_id);

        let pairs: Vec<_> = self
            .target
            .children(target_id)
            .iter()
            .copied()
            .zip(self.existing.children(existing_id).iter().copied())
            .collect();
        for (tc, ec) in pairs {
            self.claim_exact(tc, ec);
        }
    }

    fn claim_shallow(&mut self, target_id: NodeId, existing_id: NodeId) {
        self.claimed.insert(existing_id);
        self.pairs.insert(target_id, existing_id);

        if let (Some(target_spec), Some(existing_spec)) =
            (self.target_spec(target_id), self.existing_spec(existing_id))
        {
            if normalized(target_spec.clone()) != normalized(existing_spec) {
                self.updates.push(MergeOperation::Update {
                    node_hash: self.key(target_id),
                    original_node: existing_id,
                    spec: target_spec,
                });
            }
        }
    }

    fn following_keys(&self, siblings: &[NodeId], index: usize) -> Vec<HashKey> {
        siblings[index + 1..].iter().map(|s| self.key(*s)).collect()
    }

    fn visit(&mut self, target_id: NodeId) {
        let children = self.target.children(target_id).to_vec();
        let existing_parent = self.pairs.get(&target_id).copied();
        self.parents.push(target_id);

        for (index, tc) in children.iter().copied().enumerate() {
            if let Some(ec) = self.find_exact(tc, existing_parent) {
                debug!(target = %tc, existing = %ec, "Paired identical subtree");
                self.claim_exact(tc, ec);
                continue;
            }

            if let Some(ec) = existing_parent.and_then(|p| self.find_shallow(tc, p)) {
                self.claim_shallow(tc, ec);
                self.visit(tc);
                continue;
            }

            if let Some(spec) = self.target_spec(tc) {
                self.creates.push(MergeOperation::Create {
                    parent_hash: self.key(target_id),
                    sibling_hashes: self.following_keys(&children, index),
                    node_hash: self.key(tc),
                    spec,
                });
            }
            self.visit(tc);
        }
    }

    /// Moves for every child list that does not already match
    fn moves(&self) -> Vec<MergeOperation> {
        let mut moves = Vec::new();
        for parent in &self.parents {
            let children = self.target.children(*parent);
            if children.is_empty() {
                continue;
            }

            if let Some(existing_parent) = self.pairs.get(parent) {
                let wanted: Vec<Option<NodeId>> =
                    children.iter().map(|c| self.pairs.get(c).copied()).collect();
                let current: Vec<Option<NodeId>> = self
                    .existing
                    .children(*existing_parent)
                    .iter()
                    .filter(|c| self.claimed.contains(c))
                    .map(|c| Some(*c))
                    .collect();
                if wanted == current {
                    continue;
                }
            } else if children.iter().all(|c| !self.pairs.contains_key(c)) {
                // Created in order already
                continue;
            }

            for (index, child) in children.iter().enumerate().rev() {
                moves.push(MergeOperation::Move {
                    parent_hash: self.key(*parent),
                    sibling_hashes: self.following_keys(children, index),
                    node_hash: self.key(*child),
                    original_node: self.pairs.get(child).copied(),
                });
            }
        }
        moves
    }

    /// Top-most unpaired existing nodes
    fn deletes(&self, existing_root: NodeId) -> Vec<MergeOperation> {
        let mut deletes = Vec::new();
        let mut stack = vec![existing_root];
        let mut seen = HashSet::new();
        while let Some(id) = stack.pop() {
            if !seen.insert(id) {
                continue;
            }
            for child in self.existing.children(id).iter().rev() {
                if self.claimed.contains(child) {
                    stack.push(*child);
                } else {
                    deletes.push(*child);
                }
            }
        }
        deletes.sort();
        deletes
            .into_iter()
            .map(|original_node| MergeOperation::Delete { original_node })
            .collect()
    }
}

/// Compute the operations that turn the subtree at `existing_root` into the
/// shape of `target_root`. Both roots are paired with each other.
pub fn compute_operations(
    existing: &Tree,
    existing_root: NodeId,
    target: &Tree,
    target_root: NodeId,
) -> DiffResult<MergePlan> {
    let existing_kind = existing.node(existing_root)?.kind();
    let target_kind = target.node(target_root)?.kind();
    if !existing_kind.same_kind(target_kind) {
        return Err(DiffError::RootMismatch {
            existing: existing_root,
            existing_kind: existing_kind.kind_name(),
            target: target_root,
            target_kind: target_kind.kind_name(),
        });
    }

    let mut differ = Differ::new(existing, existing_root, target, target_root);
    differ.claim_shallow(target_root, existing_root);
    differ.visit(target_root);

    let mut operations = differ.deletes(existing_root);
    operations.append(&mut differ.creates);
    operations.extend(differ.moves());
    operations.append(&mut differ.updates);

    let mut index = HashIndex::new();
    for (target_id, existing_id) in &differ.pairs {
        index.insert(differ.key(*target_id), *existing_id);
    }

    debug!(
        operations = operations.len(),
        paired = differ.pairs.len(),
        exact = differ.exact.len(),
        "Computed merge plan"
    );
    Ok(MergePlan { operations, index })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pagetree_dom::NodeSnapshot;

    fn load(json: &str) -> (Tree, NodeId) {
        let mut tree = Tree::new();
        let root = tree
            .import_snapshot(&NodeSnapshot::from_json(json).unwrap())
            .unwrap();
        (tree, root)
    }

    fn names(plan: &MergePlan) -> Vec<&'static str> {
        plan.operations.iter().map(|op| op.name()).collect()
    }

    const BASE: &str = r#"{ "type": "page", "name": "p", "children": [
        { "type": "element", "tag": "h1", "children": [ { "type": "text", "content": "Hi" } ] },
        { "type": "element", "tag": "p" }
    ] }"#;

    #[test]
    fn test_identical_trees_need_nothing() {
        let (existing, er) = load(BASE);
        let (target, tr) = load(BASE);
        let plan = compute_operations(&existing, er, &target, tr).unwrap();
        assert!(plan.operations.is_empty());
    }

    #[test]
    fn test_text_change_is_update() {
        let (existing, er) = load(BASE);
        let (target, tr) = load(&BASE.replace("Hi", "Hello"));
        let plan = compute_operations(&existing, er, &target, tr).unwrap();
        assert_eq!(names(&plan), vec!["update"]);
    }

    #[test]
    fn test_added_and_removed_children() {
        let (existing, er) = load(BASE);
        let (target, tr) = load(
            r#"{ "type": "page", "name": "p", "children": [
                { "type": "element", "tag": "h1", "children": [ { "type": "text", "content": "Hi" } ] },
                { "type": "element", "tag": "ul" }
            ] }"#,
        );
        let plan = compute_operations(&existing, er, &target, tr).unwrap();
        let ops = names(&plan);

        assert_eq!(ops[0], "delete");
        assert_eq!(ops[1], "create");
        assert!(ops[2..].iter().all(|op| *op == "move"));
    }

    #[test]
    fn test_duplicate_subtrees_get_distinct_keys() {
        let (target, tr) = load(
            r#"{ "type": "page", "name": "p", "children": [
                { "type": "element", "tag": "li" },
                { "type": "element", "tag": "li" }
            ] }"#,
        );
        let (existing, er) = load(r#"{ "type": "page", "name": "p" }"#);
        let plan = compute_operations(&existing, er, &target, tr).unwrap();

        let keys: Vec<_> = plan
            .operations
            .iter()
            .filter_map(|op| match op {
                MergeOperation::Create { node_hash, .. } => Some(node_hash.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(keys.len(), 2);
        assert_ne!(keys[0], keys[1]);
        assert!(keys[1].0.ends_with("#1"));
    }

    #[test]
    fn test_root_kind_mismatch() {
        let (existing, er) = load(BASE);
        let (target, tr) = load(r#"{ "type": "element", "tag": "div" }"#);
        assert!(matches!(
            compute_operations(&existing, er, &target, tr),
            Err(DiffError::RootMismatch { .. })
        ));
    }
}
