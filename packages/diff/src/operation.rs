//! Merge operations.
//!
//! Operations never refer to target-tree identifiers. Existing nodes are
//! addressed either directly (when the pairing already knows them) or via
//! a [`HashKey`] that the [`HashIndex`](crate::HashIndex) resolves at
//! apply time, so nodes created earlier in the pass can be found by later
//! operations.

use pagetree_dom::{NodeId, NodeSpec};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Content-derived key of a target node: Merkle hash, plus `#n` for the
/// n-th repeated occurrence of the same subtree
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HashKey(pub String);

impl fmt::Display for HashKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum MergeOperation {
    /// Trash an existing node that has no counterpart in the target
    #[serde(rename_all = "camelCase")]
    Delete { original_node: NodeId },

    /// Create a node that only exists in the target
    #[serde(rename_all = "camelCase")]
    Create {
        parent_hash: HashKey,
        sibling_hashes: Vec<HashKey>,
        node_hash: HashKey,
        spec: NodeSpec,
    },

    /// Position a paired or created node like its target counterpart
    #[serde(rename_all = "camelCase")]
    Move {
        parent_hash: HashKey,
        sibling_hashes: Vec<HashKey>,
        node_hash: HashKey,
        /// Existing node, when it existed before the pass
        original_node: Option<NodeId>,
    },

    /// Copy the target's content onto a paired node
    #[serde(rename_all = "camelCase")]
    Update {
        node_hash: HashKey,
        original_node: NodeId,
        spec: NodeSpec,
    },
}

impl MergeOperation {
    /// Execution priority; lower runs first
    pub fn priority(&self) -> u32 {
        match self {
            MergeOperation::Delete { .. } => 100,
            MergeOperation::Create { .. } => 200,
            MergeOperation::Move { .. } => 300,
            MergeOperation::Update { .. } => 400,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            MergeOperation::Delete { .. } => "delete",
            MergeOperation::Create { .. } => "create",
            MergeOperation::Move { .. } => "move",
            MergeOperation::Update { .. } => "update",
        }
    }
}

fn describe(spec: &NodeSpec) -> String {
    match spec.kind.tag() {
        Some(tag) => tag.to_string(),
        None => spec.kind.kind_name().to_string(),
    }
}

impl fmt::Display for MergeOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MergeOperation::Delete { original_node } => write!(f, "Delete {}", original_node),
            MergeOperation::Create {
                node_hash, spec, ..
            } => write!(f, "Create {}({})", describe(spec), node_hash),
            MergeOperation::Move {
                node_hash,
                original_node,
                ..
            } => match original_node {
                Some(id) => write!(f, "Move {}({})", id, node_hash),
                None => write!(f, "Move ({})", node_hash),
            },
            MergeOperation::Update {
                original_node,
                spec,
                ..
            } => write!(f, "Update {} {}", describe(spec), original_node),
        }
    }
}

/// Stable sort by priority; discovery order is kept within a priority
pub fn sort_operations(operations: &mut [MergeOperation]) {
    operations.sort_by_key(MergeOperation::priority);
}
