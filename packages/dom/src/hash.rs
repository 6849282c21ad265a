//! Content hashing.
//!
//! Identifiers are not stable across re-imports, content hashes are.
//! `content_hash` covers a node's own content; `merkle_hashes` folds in the
//! hashes of all children so identical subtrees hash identically.

use crate::node::{Node, NodeId, NodeKind, NodeSpec};
use crate::tree::Tree;
use crc32fast::Hasher;
use std::collections::HashMap;

/// The part of a spec that counts as content. Page versions, stored data
/// hashes, owner and grants are cleared.
pub fn comparable_spec(mut spec: NodeSpec) -> NodeSpec {
    if let NodeKind::Page { version, .. } = &mut spec.kind {
        *version = 0;
    }
    spec.properties.data_hash = None;
    spec.properties.owner = None;
    spec.properties.grants.clear();
    spec
}

/// CRC32 over the serialized [`comparable_spec`] of a node
pub fn content_hash(node: &Node) -> u32 {
    let spec = comparable_spec(node.spec());
    let bytes = serde_json::to_vec(&spec).unwrap_or_default();
    let mut hasher = Hasher::new();
    hasher.update(&bytes);
    hasher.finalize()
}

/// Hash of own content plus the ordered hashes of all children, for `root`
/// and every descendant.
pub fn merkle_hashes(tree: &Tree, root: NodeId) -> HashMap<NodeId, u32> {
    let mut order = vec![root];
    order.extend(tree.descendants(root));

    let mut hashes = HashMap::with_capacity(order.len());
    // Reversed preorder visits children before their parent
    for id in order.into_iter().rev() {
        let Some(node) = tree.get(id) else {
            continue;
        };
        let mut hasher = Hasher::new();
        hasher.update(&content_hash(node).to_be_bytes());
        for child in node.children() {
            if let Some(h) = hashes.get(child) {
                hasher.update(&u32::to_be_bytes(*h));
            }
        }
        hashes.insert(id, hasher.finalize());
    }
    hashes
}

pub fn format_hash(hash: u32) -> String {
    format!("{:08x}", hash)
}
