//! # Tree Model
//!
//! Central node table plus the read API over structural relations.
//!
//! ```text
//!   nodes: HashMap<NodeId, Node>      sync: SyncIndex
//!   ┌──────────────────────────┐      ┌─────────────────────────┐
//!   │ #1 Page  children [2, 5] │      │ component → {mirrors}   │
//!   │ #2 Elem  parent 1  pos 0 │      │ mirror    → component   │
//!   │ #5 Text  parent 1  pos 1 │      └─────────────────────────┘
//!   └──────────────────────────┘
//! ```
//!
//! Sibling relations are derived from the parent's child list and each
//! node's cached `position`; they are never stored separately. Raw
//! structural writes are crate-internal and go through a journal so the
//! mutation engine can restore the tree when a transaction fails.

use crate::errors::{DomError, DomResult};
use crate::node::{Node, NodeId, NodeKind, NodeSpec};
use crate::sync_index::SyncIndex;
use crate::visitor::{walk_node, TextCollector};
use std::collections::{HashMap, HashSet};
use tracing::warn;

/// Name of the hidden document that owns shared components
pub const SHADOW_DOCUMENT_NAME: &str = "__shadow__";

#[derive(Debug, Clone)]
struct Journal {
    originals: HashMap<NodeId, Option<Node>>,
    sync: SyncIndex,
    next_id: u64,
    shadow_document: Option<NodeId>,
}

#[derive(Debug, Clone, Default)]
pub struct Tree {
    nodes: HashMap<NodeId, Node>,
    sync: SyncIndex,
    next_id: u64,
    shadow_document: Option<NodeId>,
    journal: Option<Journal>,
}

impl Tree {
    pub fn new() -> Self {
        Self::default()
    }

    // ---------------------------------------------------------------
    // Read API
    // ---------------------------------------------------------------

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn node(&self, id: NodeId) -> DomResult<&Node> {
        self.nodes.get(&id).ok_or(DomError::UnknownNode(id))
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All node ids in ascending order
    pub fn node_ids(&self) -> Vec<NodeId> {
        let mut ids: Vec<_> = self.nodes.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Parentless visible pages, ascending by id
    pub fn pages(&self) -> Vec<NodeId> {
        let mut pages: Vec<_> = self
            .nodes
            .values()
            .filter(|n| n.kind.is_page() && n.parent.is_none())
            .filter(|n| Some(n.id) != self.shadow_document)
            .map(|n| n.id)
            .collect();
        pages.sort();
        pages
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(&id).and_then(|n| n.parent)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.nodes
            .get(&id)
            .map(|n| n.children.as_slice())
            .unwrap_or(&[])
    }

    pub fn first_child(&self, id: NodeId) -> Option<NodeId> {
        self.children(id).first().copied()
    }

    pub fn last_child(&self, id: NodeId) -> Option<NodeId> {
        self.children(id).last().copied()
    }

    pub fn has_child_nodes(&self, id: NodeId) -> bool {
        !self.children(id).is_empty()
    }

    pub fn previous_sibling(&self, id: NodeId) -> Option<NodeId> {
        let node = self.nodes.get(&id)?;
        let position = node.position.checked_sub(1)?;
        self.children(node.parent?).get(position).copied()
    }

    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        let node = self.nodes.get(&id)?;
        self.children(node.parent?).get(node.position + 1).copied()
    }

    /// Owning page; pages report themselves
    pub fn owner_document(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(&id).and_then(|n| n.owner_document())
    }

    pub fn shadow_document(&self) -> Option<NodeId> {
        self.shadow_document
    }

    pub fn sync_index(&self) -> &SyncIndex {
        &self.sync
    }

    /// Lazy depth-first walk over all descendants (excluding `id`).
    ///
    /// Stops at the first already-visited node instead of failing.
    pub fn descendants(&self, id: NodeId) -> Descendants<'_> {
        let mut visited = HashSet::new();
        visited.insert(id);
        let stack = self.children(id).iter().rev().copied().collect();
        Descendants {
            tree: self,
            stack,
            visited,
            done: false,
        }
    }

    /// Parent chain upwards, excluding `id`
    pub fn ancestors(&self, id: NodeId) -> Ancestors<'_> {
        let mut visited = HashSet::new();
        visited.insert(id);
        Ancestors {
            tree: self,
            current: self.parent(id),
            visited,
        }
    }

    pub fn is_ancestor(&self, ancestor: NodeId, id: NodeId) -> bool {
        self.ancestors(id).any(|a| a == ancestor)
    }

    /// First node matching `predicate`, starting at `id` itself
    pub fn closest_ancestor<P>(&self, id: NodeId, predicate: P) -> Option<NodeId>
    where
        P: Fn(&Node) -> bool,
    {
        let node = self.nodes.get(&id)?;
        if predicate(node) {
            return Some(id);
        }
        self.ancestors(id)
            .find(|a| self.nodes.get(a).map(&predicate).unwrap_or(false))
    }

    /// Enclosing page by ascent, falling back to the owner document
    pub fn closest_page(&self, id: NodeId) -> Option<NodeId> {
        self.closest_ancestor(id, |n| n.kind.is_page())
            .or_else(|| self.owner_document(id))
    }

    /// Nearest enclosing component. When that component lives outside
    /// `page`, the mirror of it that belongs to `page` is returned.
    pub fn closest_component(&self, id: NodeId, page: NodeId) -> Option<NodeId> {
        let component = self.closest_ancestor(id, |n| n.kind.is_component())?;
        if self.owner_document(component) == Some(page) {
            return Some(component);
        }
        self.sync
            .mirrors_of(component)
            .find(|m| self.owner_document(*m) == Some(page))
            .or(Some(component))
    }

    /// `/i/j/k` child positions from the root down to `id`
    pub fn position_path(&self, id: NodeId) -> String {
        let mut segments = Vec::new();
        let mut current = id;
        for parent in self.ancestors(id) {
            if let Some(node) = self.nodes.get(&current) {
                segments.push(node.position.to_string());
            }
            current = parent;
        }
        segments.reverse();
        segments.iter().map(|s| format!("/{}", s)).collect()
    }

    /// `/name/...` of context names from the root down to `id`
    pub fn page_path(&self, id: NodeId) -> String {
        let mut chain: Vec<NodeId> = self.ancestors(id).collect();
        chain.reverse();
        chain.push(id);
        chain
            .iter()
            .filter_map(|n| self.nodes.get(n))
            .map(|n| format!("/{}", n.context_name()))
            .collect()
    }

    /// Concatenated content of all text nodes under `id`
    pub fn text_content(&self, id: NodeId) -> String {
        let mut collector = TextCollector::default();
        walk_node(&mut collector, self, id);
        collector.text
    }

    pub fn shared_component(&self, id: NodeId) -> Option<NodeId> {
        self.sync.component_of(id)
    }

    pub fn synced_nodes(&self, id: NodeId) -> Vec<NodeId> {
        self.sync.mirrors_of(id).collect()
    }

    /// Has a shared component or is mirrored by other nodes
    pub fn is_synced(&self, id: NodeId) -> bool {
        self.sync.is_synced(id)
    }

    /// Owned by the hidden shadow document
    pub fn is_shared_component(&self, id: NodeId) -> bool {
        match (self.shadow_document, self.nodes.get(&id)) {
            (Some(shadow), Some(node)) => node.owner_document == Some(shadow),
            _ => false,
        }
    }

    /// No parent and no owner document
    pub fn in_trash(&self, id: NodeId) -> bool {
        match self.nodes.get(&id) {
            Some(node) => {
                !node.kind.is_page() && node.parent.is_none() && node.owner_document.is_none()
            }
            None => false,
        }
    }

    // ---------------------------------------------------------------
    // Raw writes (journaled, no validation)
    // ---------------------------------------------------------------

    fn record(&mut self, id: NodeId) {
        if let Some(journal) = self.journal.as_mut() {
            if !journal.originals.contains_key(&id) {
                let original = self.nodes.get(&id).cloned();
                journal.originals.insert(id, original);
            }
        }
    }

    fn node_mut(&mut self, id: NodeId) -> DomResult<&mut Node> {
        self.record(id);
        self.nodes.get_mut(&id).ok_or(DomError::UnknownNode(id))
    }

    fn allocate_id(&mut self) -> NodeId {
        self.next_id += 1;
        while self.nodes.contains_key(&NodeId(self.next_id)) {
            self.next_id += 1;
        }
        NodeId(self.next_id)
    }

    /// Create a detached, document-less node
    pub(crate) fn insert_node(&mut self, spec: NodeSpec) -> NodeId {
        let id = self.allocate_id();
        self.insert_node_with_id(id, spec);
        id
    }

    pub(crate) fn insert_node_with_id(&mut self, id: NodeId, spec: NodeSpec) {
        self.record(id);
        if id.0 > self.next_id {
            self.next_id = id.0;
        }
        self.nodes.insert(id, Node::new(id, spec));
    }

    /// Insert `child` into `parent`'s children at `index` (clamped).
    /// `child` must be detached.
    pub(crate) fn attach(&mut self, parent: NodeId, child: NodeId, index: usize) -> DomResult<()> {
        self.node(child)?;
        let len = self.node(parent)?.children.len();
        let index = index.min(len);

        self.node_mut(parent)?.children.insert(index, child);
        self.node_mut(child)?.parent = Some(parent);
        self.reindex(parent, index)
    }

    /// Remove `child` from its parent's child list, if any
    pub(crate) fn detach(&mut self, child: NodeId) -> DomResult<()> {
        let (parent, position) = {
            let node = self.node(child)?;
            match node.parent {
                Some(parent) => (parent, node.position),
                None => return Ok(()),
            }
        };

        let parent_node = self.node_mut(parent)?;
        let index = match parent_node.children.get(position) {
            Some(c) if *c == child => position,
            _ => parent_node
                .children
                .iter()
                .position(|c| *c == child)
                .unwrap_or(parent_node.children.len()),
        };
        if index < parent_node.children.len() {
            parent_node.children.remove(index);
        }

        let node = self.node_mut(child)?;
        node.parent = None;
        node.position = 0;
        self.reindex(parent, index)
    }

    fn reindex(&mut self, parent: NodeId, from: usize) -> DomResult<()> {
        let children = self.node(parent)?.children.clone();
        for (position, child) in children.iter().enumerate().skip(from) {
            let node = self.node_mut(*child)?;
            node.position = position;
        }
        Ok(())
    }

    /// Set the owner document of `root` and every node below it.
    /// Pages keep owning themselves.
    pub(crate) fn set_owner_subtree(&mut self, root: NodeId, document: Option<NodeId>) -> DomResult<()> {
        let mut ids = vec![root];
        ids.extend(self.descendants(root));
        for id in ids {
            let node = self.node_mut(id)?;
            if !node.kind.is_page() {
                node.owner_document = document;
            }
        }
        Ok(())
    }

    pub(crate) fn set_spec(&mut self, id: NodeId, spec: NodeSpec) -> DomResult<()> {
        let node = self.node_mut(id)?;
        let version = match node.kind {
            NodeKind::Page { version, .. } => Some(version),
            _ => None,
        };
        node.kind = spec.kind;
        if let (Some(v), NodeKind::Page { version, .. }) = (version, &mut node.kind) {
            *version = v;
        }
        node.properties = spec.properties;
        node.link = spec.link;
        Ok(())
    }

    pub(crate) fn set_owner(&mut self, id: NodeId, owner: Option<String>) -> DomResult<()> {
        self.node_mut(id)?.properties.owner = owner;
        Ok(())
    }

    pub(crate) fn bump_page_version(&mut self, page: NodeId) -> DomResult<()> {
        if let NodeKind::Page { version, .. } = &mut self.node_mut(page)?.kind {
            *version += 1;
        }
        Ok(())
    }

    pub(crate) fn link_synced(&mut self, mirror: NodeId, component: NodeId) -> DomResult<()> {
        let previous = self.sync.link(mirror, component);
        if let Some(previous) = previous {
            self.record(previous);
        }
        self.record(component);
        self.node_mut(mirror)?.shared_component = Some(component);
        Ok(())
    }

    pub(crate) fn unlink_synced(&mut self, mirror: NodeId) -> DomResult<Option<NodeId>> {
        let component = self.sync.unlink(mirror);
        if let Some(component) = component {
            self.record(component);
        }
        self.node_mut(mirror)?.shared_component = None;
        Ok(component)
    }

    /// Hidden page owning shared components, created on first use
    pub(crate) fn ensure_shadow_document(&mut self) -> NodeId {
        if let Some(shadow) = self.shadow_document {
            return shadow;
        }
        let id = self.insert_node(NodeSpec::new(NodeKind::Page {
            name: SHADOW_DOCUMENT_NAME.to_string(),
            version: 0,
            shadow: true,
        }));
        self.shadow_document = Some(id);
        id
    }

    pub(crate) fn register_shadow_document(&mut self, id: NodeId) {
        self.shadow_document = Some(id);
    }

    // ---------------------------------------------------------------
    // Journal
    // ---------------------------------------------------------------

    pub(crate) fn in_journal(&self) -> bool {
        self.journal.is_some()
    }

    pub(crate) fn begin_journal(&mut self) {
        self.journal = Some(Journal {
            originals: HashMap::new(),
            sync: self.sync.clone(),
            next_id: self.next_id,
            shadow_document: self.shadow_document,
        });
    }

    /// Ids touched since `begin_journal`, in ascending order
    pub(crate) fn touched(&self) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self
            .journal
            .as_ref()
            .map(|j| j.originals.keys().copied().collect())
            .unwrap_or_default();
        ids.sort();
        ids
    }

    pub(crate) fn commit_journal(&mut self) {
        self.journal = None;
    }

    /// Restore every touched node to its state at `begin_journal`
    pub(crate) fn rollback_journal(&mut self) {
        let Some(journal) = self.journal.take() else {
            return;
        };
        for (id, original) in journal.originals {
            match original {
                Some(node) => {
                    self.nodes.insert(id, node);
                }
                None => {
                    self.nodes.remove(&id);
                }
            }
        }
        self.sync = journal.sync;
        self.next_id = journal.next_id;
        self.shadow_document = journal.shadow_document;
    }
}

/// Iterator returned by [`Tree::descendants`]
pub struct Descendants<'a> {
    tree: &'a Tree,
    stack: Vec<NodeId>,
    visited: HashSet<NodeId>,
    done: bool,
}

impl<'a> Iterator for Descendants<'a> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        if self.done {
            return None;
        }
        let id = self.stack.pop()?;
        if !self.visited.insert(id) {
            warn!(node = %id, "Node reached twice while collecting descendants, stopping traversal");
            self.done = true;
            return None;
        }
        self.stack
            .extend(self.tree.children(id).iter().rev().copied());
        Some(id)
    }
}

/// Iterator returned by [`Tree::ancestors`]
pub struct Ancestors<'a> {
    tree: &'a Tree,
    current: Option<NodeId>,
    visited: HashSet<NodeId>,
}

impl<'a> Iterator for Ancestors<'a> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let id = self.current?;
        if !self.visited.insert(id) {
            warn!(node = %id, "Parent chain loops, stopping ascent");
            self.current = None;
            return None;
        }
        self.current = self.tree.parent(id);
        Some(id)
    }
}
