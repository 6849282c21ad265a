//! # Mutation Engine
//!
//! Permission-checked, transactional structural operations on the tree.
//!
//! ## Validation order
//!
//! Every insertion validates before it touches anything:
//!
//! 1. write access on the target parent
//! 2. the parent kind accepts children
//! 3. hierarchy: not the parent itself, not an ancestor, not a page
//! 4. same document (document-less nodes are adopted, the shadow
//!    document is neutral)
//! 5. the reference child is a child of the parent
//! 6. synced parents, per [`SyncedParentPolicy`]
//!
//! ## Transactions
//!
//! Each public operation runs in one store transaction. Calls made from
//! inside [`MutationEngine::transaction`] join the outer one. On failure
//! the in-memory tree is restored from the journal and the store is rolled
//! back; on success every page whose tree was touched gets its version
//! bumped before the touched nodes are persisted.

use crate::config::{MutationConfig, SyncedParentPolicy};
use crate::errors::{DomError, DomResult};
use crate::node::{NodeId, NodeKind, NodeSpec};
use crate::permissions::{PermissionEvaluator, Principal};
use crate::store::NodeStore;
use crate::tree::Tree;
use std::collections::BTreeSet;
use tracing::{debug, instrument, warn};

pub struct MutationEngine<'a, S: NodeStore> {
    tree: &'a mut Tree,
    store: &'a mut S,
    permissions: &'a dyn PermissionEvaluator,
    principal: Principal,
    config: MutationConfig,
    depth: usize,
}

impl<'a, S: NodeStore> MutationEngine<'a, S> {
    pub fn new(
        tree: &'a mut Tree,
        store: &'a mut S,
        permissions: &'a dyn PermissionEvaluator,
        principal: Principal,
    ) -> Self {
        Self {
            tree,
            store,
            permissions,
            principal,
            config: MutationConfig::default(),
            depth: 0,
        }
    }

    pub fn with_config(mut self, config: MutationConfig) -> Self {
        self.config = config;
        self
    }

    pub fn tree(&self) -> &Tree {
        self.tree
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    // ---------------------------------------------------------------
    // Transactions
    // ---------------------------------------------------------------

    /// Run `f` atomically. Nested calls join the outermost transaction.
    pub fn transaction<T, F>(&mut self, f: F) -> DomResult<T>
    where
        F: FnOnce(&mut Self) -> DomResult<T>,
    {
        if self.depth > 0 {
            self.depth += 1;
            let result = f(self);
            self.depth -= 1;
            return result;
        }

        self.store.begin_transaction()?;
        self.tree.begin_journal();
        self.depth = 1;
        let result = f(self);
        self.depth = 0;

        let value = match result {
            Ok(value) => value,
            Err(e) => {
                debug!(error = %e, "Mutation failed, rolling back");
                self.abort();
                return Err(e);
            }
        };

        if let Err(e) = self.flush() {
            self.abort();
            return Err(e);
        }

        match self.store.commit() {
            Ok(()) => {
                self.tree.commit_journal();
                Ok(value)
            }
            Err(e) => {
                warn!(error = %e, "Store commit failed, restoring tree");
                self.tree.rollback_journal();
                Err(e.into())
            }
        }
    }

    fn abort(&mut self) {
        self.tree.rollback_journal();
        if let Err(e) = self.store.rollback() {
            warn!(error = %e, "Store rollback failed");
        }
    }

    /// Bump versions of touched pages and stage every touched node
    #[instrument(skip(self))]
    fn flush(&mut self) -> DomResult<()> {
        let mut pages = BTreeSet::new();
        for id in self.tree.touched() {
            if !self.tree.contains(id) {
                continue;
            }
            match self.tree.closest_page(id) {
                Some(page) => {
                    pages.insert(page);
                }
                None => {
                    for mirror in self.tree.synced_nodes(id) {
                        if let Some(page) = self.tree.closest_page(mirror) {
                            pages.insert(page);
                        }
                    }
                }
            }
        }
        for page in &pages {
            self.tree.bump_page_version(*page)?;
        }

        let touched = self.tree.touched();
        for id in &touched {
            match self.tree.get(*id) {
                Some(node) => self.store.persist(node)?,
                None => self.store.delete(*id)?,
            }
        }
        debug!(nodes = touched.len(), pages = pages.len(), "Flushed transaction");
        Ok(())
    }

    // ---------------------------------------------------------------
    // Checks
    // ---------------------------------------------------------------

    fn check_write(&self, id: NodeId) -> DomResult<()> {
        let node = self.tree.node(id)?;
        if self.permissions.can_write(&self.principal, node) {
            Ok(())
        } else {
            Err(DomError::NoModificationAllowed {
                node: id,
                reason: format!("{} has no write access", self.principal),
            })
        }
    }

    fn check_accepts_children(&self, parent: NodeId) -> DomResult<()> {
        let node = self.tree.node(parent)?;
        if node.kind().accepts_children() {
            Ok(())
        } else {
            Err(DomError::NotSupported(format!(
                "{} node {} cannot have children",
                node.kind().kind_name(),
                parent
            )))
        }
    }

    fn check_hierarchy(&self, parent: NodeId, child: NodeId) -> DomResult<()> {
        if parent == child {
            return Err(DomError::HierarchyViolation(format!(
                "{} cannot be its own child",
                child
            )));
        }
        if self.tree.is_ancestor(child, parent) {
            return Err(DomError::HierarchyViolation(format!(
                "{} is an ancestor of {}",
                child, parent
            )));
        }
        if self.tree.node(child)?.kind().is_page() {
            return Err(DomError::HierarchyViolation(format!(
                "page {} cannot be inserted as a child",
                child
            )));
        }
        Ok(())
    }

    /// Only a parent in the shadow document accepts nodes of any document
    fn check_same_document(&self, parent: NodeId, child: NodeId) -> DomResult<()> {
        let document = self.tree.owner_document(parent);
        let other = self.tree.owner_document(child);
        let shadow = self.tree.shadow_document();

        match (document, other) {
            (Some(document), Some(other)) if document != other && shadow != Some(document) => {
                Err(DomError::WrongDocument {
                    node: child,
                    document,
                })
            }
            _ => Ok(()),
        }
    }

    fn check_is_child(&self, parent: NodeId, child: NodeId) -> DomResult<()> {
        self.tree.node(child)?;
        if self.tree.parent(child) == Some(parent) {
            Ok(())
        } else {
            Err(DomError::NotFound { parent, child })
        }
    }

    fn check_synced_parent(&self, parent: NodeId) -> DomResult<()> {
        if self.config.synced_parent_policy == SyncedParentPolicy::Allow
            || !self.tree.is_synced(parent)
        {
            return Ok(());
        }
        Err(DomError::NoModificationAllowed {
            node: parent,
            reason: "node is part of a shared component relation".to_string(),
        })
    }

    // ---------------------------------------------------------------
    // Structural operations
    // ---------------------------------------------------------------

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> DomResult<NodeId> {
        self.transaction(|engine| {
            engine.insert(parent, child, None)?;
            Ok(child)
        })
    }

    /// Insert `new_child` before `reference`; `None` appends
    pub fn insert_before(
        &mut self,
        parent: NodeId,
        new_child: NodeId,
        reference: Option<NodeId>,
    ) -> DomResult<NodeId> {
        self.transaction(|engine| {
            engine.insert(parent, new_child, reference)?;
            Ok(new_child)
        })
    }

    /// Put `new_child` where `old_child` was. Returns `old_child`, which
    /// stays in its document but loses its parent.
    pub fn replace_child(
        &mut self,
        parent: NodeId,
        new_child: NodeId,
        old_child: NodeId,
    ) -> DomResult<NodeId> {
        self.transaction(|engine| {
            engine.check_write(parent)?;
            engine.check_is_child(parent, old_child)?;
            if new_child == old_child {
                return Ok(old_child);
            }
            engine.insert(parent, new_child, Some(old_child))?;
            engine.tree.detach(old_child)?;
            debug!(parent = %parent, new_child = %new_child, old_child = %old_child, "Replaced child");
            Ok(old_child)
        })
    }

    /// Detach `child` from `parent`. The node is not deleted.
    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) -> DomResult<NodeId> {
        self.transaction(|engine| {
            engine.check_write(parent)?;
            engine.check_is_child(parent, child)?;
            engine.check_synced_parent(parent)?;
            engine.tree.detach(child)?;
            debug!(parent = %parent, child = %child, "Removed child");
            Ok(child)
        })
    }

    /// Insert a node or expand a fragment at the reference position
    fn insert(&mut self, parent: NodeId, child: NodeId, reference: Option<NodeId>) -> DomResult<()> {
        if !self.tree.node(child)?.kind().is_fragment() {
            return self.insert_single(parent, child, reference);
        }

        self.check_write(parent)?;
        self.check_accepts_children(parent)?;
        if parent == child || self.tree.is_ancestor(child, parent) {
            return Err(DomError::HierarchyViolation(format!(
                "fragment {} contains {}",
                child, parent
            )));
        }

        let members = self.tree.children(child).to_vec();
        debug!(fragment = %child, members = members.len(), "Expanding fragment");
        for member in members {
            self.insert_single(parent, member, reference)?;
        }
        Ok(())
    }

    fn insert_single(&mut self, parent: NodeId, child: NodeId, reference: Option<NodeId>) -> DomResult<()> {
        self.check_write(parent)?;
        self.check_accepts_children(parent)?;
        self.check_hierarchy(parent, child)?;
        self.check_same_document(parent, child)?;
        if let Some(reference) = reference {
            self.check_is_child(parent, reference)?;
        }
        self.check_synced_parent(parent)?;
        if let Some(old_parent) = self.tree.parent(child) {
            if old_parent != parent {
                self.check_synced_parent(old_parent)?;
            }
        }

        if Some(child) == reference {
            return Ok(());
        }

        self.tree.detach(child)?;
        let index = match reference {
            Some(reference) => self.tree.node(reference)?.position(),
            None => self.tree.children(parent).len(),
        };
        self.tree.attach(parent, child, index)?;

        let document = self.tree.owner_document(parent);
        if self.tree.owner_document(child) != document {
            self.tree.set_owner_subtree(child, document)?;
        }

        debug!(parent = %parent, child = %child, index, "Inserted child");
        Ok(())
    }

    /// Copy a node's non-structural content into a new node in the same
    /// document. `deep` clones and attaches the whole subtree.
    pub fn clone_node(&mut self, id: NodeId, deep: bool) -> DomResult<NodeId> {
        self.transaction(|engine| engine.clone_recursive(id, deep))
    }

    fn clone_recursive(&mut self, id: NodeId, deep: bool) -> DomResult<NodeId> {
        let (mut spec, document, children) = {
            let node = self.tree.node(id)?;
            (
                node.spec(),
                node.owner_document(),
                node.children().to_vec(),
            )
        };
        spec.link = None;
        if let NodeKind::Page { version, shadow, .. } = &mut spec.kind {
            *version = 0;
            *shadow = false;
        }

        let clone = self.tree.insert_node(spec);
        self.tree.set_owner(clone, self.principal.name().map(str::to_string))?;
        if !self.tree.node(clone)?.kind().is_page() {
            self.tree.set_owner_subtree(clone, document)?;
        }

        if deep {
            for child in children {
                let child_clone = self.clone_recursive(child, true)?;
                let index = self.tree.children(clone).len();
                self.tree.attach(clone, child_clone, index)?;
            }
            let document = self.tree.owner_document(clone);
            self.tree.set_owner_subtree(clone, document)?;
        }

        debug!(source = %id, clone = %clone, deep, "Cloned node");
        Ok(clone)
    }

    /// Merge adjacent text children into one, recursively. No-op without an
    /// owner document.
    pub fn normalize(&mut self, id: NodeId) -> DomResult<()> {
        self.transaction(|engine| engine.normalize_recursive(id))
    }

    fn normalize_recursive(&mut self, id: NodeId) -> DomResult<()> {
        if self.tree.owner_document(id).is_none() {
            return Ok(());
        }

        let mut index = 0;
        loop {
            let children = self.tree.children(id).to_vec();
            let Some(current) = children.get(index).copied() else {
                break;
            };
            let next = children.get(index + 1).copied();

            let pair = next.and_then(|next| {
                let first = self.text_of(current)?;
                let second = self.text_of(next)?;
                Some((next, first, second))
            });

            match pair {
                Some((next, first, second)) => {
                    self.check_write(id)?;
                    self.check_synced_parent(id)?;
                    let mut spec = self.tree.node(current)?.spec();
                    if let NodeKind::Text { content, .. } = &mut spec.kind {
                        *content = format!("{}{}", first, second);
                    }
                    self.tree.set_spec(current, spec)?;
                    self.tree.detach(next)?;
                    self.tree.set_owner_subtree(next, None)?;
                    debug!(into = %current, merged = %next, "Merged adjacent text nodes");
                }
                None => {
                    self.normalize_recursive(current)?;
                    index += 1;
                }
            }
        }
        Ok(())
    }

    fn text_of(&self, id: NodeId) -> Option<String> {
        self.tree
            .get(id)
            .and_then(|n| n.kind().text_content())
            .map(str::to_string)
    }

    // ---------------------------------------------------------------
    // Documents
    // ---------------------------------------------------------------

    fn require_page(&self, id: NodeId) -> DomResult<()> {
        if self.tree.node(id)?.kind().is_page() {
            Ok(())
        } else {
            Err(DomError::NotSupported(format!("{} is not a page", id)))
        }
    }

    /// Detach `id` and move its whole subtree into `page`
    pub fn adopt_node(&mut self, page: NodeId, id: NodeId) -> DomResult<NodeId> {
        self.transaction(|engine| {
            engine.require_page(page)?;
            engine.check_write(page)?;
            if engine.tree.node(id)?.kind().is_page() {
                return Err(DomError::NotSupported(format!(
                    "page {} cannot be adopted",
                    id
                )));
            }
            if let Some(parent) = engine.tree.parent(id) {
                engine.check_synced_parent(parent)?;
            }
            engine.tree.detach(id)?;
            engine.tree.set_owner_subtree(id, Some(page))?;
            debug!(page = %page, node = %id, "Adopted node");
            Ok(id)
        })
    }

    /// Clone `id` (optionally deep) and adopt the clone into `page`
    pub fn import_node(&mut self, page: NodeId, id: NodeId, deep: bool) -> DomResult<NodeId> {
        self.transaction(|engine| {
            engine.require_page(page)?;
            let clone = engine.clone_recursive(id, deep)?;
            engine.adopt_node(page, clone)
        })
    }

    /// Create a node; non-page nodes belong to `document` when given
    pub fn create(&mut self, document: Option<NodeId>, spec: NodeSpec) -> DomResult<NodeId> {
        self.transaction(|engine| {
            let is_page = spec.kind.is_page();
            if let (Some(document), false) = (document, is_page) {
                engine.require_page(document)?;
                engine.check_write(document)?;
            }

            let id = engine.tree.insert_node(spec);
            engine
                .tree
                .set_owner(id, engine.principal.name().map(str::to_string))?;
            if !is_page {
                engine.tree.set_owner_subtree(id, document)?;
            }
            debug!(node = %id, kind = engine.tree.node(id)?.kind().kind_name(), "Created node");
            Ok(id)
        })
    }

    pub fn create_page(&mut self, name: &str) -> DomResult<NodeId> {
        self.create(None, NodeSpec::new(NodeKind::page(name)))
    }

    pub fn create_element(&mut self, document: NodeId, tag: &str) -> DomResult<NodeId> {
        self.create(Some(document), NodeSpec::new(NodeKind::element(tag)))
    }

    pub fn create_text(&mut self, document: NodeId, content: &str) -> DomResult<NodeId> {
        self.create(Some(document), NodeSpec::new(NodeKind::text(content)))
    }

    pub fn create_component(&mut self, document: NodeId, name: &str) -> DomResult<NodeId> {
        self.create(Some(document), NodeSpec::new(NodeKind::component(name)))
    }

    pub fn create_fragment(&mut self, document: NodeId) -> DomResult<NodeId> {
        self.create(Some(document), NodeSpec::new(NodeKind::Fragment))
    }

    /// Detach `id` and clear the owner document of its subtree
    pub fn trash_node(&mut self, id: NodeId) -> DomResult<()> {
        self.transaction(|engine| {
            if engine.tree.node(id)?.kind().is_page() {
                return Err(DomError::NotSupported(format!(
                    "page {} cannot be trashed",
                    id
                )));
            }
            match engine.tree.parent(id) {
                Some(parent) => {
                    engine.check_write(parent)?;
                    engine.check_synced_parent(parent)?;
                }
                None => engine.check_write(id)?,
            }
            engine.tree.detach(id)?;
            engine.tree.set_owner_subtree(id, None)?;
            debug!(node = %id, "Trashed node");
            Ok(())
        })
    }

    /// Replace the non-structural content of `id`; the kind must match
    pub fn update_node(&mut self, id: NodeId, spec: NodeSpec) -> DomResult<()> {
        self.transaction(|engine| {
            engine.check_write(id)?;
            let node = engine.tree.node(id)?;
            if !node.kind().same_kind(&spec.kind) {
                return Err(DomError::NotSupported(format!(
                    "cannot change {} node {} into {}",
                    node.kind().kind_name(),
                    id,
                    spec.kind.kind_name()
                )));
            }
            engine.tree.set_spec(id, spec)?;
            debug!(node = %id, "Updated node");
            Ok(())
        })
    }

    // ---------------------------------------------------------------
    // Shared components
    // ---------------------------------------------------------------

    /// Make `mirror` mirror `component`. Sync chains are rejected.
    pub fn link_synced(&mut self, mirror: NodeId, component: NodeId) -> DomResult<()> {
        self.transaction(|engine| {
            engine.check_write(mirror)?;
            let (mirror_kind, component_kind) = (
                engine.tree.node(mirror)?.kind().clone(),
                engine.tree.node(component)?.kind().clone(),
            );
            if mirror == component {
                return Err(DomError::HierarchyViolation(format!(
                    "{} cannot mirror itself",
                    mirror
                )));
            }
            if !mirror_kind.same_kind(&component_kind) {
                return Err(DomError::NotSupported(format!(
                    "{} node cannot mirror a {} node",
                    mirror_kind.kind_name(),
                    component_kind.kind_name()
                )));
            }
            if engine.tree.shared_component(component).is_some()
                || engine.tree.sync_index().has_mirrors(mirror)
            {
                return Err(DomError::NotSupported(format!(
                    "sync chain through {} or {}",
                    mirror, component
                )));
            }
            engine.tree.link_synced(mirror, component)?;
            debug!(mirror = %mirror, component = %component, "Linked synced node");
            Ok(())
        })
    }

    pub fn unlink_synced(&mut self, mirror: NodeId) -> DomResult<Option<NodeId>> {
        self.transaction(|engine| {
            engine.check_write(mirror)?;
            let component = engine.tree.unlink_synced(mirror)?;
            debug!(mirror = %mirror, component = ?component, "Unlinked synced node");
            Ok(component)
        })
    }

    /// Deep-clone `id` into the shadow document and link `id` as its first
    /// mirror. Returns the shared component.
    pub fn create_shared_component(&mut self, id: NodeId) -> DomResult<NodeId> {
        self.transaction(|engine| {
            engine.check_write(id)?;
            if engine.tree.is_synced(id) {
                return Err(DomError::NotSupported(format!(
                    "{} is already synced",
                    id
                )));
            }
            if engine.tree.node(id)?.kind().is_page() {
                return Err(DomError::NotSupported(format!(
                    "page {} cannot become a shared component",
                    id
                )));
            }

            let shadow = engine.tree.ensure_shadow_document();
            let component = engine.clone_recursive(id, true)?;
            let index = engine.tree.children(shadow).len();
            engine.tree.attach(shadow, component, index)?;
            engine.tree.set_owner_subtree(component, Some(shadow))?;
            engine.tree.link_synced(id, component)?;

            debug!(node = %id, component = %component, "Created shared component");
            Ok(component)
        })
    }
}
