//! JSON snapshots of a subtree.
//!
//! ```json
//! { "type": "page", "name": "home", "children": [
//!     { "type": "element", "tag": "h1", "children": [
//!         { "type": "text", "content": "Hello" } ] } ] }
//! ```
//!
//! Loading a snapshot bypasses the mutation engine: it is the bootstrap
//! path used for fixtures, exports and diff targets.

use crate::errors::{DomError, DomResult};
use crate::node::{Link, NodeId, NodeKind, NodeProperties, NodeSpec};
use crate::tree::Tree;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

fn is_default_properties(p: &NodeProperties) -> bool {
    *p == NodeProperties::default()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<NodeId>,

    #[serde(flatten)]
    pub kind: NodeKind,

    #[serde(default, skip_serializing_if = "is_default_properties")]
    pub properties: NodeProperties,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<Link>,

    /// Id of the shared component this node mirrors
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shared_component: Option<NodeId>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NodeSnapshot>,
}

impl NodeSnapshot {
    pub fn new(kind: NodeKind) -> Self {
        Self {
            id: None,
            kind,
            properties: NodeProperties::default(),
            link: None,
            shared_component: None,
            children: Vec::new(),
        }
    }

    pub fn with_children(mut self, children: Vec<NodeSnapshot>) -> Self {
        self.children = children;
        self
    }

    pub fn with_properties(mut self, properties: NodeProperties) -> Self {
        self.properties = properties;
        self
    }

    pub fn spec(&self) -> NodeSpec {
        NodeSpec {
            kind: self.kind.clone(),
            properties: self.properties.clone(),
            link: self.link.clone(),
        }
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

impl Tree {
    /// Build a tree from snapshots. Shared components (under the shadow
    /// page) should come first so mirrors can link to them.
    pub fn from_snapshots(snapshots: &[NodeSnapshot]) -> DomResult<Tree> {
        let mut tree = Tree::new();
        for snapshot in snapshots {
            tree.import_snapshot(snapshot)?;
        }
        Ok(tree)
    }

    /// Load `snapshot` as a new detached subtree and return its root.
    ///
    /// Snapshot ids are kept when free. A page root owns everything below
    /// it; any other root yields a document-less subtree.
    pub fn import_snapshot(&mut self, snapshot: &NodeSnapshot) -> DomResult<NodeId> {
        let mut links = Vec::new();
        let root = self.import_recursive(snapshot, &mut links)?;

        let document = match &snapshot.kind {
            NodeKind::Page { shadow, .. } => {
                if *shadow {
                    self.register_shadow_document(root);
                }
                Some(root)
            }
            _ => None,
        };
        self.set_owner_subtree(root, document)?;

        for (mirror, component) in links {
            if !self.contains(component) {
                return Err(DomError::UnknownNode(component));
            }
            self.link_synced(mirror, component)?;
        }

        debug!(root = %root, nodes = self.descendants(root).count() + 1, "Imported snapshot");
        Ok(root)
    }

    fn import_recursive(
        &mut self,
        snapshot: &NodeSnapshot,
        links: &mut Vec<(NodeId, NodeId)>,
    ) -> DomResult<NodeId> {
        let id = match snapshot.id {
            Some(id) if !self.contains(id) => {
                self.insert_node_with_id(id, snapshot.spec());
                id
            }
            _ => self.insert_node(snapshot.spec()),
        };

        if let Some(component) = snapshot.shared_component {
            links.push((id, component));
        }

        for (index, child) in snapshot.children.iter().enumerate() {
            if child.kind.is_page() {
                return Err(DomError::HierarchyViolation(format!(
                    "page cannot be a child of {}",
                    id
                )));
            }
            let child_id = self.import_recursive(child, links)?;
            self.attach(id, child_id, index)?;
        }
        Ok(id)
    }

    /// Export the subtree under `root`, ids included
    pub fn export_snapshot(&self, root: NodeId) -> DomResult<NodeSnapshot> {
        let mut seen = HashSet::new();
        self.export_recursive(root, &mut seen)
    }

    fn export_recursive(&self, id: NodeId, seen: &mut HashSet<NodeId>) -> DomResult<NodeSnapshot> {
        let node = self.node(id)?;
        seen.insert(id);

        let mut children = Vec::with_capacity(node.children().len());
        for child in node.children() {
            if seen.contains(child) {
                continue;
            }
            children.push(self.export_recursive(*child, seen)?);
        }

        Ok(NodeSnapshot {
            id: Some(id),
            kind: node.kind().clone(),
            properties: node.properties().clone(),
            link: node.link().cloned(),
            shared_component: node.shared_component(),
            children,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"{
        "type": "page",
        "name": "home",
        "children": [
            { "type": "element", "tag": "h1", "children": [
                { "type": "text", "content": "Hello" }
            ] },
            { "type": "element", "tag": "p", "attributes": { "class": "lead" } }
        ]
    }"#;

    #[test]
    fn test_import_sets_owner_document() {
        let snapshot = NodeSnapshot::from_json(PAGE).unwrap();
        let mut tree = Tree::new();
        let page = tree.import_snapshot(&snapshot).unwrap();

        assert_eq!(tree.children(page).len(), 2);
        for id in tree.descendants(page).collect::<Vec<_>>() {
            assert_eq!(tree.owner_document(id), Some(page));
        }
        assert_eq!(tree.text_content(page), "Hello");
    }

    #[test]
    fn test_export_keeps_structure() {
        let snapshot = NodeSnapshot::from_json(PAGE).unwrap();
        let mut tree = Tree::new();
        let page = tree.import_snapshot(&snapshot).unwrap();

        let exported = tree.export_snapshot(page).unwrap();
        assert_eq!(exported.id, Some(page));
        assert_eq!(exported.children[0].kind.tag(), Some("h1"));
        assert_eq!(
            exported.children[1].kind,
            NodeKind::element("p").with_attr("class", "lead")
        );
    }

    #[test]
    fn test_nested_page_rejected() {
        let snapshot = NodeSnapshot::new(NodeKind::page("outer"))
            .with_children(vec![NodeSnapshot::new(NodeKind::page("inner"))]);
        let mut tree = Tree::new();

        assert!(matches!(
            tree.import_snapshot(&snapshot),
            Err(DomError::HierarchyViolation(_))
        ));
    }

    #[test]
    fn test_snapshot_ids_are_kept_when_free() {
        let mut snapshot = NodeSnapshot::new(NodeKind::element("div"));
        snapshot.id = Some(NodeId(42));

        let mut tree = Tree::new();
        assert_eq!(tree.import_snapshot(&snapshot).unwrap(), NodeId(42));
        assert_ne!(tree.import_snapshot(&snapshot).unwrap(), NodeId(42));
    }

    #[test]
    fn test_shared_component_links_restored() {
        let mut component = NodeSnapshot::new(NodeKind::component("card"));
        component.id = Some(NodeId(10));
        let shadow = NodeSnapshot::new(NodeKind::Page {
            name: "__shadow__".to_string(),
            version: 0,
            shadow: true,
        })
        .with_children(vec![component]);

        let mut mirror = NodeSnapshot::new(NodeKind::component("card"));
        mirror.shared_component = Some(NodeId(10));
        let page = NodeSnapshot::new(NodeKind::page("home")).with_children(vec![mirror]);

        let tree = Tree::from_snapshots(&[shadow, page]).unwrap();
        let mirror_id = tree.node_ids().into_iter().find(|id| tree.shared_component(*id).is_some()).unwrap();

        assert!(tree.is_shared_component(NodeId(10)));
        assert!(tree.is_synced(mirror_id));
        assert_eq!(tree.synced_nodes(NodeId(10)), vec![mirror_id]);
    }
}
