//! Node records stored in the tree's central node table.
//!
//! A node is a shared structural record (parent, children, position, owner
//! document) plus a closed [`NodeKind`] tag and the non-structural
//! [`NodeProperties`]. Relations to other nodes are always ids into the
//! table, never owning references.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Stable node identifier, immutable after creation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Node kind (closed sum type, kind-specific rules are matches over the tag)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum NodeKind {
    /// Document root and document-identity boundary
    Page {
        name: String,
        #[serde(default)]
        version: u64,
        /// Hidden document owning shared components
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        shadow: bool,
    },

    /// HTML element
    Element {
        tag: String,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        attributes: BTreeMap<String, String>,
    },

    /// Text content
    Text {
        content: String,
        #[serde(default, rename = "contentType", skip_serializing_if = "Option::is_none")]
        content_type: Option<String>,
    },

    /// Reusable component container (renders its children only)
    Component { name: String },

    /// Ordered list of nodes expanded on insertion
    Fragment,
}

impl NodeKind {
    pub fn page(name: impl Into<String>) -> Self {
        NodeKind::Page {
            name: name.into(),
            version: 0,
            shadow: false,
        }
    }

    pub fn element(tag: impl Into<String>) -> Self {
        NodeKind::Element {
            tag: tag.into(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn text(content: impl Into<String>) -> Self {
        NodeKind::Text {
            content: content.into(),
            content_type: None,
        }
    }

    pub fn component(name: impl Into<String>) -> Self {
        NodeKind::Component { name: name.into() }
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        if let NodeKind::Element {
            ref mut attributes, ..
        } = self
        {
            attributes.insert(key.into(), value.into());
        }
        self
    }

    /// Short kind name used in logs and page paths
    pub fn kind_name(&self) -> &'static str {
        match self {
            NodeKind::Page { .. } => "page",
            NodeKind::Element { .. } => "element",
            NodeKind::Text { .. } => "text",
            NodeKind::Component { .. } => "component",
            NodeKind::Fragment => "fragment",
        }
    }

    pub fn is_page(&self) -> bool {
        matches!(self, NodeKind::Page { .. })
    }

    pub fn is_text(&self) -> bool {
        matches!(self, NodeKind::Text { .. })
    }

    pub fn is_fragment(&self) -> bool {
        matches!(self, NodeKind::Fragment)
    }

    pub fn is_component(&self) -> bool {
        matches!(self, NodeKind::Component { .. })
    }

    /// Whether nodes of this kind may hold children
    pub fn accepts_children(&self) -> bool {
        !self.is_text()
    }

    /// Same variant, ignoring payload
    pub fn same_kind(&self, other: &NodeKind) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }

    pub fn tag(&self) -> Option<&str> {
        match self {
            NodeKind::Element { tag, .. } => Some(tag),
            _ => None,
        }
    }

    pub fn text_content(&self) -> Option<&str> {
        match self {
            NodeKind::Text { content, .. } => Some(content),
            _ => None,
        }
    }
}

/// Access permission kinds granted to principals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Permission {
    Read,
    Write,
    Delete,
    AccessControl,
}

impl Permission {
    /// Single-letter form used by the export format
    pub fn short(&self) -> char {
        match self {
            Permission::Read => 'r',
            Permission::Write => 'w',
            Permission::Delete => 'd',
            Permission::AccessControl => 'a',
        }
    }

    pub fn from_short(c: char) -> Option<Self> {
        match c {
            'r' => Some(Permission::Read),
            'w' => Some(Permission::Write),
            'd' => Some(Permission::Delete),
            'a' => Some(Permission::AccessControl),
            _ => None,
        }
    }
}

/// Permissions granted on a node to a named principal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grant {
    pub principal: String,
    pub permissions: BTreeSet<Permission>,
}

impl Grant {
    pub fn new(principal: impl Into<String>, permissions: impl IntoIterator<Item = Permission>) -> Self {
        Self {
            principal: principal.into(),
            permissions: permissions.into_iter().collect(),
        }
    }
}

/// Link from a node to a linkable target (page or file path)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Link {
    pub path: String,
    #[serde(default)]
    pub to_page: bool,
}

/// Non-structural node properties: visibility, ownership, data binding
/// and rendering flags. Copied verbatim by `cloneNode`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NodeProperties {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    pub visible_to_public_users: bool,
    pub visible_to_authenticated_users: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub grants: Vec<Grant>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rest_query: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function_query: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub graph_query: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path_query: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub show_for_locales: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hide_for_locales: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub show_conditions: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hide_conditions: Option<String>,

    pub render_details: bool,
    pub hide_on_index: bool,
    pub hide_on_detail: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub shared_component_configuration: Option<String>,

    /// Persisted content hash carried through export/import
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_hash: Option<String>,
}

impl NodeProperties {
    pub fn public() -> Self {
        Self {
            visible_to_public_users: true,
            visible_to_authenticated_users: true,
            ..Self::default()
        }
    }

    pub fn grant(&self, principal: &str) -> Option<&Grant> {
        self.grants.iter().find(|g| g.principal == principal)
    }
}

/// The non-structural content of a node: everything a clone, an import or a
/// diff update carries over.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    pub kind: NodeKind,
    #[serde(default)]
    pub properties: NodeProperties,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<Link>,
}

impl NodeSpec {
    pub fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            properties: NodeProperties::default(),
            link: None,
        }
    }

    pub fn with_properties(mut self, properties: NodeProperties) -> Self {
        self.properties = properties;
        self
    }
}

/// A node in the central node table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub(crate) id: NodeId,
    pub(crate) kind: NodeKind,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) position: usize,
    pub(crate) owner_document: Option<NodeId>,
    pub(crate) shared_component: Option<NodeId>,
    pub(crate) link: Option<Link>,
    pub(crate) properties: NodeProperties,
}

impl Node {
    pub(crate) fn new(id: NodeId, spec: NodeSpec) -> Self {
        Self {
            id,
            kind: spec.kind,
            parent: None,
            children: Vec::new(),
            position: 0,
            owner_document: None,
            shared_component: None,
            link: spec.link,
            properties: spec.properties,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Position among siblings (0 for parentless nodes)
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn link(&self) -> Option<&Link> {
        self.link.as_ref()
    }

    pub fn properties(&self) -> &NodeProperties {
        &self.properties
    }

    /// Stored owner document; pages report themselves
    pub fn owner_document(&self) -> Option<NodeId> {
        if self.kind.is_page() {
            Some(self.id)
        } else {
            self.owner_document
        }
    }

    pub fn shared_component(&self) -> Option<NodeId> {
        self.shared_component
    }

    /// Non-structural content of this node
    pub fn spec(&self) -> NodeSpec {
        NodeSpec {
            kind: self.kind.clone(),
            properties: self.properties.clone(),
            link: self.link.clone(),
        }
    }

    /// Name used in page paths: name property, else tag or kind
    pub fn context_name(&self) -> String {
        if let Some(name) = &self.properties.name {
            return name.clone();
        }
        match &self.kind {
            NodeKind::Page { name, .. } | NodeKind::Component { name } => name.clone(),
            NodeKind::Element { tag, .. } => tag.clone(),
            other => other.kind_name().to_string(),
        }
    }

    /// Data hash property, else the node id
    pub fn id_hash_or_property(&self) -> String {
        self.properties
            .data_hash
            .clone()
            .unwrap_or_else(|| self.id.0.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_serialization_is_tagged() {
        let kind = NodeKind::element("div").with_attr("class", "row");
        let json = serde_json::to_value(&kind).unwrap();

        assert_eq!(json["type"], "element");
        assert_eq!(json["tag"], "div");
        assert_eq!(json["attributes"]["class"], "row");

        let back: NodeKind = serde_json::from_value(json).unwrap();
        assert_eq!(back, kind);
    }

    #[test]
    fn test_text_does_not_accept_children() {
        assert!(!NodeKind::text("hi").accepts_children());
        assert!(NodeKind::element("p").accepts_children());
        assert!(NodeKind::Fragment.accepts_children());
    }

    #[test]
    fn test_page_is_its_own_owner_document() {
        let node = Node::new(NodeId(7), NodeSpec::new(NodeKind::page("home")));
        assert_eq!(node.owner_document(), Some(NodeId(7)));
    }

    #[test]
    fn test_permission_short_form() {
        for permission in [
            Permission::Read,
            Permission::Write,
            Permission::Delete,
            Permission::AccessControl,
        ] {
            assert_eq!(Permission::from_short(permission.short()), Some(permission));
        }
        assert_eq!(Permission::from_short('x'), None);
    }

    #[test]
    fn test_context_name_prefers_name_property() {
        let mut node = Node::new(NodeId(1), NodeSpec::new(NodeKind::element("nav")));
        assert_eq!(node.context_name(), "nav");

        node.properties.name = Some("main-nav".to_string());
        assert_eq!(node.context_name(), "main-nav");
    }
}
