use crate::node::{Node, NodeId, NodeKind};
use crate::tree::Tree;

/// Visitor pattern for traversing the tree immutably
///
/// Default implementations walk every child in position order.
/// Override specific visit_* methods to act on a node kind.
pub trait Visitor: Sized {
    fn visit_page(&mut self, tree: &Tree, node: &Node) {
        walk_children(self, tree, node);
    }

    fn visit_element(&mut self, tree: &Tree, node: &Node) {
        walk_children(self, tree, node);
    }

    fn visit_text(&mut self, _tree: &Tree, _node: &Node) {
        // Leaf node, no children to walk
    }

    fn visit_component(&mut self, tree: &Tree, node: &Node) {
        walk_children(self, tree, node);
    }

    fn visit_fragment(&mut self, tree: &Tree, node: &Node) {
        walk_children(self, tree, node);
    }
}

pub fn walk_node<V: Visitor>(visitor: &mut V, tree: &Tree, id: NodeId) {
    let Some(node) = tree.get(id) else {
        return;
    };
    match node.kind() {
        NodeKind::Page { .. } => visitor.visit_page(tree, node),
        NodeKind::Element { .. } => visitor.visit_element(tree, node),
        NodeKind::Text { .. } => visitor.visit_text(tree, node),
        NodeKind::Component { .. } => visitor.visit_component(tree, node),
        NodeKind::Fragment => visitor.visit_fragment(tree, node),
    }
}

/// Walk children in position order. Entries whose parent link disagrees,
/// or that would loop back to an ancestor, are skipped.
pub fn walk_children<V: Visitor>(visitor: &mut V, tree: &Tree, node: &Node) {
    for child in node.children() {
        if tree.parent(*child) != Some(node.id()) || tree.is_ancestor(*child, node.id()) {
            continue;
        }
        walk_node(visitor, tree, *child);
    }
}

/// Collects the content of every text node in document order
#[derive(Debug, Default)]
pub struct TextCollector {
    pub text: String,
}

impl Visitor for TextCollector {
    fn visit_text(&mut self, _tree: &Tree, node: &Node) {
        if let Some(content) = node.kind().text_content() {
            self.text.push_str(content);
        }
    }
}

/// Counts nodes per kind name
#[derive(Debug, Default)]
pub struct KindCounter {
    pub counts: std::collections::BTreeMap<&'static str, usize>,
}

impl KindCounter {
    fn bump(&mut self, node: &Node) {
        *self.counts.entry(node.kind().kind_name()).or_default() += 1;
    }
}

impl Visitor for KindCounter {
    fn visit_page(&mut self, tree: &Tree, node: &Node) {
        self.bump(node);
        walk_children(self, tree, node);
    }

    fn visit_element(&mut self, tree: &Tree, node: &Node) {
        self.bump(node);
        walk_children(self, tree, node);
    }

    fn visit_text(&mut self, _tree: &Tree, node: &Node) {
        self.bump(node);
    }

    fn visit_component(&mut self, tree: &Tree, node: &Node) {
        self.bump(node);
        walk_children(self, tree, node);
    }

    fn visit_fragment(&mut self, tree: &Tree, node: &Node) {
        self.bump(node);
        walk_children(self, tree, node);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::tests::sample;

    #[test]
    fn test_kind_counter() {
        let (tree, ids) = sample();
        let mut counter = KindCounter::default();
        walk_node(&mut counter, &tree, ids[0]);

        assert_eq!(counter.counts.get("page"), Some(&1));
        assert_eq!(counter.counts.get("element"), Some(&3));
        assert_eq!(counter.counts.get("text"), Some(&2));
    }
}
