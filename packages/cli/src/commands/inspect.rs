use anyhow::Result;
use clap::Args;
use colored::Colorize;
use pagetree_dom::visitor::{walk_children, walk_node, KindCounter, Visitor};
use pagetree_dom::{format_hash, merkle_hashes, Node, NodeId, NodeKind, NodeSnapshot, Tree};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Snapshot JSON to inspect
    pub input: PathBuf,

    /// Hide subtree hashes
    #[arg(long)]
    pub no_hashes: bool,
}

pub fn inspect(args: InspectArgs, _cwd: &str) -> Result<()> {
    println!("🔍 {} {}", "Inspecting".green().bold(), args.input.display());
    println!();

    let snapshot = NodeSnapshot::from_json(&fs::read_to_string(&args.input)?)?;
    let mut tree = Tree::new();
    let root = tree.import_snapshot(&snapshot)?;

    for line in outline(&tree, root, !args.no_hashes) {
        println!("   {}", line);
    }

    println!();
    let summary: Vec<String> = kind_counts(&tree, root)
        .into_iter()
        .map(|(kind, count)| format!("{} {}", count, kind))
        .collect();
    println!("   {}", summary.join(", ").dimmed());

    Ok(())
}

/// One line per node, indented by depth
pub fn outline(tree: &Tree, root: NodeId, with_hashes: bool) -> Vec<String> {
    let mut printer = OutlinePrinter {
        hashes: if with_hashes {
            merkle_hashes(tree, root)
        } else {
            HashMap::new()
        },
        depth: 0,
        lines: Vec::new(),
    };
    walk_node(&mut printer, tree, root);
    printer.lines
}

pub fn kind_counts(tree: &Tree, root: NodeId) -> Vec<(&'static str, usize)> {
    let mut counter = KindCounter::default();
    walk_node(&mut counter, tree, root);
    counter.counts.into_iter().collect()
}

struct OutlinePrinter {
    hashes: HashMap<NodeId, u32>,
    depth: usize,
    lines: Vec<String>,
}

impl OutlinePrinter {
    fn line(&mut self, tree: &Tree, node: &Node) {
        let label = match node.kind() {
            NodeKind::Page { name, .. } => format!("page {}", name),
            NodeKind::Element { tag, .. } => format!("<{}>", tag),
            NodeKind::Text { content, .. } => format!("{:?}", content),
            NodeKind::Component { name } => format!("component {}", name),
            NodeKind::Fragment => "fragment".to_string(),
        };

        let mut line = format!(
            "{}{} {}",
            "  ".repeat(self.depth),
            label,
            tree.position_path(node.id())
        );
        if let Some(hash) = self.hashes.get(&node.id()) {
            line.push_str(&format!(" #{}", format_hash(*hash)));
        }
        if tree.is_shared_component(node.id()) {
            line.push_str(" [shared]");
        } else if tree.is_synced(node.id()) {
            line.push_str(" [synced]");
        }
        if let Some(key) = &node.properties().data_key {
            line.push_str(&format!(" [data-key={}]", key));
        }
        self.lines.push(line);
    }

    fn nested(&mut self, tree: &Tree, node: &Node) {
        self.line(tree, node);
        self.depth += 1;
        walk_children(self, tree, node);
        self.depth -= 1;
    }
}

impl Visitor for OutlinePrinter {
    fn visit_page(&mut self, tree: &Tree, node: &Node) {
        self.nested(tree, node);
    }

    fn visit_element(&mut self, tree: &Tree, node: &Node) {
        self.nested(tree, node);
    }

    fn visit_text(&mut self, tree: &Tree, node: &Node) {
        self.line(tree, node);
    }

    fn visit_component(&mut self, tree: &Tree, node: &Node) {
        self.nested(tree, node);
    }

    fn visit_fragment(&mut self, tree: &Tree, node: &Node) {
        self.nested(tree, node);
    }
}
