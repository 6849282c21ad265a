use criterion::{black_box, criterion_group, criterion_main, Criterion};
use pagetree_diff::{compute_operations, merge, DiffConfig};
use pagetree_dom::{AllowAll, MemoryStore, MutationEngine, NodeId, NodeKind, NodeSnapshot, Principal, Tree};

/// A page with `sections` sections of `items` list items each
fn catalog(sections: usize, items: usize, reverse: bool) -> NodeSnapshot {
    let mut children = Vec::with_capacity(sections);
    for s in 0..sections {
        let mut list: Vec<NodeSnapshot> = (0..items)
            .map(|i| {
                NodeSnapshot::new(NodeKind::element("li"))
                    .with_children(vec![NodeSnapshot::new(NodeKind::text(format!("item {s}.{i}")))])
            })
            .collect();
        if reverse {
            list.reverse();
        }
        children.push(
            NodeSnapshot::new(NodeKind::element("section")).with_children(vec![
                NodeSnapshot::new(NodeKind::element("h2"))
                    .with_children(vec![NodeSnapshot::new(NodeKind::text(format!("Section {s}")))]),
                NodeSnapshot::new(NodeKind::element("ul")).with_children(list),
            ]),
        );
    }
    NodeSnapshot::new(NodeKind::page("catalog")).with_children(children)
}

fn load(snapshot: &NodeSnapshot) -> (Tree, NodeId) {
    let mut tree = Tree::new();
    let root = tree.import_snapshot(snapshot).unwrap();
    (tree, root)
}

fn compute_identical(c: &mut Criterion) {
    let (existing, er) = load(&catalog(20, 20, false));
    let (target, tr) = load(&catalog(20, 20, false));

    c.bench_function("compute_identical_400_items", |b| {
        b.iter(|| compute_operations(black_box(&existing), er, black_box(&target), tr))
    });
}

fn compute_reversed(c: &mut Criterion) {
    let (existing, er) = load(&catalog(20, 20, false));
    let (target, tr) = load(&catalog(20, 20, true));

    c.bench_function("compute_reversed_400_items", |b| {
        b.iter(|| compute_operations(black_box(&existing), er, black_box(&target), tr))
    });
}

fn merge_reversed(c: &mut Criterion) {
    let existing_snapshot = catalog(10, 20, false);
    let (target, tr) = load(&catalog(10, 20, true));

    c.bench_function("merge_reversed_200_items", |b| {
        b.iter(|| {
            let (mut existing, er) = load(&existing_snapshot);
            let mut store = MemoryStore::new();
            let mut engine =
                MutationEngine::new(&mut existing, &mut store, &AllowAll, Principal::admin("bench"));
            merge(&mut engine, er, black_box(&target), tr, &DiffConfig::default())
        })
    });
}

criterion_group!(benches, compute_identical, compute_reversed, merge_reversed);
criterion_main!(benches);
