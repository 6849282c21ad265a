use pagetree_dom::{
    merkle_hashes, AllowAll, MemoryStore, MutationEngine, NodeKind, NodeSnapshot, Principal, Tree,
};

fn shop_page() -> NodeSnapshot {
    NodeSnapshot::from_json(
        r#"{
            "type": "page",
            "name": "shop",
            "children": [
                { "type": "component", "name": "card", "children": [
                    { "type": "element", "tag": "h2", "children": [
                        { "type": "text", "content": "Title" }
                    ] }
                ] },
                { "type": "element", "tag": "ul", "children": [
                    { "type": "element", "tag": "li" },
                    { "type": "element", "tag": "li" }
                ] }
            ]
        }"#,
    )
    .unwrap()
}

#[test]
fn test_closest_component_within_page() {
    let mut tree = Tree::new();
    let page = tree.import_snapshot(&shop_page()).unwrap();
    let card = tree.children(page)[0];
    let h2 = tree.children(card)[0];

    assert_eq!(tree.closest_component(h2, page), Some(card));
    assert_eq!(tree.closest_page(h2), Some(page));
    assert_eq!(tree.ancestors(h2).collect::<Vec<_>>(), vec![card, page]);
}

#[test]
fn test_closest_component_resolves_mirror_for_page() {
    let mut tree = Tree::new();
    let mut store = MemoryStore::new();
    let page = tree.import_snapshot(&shop_page()).unwrap();
    let card = tree.children(page)[0];

    let shared = {
        let mut engine = MutationEngine::new(&mut tree, &mut store, &AllowAll, Principal::admin("root"));
        engine.create_shared_component(card).unwrap()
    };
    let shared_h2 = tree.children(shared)[0];

    // Walking from the shared copy yields the mirror living in `page`
    assert_eq!(tree.closest_component(shared_h2, page), Some(card));
    assert!(tree.is_shared_component(shared));
    assert!(!tree.is_shared_component(card));
    assert_eq!(tree.pages(), vec![page]);
}

#[test]
fn test_identical_subtrees_share_merkle_hash() {
    let mut tree = Tree::new();
    let page = tree.import_snapshot(&shop_page()).unwrap();
    let ul = tree.children(page)[1];
    let items = tree.children(ul).to_vec();

    let hashes = merkle_hashes(&tree, page);
    assert_eq!(hashes[&items[0]], hashes[&items[1]]);
    assert_ne!(hashes[&items[0]], hashes[&ul]);
}

#[test]
fn test_export_import_preserves_shape() {
    let mut tree = Tree::new();
    let page = tree.import_snapshot(&shop_page()).unwrap();
    let exported = tree.export_snapshot(page).unwrap();

    let json = exported.to_json_pretty().unwrap();
    let mut copy = Tree::new();
    let copy_page = copy.import_snapshot(&NodeSnapshot::from_json(&json).unwrap()).unwrap();

    assert_eq!(copy_page, page);
    assert_eq!(copy.text_content(copy_page), "Title");
    assert_eq!(
        merkle_hashes(&copy, copy_page)[&copy_page],
        merkle_hashes(&tree, page)[&page]
    );
    assert!(matches!(copy.node(copy_page).unwrap().kind(), NodeKind::Page { .. }));
}

#[test]
fn test_page_path_uses_names() {
    let mut tree = Tree::new();
    let page = tree.import_snapshot(&shop_page()).unwrap();
    let ul = tree.children(page)[1];
    let second = tree.children(ul)[1];

    assert_eq!(tree.page_path(second), "/shop/ul/li");
    assert_eq!(tree.position_path(second), "/1/1");
}
