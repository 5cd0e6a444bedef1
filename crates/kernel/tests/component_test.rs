#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Reusable components: definition capture, instantiation, compensation.

mod common;

use std::collections::HashSet;

use common::TestEngine;
use pagecraft_kernel::EngineError;
use pagecraft_kernel::models::{BlockNode, CreateDefinition, InstantiateComponent};
use pagecraft_kernel::store::{DefinitionQuery, StoreOp};
use serde_json::json;
use uuid::Uuid;

/// A section holding a columns block with one text per column.
async fn hero(t: &TestEngine) -> (BlockNode, Vec<BlockNode>) {
    let section = t.root("section").await;
    let columns = t.child("columns", &section, "content").await;
    let left = t.text(&columns, "column1", "left").await;
    let right = t.text(&columns, "column2", "right").await;
    (section.clone(), vec![section, columns, left, right])
}

fn define(name: &str, root: &BlockNode, nodes: &[BlockNode]) -> CreateDefinition {
    CreateDefinition {
        name: name.into(),
        description: Some("A reusable hero".into()),
        category: Some("marketing".into()),
        tags: vec!["hero".into()],
        source_node_ids: nodes.iter().map(|n| n.id).collect(),
        root_node_id: root.id,
        include_descendants: false,
        created_by: None,
        comment: Some("initial".into()),
    }
}

fn place(definition_id: Uuid, page_id: Uuid, parent: Option<&BlockNode>, slot: Option<&str>) -> InstantiateComponent {
    InstantiateComponent {
        definition_id,
        page_id,
        parent_block_id: parent.map(|p| p.id),
        slot: slot.map(str::to_string),
        position: None,
        overrides: None,
    }
}

#[tokio::test]
async fn test_create_definition_captures_subtree() {
    let t = TestEngine::new();
    let (root, nodes) = hero(&t).await;

    let definition = t
        .engine
        .components()
        .create_definition(define("Hero", &root, &nodes))
        .await
        .unwrap();
    assert_eq!(definition.version, 1);

    let snapshots = t.engine.components().list_snapshots(definition.id).await.unwrap();
    assert_eq!(snapshots.len(), 1);
    let tree = &snapshots[0].tree;
    assert_eq!(tree.root_id, root.id);
    assert_eq!(tree.nodes.len(), 4);
    let snap_root = tree.root().unwrap();
    assert!(snap_root.parent_id.is_none());
    assert!(snap_root.slot.is_none());
}

#[tokio::test]
async fn test_create_definition_captures_only_listed_nodes() {
    let t = TestEngine::new();
    let (root, nodes) = hero(&t).await;
    // Root and columns only; the texts are left out.
    let listed = &nodes[..2];

    let definition = t
        .engine
        .components()
        .create_definition(define("Hero", &root, listed))
        .await
        .unwrap();
    let snapshots = t.engine.components().list_snapshots(definition.id).await.unwrap();
    assert_eq!(snapshots[0].tree.nodes.len(), 2);

    let mut input = define("Hero full", &root, &nodes[..1]);
    input.include_descendants = true;
    let full = t.engine.components().create_definition(input).await.unwrap();
    let snapshots = t.engine.components().list_snapshots(full.id).await.unwrap();
    assert_eq!(snapshots[0].tree.nodes.len(), 4);
}

#[tokio::test]
async fn test_create_definition_rejects_bad_input() {
    let t = TestEngine::new();
    let (root, nodes) = hero(&t).await;

    let err = t
        .engine
        .components()
        .create_definition(define("   ", &root, &nodes))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidInput(_)));

    let err = t
        .engine
        .components()
        .create_definition(define("Hero", &root, &nodes[1..]))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidInput(_)));
    assert_eq!(t.store.definition_count(), 0);
}

#[tokio::test]
async fn test_snapshot_failure_removes_definition() {
    let t = TestEngine::new();
    let (root, nodes) = hero(&t).await;
    t.store.fail_next(StoreOp::InsertSnapshot);

    let err = t
        .engine
        .components()
        .create_definition(define("Hero", &root, &nodes))
        .await
        .unwrap_err();
    assert!(err.is_internal());
    assert_eq!(t.store.definition_count(), 0);
    assert_eq!(t.store.snapshot_count(), 0);
}

#[tokio::test]
async fn test_instantiate_sets_depth_from_target_parent() {
    let t = TestEngine::new();
    let (root, nodes) = hero(&t).await;
    let definition = t
        .engine
        .components()
        .create_definition(define("Hero", &root, &nodes))
        .await
        .unwrap();

    let page = t.root("section").await;
    let holder = t.child("container", &page, "content").await;
    let result = t
        .engine
        .components()
        .instantiate(place(definition.id, t.page_id, Some(&holder), Some("content")))
        .await
        .unwrap();

    let clone_root = result.root().unwrap();
    assert_eq!(clone_root.block_type, "section");
    assert_eq!(clone_root.depth, holder.depth + 1);
    assert_eq!(clone_root.parent_block_id, Some(holder.id));
    assert_eq!(clone_root.slot.as_deref(), Some("content"));

    let by_id: std::collections::HashMap<Uuid, &BlockNode> =
        result.nodes.iter().map(|n| (n.id, n)).collect();
    for node in &result.nodes {
        assert_eq!(node.instance_id, Some(result.instance.id));
        if let Some(parent) = node.parent_block_id.and_then(|p| by_id.get(&p)) {
            assert_eq!(node.depth, parent.depth + 1);
        }
    }
    let texts: Vec<&BlockNode> = result.nodes.iter().filter(|n| n.block_type == "text").collect();
    assert!(texts.iter().all(|n| n.depth == 4));
}

#[tokio::test]
async fn test_instantiations_get_fresh_ids() {
    let t = TestEngine::new();
    let (root, nodes) = hero(&t).await;
    let definition = t
        .engine
        .components()
        .create_definition(define("Hero", &root, &nodes))
        .await
        .unwrap();
    let target_page = Uuid::now_v7();

    let first = t
        .engine
        .components()
        .instantiate(place(definition.id, target_page, None, None))
        .await
        .unwrap();
    let second = t
        .engine
        .components()
        .instantiate(place(definition.id, target_page, None, None))
        .await
        .unwrap();

    let source: HashSet<Uuid> = nodes.iter().map(|n| n.id).collect();
    let a: HashSet<Uuid> = first.nodes.iter().map(|n| n.id).collect();
    let b: HashSet<Uuid> = second.nodes.iter().map(|n| n.id).collect();
    assert_eq!(a.len(), 4);
    assert!(a.is_disjoint(&b));
    assert!(a.is_disjoint(&source));

    // Internal links point inside each clone.
    for node in first.nodes.iter().skip(1) {
        assert!(a.contains(&node.parent_block_id.unwrap()));
    }
    assert_eq!(first.root().unwrap().depth, 0);
    assert_eq!(second.root().unwrap().position, 1);
    assert_eq!(first.nodes[0].page_id, target_page);

    assert_eq!(t.engine.components().usage_count(definition.id).await.unwrap(), 2);
}

#[tokio::test]
async fn test_instantiate_rejects_invalid_placement() {
    let t = TestEngine::new();
    let (root, nodes) = hero(&t).await;
    let definition = t
        .engine
        .components()
        .create_definition(define("Hero", &root, &nodes))
        .await
        .unwrap();
    let before = t.store.node_count();

    // A section cannot sit inside a columns cell.
    let columns = &nodes[1];
    let err = t
        .engine
        .components()
        .instantiate(place(definition.id, t.page_id, Some(columns), Some("column1")))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidPlacement { .. }));
    assert_eq!(t.store.node_count(), before);
}

#[tokio::test]
async fn test_instance_failure_removes_cloned_nodes() {
    let t = TestEngine::new();
    let (root, nodes) = hero(&t).await;
    let definition = t
        .engine
        .components()
        .create_definition(define("Hero", &root, &nodes))
        .await
        .unwrap();
    let before = t.store.node_count();
    t.store.fail_next(StoreOp::InsertInstance);

    let err = t
        .engine
        .components()
        .instantiate(place(definition.id, t.page_id, None, None))
        .await
        .unwrap_err();
    assert!(err.is_internal());
    assert_eq!(t.store.node_count(), before);
    assert_eq!(t.store.instance_count(), 0);
}

#[tokio::test]
async fn test_instantiate_unknown_definition() {
    let t = TestEngine::new();
    let err = t
        .engine
        .components()
        .instantiate(place(Uuid::now_v7(), t.page_id, None, None))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NotFound { .. }));
}

#[tokio::test]
async fn test_overrides_are_replaced_wholesale() {
    let t = TestEngine::new();
    let (root, nodes) = hero(&t).await;
    let definition = t
        .engine
        .components()
        .create_definition(define("Hero", &root, &nodes))
        .await
        .unwrap();
    let mut input = place(definition.id, t.page_id, None, None);
    input.overrides = Some(json!({ "title": "Hi" }));
    let result = t.engine.components().instantiate(input).await.unwrap();
    assert_eq!(result.instance.overrides, json!({ "title": "Hi" }));

    let updated = t
        .engine
        .components()
        .update_instance_overrides(result.instance.id, json!({ "subtitle": "There" }))
        .await
        .unwrap();
    assert_eq!(updated.overrides, json!({ "subtitle": "There" }));

    let err = t
        .engine
        .components()
        .update_instance_overrides(result.instance.id, json!(["not", "an", "object"]))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidInput(_)));

    let err = t
        .engine
        .components()
        .update_instance_overrides(Uuid::now_v7(), json!({}))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NotFound { .. }));
}

#[tokio::test]
async fn test_listing_reflects_creates_and_deletes() {
    let t = TestEngine::new();
    let (root, nodes) = hero(&t).await;
    let components = t.engine.components();
    let query = DefinitionQuery::default();

    assert_eq!(components.list_definitions(&query).await.unwrap().total, 0);

    let first = components
        .create_definition(define("Hero", &root, &nodes))
        .await
        .unwrap();
    assert_eq!(components.list_definitions(&query).await.unwrap().total, 1);
    // Served from cache, same answer.
    assert_eq!(components.list_definitions(&query).await.unwrap().total, 1);

    components
        .create_definition(define("Banner", &root, &nodes))
        .await
        .unwrap();
    assert_eq!(components.list_definitions(&query).await.unwrap().total, 2);

    let searched = DefinitionQuery {
        search: Some("bann".into()),
        ..Default::default()
    };
    let page = components.list_definitions(&searched).await.unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].name, "Banner");

    assert!(components.delete_definition(first.id).await.unwrap());
    assert_eq!(components.list_definitions(&query).await.unwrap().total, 1);
}

#[tokio::test]
async fn test_delete_definition_keeps_clones() {
    let t = TestEngine::new();
    let (root, nodes) = hero(&t).await;
    let definition = t
        .engine
        .components()
        .create_definition(define("Hero", &root, &nodes))
        .await
        .unwrap();
    let result = t
        .engine
        .components()
        .instantiate(place(definition.id, t.page_id, None, None))
        .await
        .unwrap();
    let before = t.store.node_count();

    assert!(t.engine.components().delete_definition(definition.id).await.unwrap());
    assert!(!t.engine.components().delete_definition(definition.id).await.unwrap());

    assert_eq!(t.store.node_count(), before);
    assert_eq!(t.store.instance_count(), 0);
    assert_eq!(t.store.snapshot_count(), 0);
    assert!(t.engine.tree().get(result.root().unwrap().id).await.unwrap().is_some());

    let err = t.engine.components().get_definition(definition.id).await.unwrap_err();
    assert!(matches!(err, EngineError::NotFound { .. }));
}
