#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Block tree CRUD: cascading delete, depth maintenance, visibility.

mod common;

use common::{TestEngine, raw_node};
use pagecraft_kernel::models::{BlockStatus, CreateBlockNode, UpdateBlockNode};
use pagecraft_kernel::{EngineError, Visibility};
use serde_json::json;
use uuid::Uuid;

#[tokio::test]
async fn test_create_sets_depth_and_appends_position() {
    let t = TestEngine::new();
    let section = t.root("section").await;
    let first = t.text(&section, "content", "one").await;
    let second = t.text(&section, "content", "two").await;
    let columns = t.child("columns", &section, "content").await;
    let cell = t.text(&columns, "column1", "cell").await;

    assert_eq!(section.depth, 0);
    assert_eq!((first.depth, first.position), (1, 0));
    assert_eq!((second.depth, second.position), (1, 1));
    assert_eq!(columns.position, 2);
    assert_eq!((cell.depth, cell.position), (2, 0));
}

#[tokio::test]
async fn test_root_slot_is_dropped() {
    let t = TestEngine::new();
    let mut input = CreateBlockNode::root(t.page_id, "section");
    input.slot = Some("content".into());
    let root = t.engine.tree().create(input).await.unwrap();
    assert!(root.slot.is_none());
}

#[tokio::test]
async fn test_build_tree_orders_children_by_position() {
    let t = TestEngine::new();
    let section = t.root("section").await;
    for (position, body) in [(2, "c"), (0, "a"), (1, "b")] {
        t.engine
            .tree()
            .create(
                CreateBlockNode::child(t.page_id, "text", section.id, Some("content"))
                    .with_content(json!({ "text": body }))
                    .at_position(position),
            )
            .await
            .unwrap();
    }

    let forest = t.engine.tree().build_tree(t.page_id, Visibility::All).await.unwrap();
    assert_eq!(forest.len(), 1);
    let bodies: Vec<&str> = forest[0]
        .children
        .iter()
        .map(|c| c.node.content["text"].as_str().unwrap())
        .collect();
    assert_eq!(bodies, vec!["a", "b", "c"]);
}

#[tokio::test]
async fn test_build_tree_reports_nesting_level() {
    let t = TestEngine::new();
    let section = t.root("section").await;
    let mut stale = raw_node(t.page_id, "text", Some(section.id), Some("content"));
    stale.depth = 7;
    t.store.put_node_unchecked(stale);

    let forest = t.engine.tree().build_tree(t.page_id, Visibility::All).await.unwrap();
    assert_eq!(forest[0].children[0].node.depth, 1);
}

#[tokio::test]
async fn test_delete_cascades_to_descendants() {
    let t = TestEngine::new();
    let section = t.root("section").await;
    let container = t.child("container", &section, "content").await;
    t.text(&container, "content", "deep").await;
    t.text(&section, "content", "shallow").await;
    let other = t.root("section").await;

    let removed = t.engine.tree().delete(section.id).await.unwrap();
    assert_eq!(removed, 4);
    assert_eq!(t.store.node_count(), 1);
    assert!(t.engine.tree().get(other.id).await.unwrap().is_some());
}

#[tokio::test]
async fn test_delete_is_idempotent() {
    let t = TestEngine::new();
    let section = t.root("section").await;
    t.text(&section, "content", "x").await;

    assert_eq!(t.engine.tree().delete(section.id).await.unwrap(), 2);
    assert_eq!(t.engine.tree().delete(section.id).await.unwrap(), 0);
    assert_eq!(t.engine.tree().delete(Uuid::now_v7()).await.unwrap(), 0);
}

#[tokio::test]
async fn test_move_cascades_depth() {
    let t = TestEngine::new();
    let left = t.root("section").await;
    let container = t.child("container", &left, "content").await;
    let inner = t.child("container", &container, "content").await;
    let leaf = t.text(&inner, "content", "leaf").await;

    let right = t.root("section").await;
    let columns = t.child("columns", &right, "content").await;

    let moved = t
        .engine
        .tree()
        .move_node(container.id, Some(columns.id), Some("column2".into()), None)
        .await
        .unwrap();
    assert_eq!(moved.depth, 2);
    assert_eq!(moved.parent_block_id, Some(columns.id));
    assert_eq!(moved.slot.as_deref(), Some("column2"));
    assert_eq!(t.node(inner.id).await.depth, 3);
    assert_eq!(t.node(leaf.id).await.depth, 4);

    let lifted = t
        .engine
        .tree()
        .move_node(container.id, None, Some("column2".into()), None)
        .await
        .unwrap();
    assert_eq!(lifted.depth, 0);
    assert!(lifted.slot.is_none());
    assert_eq!(t.node(leaf.id).await.depth, 2);
}

#[tokio::test]
async fn test_move_keeps_position_among_same_siblings() {
    let t = TestEngine::new();
    let section = t.root("section").await;
    t.text(&section, "content", "a").await;
    let b = t.text(&section, "content", "b").await;

    let same = t
        .engine
        .tree()
        .move_node(b.id, Some(section.id), Some("content".into()), None)
        .await
        .unwrap();
    assert_eq!(same.position, 1);

    let columns = t.child("columns", &section, "content").await;
    t.text(&columns, "column1", "existing").await;
    let appended = t
        .engine
        .tree()
        .move_node(b.id, Some(columns.id), Some("column1".into()), None)
        .await
        .unwrap();
    assert_eq!(appended.position, 1);
}

#[tokio::test]
async fn test_move_rejects_cycles() {
    let t = TestEngine::new();
    let outer = t.root("container").await;
    let middle = t.child("container", &outer, "content").await;
    let inner = t.child("container", &middle, "content").await;

    let err = t
        .engine
        .tree()
        .move_node(outer.id, Some(inner.id), Some("content".into()), None)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Cycle { .. }));

    let err = t
        .engine
        .tree()
        .move_node(outer.id, Some(outer.id), Some("content".into()), None)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Cycle { .. }));

    assert!(t.node(outer.id).await.parent_block_id.is_none());
}

#[tokio::test]
async fn test_move_rejects_invalid_placement() {
    let t = TestEngine::new();
    let section = t.root("section").await;
    let columns = t.child("columns", &section, "content").await;
    let tabs = t.root("tabs").await;

    let err = t
        .engine
        .tree()
        .move_node(tabs.id, Some(columns.id), Some("column1".into()), None)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidPlacement { .. }));
}

#[tokio::test]
async fn test_update_with_new_parent_moves_subtree() {
    let t = TestEngine::new();
    let section = t.root("section").await;
    let container = t.root("container").await;
    let child = t.text(&container, "content", "x").await;

    let update = UpdateBlockNode {
        parent_block_id: Some(Some(section.id)),
        slot: Some(Some("content".into())),
        status: Some(BlockStatus::Published),
        ..Default::default()
    };
    let updated = t.engine.tree().update(container.id, update).await.unwrap();

    assert_eq!(updated.depth, 1);
    assert_eq!(updated.status, BlockStatus::Published);
    assert_eq!(t.node(child.id).await.depth, 2);
}

#[tokio::test]
async fn test_update_content_keeps_placement() {
    let t = TestEngine::new();
    let section = t.root("section").await;
    let heading = t.child("heading", &section, "content").await;

    let update = UpdateBlockNode {
        content: Some(json!({ "text": "Welcome", "level": 2 })),
        ..Default::default()
    };
    let updated = t.engine.tree().update(heading.id, update).await.unwrap();
    assert_eq!(updated.content["level"], 2);
    assert_eq!(updated.parent_block_id, Some(section.id));
    assert_eq!(updated.depth, 1);

    let bad = UpdateBlockNode {
        content: Some(json!({ "text": "<script>x</script>" })),
        ..Default::default()
    };
    let err = t.engine.tree().update(heading.id, bad).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidContent(_)));
}

#[tokio::test]
async fn test_update_missing_node_is_not_found() {
    let t = TestEngine::new();
    let err = t
        .engine
        .tree()
        .update(Uuid::now_v7(), UpdateBlockNode::default())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NotFound { .. }));
}

#[tokio::test]
async fn test_visibility_modes() {
    let t = TestEngine::new();
    let section = t.published("section", None).await;
    let draft = t.child("container", &section, "content").await;
    t.published("text", Some((&draft, "content"))).await;
    t.published("text", Some((&section, "content"))).await;

    let tree = t.engine.tree();

    let all = tree.build_tree(t.page_id, Visibility::All).await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].size(), 4);

    let published = tree.build_tree(t.page_id, Visibility::PublishedOnly).await.unwrap();
    assert_eq!(published.len(), 2, "orphaned published text becomes a root");
    assert_eq!(published.iter().map(|t| t.size()).sum::<usize>(), 3);

    let subtrees = tree
        .build_tree(t.page_id, Visibility::PublishedSubtrees)
        .await
        .unwrap();
    assert_eq!(subtrees.len(), 1);
    assert_eq!(subtrees[0].size(), 2);
}

#[tokio::test]
async fn test_descendants_lists_whole_subtree() {
    let t = TestEngine::new();
    let section = t.root("section").await;
    let container = t.child("container", &section, "content").await;
    let leaf = t.text(&container, "content", "leaf").await;

    let found = t.engine.tree().descendants(section.id).await.unwrap();
    let ids: Vec<Uuid> = found.iter().map(|n| n.id).collect();
    assert_eq!(ids, vec![container.id, leaf.id]);
}

#[tokio::test]
async fn test_page_locks_released_after_mutations() {
    let t = TestEngine::new();
    for _ in 0..200 {
        let page = Uuid::now_v7();
        let root = t
            .engine
            .tree()
            .create(CreateBlockNode::root(page, "section"))
            .await
            .unwrap();
        let child = t
            .engine
            .tree()
            .create(CreateBlockNode::child(page, "text", root.id, Some("content")))
            .await
            .unwrap();
        t.engine
            .tree()
            .move_node(child.id, None, None, None)
            .await
            .unwrap();
        t.engine.tree().delete(root.id).await.unwrap();
    }
    assert!(t.engine.locks().is_empty());
}
