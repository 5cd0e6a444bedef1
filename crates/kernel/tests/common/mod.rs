#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Common test utilities for integration tests.
//!
//! Every test builds its own engine over a fresh in-memory store, so tests
//! are independent and need no database.

#![allow(dead_code)]

use std::sync::Arc;

use serde_json::json;
use uuid::Uuid;

use pagecraft_kernel::cache::CacheLayer;
use pagecraft_kernel::models::{BlockNode, BlockStatus, CreateBlockNode};
use pagecraft_kernel::store::{LayoutStore, MemoryLayoutStore};
use pagecraft_kernel::{BlockSpecRegistry, LayoutEngine};

/// Engine plus a handle on its concrete store for fault injection and counts.
pub struct TestEngine {
    pub engine: LayoutEngine,
    pub store: Arc<MemoryLayoutStore>,
    pub page_id: Uuid,
}

impl TestEngine {
    pub fn new() -> Self {
        let store = Arc::new(MemoryLayoutStore::new());
        let dyn_store: Arc<dyn LayoutStore> = store.clone();
        let engine = LayoutEngine::new(
            dyn_store,
            BlockSpecRegistry::with_standard_types(),
            CacheLayer::new(60),
        );
        Self {
            engine,
            store,
            page_id: Uuid::now_v7(),
        }
    }

    pub async fn root(&self, block_type: &str) -> BlockNode {
        self.engine
            .tree()
            .create(CreateBlockNode::root(self.page_id, block_type))
            .await
            .expect("create root")
    }

    pub async fn child(&self, block_type: &str, parent: &BlockNode, slot: &str) -> BlockNode {
        self.engine
            .tree()
            .create(CreateBlockNode::child(
                self.page_id,
                block_type,
                parent.id,
                Some(slot),
            ))
            .await
            .expect("create child")
    }

    pub async fn text(&self, parent: &BlockNode, slot: &str, body: &str) -> BlockNode {
        self.engine
            .tree()
            .create(
                CreateBlockNode::child(self.page_id, "text", parent.id, Some(slot))
                    .with_content(json!({ "text": body })),
            )
            .await
            .expect("create text")
    }

    pub async fn published(&self, block_type: &str, parent: Option<(&BlockNode, &str)>) -> BlockNode {
        let input = match parent {
            Some((parent, slot)) => {
                CreateBlockNode::child(self.page_id, block_type, parent.id, Some(slot))
            }
            None => CreateBlockNode::root(self.page_id, block_type),
        };
        self.engine
            .tree()
            .create(input.with_status(BlockStatus::Published))
            .await
            .expect("create published node")
    }

    /// Every node on the page, keyed lookup by id.
    pub async fn node(&self, id: Uuid) -> BlockNode {
        self.engine
            .tree()
            .get(id)
            .await
            .unwrap()
            .expect("node should exist")
    }
}

/// A bare node row for seeding the store directly.
pub fn raw_node(page_id: Uuid, block_type: &str, parent: Option<Uuid>, slot: Option<&str>) -> BlockNode {
    BlockNode {
        id: Uuid::now_v7(),
        page_id,
        block_type: block_type.to_string(),
        content: json!({}),
        metadata: json!({}),
        position: 0,
        status: BlockStatus::Draft,
        parent_block_id: parent,
        slot: slot.map(str::to_string),
        depth: 0,
        instance_id: None,
        created: 0,
        changed: 0,
    }
}
