//! Layout revision model.
//!
//! A revision stores the full node set of a page so the tree can later be
//! rebuilt. Every snapshot node keeps its parent link and slot; without them
//! the hierarchy cannot be reconstructed.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::block_node::{BlockNode, BlockStatus};

/// Layout revision record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct LayoutRevision {
    pub id: Uuid,
    pub page_id: Uuid,

    /// Nodes ordered parents before children (JSONB).
    #[sqlx(json)]
    pub snapshot: Vec<RevisionNode>,

    pub label: Option<String>,
    pub created_by: Option<Uuid>,
    pub created: i64,
}

/// A node as captured by a revision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevisionNode {
    pub id: Uuid,
    pub block_type: String,
    pub content: serde_json::Value,
    pub metadata: serde_json::Value,
    pub position: i32,
    pub status: BlockStatus,
    pub parent_block_id: Option<Uuid>,
    pub slot: Option<String>,
    #[serde(default)]
    pub instance_id: Option<Uuid>,
}

impl From<&BlockNode> for RevisionNode {
    fn from(node: &BlockNode) -> Self {
        Self {
            id: node.id,
            block_type: node.block_type.clone(),
            content: node.content.clone(),
            metadata: node.metadata.clone(),
            position: node.position,
            status: node.status,
            parent_block_id: node.parent_block_id,
            slot: node.slot.clone(),
            instance_id: node.instance_id,
        }
    }
}

impl RevisionNode {
    /// Rebuild a live node on `page_id` at the given depth.
    pub fn into_block_node(self, page_id: Uuid, depth: i32, now: i64) -> BlockNode {
        BlockNode {
            id: self.id,
            page_id,
            block_type: self.block_type,
            content: self.content,
            metadata: self.metadata,
            position: self.position,
            status: self.status,
            parent_block_id: self.parent_block_id,
            slot: self.slot,
            depth,
            instance_id: self.instance_id,
            created: now,
            changed: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn revision_node_keeps_topology_fields() {
        let parent = Uuid::now_v7();
        let node = BlockNode {
            id: Uuid::now_v7(),
            page_id: Uuid::now_v7(),
            block_type: "heading".into(),
            content: serde_json::json!({ "text": "Hi", "level": 2 }),
            metadata: serde_json::json!({}),
            position: 4,
            status: BlockStatus::Published,
            parent_block_id: Some(parent),
            slot: Some("column1".into()),
            depth: 1,
            instance_id: None,
            created: 0,
            changed: 0,
        };

        let captured = RevisionNode::from(&node);
        let json = serde_json::to_value(&captured).unwrap_or_default();
        assert_eq!(json["parent_block_id"], serde_json::json!(parent));
        assert_eq!(json["slot"], "column1");
        assert_eq!(json["position"], 4);

        let restored = captured.into_block_node(node.page_id, 1, 10);
        assert_eq!(restored.id, node.id);
        assert_eq!(restored.parent_block_id, Some(parent));
        assert_eq!(restored.slot.as_deref(), Some("column1"));
        assert_eq!(restored.changed, 10);
    }
}
