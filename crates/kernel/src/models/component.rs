//! Reusable component models.
//!
//! A definition names a template subtree. Its content lives in versioned
//! snapshots that embed the subtree with relative topology, so a snapshot can
//! be cloned onto any page. Every clone is recorded as an instance.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::block_node::BlockStatus;

/// Reusable component definition record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ComponentDefinition {
    /// Unique identifier (UUIDv7).
    pub id: Uuid,

    /// Human-readable name.
    pub name: String,

    pub description: Option<String>,

    /// Free-form grouping used by the component browser.
    pub category: Option<String>,

    pub tags: Vec<String>,

    /// Highest snapshot version.
    pub version: i32,

    /// Author user ID.
    pub created_by: Option<Uuid>,

    /// Unix timestamp when created.
    pub created: i64,
}

/// One versioned content snapshot of a definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ContentSnapshot {
    pub id: Uuid,
    pub definition_id: Uuid,
    pub version: i32,

    /// Embedded subtree (JSONB).
    #[sqlx(json)]
    pub tree: SnapshotTree,

    pub author: Option<Uuid>,

    /// Log message for this version.
    pub comment: Option<String>,

    pub created: i64,
}

/// Subtree embedded in a snapshot: a root reference plus the node array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotTree {
    pub root_id: Uuid,
    pub nodes: Vec<SnapshotNode>,
}

impl SnapshotTree {
    /// Find the root node of the subtree.
    pub fn root(&self) -> Option<&SnapshotNode> {
        self.nodes.iter().find(|n| n.id == self.root_id)
    }
}

/// A node inside a snapshot. Ids are the source node ids at capture time and
/// are only meaningful relative to each other.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotNode {
    pub id: Uuid,
    pub block_type: String,
    pub content: serde_json::Value,
    pub metadata: serde_json::Value,
    pub position: i32,
    pub status: BlockStatus,
    /// Parent inside the snapshot; None only for the root.
    pub parent_id: Option<Uuid>,
    pub slot: Option<String>,
}

/// Input for creating a definition from existing page nodes.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateDefinition {
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Nodes to capture. Must contain `root_node_id`.
    pub source_node_ids: Vec<Uuid>,
    pub root_node_id: Uuid,
    /// Capture every descendant of the root instead of only the listed ids.
    #[serde(default)]
    pub include_descendants: bool,
    pub created_by: Option<Uuid>,
    /// Log message stored on the first snapshot.
    pub comment: Option<String>,
}

/// Component instance record: one clone of a definition on a page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ComponentInstance {
    pub id: Uuid,
    pub definition_id: Uuid,
    pub page_id: Uuid,
    pub parent_block_id: Option<Uuid>,
    pub slot: Option<String>,
    pub position: i32,

    /// Path-keyed overrides overlaid on cloned content at render time.
    pub overrides: serde_json::Value,

    pub created: i64,
    pub changed: i64,
}

/// Input for cloning a definition onto a page.
#[derive(Debug, Clone, Deserialize)]
pub struct InstantiateComponent {
    pub definition_id: Uuid,
    pub page_id: Uuid,
    pub parent_block_id: Option<Uuid>,
    pub slot: Option<String>,
    /// Appended after the current siblings when omitted.
    pub position: Option<i32>,
    #[serde(default)]
    pub overrides: Option<serde_json::Value>,
}

/// Result of an instantiate call.
#[derive(Debug, Clone, Serialize)]
pub struct Instantiation {
    pub instance: ComponentInstance,
    /// Cloned nodes, parents before children.
    pub nodes: Vec<super::BlockNode>,
}

impl Instantiation {
    /// The clone's root node.
    pub fn root(&self) -> Option<&super::BlockNode> {
        self.nodes.first()
    }
}

/// One page of definitions plus the unpaginated total.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefinitionPage {
    pub items: Vec<ComponentDefinition>,
    pub total: u64,
    pub limit: u64,
    pub offset: u64,
}
