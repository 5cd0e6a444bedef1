//! Block node model.
//!
//! A block node is one structural element of a page's layout tree. Nodes
//! point at their parent through `parent_block_id` and name their insertion
//! point inside that parent through `slot`. The cached `depth` is maintained
//! by the tree service whenever a node changes parent.

use serde::{Deserialize, Serialize};
use sqlx::Postgres;
use sqlx::encode::IsNull;
use sqlx::error::BoxDynError;
use sqlx::postgres::{PgArgumentBuffer, PgTypeInfo, PgValueRef};
use uuid::Uuid;

/// Publication status of a block node.
///
/// Stored as lowercase text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockStatus {
    #[default]
    Draft,
    Published,
    Archived,
}

impl BlockStatus {
    /// Machine name as stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Published => "published",
            Self::Archived => "archived",
        }
    }
}

impl std::str::FromStr for BlockStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(Self::Draft),
            "published" => Ok(Self::Published),
            "archived" => Ok(Self::Archived),
            other => Err(format!("unknown block status '{other}'")),
        }
    }
}

impl sqlx::Type<Postgres> for BlockStatus {
    fn type_info() -> PgTypeInfo {
        <String as sqlx::Type<Postgres>>::type_info()
    }

    fn compatible(ty: &PgTypeInfo) -> bool {
        <String as sqlx::Type<Postgres>>::compatible(ty)
    }
}

impl<'r> sqlx::Decode<'r, Postgres> for BlockStatus {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        let raw = <&str as sqlx::Decode<Postgres>>::decode(value)?;
        Ok(raw.parse()?)
    }
}

impl sqlx::Encode<'_, Postgres> for BlockStatus {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> Result<IsNull, BoxDynError> {
        <&str as sqlx::Encode<Postgres>>::encode_by_ref(&self.as_str(), buf)
    }
}

impl std::fmt::Display for BlockStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Block node record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct BlockNode {
    /// Unique identifier (UUIDv7).
    pub id: Uuid,

    /// Page this node belongs to.
    pub page_id: Uuid,

    /// Registered block type (e.g. "heading", "columns").
    pub block_type: String,

    /// Type-specific payload (JSONB).
    pub content: serde_json::Value,

    /// Presentation payload (JSONB).
    pub metadata: serde_json::Value,

    /// Sibling order; unique only among nodes sharing parent and slot.
    pub position: i32,

    /// Publication status.
    pub status: BlockStatus,

    /// Parent node, or None for page roots.
    pub parent_block_id: Option<Uuid>,

    /// Named insertion point inside the parent, or None for roots.
    pub slot: Option<String>,

    /// Cached distance from the page root (0 for roots).
    pub depth: i32,

    /// Component instance this node was cloned for, if any.
    pub instance_id: Option<Uuid>,

    /// Unix timestamp when created.
    pub created: i64,

    /// Unix timestamp when last changed.
    pub changed: i64,
}

impl BlockNode {
    /// Check if this node sits at the page root.
    pub fn is_root(&self) -> bool {
        self.parent_block_id.is_none()
    }

    /// Check if this node is published.
    pub fn is_published(&self) -> bool {
        self.status == BlockStatus::Published
    }
}

/// Input for creating a block node.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateBlockNode {
    pub page_id: Uuid,
    pub block_type: String,
    pub content: Option<serde_json::Value>,
    pub metadata: Option<serde_json::Value>,
    /// Appended after the current siblings when omitted.
    pub position: Option<i32>,
    pub status: Option<BlockStatus>,
    pub parent_block_id: Option<Uuid>,
    pub slot: Option<String>,
}

impl CreateBlockNode {
    /// Input for a root-level node with empty content.
    pub fn root(page_id: Uuid, block_type: impl Into<String>) -> Self {
        Self {
            page_id,
            block_type: block_type.into(),
            content: None,
            metadata: None,
            position: None,
            status: None,
            parent_block_id: None,
            slot: None,
        }
    }

    /// Input for a node placed inside `parent_id` at `slot`.
    pub fn child(
        page_id: Uuid,
        block_type: impl Into<String>,
        parent_id: Uuid,
        slot: Option<&str>,
    ) -> Self {
        Self {
            parent_block_id: Some(parent_id),
            slot: slot.map(str::to_string),
            ..Self::root(page_id, block_type)
        }
    }

    /// Set the content payload.
    pub fn with_content(mut self, content: serde_json::Value) -> Self {
        self.content = Some(content);
        self
    }

    /// Set an explicit sibling position.
    pub fn at_position(mut self, position: i32) -> Self {
        self.position = Some(position);
        self
    }

    /// Set the publication status.
    pub fn with_status(mut self, status: BlockStatus) -> Self {
        self.status = Some(status);
        self
    }
}

/// Input for updating a block node.
///
/// `parent_block_id` and `slot` use a nested option: the outer `None` leaves
/// the placement untouched, `Some(None)` clears it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateBlockNode {
    pub content: Option<serde_json::Value>,
    pub metadata: Option<serde_json::Value>,
    pub position: Option<i32>,
    pub status: Option<BlockStatus>,
    #[serde(default)]
    pub parent_block_id: Option<Option<Uuid>>,
    #[serde(default)]
    pub slot: Option<Option<String>>,
}

impl UpdateBlockNode {
    /// Whether this update changes where the node lives in the tree.
    pub fn touches_placement(&self) -> bool {
        self.parent_block_id.is_some() || self.slot.is_some()
    }
}

/// Hierarchical view of a block node and its ordered children.
#[derive(Debug, Clone, Serialize)]
pub struct BlockTree {
    #[serde(flatten)]
    pub node: BlockNode,
    pub children: Vec<BlockTree>,
}

impl BlockTree {
    /// Total number of nodes in this subtree, including the root.
    pub fn size(&self) -> usize {
        let mut count = 0;
        let mut stack = vec![self];
        while let Some(tree) = stack.pop() {
            count += 1;
            stack.extend(tree.children.iter());
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_serde() {
        let json = serde_json::to_string(&BlockStatus::Published).unwrap_or_default();
        assert_eq!(json, "\"published\"");
        assert_eq!(BlockStatus::default(), BlockStatus::Draft);
        assert_eq!(BlockStatus::Archived.to_string(), "archived");
        assert_eq!("published".parse::<BlockStatus>(), Ok(BlockStatus::Published));
        assert!("live".parse::<BlockStatus>().is_err());
    }

    #[test]
    fn update_placement_detection() {
        assert!(!UpdateBlockNode::default().touches_placement());
        let detach = UpdateBlockNode {
            parent_block_id: Some(None),
            ..Default::default()
        };
        assert!(detach.touches_placement());
        let reslot = UpdateBlockNode {
            slot: Some(Some("column2".into())),
            ..Default::default()
        };
        assert!(reslot.touches_placement());
    }

    #[test]
    fn child_input_carries_placement() {
        let page = Uuid::now_v7();
        let parent = Uuid::now_v7();
        let input = CreateBlockNode::child(page, "heading", parent, Some("column1"))
            .at_position(3)
            .with_status(BlockStatus::Published);
        assert_eq!(input.parent_block_id, Some(parent));
        assert_eq!(input.slot.as_deref(), Some("column1"));
        assert_eq!(input.position, Some(3));
        assert_eq!(input.status, Some(BlockStatus::Published));
    }
}
