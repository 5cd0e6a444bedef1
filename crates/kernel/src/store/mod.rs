//! Layout storage abstraction layer.
//!
//! All reads and writes of block nodes, component definitions, snapshots,
//! instances, and revisions go through [`LayoutStore`]. Services never talk to
//! a database directly, so the same engine runs against PostgreSQL in
//! production and against the in-memory store in tests.
//!
//! The store is not assumed to provide transactions across entity kinds.
//! Multi-entity operations compensate on failure at the call site.

mod definition_query;
mod memory;
mod postgres;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use definition_query::DefinitionQueryBuilder;
pub use memory::{MemoryLayoutStore, StoreOp};
pub use postgres::PgLayoutStore;

use crate::models::{
    BlockNode, BlockStatus, ComponentDefinition, ComponentInstance, ContentSnapshot,
    LayoutRevision,
};

/// Persistence interface for every layout entity.
#[async_trait]
pub trait LayoutStore: Send + Sync {
    // ---- Block nodes ----

    /// Load a single node.
    async fn get_node(&self, id: Uuid) -> Result<Option<BlockNode>>;

    /// Load every node whose id is in `ids`. Missing ids are skipped.
    async fn get_nodes(&self, ids: &[Uuid]) -> Result<Vec<BlockNode>>;

    /// List a page's nodes ordered by position, optionally filtered by status.
    async fn list_page_nodes(
        &self,
        page_id: Uuid,
        status: Option<BlockStatus>,
    ) -> Result<Vec<BlockNode>>;

    /// List the direct children of every node in `parent_ids`, ordered by position.
    async fn list_children(&self, parent_ids: &[Uuid]) -> Result<Vec<BlockNode>>;

    /// Insert nodes in the given order. Parents must precede their children.
    ///
    /// Either every node is inserted or none is.
    async fn insert_nodes(&self, nodes: &[BlockNode]) -> Result<()>;

    /// Replace a stored node row. Returns false if the node does not exist.
    async fn update_node(&self, node: &BlockNode) -> Result<bool>;

    /// Set the cached depth of many nodes at once.
    async fn update_depths(&self, depths: &[(Uuid, i32)]) -> Result<()>;

    /// Delete every node whose id is in `ids`. Returns the number removed.
    async fn delete_nodes(&self, ids: &[Uuid]) -> Result<u64>;

    /// Delete all nodes of a page and insert `nodes` in their place.
    ///
    /// Returns the number of nodes deleted.
    async fn replace_page_nodes(&self, page_id: Uuid, nodes: &[BlockNode]) -> Result<u64>;

    // ---- Component definitions ----

    async fn insert_definition(&self, definition: &ComponentDefinition) -> Result<()>;

    async fn get_definition(&self, id: Uuid) -> Result<Option<ComponentDefinition>>;

    /// List definitions matching `query`, returning the page and the total count.
    async fn list_definitions(
        &self,
        query: &DefinitionQuery,
    ) -> Result<(Vec<ComponentDefinition>, u64)>;

    /// Delete a definition together with its snapshots and instance records.
    async fn delete_definition(&self, id: Uuid) -> Result<bool>;

    async fn insert_snapshot(&self, snapshot: &ContentSnapshot) -> Result<()>;

    /// Load the highest-version snapshot of a definition.
    async fn latest_snapshot(&self, definition_id: Uuid) -> Result<Option<ContentSnapshot>>;

    /// List a definition's snapshots, newest version first.
    async fn list_snapshots(&self, definition_id: Uuid) -> Result<Vec<ContentSnapshot>>;

    // ---- Component instances ----

    async fn insert_instance(&self, instance: &ComponentInstance) -> Result<()>;

    async fn get_instance(&self, id: Uuid) -> Result<Option<ComponentInstance>>;

    async fn list_instances(&self, definition_id: Uuid) -> Result<Vec<ComponentInstance>>;

    async fn count_instances(&self, definition_id: Uuid) -> Result<u64>;

    /// Replace an instance's overrides. Returns the updated row if it exists.
    async fn update_instance_overrides(
        &self,
        id: Uuid,
        overrides: &serde_json::Value,
        changed: i64,
    ) -> Result<Option<ComponentInstance>>;

    // ---- Layout revisions ----

    async fn insert_revision(&self, revision: &LayoutRevision) -> Result<()>;

    async fn get_revision(&self, id: Uuid) -> Result<Option<LayoutRevision>>;

    /// List a page's revisions, newest first.
    async fn list_revisions(&self, page_id: Uuid) -> Result<Vec<LayoutRevision>>;

    async fn delete_revisions(&self, ids: &[Uuid]) -> Result<u64>;
}

/// Sort column for definition listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefinitionSort {
    Name,
    #[default]
    Created,
    Version,
}

impl DefinitionSort {
    /// Column name in the `component_definition` table.
    pub fn column(&self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Created => "created",
            Self::Version => "version",
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

/// Default page size for definition listings.
pub const DEFAULT_DEFINITION_LIMIT: u64 = 20;

/// Maximum page size for definition listings.
pub const MAX_DEFINITION_LIMIT: u64 = 100;

/// Filter, sort, and pagination for definition listings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DefinitionQuery {
    pub category: Option<String>,
    /// Case-insensitive match against name and description.
    pub search: Option<String>,
    /// Matches definitions carrying any of these tags.
    #[serde(default)]
    pub tags: Vec<String>,
    pub limit: u64,
    pub offset: u64,
    #[serde(default)]
    pub sort_by: DefinitionSort,
    #[serde(default)]
    pub sort_order: SortOrder,
}

impl Default for DefinitionQuery {
    fn default() -> Self {
        Self {
            category: None,
            search: None,
            tags: Vec::new(),
            limit: DEFAULT_DEFINITION_LIMIT,
            offset: 0,
            sort_by: DefinitionSort::default(),
            sort_order: SortOrder::default(),
        }
    }
}

impl DefinitionQuery {
    /// Search text with surrounding whitespace removed, if any remains.
    pub fn search_term(&self) -> Option<&str> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Page size clamped to `1..=MAX_DEFINITION_LIMIT`.
    pub fn effective_limit(&self) -> u64 {
        self.limit.clamp(1, MAX_DEFINITION_LIMIT)
    }

    /// Only the default shape (no search text, first page) may be cached.
    pub fn is_cacheable(&self) -> bool {
        self.search_term().is_none() && self.offset == 0
    }

    /// Cache key derived from the serialized query shape.
    pub fn cache_key(&self) -> String {
        let shape = serde_json::to_string(self).unwrap_or_default();
        format!("component_definitions:{shape}")
    }
}
