//! Block tree service.
//!
//! Owns persisted block nodes: builds hierarchical page views and performs
//! create, update, move, and cascading delete while keeping the cached
//! `depth` of every moved subtree consistent with its parent chain.

pub mod walk;

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::block::PlacementValidator;
use crate::error::{EngineError, EngineResult};
use crate::models::{BlockNode, BlockStatus, BlockTree, CreateBlockNode, UpdateBlockNode};
use crate::page_lock::PageLocks;
use crate::store::LayoutStore;

/// Which nodes a tree view includes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    /// Every node regardless of status.
    #[default]
    All,
    /// Published nodes only, linked among themselves. A published node whose
    /// parent is not published is promoted to a root.
    PublishedOnly,
    /// Published nodes whose whole ancestor chain is published.
    PublishedSubtrees,
}

/// Tree-shaped CRUD over block nodes.
#[derive(Clone)]
pub struct TreeStore {
    store: Arc<dyn LayoutStore>,
    validator: PlacementValidator,
    locks: PageLocks,
}

impl TreeStore {
    pub fn new(store: Arc<dyn LayoutStore>, validator: PlacementValidator, locks: PageLocks) -> Self {
        Self {
            store,
            validator,
            locks,
        }
    }

    /// Build the page forest, siblings ordered by position.
    ///
    /// Depth in the returned view is the actual nesting level, not the
    /// cached column.
    pub async fn build_tree(
        &self,
        page_id: Uuid,
        visibility: Visibility,
    ) -> EngineResult<Vec<BlockTree>> {
        let nodes = match visibility {
            Visibility::All => self.store.list_page_nodes(page_id, None).await?,
            Visibility::PublishedOnly => {
                self.store
                    .list_page_nodes(page_id, Some(BlockStatus::Published))
                    .await?
            }
            Visibility::PublishedSubtrees => {
                let all = self.store.list_page_nodes(page_id, None).await?;
                published_subtrees(all)
            }
        };

        debug!(%page_id, ?visibility, count = nodes.len(), "building page tree");
        Ok(walk::build_forest(nodes))
    }

    /// Load a single node.
    pub async fn get(&self, id: Uuid) -> EngineResult<Option<BlockNode>> {
        Ok(self.store.get_node(id).await?)
    }

    /// List a page's nodes as a flat, position-ordered list.
    pub async fn list(&self, page_id: Uuid) -> EngineResult<Vec<BlockNode>> {
        Ok(self.store.list_page_nodes(page_id, None).await?)
    }

    /// Every descendant of `id`, parents first.
    pub async fn descendants(&self, id: Uuid) -> EngineResult<Vec<BlockNode>> {
        let found = walk::descendants_with_level(self.store.as_ref(), id).await?;
        Ok(found.into_iter().map(|(node, _)| node).collect())
    }

    /// Create a node.
    ///
    /// Depth is the parent's current depth plus one, or 0 for roots. Roots
    /// never carry a slot.
    pub async fn create(&self, input: CreateBlockNode) -> EngineResult<BlockNode> {
        let _guard = self.locks.lock(input.page_id).await;
        self.create_locked(input).await.map_err(EngineError::logged)
    }

    async fn create_locked(&self, input: CreateBlockNode) -> EngineResult<BlockNode> {
        let content = input.content.unwrap_or_else(|| serde_json::json!({}));
        self.check_content(&input.block_type, &content)?;

        let slot = input.parent_block_id.and(input.slot);
        let depth = match input.parent_block_id {
            Some(parent_id) => {
                let parent = self
                    .placement_parent(&input.block_type, input.page_id, parent_id, slot.as_deref())
                    .await?;
                parent.depth + 1
            }
            None => 0,
        };

        let position = match input.position {
            Some(position) => position,
            None => {
                self.next_position(input.page_id, input.parent_block_id, slot.as_deref())
                    .await?
            }
        };

        let now = chrono::Utc::now().timestamp();
        let node = BlockNode {
            id: Uuid::now_v7(),
            page_id: input.page_id,
            block_type: input.block_type,
            content,
            metadata: input.metadata.unwrap_or_else(|| serde_json::json!({})),
            position,
            status: input.status.unwrap_or_default(),
            parent_block_id: input.parent_block_id,
            slot,
            depth,
            instance_id: None,
            created: now,
            changed: now,
        };

        self.store.insert_nodes(std::slice::from_ref(&node)).await?;

        debug!(node_id = %node.id, page_id = %node.page_id, block_type = %node.block_type, "block node created");
        Ok(node)
    }

    /// Apply a partial update.
    ///
    /// A change of `parent_block_id` or `slot` goes through the same path as
    /// [`TreeStore::move_node`], so the whole moved subtree gets new depths.
    pub async fn update(&self, id: Uuid, update: UpdateBlockNode) -> EngineResult<BlockNode> {
        let page_id = self.page_of(id).await?;
        let _guard = self.locks.lock(page_id).await;
        self.update_locked(id, update)
            .await
            .map_err(EngineError::logged)
    }

    async fn update_locked(&self, id: Uuid, update: UpdateBlockNode) -> EngineResult<BlockNode> {
        let mut node = self.load(id).await?;
        let moving = update.touches_placement();

        if let Some(content) = update.content {
            self.check_content(&node.block_type, &content)?;
            node.content = content;
        }
        if let Some(metadata) = update.metadata {
            node.metadata = metadata;
        }
        if let Some(status) = update.status {
            node.status = status;
        }

        if moving {
            let parent_id = update.parent_block_id.unwrap_or(node.parent_block_id);
            let slot = update.slot.unwrap_or_else(|| node.slot.clone());
            return self.relocate(node, parent_id, slot, update.position).await;
        }

        if let Some(position) = update.position {
            node.position = position;
        }
        node.changed = chrono::Utc::now().timestamp();

        if !self.store.update_node(&node).await? {
            return Err(EngineError::not_found("block node", id));
        }
        debug!(node_id = %id, "block node updated");
        Ok(node)
    }

    /// Move a node, with its subtree, under `parent_id` at `slot`.
    ///
    /// Rejects placements the validator refuses and moves that would make the
    /// node its own ancestor. When `position` is omitted the node keeps its
    /// position if it stays among the same siblings, otherwise it is appended.
    pub async fn move_node(
        &self,
        id: Uuid,
        parent_id: Option<Uuid>,
        slot: Option<String>,
        position: Option<i32>,
    ) -> EngineResult<BlockNode> {
        let page_id = self.page_of(id).await?;
        let _guard = self.locks.lock(page_id).await;
        self.move_locked(id, parent_id, slot, position)
            .await
            .map_err(EngineError::logged)
    }

    async fn move_locked(
        &self,
        id: Uuid,
        parent_id: Option<Uuid>,
        slot: Option<String>,
        position: Option<i32>,
    ) -> EngineResult<BlockNode> {
        let node = self.load(id).await?;
        self.relocate(node, parent_id, slot, position).await
    }

    async fn relocate(
        &self,
        mut node: BlockNode,
        parent_id: Option<Uuid>,
        slot: Option<String>,
        position: Option<i32>,
    ) -> EngineResult<BlockNode> {
        let slot = parent_id.and(slot);

        let depth = match parent_id {
            Some(parent_id) => {
                if parent_id == node.id {
                    return Err(EngineError::Cycle {
                        id: node.id,
                        parent_id,
                    });
                }
                let parent = self
                    .placement_parent(&node.block_type, node.page_id, parent_id, slot.as_deref())
                    .await?;
                self.ensure_not_ancestor(node.id, &parent).await?;
                parent.depth + 1
            }
            None => 0,
        };

        let same_siblings = node.parent_block_id == parent_id && node.slot == slot;
        node.position = match position {
            Some(position) => position,
            None if same_siblings => node.position,
            None => self.next_position(node.page_id, parent_id, slot.as_deref()).await?,
        };
        node.parent_block_id = parent_id;
        node.slot = slot;
        node.depth = depth;
        node.changed = chrono::Utc::now().timestamp();

        if !self.store.update_node(&node).await? {
            return Err(EngineError::not_found("block node", node.id));
        }
        let cascaded = walk::cascade_depths(self.store.as_ref(), node.id, depth).await?;

        debug!(node_id = %node.id, parent_id = ?parent_id, depth, cascaded, "block node moved");
        Ok(node)
    }

    /// Delete a node together with all of its descendants.
    ///
    /// Deleting an absent node succeeds and removes nothing. Returns the
    /// number of rows removed.
    pub async fn delete(&self, id: Uuid) -> EngineResult<u64> {
        let found = self
            .store
            .get_node(id)
            .await
            .map_err(|e| EngineError::from(e).logged())?;
        let Some(node) = found else {
            debug!(node_id = %id, "delete of absent block node");
            return Ok(0);
        };
        let _guard = self.locks.lock(node.page_id).await;
        self.delete_locked(&node)
            .await
            .map_err(EngineError::logged)
    }

    async fn delete_locked(&self, node: &BlockNode) -> EngineResult<u64> {
        let mut closure = vec![node.id];
        closure.extend(self.descendants(node.id).await?.into_iter().map(|n| n.id));

        let removed = self.store.delete_nodes(&closure).await?;
        info!(node_id = %node.id, page_id = %node.page_id, removed, "block subtree deleted");
        Ok(removed)
    }

    /// Load the parent for a placement and check the placement against it.
    ///
    /// Missing parents, parents on another page, and registry rejections all
    /// surface as `InvalidPlacement`.
    pub(crate) async fn placement_parent(
        &self,
        block_type: &str,
        page_id: Uuid,
        parent_id: Uuid,
        slot: Option<&str>,
    ) -> EngineResult<BlockNode> {
        let invalid = || EngineError::InvalidPlacement {
            block_type: block_type.to_string(),
            parent_id: Some(parent_id),
            slot: slot.map(str::to_string),
        };

        let Some(parent) = self.store.get_node(parent_id).await? else {
            debug!(%parent_id, block_type, "placement rejected: parent missing");
            return Err(invalid());
        };
        if parent.page_id != page_id {
            debug!(%parent_id, block_type, "placement rejected: parent on another page");
            return Err(invalid());
        }
        if let Err(rejection) = self.validator.check_against_parent(block_type, &parent, slot) {
            debug!(%parent_id, block_type, ?slot, reason = %rejection, "placement rejected");
            return Err(invalid());
        }
        Ok(parent)
    }

    /// Next free position after the current siblings in (parent, slot).
    pub(crate) async fn next_position(
        &self,
        page_id: Uuid,
        parent_id: Option<Uuid>,
        slot: Option<&str>,
    ) -> EngineResult<i32> {
        let siblings = match parent_id {
            Some(parent_id) => self.store.list_children(&[parent_id]).await?,
            None => self.store.list_page_nodes(page_id, None).await?,
        };
        let last = siblings
            .iter()
            .filter(|n| n.parent_block_id == parent_id && n.slot.as_deref() == slot)
            .map(|n| n.position)
            .max();
        Ok(last.map_or(0, |p| p.saturating_add(1)))
    }

    fn check_content(&self, block_type: &str, content: &serde_json::Value) -> EngineResult<()> {
        let errors = self
            .validator
            .registry()
            .validate_content(block_type, content);
        if errors.is_empty() {
            Ok(())
        } else {
            debug!(block_type, ?errors, "block content rejected");
            Err(EngineError::InvalidContent(errors))
        }
    }

    /// Fail if `id` appears in the ancestor chain starting at `parent`.
    async fn ensure_not_ancestor(&self, id: Uuid, parent: &BlockNode) -> EngineResult<()> {
        let mut visited = HashSet::from([parent.id]);
        let mut current = parent.parent_block_id;
        while let Some(ancestor_id) = current {
            if ancestor_id == id {
                return Err(EngineError::Cycle {
                    id,
                    parent_id: parent.id,
                });
            }
            if !visited.insert(ancestor_id) {
                break;
            }
            current = self
                .store
                .get_node(ancestor_id)
                .await?
                .and_then(|n| n.parent_block_id);
        }
        Ok(())
    }

    async fn load(&self, id: Uuid) -> EngineResult<BlockNode> {
        self.store
            .get_node(id)
            .await?
            .ok_or_else(|| EngineError::not_found("block node", id))
    }

    async fn page_of(&self, id: Uuid) -> EngineResult<Uuid> {
        self.load(id)
            .await
            .map(|n| n.page_id)
            .map_err(EngineError::logged)
    }
}

/// Keep published nodes whose every ancestor is also published.
fn published_subtrees(nodes: Vec<BlockNode>) -> Vec<BlockNode> {
    let ordered = walk::level_order(nodes, |n| n.id, |n| n.parent_block_id, BlockNode::is_root);
    let mut kept_ids = HashSet::new();
    let mut kept = Vec::new();
    for (node, _) in ordered {
        let parent_kept = node.parent_block_id.is_none_or(|p| kept_ids.contains(&p));
        if node.is_published() && parent_kept {
            kept_ids.insert(node.id);
            kept.push(node);
        }
    }
    // Restore the position order the forest builder expects.
    kept.sort_by(|a, b| a.position.cmp(&b.position).then(a.id.cmp(&b.id)));
    kept
}
