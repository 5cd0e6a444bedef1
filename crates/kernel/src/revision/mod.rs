//! Layout revision service.
//!
//! Captures the full node set of a page and restores it on demand. Revert is
//! destructive and does not snapshot the current tree first; callers that
//! want a backup create a revision before reverting.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};
use crate::models::{BlockNode, LayoutRevision, RevisionNode};
use crate::page_lock::PageLocks;
use crate::store::LayoutStore;
use crate::tree::walk::level_order;

/// Page revisions.
#[derive(Clone)]
pub struct RevisionService {
    store: Arc<dyn LayoutStore>,
    locks: PageLocks,
}

impl RevisionService {
    pub fn new(store: Arc<dyn LayoutStore>, locks: PageLocks) -> Self {
        Self { store, locks }
    }

    /// Store the page's full, unfiltered node set as a new revision.
    ///
    /// Nodes are captured parents first with their parent links and slots.
    /// The page lock is held so the capture never sees a half-applied
    /// mutation.
    pub async fn create_revision(
        &self,
        page_id: Uuid,
        label: Option<String>,
        created_by: Option<Uuid>,
    ) -> EngineResult<LayoutRevision> {
        let _guard = self.locks.lock(page_id).await;
        self.create_revision_inner(page_id, label, created_by)
            .await
            .map_err(EngineError::logged)
    }

    async fn create_revision_inner(
        &self,
        page_id: Uuid,
        label: Option<String>,
        created_by: Option<Uuid>,
    ) -> EngineResult<LayoutRevision> {
        let nodes = self.store.list_page_nodes(page_id, None).await?;
        let snapshot = capture(&nodes);

        let revision = LayoutRevision {
            id: Uuid::now_v7(),
            page_id,
            snapshot,
            label: label.map(|l| l.trim().to_string()).filter(|l| !l.is_empty()),
            created_by,
            created: chrono::Utc::now().timestamp(),
        };
        self.store.insert_revision(&revision).await?;

        info!(revision_id = %revision.id, %page_id, nodes = revision.snapshot.len(), "layout revision created");
        Ok(revision)
    }

    /// A page's revisions, newest first.
    pub async fn list_revisions(&self, page_id: Uuid) -> EngineResult<Vec<LayoutRevision>> {
        Ok(self.store.list_revisions(page_id).await?)
    }

    pub async fn get_revision(&self, id: Uuid) -> EngineResult<LayoutRevision> {
        self.store
            .get_revision(id)
            .await?
            .ok_or_else(|| EngineError::not_found("layout revision", id))
    }

    /// Replace the page's live tree with the one stored in `revision_id`.
    ///
    /// Original ids, parent links, slots, statuses, and positions are kept;
    /// depths are recomputed from the restored topology. The delete and the
    /// re-insert happen in one store call. Returns the restored nodes.
    pub async fn revert(&self, page_id: Uuid, revision_id: Uuid) -> EngineResult<Vec<BlockNode>> {
        let _guard = self.locks.lock(page_id).await;
        self.revert_locked(page_id, revision_id)
            .await
            .map_err(EngineError::logged)
    }

    async fn revert_locked(&self, page_id: Uuid, revision_id: Uuid) -> EngineResult<Vec<BlockNode>> {
        let revision = self.get_revision(revision_id).await?;
        if revision.page_id != page_id {
            return Err(EngineError::InvalidInput(format!(
                "revision {revision_id} belongs to page {}",
                revision.page_id
            )));
        }

        let nodes = restore(revision.snapshot, page_id, chrono::Utc::now().timestamp());

        // Replacing is idempotent, so a failed attempt is retried once from
        // the same snapshot.
        let removed = match self.store.replace_page_nodes(page_id, &nodes).await {
            Ok(removed) => removed,
            Err(e) => {
                warn!(error = %e, %page_id, %revision_id, "revert failed, retrying from snapshot");
                self.store.replace_page_nodes(page_id, &nodes).await?
            }
        };

        info!(
            %page_id,
            %revision_id,
            removed,
            restored = nodes.len(),
            "page reverted"
        );
        Ok(nodes)
    }

    /// Delete a single revision. Returns false if it did not exist.
    pub async fn delete_revision(&self, id: Uuid) -> EngineResult<bool> {
        let removed = self
            .store
            .delete_revisions(&[id])
            .await
            .map_err(|e| EngineError::from(e).logged())?;
        Ok(removed > 0)
    }

    /// Keep the newest `keep` revisions of a page and delete the rest.
    ///
    /// Returns the number of revisions deleted.
    pub async fn prune_revisions(&self, page_id: Uuid, keep: usize) -> EngineResult<u64> {
        let revisions = self.list_revisions(page_id).await?;
        let stale: Vec<Uuid> = revisions.iter().skip(keep).map(|r| r.id).collect();
        if stale.is_empty() {
            return Ok(0);
        }

        let removed = self
            .store
            .delete_revisions(&stale)
            .await
            .map_err(|e| EngineError::from(e).logged())?;
        debug!(%page_id, keep, removed, "layout revisions pruned");
        Ok(removed)
    }
}

/// Capture a page's nodes parents first.
///
/// Rows whose parent chain never reaches a root are appended last so the
/// revision still holds every row.
fn capture(nodes: &[BlockNode]) -> Vec<RevisionNode> {
    let ids: HashSet<Uuid> = nodes.iter().map(|n| n.id).collect();
    let ordered = level_order(
        nodes.iter().collect(),
        |n: &&BlockNode| n.id,
        |n| n.parent_block_id,
        |n| n.parent_block_id.is_none_or(|p| !ids.contains(&p)),
    );

    let mut captured: Vec<RevisionNode> = ordered.iter().map(|(n, _)| RevisionNode::from(*n)).collect();
    if captured.len() < nodes.len() {
        let seen: HashSet<Uuid> = captured.iter().map(|n| n.id).collect();
        let stranded: Vec<&BlockNode> = nodes.iter().filter(|n| !seen.contains(&n.id)).collect();
        warn!(count = stranded.len(), "capturing rows outside any rooted tree");
        captured.extend(stranded.into_iter().map(RevisionNode::from));
    }
    captured
}

/// Rebuild live nodes from a snapshot, parents first, with fresh depths.
///
/// Nodes whose parent is missing from the snapshot, or that sit on a cycle,
/// are dropped: they cannot be inserted without breaking parent integrity.
fn restore(snapshot: Vec<RevisionNode>, page_id: Uuid, now: i64) -> Vec<BlockNode> {
    let total = snapshot.len();
    let ordered = level_order(
        snapshot,
        |n| n.id,
        |n| n.parent_block_id,
        |n| n.parent_block_id.is_none(),
    );

    if ordered.len() < total {
        let dangling = total - ordered.len();
        warn!(%page_id, dangling, "dropping snapshot nodes without a rooted parent chain");
    }

    ordered
        .into_iter()
        .map(|(node, depth)| node.into_block_node(page_id, depth, now))
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::models::BlockStatus;

    fn revision_node(id: Uuid, parent: Option<Uuid>) -> RevisionNode {
        RevisionNode {
            id,
            block_type: "container".into(),
            content: serde_json::json!({}),
            metadata: serde_json::json!({}),
            position: 0,
            status: BlockStatus::Draft,
            parent_block_id: parent,
            slot: parent.map(|_| "content".into()),
            instance_id: None,
        }
    }

    #[test]
    fn restore_orders_parents_first_and_sets_depth() {
        let (root, child, grandchild) = (Uuid::now_v7(), Uuid::now_v7(), Uuid::now_v7());
        let page = Uuid::now_v7();
        let restored = restore(
            vec![
                revision_node(grandchild, Some(child)),
                revision_node(child, Some(root)),
                revision_node(root, None),
            ],
            page,
            5,
        );

        let got: Vec<(Uuid, i32)> = restored.iter().map(|n| (n.id, n.depth)).collect();
        assert_eq!(got, vec![(root, 0), (child, 1), (grandchild, 2)]);
        assert!(restored.iter().all(|n| n.page_id == page && n.changed == 5));
    }

    #[test]
    fn restore_drops_dangling_nodes() {
        let root = Uuid::now_v7();
        let restored = restore(
            vec![
                revision_node(root, None),
                revision_node(Uuid::now_v7(), Some(Uuid::now_v7())),
            ],
            Uuid::now_v7(),
            0,
        );
        assert_eq!(restored.len(), 1);
        assert_eq!(restored[0].id, root);
    }
}
