//! Subtree capture and cloning.

use std::collections::{HashMap, HashSet};

use uuid::Uuid;

use crate::models::{BlockNode, SnapshotNode, SnapshotTree};
use crate::tree::walk::level_order;

/// Capture the subtree rooted at `root_id` from an explicit node set.
///
/// Links are followed only within `nodes`: a node whose parent is not in
/// the set, and is not reachable from the root through nodes that are, is
/// dropped. The root loses its parent link, slot, and position, which are
/// supplied again on every clone. Returns None when the root is absent.
pub fn extract_subtree(nodes: Vec<BlockNode>, root_id: Uuid) -> Option<SnapshotTree> {
    let captured: Vec<SnapshotNode> = level_order(
        nodes,
        |n| n.id,
        |n| n.parent_block_id,
        |n| n.id == root_id,
    )
    .into_iter()
    .map(|(node, depth)| {
        let is_root = depth == 0;
        SnapshotNode {
            id: node.id,
            block_type: node.block_type,
            content: node.content,
            metadata: node.metadata,
            position: if is_root { 0 } else { node.position },
            status: node.status,
            parent_id: node.parent_block_id.filter(|_| !is_root),
            slot: node.slot.filter(|_| !is_root),
        }
    })
    .collect();

    if captured.is_empty() {
        return None;
    }
    Some(SnapshotTree {
        root_id,
        nodes: captured,
    })
}

/// Where a clone's root lands.
#[derive(Debug, Clone)]
pub struct ClonePlacement {
    pub page_id: Uuid,
    pub parent_block_id: Option<Uuid>,
    pub slot: Option<String>,
    pub position: i32,
    /// Depth of the clone's root; descendants follow from it.
    pub depth: i32,
    pub instance_id: Uuid,
}

/// Deep-clone a snapshot into fresh nodes, parents first.
///
/// Every node gets a new id and every parent link is rewritten to the new
/// id of the cloned parent. Depth is assigned for the whole subtree from the
/// root's placement depth.
pub fn clone_subtree(tree: &SnapshotTree, placement: &ClonePlacement, now: i64) -> Vec<BlockNode> {
    let ordered = level_order(
        tree.nodes.iter().collect(),
        |n: &&SnapshotNode| n.id,
        |n| n.parent_id,
        |n| n.id == tree.root_id,
    );

    let mut new_ids: HashMap<Uuid, Uuid> = HashMap::with_capacity(ordered.len());
    let mut cloned = Vec::with_capacity(ordered.len());

    for (source, level) in ordered {
        let id = Uuid::now_v7();
        new_ids.insert(source.id, id);

        let (parent_block_id, slot, position) = if level == 0 {
            (
                placement.parent_block_id,
                placement.slot.clone(),
                placement.position,
            )
        } else {
            // Parents precede children, so the parent's new id is known.
            let parent = source.parent_id.and_then(|p| new_ids.get(&p).copied());
            (parent, source.slot.clone(), source.position)
        };

        cloned.push(BlockNode {
            id,
            page_id: placement.page_id,
            block_type: source.block_type.clone(),
            content: source.content.clone(),
            metadata: source.metadata.clone(),
            position,
            status: source.status,
            parent_block_id,
            slot,
            depth: placement.depth + level,
            instance_id: Some(placement.instance_id),
            created: now,
            changed: now,
        });
    }

    cloned
}

/// Ids in `tree` that would be dropped by a clone.
pub fn unreachable_ids(tree: &SnapshotTree) -> HashSet<Uuid> {
    let reachable: HashSet<Uuid> = level_order(
        tree.nodes.iter().collect(),
        |n: &&SnapshotNode| n.id,
        |n| n.parent_id,
        |n| n.id == tree.root_id,
    )
    .into_iter()
    .map(|(n, _)| n.id)
    .collect();

    tree.nodes
        .iter()
        .map(|n| n.id)
        .filter(|id| !reachable.contains(id))
        .collect()
}
