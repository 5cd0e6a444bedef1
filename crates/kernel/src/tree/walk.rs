//! Iterative tree walks.
//!
//! Every walk uses an explicit work-list and a visited set, so stack depth is
//! bounded and cyclic parent links terminate instead of looping.

use std::collections::{HashMap, HashSet, VecDeque};

use anyhow::Result;
use uuid::Uuid;

use crate::models::{BlockNode, BlockTree};
use crate::store::LayoutStore;

/// Order `items` parents-first, starting from every item `is_root` accepts.
///
/// Returns each reachable item with its distance from its root. Items not
/// reachable from a root through parent links in the set are dropped.
/// Siblings keep their relative input order.
pub fn level_order<T>(
    items: Vec<T>,
    id_of: impl Fn(&T) -> Uuid,
    parent_of: impl Fn(&T) -> Option<Uuid>,
    is_root: impl Fn(&T) -> bool,
) -> Vec<(T, i32)> {
    let mut children: HashMap<Uuid, Vec<usize>> = HashMap::new();
    let mut queue = VecDeque::new();
    for (i, item) in items.iter().enumerate() {
        if is_root(item) {
            queue.push_back((i, 0));
        } else if let Some(parent_id) = parent_of(item) {
            children.entry(parent_id).or_default().push(i);
        }
    }

    let mut pending: Vec<Option<T>> = items.into_iter().map(Some).collect();
    let mut visited = HashSet::new();
    let mut ordered = Vec::with_capacity(pending.len());

    while let Some((i, depth)) = queue.pop_front() {
        let Some(item) = pending.get_mut(i).and_then(Option::take) else {
            continue;
        };
        let id = id_of(&item);
        if !visited.insert(id) {
            continue;
        }
        if let Some(kids) = children.get(&id) {
            queue.extend(kids.iter().map(|&k| (k, depth + 1)));
        }
        ordered.push((item, depth));
    }

    ordered
}

/// Assemble a forest from a flat, position-ordered node list.
///
/// Links are rebuilt only among the given rows: a node whose parent is not
/// in the list becomes a root. Each node's `depth` is replaced by its actual
/// nesting level in the returned forest.
pub fn build_forest(nodes: Vec<BlockNode>) -> Vec<BlockTree> {
    let ids: HashSet<Uuid> = nodes.iter().map(|n| n.id).collect();
    let is_root = |n: &BlockNode| n.parent_block_id.is_none_or(|p| !ids.contains(&p));
    let ordered = level_order(nodes, |n| n.id, |n| n.parent_block_id, is_root);

    let mut pending: HashMap<Uuid, Vec<BlockTree>> = HashMap::new();
    let mut roots = Vec::new();

    // Children are complete before their parent is reached in reverse order.
    for (mut node, depth) in ordered.into_iter().rev() {
        let mut children = pending.remove(&node.id).unwrap_or_default();
        children.reverse();
        node.depth = depth;

        let parent = node.parent_block_id.filter(|_| depth > 0);
        let tree = BlockTree { node, children };
        match parent {
            Some(parent_id) => pending.entry(parent_id).or_default().push(tree),
            None => roots.push(tree),
        }
    }

    roots.reverse();
    roots
}

/// Load every descendant of `root_id`, parents first, with its level below
/// the root (direct children are level 1).
pub async fn descendants_with_level(
    store: &dyn LayoutStore,
    root_id: Uuid,
) -> Result<Vec<(BlockNode, i32)>> {
    let mut visited = HashSet::from([root_id]);
    let mut frontier = vec![root_id];
    let mut level = 0;
    let mut found = Vec::new();

    while !frontier.is_empty() {
        level += 1;
        let children = store.list_children(&frontier).await?;
        frontier = Vec::with_capacity(children.len());
        for child in children {
            if visited.insert(child.id) {
                frontier.push(child.id);
                found.push((child, level));
            }
        }
    }

    Ok(found)
}

/// Rewrite cached depths below `root_id` so that every descendant sits one
/// level below its parent, given the root's own depth.
///
/// Only rows whose depth actually changes are written. Returns that count.
pub async fn cascade_depths(store: &dyn LayoutStore, root_id: Uuid, root_depth: i32) -> Result<usize> {
    let updates: Vec<(Uuid, i32)> = descendants_with_level(store, root_id)
        .await?
        .into_iter()
        .filter_map(|(node, level)| {
            let depth = root_depth + level;
            (node.depth != depth).then_some((node.id, depth))
        })
        .collect();

    store.update_depths(&updates).await?;
    Ok(updates.len())
}
