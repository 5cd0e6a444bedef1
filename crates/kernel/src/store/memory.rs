//! In-memory implementation of LayoutStore.
//!
//! Mirrors the referential rules of the SQL schema: a node's parent must
//! exist when the node is written, and deleting a definition removes its
//! snapshots and instances. Node deletes do not cascade; callers pass the full
//! closure, exactly as they must for stores without foreign keys.
//!
//! Individual operations can be made to fail once via [`MemoryLayoutStore::fail_next`]
//! so compensation paths can be exercised.

use std::collections::{HashMap, HashSet};

use anyhow::{Result, bail};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use uuid::Uuid;

use super::{DefinitionQuery, DefinitionSort, LayoutStore, SortOrder};
use crate::models::{
    BlockNode, BlockStatus, ComponentDefinition, ComponentInstance, ContentSnapshot,
    LayoutRevision,
};

/// Store operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    GetNode,
    InsertNodes,
    UpdateNode,
    UpdateDepths,
    DeleteNodes,
    ReplacePageNodes,
    InsertDefinition,
    DeleteDefinition,
    InsertSnapshot,
    InsertInstance,
    InsertRevision,
}

#[derive(Default)]
struct Tables {
    nodes: HashMap<Uuid, BlockNode>,
    definitions: HashMap<Uuid, ComponentDefinition>,
    snapshots: HashMap<Uuid, ContentSnapshot>,
    instances: HashMap<Uuid, ComponentInstance>,
    revisions: HashMap<Uuid, LayoutRevision>,
}

impl Tables {
    fn check_parent(&self, node: &BlockNode, pending: &HashSet<Uuid>) -> Result<()> {
        if let Some(parent_id) = node.parent_block_id
            && !self.nodes.contains_key(&parent_id)
            && !pending.contains(&parent_id)
        {
            bail!(
                "block node {} references missing parent {parent_id}",
                node.id
            );
        }
        Ok(())
    }
}

/// In-memory layout store.
#[derive(Default)]
pub struct MemoryLayoutStore {
    tables: RwLock<Tables>,
    faults: Mutex<HashSet<StoreOp>>,
}

impl MemoryLayoutStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next call of `op` fail.
    pub fn fail_next(&self, op: StoreOp) {
        self.faults.lock().insert(op);
    }

    /// Total number of stored nodes across all pages.
    pub fn node_count(&self) -> usize {
        self.tables.read().nodes.len()
    }

    /// Number of stored definitions.
    pub fn definition_count(&self) -> usize {
        self.tables.read().definitions.len()
    }

    /// Number of stored snapshots across all definitions.
    pub fn snapshot_count(&self) -> usize {
        self.tables.read().snapshots.len()
    }

    /// Number of stored instance records across all definitions.
    pub fn instance_count(&self) -> usize {
        self.tables.read().instances.len()
    }

    /// Write a node row without referential checks.
    ///
    /// Used to seed corrupt data (dangling parents, cycles) in tests.
    pub fn put_node_unchecked(&self, node: BlockNode) {
        self.tables.write().nodes.insert(node.id, node);
    }

    fn check(&self, op: StoreOp) -> Result<()> {
        if self.faults.lock().remove(&op) {
            bail!("injected {op:?} failure");
        }
        Ok(())
    }
}

fn sort_nodes(nodes: &mut [BlockNode]) {
    nodes.sort_by(|a, b| a.position.cmp(&b.position).then(a.id.cmp(&b.id)));
}

#[async_trait]
impl LayoutStore for MemoryLayoutStore {
    async fn get_node(&self, id: Uuid) -> Result<Option<BlockNode>> {
        self.check(StoreOp::GetNode)?;
        Ok(self.tables.read().nodes.get(&id).cloned())
    }

    async fn get_nodes(&self, ids: &[Uuid]) -> Result<Vec<BlockNode>> {
        let tables = self.tables.read();
        let mut nodes: Vec<BlockNode> = ids
            .iter()
            .collect::<HashSet<_>>()
            .into_iter()
            .filter_map(|id| tables.nodes.get(id).cloned())
            .collect();
        sort_nodes(&mut nodes);
        Ok(nodes)
    }

    async fn list_page_nodes(
        &self,
        page_id: Uuid,
        status: Option<BlockStatus>,
    ) -> Result<Vec<BlockNode>> {
        let tables = self.tables.read();
        let mut nodes: Vec<BlockNode> = tables
            .nodes
            .values()
            .filter(|n| n.page_id == page_id)
            .filter(|n| status.is_none_or(|s| n.status == s))
            .cloned()
            .collect();
        sort_nodes(&mut nodes);
        Ok(nodes)
    }

    async fn list_children(&self, parent_ids: &[Uuid]) -> Result<Vec<BlockNode>> {
        let parents: HashSet<&Uuid> = parent_ids.iter().collect();
        let tables = self.tables.read();
        let mut nodes: Vec<BlockNode> = tables
            .nodes
            .values()
            .filter(|n| n.parent_block_id.is_some_and(|p| parents.contains(&p)))
            .cloned()
            .collect();
        sort_nodes(&mut nodes);
        Ok(nodes)
    }

    async fn insert_nodes(&self, nodes: &[BlockNode]) -> Result<()> {
        self.check(StoreOp::InsertNodes)?;
        let mut tables = self.tables.write();

        let mut pending = HashSet::new();
        for node in nodes {
            if tables.nodes.contains_key(&node.id) || !pending.insert(node.id) {
                bail!("duplicate block node id {}", node.id);
            }
        }
        // Parents must already exist or precede the child in this batch.
        let mut seen = HashSet::new();
        for node in nodes {
            tables.check_parent(node, &seen)?;
            seen.insert(node.id);
        }

        for node in nodes {
            tables.nodes.insert(node.id, node.clone());
        }
        Ok(())
    }

    async fn update_node(&self, node: &BlockNode) -> Result<bool> {
        self.check(StoreOp::UpdateNode)?;
        let mut tables = self.tables.write();
        if !tables.nodes.contains_key(&node.id) {
            return Ok(false);
        }
        tables.check_parent(node, &HashSet::new())?;
        tables.nodes.insert(node.id, node.clone());
        Ok(true)
    }

    async fn update_depths(&self, depths: &[(Uuid, i32)]) -> Result<()> {
        self.check(StoreOp::UpdateDepths)?;
        let mut tables = self.tables.write();
        for (id, depth) in depths {
            if let Some(node) = tables.nodes.get_mut(id) {
                node.depth = *depth;
            }
        }
        Ok(())
    }

    async fn delete_nodes(&self, ids: &[Uuid]) -> Result<u64> {
        self.check(StoreOp::DeleteNodes)?;
        let mut tables = self.tables.write();
        let removed = ids
            .iter()
            .filter(|id| tables.nodes.remove(id).is_some())
            .count();
        Ok(removed as u64)
    }

    async fn replace_page_nodes(&self, page_id: Uuid, nodes: &[BlockNode]) -> Result<u64> {
        self.check(StoreOp::ReplacePageNodes)?;
        let mut tables = self.tables.write();

        let existing: Vec<Uuid> = tables
            .nodes
            .values()
            .filter(|n| n.page_id == page_id)
            .map(|n| n.id)
            .collect();

        // Validate against the post-delete state before touching anything.
        let mut seen = HashSet::new();
        for node in nodes {
            let clashes = tables
                .nodes
                .get(&node.id)
                .is_some_and(|n| n.page_id != page_id);
            if clashes || !seen.insert(node.id) {
                bail!("duplicate block node id {}", node.id);
            }
            if let Some(parent_id) = node.parent_block_id {
                let outside = tables
                    .nodes
                    .get(&parent_id)
                    .is_some_and(|p| p.page_id != page_id);
                if !outside && !seen.contains(&parent_id) {
                    bail!(
                        "block node {} references missing parent {parent_id}",
                        node.id
                    );
                }
            }
        }

        for id in &existing {
            tables.nodes.remove(id);
        }
        for node in nodes {
            tables.nodes.insert(node.id, node.clone());
        }
        Ok(existing.len() as u64)
    }

    async fn insert_definition(&self, definition: &ComponentDefinition) -> Result<()> {
        self.check(StoreOp::InsertDefinition)?;
        let mut tables = self.tables.write();
        if tables.definitions.contains_key(&definition.id) {
            bail!("duplicate component definition id {}", definition.id);
        }
        tables
            .definitions
            .insert(definition.id, definition.clone());
        Ok(())
    }

    async fn get_definition(&self, id: Uuid) -> Result<Option<ComponentDefinition>> {
        Ok(self.tables.read().definitions.get(&id).cloned())
    }

    async fn list_definitions(
        &self,
        query: &DefinitionQuery,
    ) -> Result<(Vec<ComponentDefinition>, u64)> {
        let tables = self.tables.read();
        let needle = query.search_term().map(str::to_lowercase);

        let mut matches: Vec<ComponentDefinition> = tables
            .definitions
            .values()
            .filter(|d| {
                query
                    .category
                    .as_ref()
                    .is_none_or(|c| d.category.as_ref() == Some(c))
            })
            .filter(|d| {
                needle.as_ref().is_none_or(|needle| {
                    d.name.to_lowercase().contains(needle)
                        || d
                            .description
                            .as_deref()
                            .is_some_and(|desc| desc.to_lowercase().contains(needle))
                })
            })
            .filter(|d| query.tags.is_empty() || d.tags.iter().any(|t| query.tags.contains(t)))
            .cloned()
            .collect();

        matches.sort_by(|a, b| {
            let ordering = match query.sort_by {
                DefinitionSort::Name => a.name.cmp(&b.name),
                DefinitionSort::Created => a.created.cmp(&b.created),
                DefinitionSort::Version => a.version.cmp(&b.version),
            }
            .then(a.id.cmp(&b.id));
            match query.sort_order {
                SortOrder::Asc => ordering,
                SortOrder::Desc => ordering.reverse(),
            }
        });

        let total = matches.len() as u64;
        let page = matches
            .into_iter()
            .skip(query.offset as usize)
            .take(query.effective_limit() as usize)
            .collect();
        Ok((page, total))
    }

    async fn delete_definition(&self, id: Uuid) -> Result<bool> {
        self.check(StoreOp::DeleteDefinition)?;
        let mut tables = self.tables.write();
        let removed = tables.definitions.remove(&id).is_some();
        tables.snapshots.retain(|_, s| s.definition_id != id);
        tables.instances.retain(|_, i| i.definition_id != id);
        Ok(removed)
    }

    async fn insert_snapshot(&self, snapshot: &ContentSnapshot) -> Result<()> {
        self.check(StoreOp::InsertSnapshot)?;
        let mut tables = self.tables.write();
        if !tables.definitions.contains_key(&snapshot.definition_id) {
            bail!(
                "snapshot references missing definition {}",
                snapshot.definition_id
            );
        }
        tables.snapshots.insert(snapshot.id, snapshot.clone());
        Ok(())
    }

    async fn latest_snapshot(&self, definition_id: Uuid) -> Result<Option<ContentSnapshot>> {
        Ok(self
            .tables
            .read()
            .snapshots
            .values()
            .filter(|s| s.definition_id == definition_id)
            .max_by_key(|s| s.version)
            .cloned())
    }

    async fn list_snapshots(&self, definition_id: Uuid) -> Result<Vec<ContentSnapshot>> {
        let tables = self.tables.read();
        let mut snapshots: Vec<ContentSnapshot> = tables
            .snapshots
            .values()
            .filter(|s| s.definition_id == definition_id)
            .cloned()
            .collect();
        snapshots.sort_by(|a, b| b.version.cmp(&a.version));
        Ok(snapshots)
    }

    async fn insert_instance(&self, instance: &ComponentInstance) -> Result<()> {
        self.check(StoreOp::InsertInstance)?;
        let mut tables = self.tables.write();
        if !tables.definitions.contains_key(&instance.definition_id) {
            bail!(
                "instance references missing definition {}",
                instance.definition_id
            );
        }
        tables.instances.insert(instance.id, instance.clone());
        Ok(())
    }

    async fn get_instance(&self, id: Uuid) -> Result<Option<ComponentInstance>> {
        Ok(self.tables.read().instances.get(&id).cloned())
    }

    async fn list_instances(&self, definition_id: Uuid) -> Result<Vec<ComponentInstance>> {
        let tables = self.tables.read();
        let mut instances: Vec<ComponentInstance> = tables
            .instances
            .values()
            .filter(|i| i.definition_id == definition_id)
            .cloned()
            .collect();
        instances.sort_by(|a, b| a.created.cmp(&b.created).then(a.id.cmp(&b.id)));
        Ok(instances)
    }

    async fn count_instances(&self, definition_id: Uuid) -> Result<u64> {
        let tables = self.tables.read();
        let count = tables
            .instances
            .values()
            .filter(|i| i.definition_id == definition_id)
            .count();
        Ok(count as u64)
    }

    async fn update_instance_overrides(
        &self,
        id: Uuid,
        overrides: &serde_json::Value,
        changed: i64,
    ) -> Result<Option<ComponentInstance>> {
        let mut tables = self.tables.write();
        Ok(tables.instances.get_mut(&id).map(|instance| {
            instance.overrides = overrides.clone();
            instance.changed = changed;
            instance.clone()
        }))
    }

    async fn insert_revision(&self, revision: &LayoutRevision) -> Result<()> {
        self.check(StoreOp::InsertRevision)?;
        self.tables
            .write()
            .revisions
            .insert(revision.id, revision.clone());
        Ok(())
    }

    async fn get_revision(&self, id: Uuid) -> Result<Option<LayoutRevision>> {
        Ok(self.tables.read().revisions.get(&id).cloned())
    }

    async fn list_revisions(&self, page_id: Uuid) -> Result<Vec<LayoutRevision>> {
        let tables = self.tables.read();
        let mut revisions: Vec<LayoutRevision> = tables
            .revisions
            .values()
            .filter(|r| r.page_id == page_id)
            .cloned()
            .collect();
        revisions.sort_by(|a, b| b.created.cmp(&a.created).then(b.id.cmp(&a.id)));
        Ok(revisions)
    }

    async fn delete_revisions(&self, ids: &[Uuid]) -> Result<u64> {
        let mut tables = self.tables.write();
        let removed = ids
            .iter()
            .filter(|id| tables.revisions.remove(id).is_some())
            .count();
        Ok(removed as u64)
    }
}
