//! Reusable component service.
//!
//! Snapshots page subtrees into versioned definitions and clones them back
//! onto pages as independent node subtrees. Clones are copies, not live
//! references: deleting a definition leaves existing clones in place.

mod saga;
pub mod snapshot;

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cache::CacheLayer;
use crate::error::{EngineError, EngineResult};
use crate::models::{
    ComponentDefinition, ComponentInstance, ContentSnapshot, CreateDefinition, DefinitionPage,
    InstantiateComponent, Instantiation,
};
use crate::page_lock::PageLocks;
use crate::store::{DefinitionQuery, LayoutStore};
use crate::tree::TreeStore;
use crate::tree::walk;

pub use saga::{Compensation, UndoStep};
pub use snapshot::{ClonePlacement, clone_subtree, extract_subtree};

/// Cache tag shared by every cached definition listing.
pub const DEFINITIONS_CACHE_TAG: &str = "component_definitions";

/// Definitions, snapshots, and instances.
#[derive(Clone)]
pub struct ComponentService {
    store: Arc<dyn LayoutStore>,
    tree: TreeStore,
    cache: CacheLayer,
    locks: PageLocks,
    list_ttl_secs: u64,
}

impl ComponentService {
    pub fn new(
        store: Arc<dyn LayoutStore>,
        tree: TreeStore,
        cache: CacheLayer,
        locks: PageLocks,
        list_ttl_secs: u64,
    ) -> Self {
        Self {
            store,
            tree,
            cache,
            locks,
            list_ttl_secs,
        }
    }

    /// Create a definition and its first snapshot from existing page nodes.
    ///
    /// Only the listed nodes are captured unless `include_descendants` is
    /// set. If the snapshot cannot be stored the definition row is removed
    /// again.
    pub async fn create_definition(
        &self,
        input: CreateDefinition,
    ) -> EngineResult<ComponentDefinition> {
        self.create_definition_inner(input)
            .await
            .map_err(EngineError::logged)
    }

    async fn create_definition_inner(
        &self,
        input: CreateDefinition,
    ) -> EngineResult<ComponentDefinition> {
        let name = input.name.trim();
        if name.is_empty() {
            return Err(EngineError::InvalidInput(
                "definition name must not be empty".into(),
            ));
        }
        if !input.source_node_ids.contains(&input.root_node_id) {
            return Err(EngineError::InvalidInput(format!(
                "root node {} is not among the source nodes",
                input.root_node_id
            )));
        }

        let mut nodes = self.store.get_nodes(&input.source_node_ids).await?;
        if !nodes.iter().any(|n| n.id == input.root_node_id) {
            return Err(EngineError::not_found("block node", input.root_node_id));
        }
        if input.include_descendants {
            let mut seen: HashSet<Uuid> = nodes.iter().map(|n| n.id).collect();
            let below = walk::descendants_with_level(self.store.as_ref(), input.root_node_id).await?;
            nodes.extend(
                below
                    .into_iter()
                    .map(|(node, _)| node)
                    .filter(|n| seen.insert(n.id)),
            );
        }

        let loaded = nodes.len();
        let tree = extract_subtree(nodes, input.root_node_id)
            .ok_or_else(|| EngineError::not_found("block node", input.root_node_id))?;
        if tree.nodes.len() < loaded {
            debug!(
                root_id = %input.root_node_id,
                dropped = loaded - tree.nodes.len(),
                "source nodes outside the root's subtree were not captured"
            );
        }

        let now = chrono::Utc::now().timestamp();
        let definition = ComponentDefinition {
            id: Uuid::now_v7(),
            name: name.to_string(),
            description: input.description,
            category: input.category,
            tags: input.tags,
            version: 1,
            created_by: input.created_by,
            created: now,
        };
        let snapshot = ContentSnapshot {
            id: Uuid::now_v7(),
            definition_id: definition.id,
            version: 1,
            tree,
            author: input.created_by,
            comment: input.comment,
            created: now,
        };

        let mut saga = Compensation::new(self.store.as_ref(), "create_definition");
        self.store.insert_definition(&definition).await?;
        saga.record(UndoStep::DeleteDefinition(definition.id));

        if let Err(e) = self.store.insert_snapshot(&snapshot).await {
            saga.unwind().await;
            return Err(e.into());
        }
        saga.commit();

        self.cache.invalidate_tag(DEFINITIONS_CACHE_TAG).await;

        info!(
            definition_id = %definition.id,
            name = %definition.name,
            nodes = snapshot.tree.nodes.len(),
            "component definition created"
        );
        Ok(definition)
    }

    /// List definitions with filtering, sorting, and pagination.
    ///
    /// Only the default shape (no search text, first page) is served from the
    /// cache; results are identical with or without it.
    pub async fn list_definitions(&self, query: &DefinitionQuery) -> EngineResult<DefinitionPage> {
        let cache_key = query.is_cacheable().then(|| query.cache_key());

        if let Some(key) = &cache_key
            && let Some(cached) = self.cache.get(key).await
        {
            match serde_json::from_str::<DefinitionPage>(&cached) {
                Ok(page) => return Ok(page),
                Err(e) => warn!(error = %e, key = %key, "discarding unreadable cached listing"),
            }
        }

        let (items, total) = self
            .store
            .list_definitions(query)
            .await
            .map_err(|e| EngineError::from(e).logged())?;
        let page = DefinitionPage {
            items,
            total,
            limit: query.effective_limit(),
            offset: query.offset,
        };

        if let Some(key) = &cache_key {
            match serde_json::to_string(&page) {
                Ok(json) => {
                    self.cache
                        .set(key, &json, self.list_ttl_secs, &[DEFINITIONS_CACHE_TAG])
                        .await;
                }
                Err(e) => warn!(error = %e, "failed to serialize definition listing"),
            }
        }

        Ok(page)
    }

    pub async fn get_definition(&self, id: Uuid) -> EngineResult<ComponentDefinition> {
        self.store
            .get_definition(id)
            .await?
            .ok_or_else(|| EngineError::not_found("component definition", id))
    }

    /// A definition's snapshots, newest version first.
    pub async fn list_snapshots(&self, definition_id: Uuid) -> EngineResult<Vec<ContentSnapshot>> {
        Ok(self.store.list_snapshots(definition_id).await?)
    }

    /// Clone the latest snapshot of a definition onto a page.
    ///
    /// The clone's root takes the requested placement, which is validated
    /// like any other; descendants keep their snapshot slots and positions.
    /// All cloned nodes share the new instance id. If the instance record
    /// cannot be stored, the cloned nodes are removed again.
    pub async fn instantiate(&self, input: InstantiateComponent) -> EngineResult<Instantiation> {
        let _guard = self.locks.lock(input.page_id).await;
        self.instantiate_locked(input)
            .await
            .map_err(EngineError::logged)
    }

    async fn instantiate_locked(&self, input: InstantiateComponent) -> EngineResult<Instantiation> {
        let overrides = input
            .overrides
            .unwrap_or_else(|| serde_json::json!({}));
        if !overrides.is_object() {
            return Err(EngineError::InvalidInput(
                "instance overrides must be an object".into(),
            ));
        }

        let definition = self.get_definition(input.definition_id).await?;
        let snapshot = self
            .store
            .latest_snapshot(definition.id)
            .await?
            .ok_or_else(|| EngineError::not_found("component snapshot", definition.id))?;
        let root = snapshot.tree.root().ok_or_else(|| {
            EngineError::InvalidInput(format!(
                "snapshot v{} of {} has no root node",
                snapshot.version, definition.id
            ))
        })?;

        let slot = input.parent_block_id.and(input.slot);
        let depth = match input.parent_block_id {
            Some(parent_id) => {
                let parent = self
                    .tree
                    .placement_parent(&root.block_type, input.page_id, parent_id, slot.as_deref())
                    .await?;
                parent.depth + 1
            }
            None => 0,
        };
        let position = match input.position {
            Some(position) => position,
            None => {
                self.tree
                    .next_position(input.page_id, input.parent_block_id, slot.as_deref())
                    .await?
            }
        };

        let skipped = snapshot::unreachable_ids(&snapshot.tree);
        if !skipped.is_empty() {
            warn!(
                definition_id = %definition.id,
                skipped = skipped.len(),
                "snapshot contains nodes unreachable from its root"
            );
        }

        let now = chrono::Utc::now().timestamp();
        let placement = ClonePlacement {
            page_id: input.page_id,
            parent_block_id: input.parent_block_id,
            slot: slot.clone(),
            position,
            depth,
            instance_id: Uuid::now_v7(),
        };
        let nodes = clone_subtree(&snapshot.tree, &placement, now);

        let instance = ComponentInstance {
            id: placement.instance_id,
            definition_id: definition.id,
            page_id: input.page_id,
            parent_block_id: input.parent_block_id,
            slot,
            position,
            overrides,
            created: now,
            changed: now,
        };

        let mut saga = Compensation::new(self.store.as_ref(), "instantiate");
        self.store.insert_nodes(&nodes).await?;
        saga.record(UndoStep::DeleteNodes(nodes.iter().map(|n| n.id).collect()));

        if let Err(e) = self.store.insert_instance(&instance).await {
            saga.unwind().await;
            return Err(e.into());
        }
        saga.commit();

        info!(
            definition_id = %definition.id,
            instance_id = %instance.id,
            page_id = %instance.page_id,
            nodes = nodes.len(),
            "component instantiated"
        );
        Ok(Instantiation { instance, nodes })
    }

    /// Replace an instance's overrides wholesale.
    ///
    /// Cloned node content is not touched.
    pub async fn update_instance_overrides(
        &self,
        instance_id: Uuid,
        overrides: serde_json::Value,
    ) -> EngineResult<ComponentInstance> {
        if !overrides.is_object() {
            return Err(EngineError::InvalidInput(
                "instance overrides must be an object".into(),
            ));
        }
        let now = chrono::Utc::now().timestamp();
        self.store
            .update_instance_overrides(instance_id, &overrides, now)
            .await
            .map_err(|e| EngineError::from(e).logged())?
            .ok_or_else(|| EngineError::not_found("component instance", instance_id))
    }

    /// Delete a definition with its snapshots and instance records.
    ///
    /// Cloned nodes already on pages stay. Returns false if the definition
    /// did not exist.
    pub async fn delete_definition(&self, id: Uuid) -> EngineResult<bool> {
        let removed = self
            .store
            .delete_definition(id)
            .await
            .map_err(|e| EngineError::from(e).logged())?;
        if removed {
            self.cache.invalidate_tag(DEFINITIONS_CACHE_TAG).await;
            info!(definition_id = %id, "component definition deleted");
        }
        Ok(removed)
    }

    pub async fn get_instance(&self, id: Uuid) -> EngineResult<ComponentInstance> {
        self.store
            .get_instance(id)
            .await?
            .ok_or_else(|| EngineError::not_found("component instance", id))
    }

    pub async fn list_instances(&self, definition_id: Uuid) -> EngineResult<Vec<ComponentInstance>> {
        Ok(self.store.list_instances(definition_id).await?)
    }

    /// Number of recorded instances of a definition.
    pub async fn usage_count(&self, definition_id: Uuid) -> EngineResult<u64> {
        Ok(self.store.count_instances(definition_id).await?)
    }
}
