//! Placement validation.
//!
//! Decides whether a (child type, parent, slot) triple is legal. A rejection
//! is an ordinary `false`, never an error: store faults while loading the
//! parent are logged and treated as a rejection.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use super::registry::BlockSpecRegistry;
use crate::models::BlockNode;
use crate::store::LayoutStore;

/// Why a placement was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlacementRejection {
    #[error("parent {0} does not exist")]
    MissingParent(Uuid),

    #[error("parent type '{0}' is not registered")]
    UnknownParentType(String),

    #[error("'{parent_type}' does not accept '{child_type}' children")]
    ChildNotAllowed {
        parent_type: String,
        child_type: String,
    },

    #[error("'{parent_type}' has no slot '{slot}'")]
    UnknownSlot { parent_type: String, slot: String },
}

/// Validates placements against the registry and the persisted parent.
#[derive(Clone)]
pub struct PlacementValidator {
    registry: Arc<BlockSpecRegistry>,
    store: Arc<dyn LayoutStore>,
}

impl PlacementValidator {
    pub fn new(registry: Arc<BlockSpecRegistry>, store: Arc<dyn LayoutStore>) -> Self {
        Self { registry, store }
    }

    /// The registry this validator consults.
    pub fn registry(&self) -> &Arc<BlockSpecRegistry> {
        &self.registry
    }

    /// Check whether `child_type` may be placed under `parent_id` at `slot`.
    ///
    /// Root placement (`parent_id == None`) is always valid. The parent row
    /// is loaded once; its type and content drive every check.
    pub async fn validate_placement(
        &self,
        child_type: &str,
        parent_id: Option<Uuid>,
        slot: Option<&str>,
    ) -> bool {
        let Some(parent_id) = parent_id else {
            return true;
        };

        let parent = match self.store.get_node(parent_id).await {
            Ok(Some(parent)) => parent,
            Ok(None) => {
                debug!(%parent_id, child_type, "placement rejected: parent missing");
                return false;
            }
            Err(e) => {
                warn!(error = %e, %parent_id, "placement rejected: failed to load parent");
                return false;
            }
        };

        match self.check_against_parent(child_type, &parent, slot) {
            Ok(()) => true,
            Err(rejection) => {
                debug!(%parent_id, child_type, ?slot, reason = %rejection, "placement rejected");
                false
            }
        }
    }

    /// Check a placement against an already-loaded parent.
    pub fn check_against_parent(
        &self,
        child_type: &str,
        parent: &BlockNode,
        slot: Option<&str>,
    ) -> Result<(), PlacementRejection> {
        let Some(spec) = self.registry.get_spec(&parent.block_type) else {
            return Err(PlacementRejection::UnknownParentType(
                parent.block_type.clone(),
            ));
        };

        if !spec.accepts_child(child_type) {
            return Err(PlacementRejection::ChildNotAllowed {
                parent_type: parent.block_type.clone(),
                child_type: child_type.to_string(),
            });
        }

        let Some(slot) = slot else {
            return Ok(());
        };

        let dynamic_match = spec
            .dynamic_slots
            .is_some_and(|kind| kind.declares(&parent.content, slot));
        if spec.has_static_slot(slot) || dynamic_match {
            Ok(())
        } else {
            Err(PlacementRejection::UnknownSlot {
                parent_type: parent.block_type.clone(),
                slot: slot.to_string(),
            })
        }
    }
}
