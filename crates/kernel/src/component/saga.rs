//! Compensation for multi-entity writes.
//!
//! The store offers no transaction spanning entity kinds, so each completed
//! write registers the step that undoes it. On failure the steps run in
//! reverse order; on success they are discarded.

use tracing::{error, warn};
use uuid::Uuid;

use crate::store::LayoutStore;

/// One undo action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UndoStep {
    DeleteDefinition(Uuid),
    DeleteNodes(Vec<Uuid>),
}

/// Ordered list of undo steps for one logical operation.
pub struct Compensation<'a> {
    store: &'a dyn LayoutStore,
    operation: &'static str,
    steps: Vec<UndoStep>,
}

impl<'a> Compensation<'a> {
    pub fn new(store: &'a dyn LayoutStore, operation: &'static str) -> Self {
        Self {
            store,
            operation,
            steps: Vec::new(),
        }
    }

    /// Register the undo action for a write that just succeeded.
    pub fn record(&mut self, step: UndoStep) {
        self.steps.push(step);
    }

    /// The operation completed; nothing needs undoing.
    pub fn commit(self) {}

    /// Undo every recorded step, newest first.
    ///
    /// Failures are logged and do not stop the remaining steps. Returns the
    /// number of steps that failed.
    pub async fn unwind(self) -> usize {
        let mut failed = 0;
        for step in self.steps.into_iter().rev() {
            warn!(operation = self.operation, ?step, "compensating partial write");
            let result = match &step {
                UndoStep::DeleteDefinition(id) => self.store.delete_definition(*id).await.map(|_| ()),
                UndoStep::DeleteNodes(ids) => self.store.delete_nodes(ids).await.map(|_| ()),
            };
            if let Err(e) = result {
                failed += 1;
                error!(operation = self.operation, ?step, error = %e, "compensation step failed");
            }
        }
        failed
    }
}
