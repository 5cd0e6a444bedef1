//! Engine error types.

use thiserror::Error;
use uuid::Uuid;

/// Errors surfaced by the layout services.
///
/// Placement checks themselves never fail; a rejected placement only becomes
/// an error when a service is asked to write it.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("block type '{block_type}' cannot be placed in {parent_id:?} (slot {slot:?})")]
    InvalidPlacement {
        block_type: String,
        parent_id: Option<Uuid>,
        slot: Option<String>,
    },

    #[error("invalid block content: {}", .0.join("; "))]
    InvalidContent(Vec<String>),

    #[error("moving {id} under {parent_id} would create a cycle")]
    Cycle { id: Uuid, parent_id: Uuid },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("internal error")]
    Internal(#[from] anyhow::Error),

    #[error("database error")]
    Database(#[from] sqlx::Error),
}

impl EngineError {
    pub(crate) fn not_found(entity: &'static str, id: Uuid) -> Self {
        Self::NotFound { entity, id }
    }

    /// Whether this error reflects a store fault rather than a rejected request.
    pub fn is_internal(&self) -> bool {
        matches!(self, Self::Internal(_) | Self::Database(_))
    }

    /// Log store faults at the point they leave the engine.
    pub(crate) fn logged(self) -> Self {
        match &self {
            Self::Internal(e) => tracing::error!(error = %format!("{e:#}"), "internal error"),
            Self::Database(e) => tracing::error!(error = %e, "database error"),
            _ => {}
        }
        self
    }
}

/// Result type alias using EngineError.
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_errors_are_joined() {
        let err = EngineError::InvalidContent(vec!["a".into(), "b".into()]);
        assert_eq!(err.to_string(), "invalid block content: a; b");
        assert!(!err.is_internal());
    }

    #[test]
    fn store_faults_are_internal() {
        let err: EngineError = anyhow::anyhow!("connection reset").into();
        assert!(err.is_internal());
        assert_eq!(err.to_string(), "internal error");
    }
}
