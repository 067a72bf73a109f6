use thiserror::Error;

use crate::domain::RunStatus;

/// Why a stack run could not be attached under the requested parent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HierarchyViolation {
    #[error("parent {parent} belongs to task run {parent_task_run}, not {task_run}")]
    ParentInOtherTaskRun {
        parent: String,
        parent_task_run: String,
        task_run: String,
    },

    #[error("ancestor chain of {start} revisits {revisited}")]
    Cycle { start: String, revisited: String },

    #[error("ancestor chain of {start} is deeper than {max_depth}")]
    DepthExceeded { start: String, max_depth: usize },
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store is not initialized; call initialize() first")]
    Uninitialized,

    #[error("store is closed")]
    Closed,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("invalid status transition {from} -> {to}")]
    InvalidTransition { from: RunStatus, to: RunStatus },

    #[error("hierarchy violation: {0}")]
    Hierarchy(#[from] HierarchyViolation),

    #[error("cannot decode stored {field}: {source}")]
    Decode {
        field: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("sqlite: {0}")]
    Sql(#[from] rusqlite::Error),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("engine: {0}")]
    Engine(String),
}

impl StoreError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn decode(
        field: &'static str,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::Decode {
            field,
            source: source.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
