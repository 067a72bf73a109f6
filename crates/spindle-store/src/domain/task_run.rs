//! Task run record: one top-level invocation of a named task.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ids::TaskRunId;
use super::state::RunStatus;
use crate::error::StoreError;

/// A stored task run.
///
/// `created_at` never changes after insert; `updated_at` moves on every
/// update. Whether `result` or `error` is populated for a terminal run is the
/// scheduler's contract, not checked here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRun {
    pub id: TaskRunId,
    pub task_identifier: String,
    pub status: RunStatus,
    pub input: Option<Value>,
    pub result: Option<Value>,
    pub error: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields supplied when creating a task run. The store assigns id and
/// timestamps.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTaskRun {
    pub task_identifier: String,
    pub status: RunStatus,
    pub input: Option<Value>,
    pub result: Option<Value>,
    pub error: Option<Value>,
}

impl NewTaskRun {
    pub fn new(task_identifier: impl Into<String>) -> Self {
        Self {
            task_identifier: task_identifier.into(),
            status: RunStatus::Pending,
            input: None,
            result: None,
            error: None,
        }
    }

    pub fn with_status(mut self, status: RunStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_input(mut self, input: Value) -> Self {
        self.input = Some(input);
        self
    }

    pub fn with_result(mut self, result: Value) -> Self {
        self.result = Some(result);
        self
    }

    pub fn with_error(mut self, error: Value) -> Self {
        self.error = Some(error);
        self
    }

    pub(crate) fn validate(&self) -> Result<(), StoreError> {
        require_non_blank("task_identifier", &self.task_identifier)
    }
}

/// Partial update of a task run.
///
/// Only fields set on the patch are written. Payload setters take a value;
/// the `clear_*` variants write an explicit null.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskRunPatch {
    pub(crate) task_identifier: Option<String>,
    pub(crate) status: Option<RunStatus>,
    pub(crate) input: Option<Option<Value>>,
    pub(crate) result: Option<Option<Value>>,
    pub(crate) error: Option<Option<Value>>,
}

impl TaskRunPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn task_identifier(mut self, task_identifier: impl Into<String>) -> Self {
        self.task_identifier = Some(task_identifier.into());
        self
    }

    pub fn status(mut self, status: RunStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn input(mut self, input: Value) -> Self {
        self.input = Some(Some(input));
        self
    }

    pub fn clear_input(mut self) -> Self {
        self.input = Some(None);
        self
    }

    pub fn result(mut self, result: Value) -> Self {
        self.result = Some(Some(result));
        self
    }

    pub fn clear_result(mut self) -> Self {
        self.result = Some(None);
        self
    }

    pub fn error(mut self, error: Value) -> Self {
        self.error = Some(Some(error));
        self
    }

    pub fn clear_error(mut self) -> Self {
        self.error = Some(None);
        self
    }

    pub fn status_change(&self) -> Option<RunStatus> {
        self.status
    }

    /// True when the patch names no fields (only `updated_at` moves).
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    pub(crate) fn validate(&self) -> Result<(), StoreError> {
        match &self.task_identifier {
            Some(name) => require_non_blank("task_identifier", name),
            None => Ok(()),
        }
    }
}

pub(crate) fn require_non_blank(field: &str, value: &str) -> Result<(), StoreError> {
    if value.trim().is_empty() {
        return Err(StoreError::Validation(format!("{field} is required")));
    }
    Ok(())
}
