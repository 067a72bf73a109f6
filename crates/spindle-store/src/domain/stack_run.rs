//! Stack run record: one frame of a task run's persisted call stack.
//!
//! Frames form a forest per task run through `parent_stack_run_id`. Both the
//! owning task run and the parent are fixed at creation; [`StackRunPatch`]
//! has no setter for either.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ids::{StackRunId, TaskRunId};
use super::state::RunStatus;
use super::task_run::require_non_blank;
use crate::error::StoreError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackRun {
    pub id: StackRunId,
    pub task_run_id: TaskRunId,

    /// None for a top-level frame of the task run.
    pub parent_stack_run_id: Option<StackRunId>,

    pub operation: String,
    pub status: RunStatus,
    pub input: Option<Value>,
    pub result: Option<Value>,
    pub error: Option<Value>,

    /// When the frame last entered a suspended state.
    pub suspended_at: Option<DateTime<Utc>>,

    /// Data handed to the frame when it was last resumed.
    pub resume_payload: Option<Value>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StackRun {
    pub fn is_top_level(&self) -> bool {
        self.parent_stack_run_id.is_none()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewStackRun {
    pub task_run_id: TaskRunId,
    pub parent_stack_run_id: Option<StackRunId>,
    pub operation: String,
    pub status: RunStatus,
    pub input: Option<Value>,
    pub result: Option<Value>,
    pub error: Option<Value>,
}

impl NewStackRun {
    /// A top-level frame of `task_run_id`.
    pub fn new(task_run_id: TaskRunId, operation: impl Into<String>) -> Self {
        Self {
            task_run_id,
            parent_stack_run_id: None,
            operation: operation.into(),
            status: RunStatus::Pending,
            input: None,
            result: None,
            error: None,
        }
    }

    /// A nested call under `parent`.
    pub fn child_of(
        task_run_id: TaskRunId,
        parent: StackRunId,
        operation: impl Into<String>,
    ) -> Self {
        Self::new(task_run_id, operation).with_parent(parent)
    }

    pub fn with_parent(mut self, parent: StackRunId) -> Self {
        self.parent_stack_run_id = Some(parent);
        self
    }

    pub fn with_status(mut self, status: RunStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_input(mut self, input: Value) -> Self {
        self.input = Some(input);
        self
    }

    /// Outcome for a frame recorded after the fact, typically created
    /// straight into `completed`.
    pub fn with_result(mut self, result: Value) -> Self {
        self.result = Some(result);
        self
    }

    pub fn with_error(mut self, error: Value) -> Self {
        self.error = Some(error);
        self
    }

    pub(crate) fn validate(&self) -> Result<(), StoreError> {
        require_non_blank("operation", &self.operation)
    }
}

/// Partial update of a stack run. This is how every state transition is
/// recorded; the helpers below only assemble the usual field sets.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StackRunPatch {
    pub(crate) operation: Option<String>,
    pub(crate) status: Option<RunStatus>,
    pub(crate) input: Option<Option<Value>>,
    pub(crate) result: Option<Option<Value>>,
    pub(crate) error: Option<Option<Value>>,
    pub(crate) suspended_at: Option<Option<DateTime<Utc>>>,
    pub(crate) resume_payload: Option<Option<Value>>,
}

impl StackRunPatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block the frame on its children, stamping the suspension time.
    pub fn suspend_waiting_child(at: DateTime<Utc>) -> Self {
        Self::new()
            .status(RunStatus::SuspendedWaitingChild)
            .suspended_at(at)
    }

    /// Pause the frame for an external event, stamping the suspension time.
    pub fn suspend(at: DateTime<Utc>) -> Self {
        Self::new().status(RunStatus::Suspended).suspended_at(at)
    }

    /// Hand `payload` to a suspended frame and mark it running again.
    /// Chain `.status(..)` to resume straight into a terminal state.
    pub fn resume(payload: Value) -> Self {
        Self::new()
            .status(RunStatus::Running)
            .resume_payload(payload)
    }

    pub fn operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = Some(operation.into());
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

    pub fn suspended_at(mut self, at: DateTime<Utc>) -> Self {
        self.suspended_at = Some(Some(at));
        self
    }

    pub fn resume_payload(mut self, payload: Value) -> Self {
        self.resume_payload = Some(Some(payload));
        self
    }

    pub fn clear_resume_payload(mut self) -> Self {
        self.resume_payload = Some(None);
        self
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    pub(crate) fn validate(&self) -> Result<(), StoreError> {
        match &self.operation {
            Some(operation) => require_non_blank("operation", operation),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;
    use ulid::Ulid;

    #[test]
    fn child_of_links_parent() {
        let task_run = TaskRunId::from_ulid(Ulid::new());
        let parent = StackRunId::from_ulid(Ulid::new());
        let new = NewStackRun::child_of(task_run, parent, "fetch");
        assert_eq!(new.parent_stack_run_id, Some(parent));
        assert_eq!(new.status, RunStatus::Pending);
    }

    #[test]
    fn blank_operation_is_rejected() {
        let new = NewStackRun::new(TaskRunId::from_ulid(Ulid::new()), "");
        assert!(matches!(new.validate(), Err(StoreError::Validation(_))));
    }

    #[test]
    fn suspend_helper_stamps_time() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let patch = StackRunPatch::suspend_waiting_child(at);
        assert_eq!(patch.status, Some(RunStatus::SuspendedWaitingChild));
        assert_eq!(patch.suspended_at, Some(Some(at)));
        assert_eq!(patch.resume_payload, None);
    }

    #[test]
    fn resume_helper_can_finish_directly() {
        let patch = StackRunPatch::resume(json!({"child": "ok"})).status(RunStatus::Completed);
        assert_eq!(patch.status, Some(RunStatus::Completed));
        assert_eq!(patch.resume_payload, Some(Some(json!({"child": "ok"}))));
    }
}
