//! Run stores - task runs and their stack-run hierarchy.
//!
//! These are the seams a scheduler codes against. The store layer records
//! what it is told; it never drives a run forward on its own.

use async_trait::async_trait;

use crate::domain::{
    Filter, NewStackRun, NewTaskRun, StackRun, StackRunId, StackRunPatch, TaskRun,
    TaskRunId, TaskRunPatch,
};
use crate::error::StoreError;
use crate::observability::StatusCounts;

/// Top-level task invocations and their outcome.
#[async_trait]
pub trait TaskRunRegistry: Send + Sync {
    /// Insert a new task run; returns it with id and timestamps assigned.
    async fn create_task_run(&self, new: NewTaskRun) -> Result<TaskRun, StoreError>;

    /// `Ok(None)` when no record has this id.
    async fn get_task_run(&self, id: TaskRunId) -> Result<Option<TaskRun>, StoreError>;

    /// Apply the fields named by `patch` and refresh `updated_at`.
    /// Fails with `NotFound` when the id is unknown.
    async fn update_task_run(
        &self,
        id: TaskRunId,
        patch: TaskRunPatch,
    ) -> Result<TaskRun, StoreError>;

    /// Records matching every condition of `filter`, in insertion order.
    async fn query_task_runs(&self, filter: &Filter) -> Result<Vec<TaskRun>, StoreError>;

    async fn task_run_counts(&self) -> Result<StatusCounts, StoreError>;
}

/// Frames of execution within task runs, linked by parent pointers.
///
/// The hierarchy is flat: one table, one parent link per frame. Creating a
/// frame checks that its parent lives in the same task run and that the
/// parent's ancestor chain is sound.
#[async_trait]
pub trait StackRunHierarchy: Send + Sync {
    async fn create_stack_run(&self, new: NewStackRun) -> Result<StackRun, StoreError>;

    async fn get_stack_run(&self, id: StackRunId) -> Result<Option<StackRun>, StoreError>;

    /// The only way status transitions are recorded. A status change is
    /// checked against [`crate::domain::RunStatus::can_transition_to`].
    async fn update_stack_run(
        &self,
        id: StackRunId,
        patch: StackRunPatch,
    ) -> Result<StackRun, StoreError>;

    async fn query_stack_runs(&self, filter: &Filter) -> Result<Vec<StackRun>, StoreError>;

    /// Frames whose status is in [`crate::domain::RunStatus::PENDING_WORK`], oldest
    /// `created_at` first.
    async fn pending_work(&self) -> Result<Vec<StackRun>, StoreError>;

    /// Direct children of `id`, oldest first.
    async fn children(&self, id: StackRunId) -> Result<Vec<StackRun>, StoreError>;

    /// Parent, grandparent, ... up to the top-level frame. Empty for a
    /// top-level frame; `NotFound` when `id` is unknown.
    async fn ancestors(&self, id: StackRunId) -> Result<Vec<StackRun>, StoreError>;

    async fn stack_run_counts(&self) -> Result<StatusCounts, StoreError>;
}
