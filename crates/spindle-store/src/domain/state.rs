//! Run status state machine shared by task runs and stack runs.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::StoreError;

/// Status of a task run or stack run.
///
/// State transitions:
/// - Pending -> Running -> Completed | Failed
/// - Running -> Suspended | SuspendedWaitingChild -> Running (resumed)
/// - Suspended | SuspendedWaitingChild -> Completed | Failed
/// - Pending -> Failed (work rejected before it ever ran)
///
/// Persisted as snake_case text; the enum is the only way values enter or
/// leave the store.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Created, not yet picked up.
    #[default]
    Pending,

    /// Currently executing.
    Running,

    /// Finished successfully.
    Completed,

    /// Finished with an error.
    Failed,

    /// Paused pending some external event.
    Suspended,

    /// Paused until one or more child frames finish.
    SuspendedWaitingChild,
}

impl RunStatus {
    pub const ALL: [RunStatus; 6] = [
        RunStatus::Pending,
        RunStatus::Running,
        RunStatus::Completed,
        RunStatus::Failed,
        RunStatus::Suspended,
        RunStatus::SuspendedWaitingChild,
    ];

    /// Statuses the scheduler polls for: fresh work and frames whose
    /// children may have finished.
    pub const PENDING_WORK: [RunStatus; 2] =
        [RunStatus::Pending, RunStatus::SuspendedWaitingChild];

    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::Suspended => "suspended",
            RunStatus::SuspendedWaitingChild => "suspended_waiting_child",
        }
    }

    /// No transitions leave a terminal state.
    pub fn is_terminal(self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed)
    }

    pub fn is_suspended(self) -> bool {
        matches!(self, RunStatus::Suspended | RunStatus::SuspendedWaitingChild)
    }

    pub fn is_pending_work(self) -> bool {
        Self::PENDING_WORK.contains(&self)
    }

    /// Whether an update may move a record from `self` to `next`.
    ///
    /// Re-asserting the current status is always allowed.
    pub fn can_transition_to(self, next: RunStatus) -> bool {
        if self == next {
            return true;
        }
        if self.is_terminal() {
            return false;
        }
        if self.is_suspended() {
            return matches!(
                next,
                RunStatus::Running | RunStatus::Completed | RunStatus::Failed
            );
        }
        match self {
            RunStatus::Pending => matches!(next, RunStatus::Running | RunStatus::Failed),
            RunStatus::Running => matches!(
                next,
                RunStatus::Completed
                    | RunStatus::Failed
                    | RunStatus::Suspended
                    | RunStatus::SuspendedWaitingChild
            ),
            _ => false,
        }
    }

    /// Validate a transition, returning the error the store reports.
    pub fn check_transition(self, next: RunStatus) -> Result<(), StoreError> {
        if self.can_transition_to(next) {
            Ok(())
        } else {
            Err(StoreError::InvalidTransition {
                from: self,
                to: next,
            })
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RunStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| StoreError::InvalidArgument(format!("unknown run status '{s}'")))
    }
}
