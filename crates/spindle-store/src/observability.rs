use serde::{Deserialize, Serialize};

use crate::domain::RunStatus;

/// Records per status in one run table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub suspended: usize,
    pub suspended_waiting_child: usize,
}

impl StatusCounts {
    pub fn add(&mut self, status: RunStatus, n: usize) {
        let slot = match status {
            RunStatus::Pending => &mut self.pending,
            RunStatus::Running => &mut self.running,
            RunStatus::Completed => &mut self.completed,
            RunStatus::Failed => &mut self.failed,
            RunStatus::Suspended => &mut self.suspended,
            RunStatus::SuspendedWaitingChild => &mut self.suspended_waiting_child,
        };
        *slot += n;
    }

    pub fn get(&self, status: RunStatus) -> usize {
        match status {
            RunStatus::Pending => self.pending,
            RunStatus::Running => self.running,
            RunStatus::Completed => self.completed,
            RunStatus::Failed => self.failed,
            RunStatus::Suspended => self.suspended,
            RunStatus::SuspendedWaitingChild => self.suspended_waiting_child,
        }
    }

    pub fn total(&self) -> usize {
        RunStatus::ALL.into_iter().map(|status| self.get(status)).sum()
    }

    /// What the scheduler's poll would return right now.
    pub fn pending_work(&self) -> usize {
        self.pending + self.suspended_waiting_child
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_and_get_agree() {
        let mut counts = StatusCounts::default();
        counts.add(RunStatus::Pending, 2);
        counts.add(RunStatus::SuspendedWaitingChild, 1);
        counts.add(RunStatus::Completed, 4);
        assert_eq!(counts.get(RunStatus::Pending), 2);
        assert_eq!(counts.pending_work(), 3);
        assert_eq!(counts.total(), 7);
    }
}
