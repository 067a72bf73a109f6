//! IdGenerator port - id assignment for new records.
//!
//! # Implementations
//! - **UlidGenerator**: ULID whose timestamp part comes from a `Clock`

use crate::domain::ids::{StackRunId, TaskFunctionId, TaskRunId};
use crate::ports::Clock;
use ulid::Ulid;

/// Generates the ids the store assigns on insert.
///
/// `Send + Sync` because a store is shared across tasks.
pub trait IdGenerator: Send + Sync {
    fn generate_task_run_id(&self) -> TaskRunId;

    fn generate_stack_run_id(&self) -> StackRunId;

    fn generate_task_function_id(&self) -> TaskFunctionId;
}

/// ULID-based generator.
///
/// The timestamp half of each ULID is read from the clock, so a `FixedClock`
/// pins it; the random half still keeps ids distinct.
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }

    fn next_ulid(&self) -> Ulid {
        let timestamp_ms = self.clock.now().timestamp_millis().max(0) as u64;
        Ulid::from_parts(timestamp_ms, rand::random())
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_task_run_id(&self) -> TaskRunId {
        TaskRunId::from(self.next_ulid())
    }

    fn generate_stack_run_id(&self) -> StackRunId {
        StackRunId::from(self.next_ulid())
    }

    fn generate_task_function_id(&self) -> TaskFunctionId {
        TaskFunctionId::from(self.next_ulid())
    }
}
