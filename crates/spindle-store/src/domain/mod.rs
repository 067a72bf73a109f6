//! Domain model: ids, run status, records, patches and filters.

pub mod filter;
pub mod ids;
pub mod stack_run;
pub mod state;
pub mod task_function;
pub mod task_run;

pub use filter::{Condition, Filter, Scalar};
pub use ids::{StackRunId, TaskFunctionId, TaskRunId};
pub use stack_run::{NewStackRun, StackRun, StackRunPatch};
pub use state::RunStatus;
pub use task_function::{NewTaskFunction, TaskFunction};
pub use task_run::{NewTaskRun, TaskRun, TaskRunPatch};
