//! spindle-store
//!
//! Persistence for a task-execution framework: task runs, their stack-run
//! hierarchy, the task function catalog and a small keystore, all kept in an
//! embedded SQLite database.
//!
//! # Modules
//! - **domain**: ids, run status, records, patches, filters
//! - **ports**: the async traits a scheduler codes against, plus `Clock` and `IdGenerator`
//! - **store**: `SqliteStore`, which implements every port
//! - **observability**: per-status counts
//! - **error**: `StoreError`
//!
//! ```ignore
//! let store = SqliteStore::builder().location_from_env().build()?;
//! let report = store.initialize().await?;
//! if report.degraded() {
//!     for warning in &report.warnings {
//!         eprintln!("{warning}");
//!     }
//! }
//! let run = store.create_task_run(NewTaskRun::new("sync-inventory")).await?;
//! store.close().await;
//! ```

pub mod domain;
pub mod error;
pub mod observability;
pub mod ports;
pub mod store;

pub use domain::{
    Condition, Filter, NewStackRun, NewTaskFunction, NewTaskRun, RunStatus, Scalar, StackRun,
    StackRunId, StackRunPatch, TaskFunction, TaskFunctionId, TaskRun, TaskRunId, TaskRunPatch,
};
pub use error::{HierarchyViolation, StoreError};
pub use observability::StatusCounts;
pub use ports::{FunctionCatalog, Keystore, StackRunHierarchy, TaskRunRegistry};
pub use store::{
    CloseReport, InitReport, SqliteStore, StoreBuilder, StoreConfig, StoreLocation, StoreWarning,
};
