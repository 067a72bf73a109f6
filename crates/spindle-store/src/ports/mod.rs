//! Ports - the abstraction layer.
//!
//! Each trait is a seam between the scheduler-facing API and the storage
//! engine. `SqliteStore` implements all four component traits; `Clock` and
//! `IdGenerator` are injected into it so tests can pin time and ids.

pub mod clock;
pub mod function_catalog;
pub mod id_generator;
pub mod keystore;
pub mod task_store;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::function_catalog::FunctionCatalog;
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::keystore::Keystore;
pub use self::task_store::{StackRunHierarchy, TaskRunRegistry};
