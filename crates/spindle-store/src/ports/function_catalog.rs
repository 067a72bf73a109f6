//! FunctionCatalog port - runnable code stored by identifier.

use async_trait::async_trait;

use crate::domain::{NewTaskFunction, TaskFunction};
use crate::error::StoreError;

/// One live record per identifier, replaced wholesale on every store.
#[async_trait]
pub trait FunctionCatalog: Send + Sync {
    /// Insert, or fully replace the record already stored under the same
    /// identifier. Metadata that is not resupplied is gone afterwards.
    async fn store_task_function(&self, new: NewTaskFunction)
    -> Result<TaskFunction, StoreError>;

    /// Exact identifier lookup; `Ok(None)` when nothing is stored under it.
    async fn get_task_function(&self, identifier: &str)
    -> Result<Option<TaskFunction>, StoreError>;
}
