//! Task function record: runnable code stored under a stable identifier.
//!
//! There is exactly one live record per identifier. Storing again replaces
//! the whole record; nothing from the previous version survives.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ids::TaskFunctionId;
use super::task_run::require_non_blank;
use crate::error::StoreError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskFunction {
    pub id: TaskFunctionId,
    pub identifier: String,
    pub code: String,
    pub metadata: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewTaskFunction {
    pub identifier: String,
    pub code: String,
    pub metadata: Option<Value>,
}

impl NewTaskFunction {
    pub fn new(identifier: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            code: code.into(),
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub(crate) fn validate(&self) -> Result<(), StoreError> {
        require_non_blank("identifier", &self.identifier)?;
        require_non_blank("code", &self.code)
    }
}
