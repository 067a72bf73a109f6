//! Keystore port - generic named settings.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::StoreError;

/// Upsert-or-delete settings. Values are arbitrary JSON and come back
/// exactly as they were set.
#[async_trait]
pub trait Keystore: Send + Sync {
    async fn set_keystore(&self, key: &str, value: Value) -> Result<(), StoreError>;

    /// `Ok(None)` when the key is absent. A stored JSON `null` is `Some(Value::Null)`.
    async fn get_keystore(&self, key: &str) -> Result<Option<Value>, StoreError>;

    /// Removing an absent key is not an error.
    async fn delete_keystore(&self, key: &str) -> Result<(), StoreError>;

    /// All keys, ascending.
    async fn keystore_keys(&self) -> Result<Vec<String>, StoreError>;
}
