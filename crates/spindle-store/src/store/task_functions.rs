use async_trait::async_trait;
use rusqlite::{OptionalExtension, Row, params};
use tracing::debug;

use super::SqliteStore;
use super::codec::PayloadCodec;
use crate::domain::{NewTaskFunction, TaskFunction, TaskFunctionId};
use crate::error::StoreError;
use crate::ports::FunctionCatalog;

struct TaskFunctionRow {
    id: TaskFunctionId,
    identifier: String,
    code: String,
    metadata: Option<String>,
    created_at: String,
    updated_at: String,
}

impl TaskFunctionRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            identifier: row.get(1)?,
            code: row.get(2)?,
            metadata: row.get(3)?,
            created_at: row.get(4)?,
            updated_at: row.get(5)?,
        })
    }

    fn decode(self) -> Result<TaskFunction, StoreError> {
        Ok(TaskFunction {
            id: self.id,
            identifier: self.identifier,
            code: self.code,
            metadata: PayloadCodec::decode_payload("metadata", self.metadata)?,
            created_at: PayloadCodec::decode_timestamp("created_at", &self.created_at)?,
            updated_at: PayloadCodec::decode_timestamp("updated_at", &self.updated_at)?,
        })
    }
}

#[async_trait]
impl FunctionCatalog for SqliteStore {
    async fn store_task_function(
        &self,
        new: NewTaskFunction,
    ) -> Result<TaskFunction, StoreError> {
        new.validate()?;
        let now = self.now();
        let function = TaskFunction {
            id: self.ids.generate_task_function_id(),
            identifier: new.identifier,
            code: new.code,
            metadata: new.metadata,
            created_at: now,
            updated_at: now,
        };

        // REPLACE deletes the old row first: nothing of it survives
        let replaced = self
            .with_conn(|conn| {
                let tx = conn.transaction()?;
                let existed = tx
                    .query_row(
                        "SELECT 1 FROM task_functions WHERE identifier = ?1",
                        [&function.identifier],
                        |_| Ok(()),
                    )
                    .optional()?
                    .is_some();
                tx.execute(
                    "INSERT OR REPLACE INTO task_functions \
                     (id, identifier, code, metadata, created_at, updated_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        function.id,
                        function.identifier,
                        function.code,
                        PayloadCodec::encode_payload(function.metadata.as_ref()),
                        PayloadCodec::encode_timestamp(function.created_at),
                        PayloadCodec::encode_timestamp(function.updated_at),
                    ],
                )?;
                tx.commit()?;
                Ok(existed)
            })
            .await?;

        debug!(identifier = %function.identifier, id = %function.id, replaced, "task function stored");
        Ok(function)
    }

    async fn get_task_function(
        &self,
        identifier: &str,
    ) -> Result<Option<TaskFunction>, StoreError> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, identifier, code, metadata, created_at, updated_at \
                 FROM task_functions WHERE identifier = ?1",
                [identifier],
                TaskFunctionRow::read,
            )
            .optional()?
            .map(TaskFunctionRow::decode)
            .transpose()
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::testing::open_store;
    use chrono::Duration;
    use serde_json::json;

    #[tokio::test]
    async fn store_then_get_by_identifier() {
        let (store, _) = open_store().await;
        let stored = store
            .store_task_function(
                NewTaskFunction::new("fetch", "return http.get(input.url)")
                    .with_metadata(json!({"timeout_ms": 5000})),
            )
            .await
            .unwrap();
        assert!(stored.id.to_string().starts_with("taskfn-"));

        let loaded = store.get_task_function("fetch").await.unwrap();
        assert_eq!(loaded, Some(stored));
    }

    #[tokio::test]
    async fn storing_again_replaces_everything() {
        let (store, clock) = open_store().await;
        let first = store
            .store_task_function(
                NewTaskFunction::new("fetch", "v1").with_metadata(json!({"owner": "ops"})),
            )
            .await
            .unwrap();
        clock.advance(Duration::minutes(1));
        let second = store
            .store_task_function(NewTaskFunction::new("fetch", "v2"))
            .await
            .unwrap();

        let loaded = store.get_task_function("fetch").await.unwrap().unwrap();
        assert_eq!(loaded, second);
        assert_eq!(loaded.code, "v2");
        assert_eq!(loaded.metadata, None);
        assert_ne!(loaded.id, first.id);
        assert!(loaded.created_at > first.created_at);

        let rows: i64 = store
            .with_conn(|conn| {
                Ok(conn.query_row(
                    "SELECT COUNT(*) FROM task_functions WHERE identifier = 'fetch'",
                    [],
                    |row| row.get(0),
                )?)
            })
            .await
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[tokio::test]
    async fn lookup_is_exact() {
        let (store, _) = open_store().await;
        store
            .store_task_function(NewTaskFunction::new("fetch-page", "x"))
            .await
            .unwrap();
        assert!(store.get_task_function("fetch").await.unwrap().is_none());
        assert!(store.get_task_function("fetch-page").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn code_is_required() {
        let (store, _) = open_store().await;
        let err = store
            .store_task_function(NewTaskFunction::new("fetch", ""))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
    }
}
