use async_trait::async_trait;
use rusqlite::{OptionalExtension, params};
use serde_json::Value;
use tracing::debug;

use super::SqliteStore;
use super::codec::PayloadCodec;
use crate::domain::task_run::require_non_blank;
use crate::error::StoreError;
use crate::ports::Keystore;

#[async_trait]
impl Keystore for SqliteStore {
    async fn set_keystore(&self, key: &str, value: Value) -> Result<(), StoreError> {
        require_non_blank("key", key)?;
        let now = PayloadCodec::encode_timestamp(self.now());
        let encoded = PayloadCodec::encode_setting(&value);
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO keystore (key, value, created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?3) \
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                params![key, encoded, now],
            )?;
            Ok(())
        })
        .await?;
        debug!(key, "keystore value set");
        Ok(())
    }

    async fn get_keystore(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let text: Option<String> = self
            .with_conn(|conn| {
                Ok(conn
                    .query_row("SELECT value FROM keystore WHERE key = ?1", [key], |row| {
                        row.get(0)
                    })
                    .optional()?)
            })
            .await?;
        Ok(text.map(PayloadCodec::decode_setting))
    }

    async fn delete_keystore(&self, key: &str) -> Result<(), StoreError> {
        let removed = self
            .with_conn(|conn| Ok(conn.execute("DELETE FROM keystore WHERE key = ?1", [key])?))
            .await?;
        debug!(key, removed, "keystore value deleted");
        Ok(())
    }

    async fn keystore_keys(&self) -> Result<Vec<String>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT key FROM keystore ORDER BY key")?;
            let keys = stmt
                .query_map([], |row| row.get(0))?
                .collect::<Result<Vec<String>, _>>()?;
            Ok(keys)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::testing::open_store;
    use rstest::rstest;
    use serde_json::json;

    #[tokio::test]
    async fn set_get_delete() {
        let (store, _) = open_store().await;
        store.set_keystore("api-key", json!("secret")).await.unwrap();
        assert_eq!(store.get_keystore("api-key").await.unwrap(), Some(json!("secret")));

        store.delete_keystore("api-key").await.unwrap();
        assert_eq!(store.get_keystore("api-key").await.unwrap(), None);
    }

    #[rstest]
    #[case::plain_string(json!("secret"))]
    #[case::numeric_string(json!("42"))]
    #[case::json_looking_string(json!("{\"a\":1}"))]
    #[case::number(json!(3.5))]
    #[case::float_tiny(json!(1.0715660391465826e-75))]
    #[case::float_huge(json!({"x": -1.603964615428183e143}))]
    #[case::boolean(json!(false))]
    #[case::null(Value::Null)]
    #[case::nested(json!({"retry": {"max": 3, "backoff": [1, 2, 4]}, "tags": null}))]
    #[tokio::test]
    async fn values_round_trip_exactly(#[case] value: Value) {
        let (store, _) = open_store().await;
        store.set_keystore("k", value.clone()).await.unwrap();
        assert_eq!(store.get_keystore("k").await.unwrap(), Some(value));
    }

    #[tokio::test]
    async fn set_overwrites_and_keeps_created_at() {
        let (store, clock) = open_store().await;
        store.set_keystore("mode", json!("a")).await.unwrap();
        clock.advance(chrono::Duration::seconds(1));
        store.set_keystore("mode", json!("b")).await.unwrap();

        assert_eq!(store.get_keystore("mode").await.unwrap(), Some(json!("b")));
        let (created, updated): (String, String) = store
            .with_conn(|conn| {
                Ok(conn.query_row(
                    "SELECT created_at, updated_at FROM keystore WHERE key = 'mode'",
                    [],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )?)
            })
            .await
            .unwrap();
        assert!(created < updated);
    }

    #[tokio::test]
    async fn deleting_absent_key_is_fine() {
        let (store, _) = open_store().await;
        store.delete_keystore("never-set").await.unwrap();
    }

    #[tokio::test]
    async fn raw_text_reads_back_as_string() {
        let (store, _) = open_store().await;
        store
            .with_conn(|conn| {
                conn.execute(
                    "INSERT INTO keystore (key, value, created_at, updated_at) \
                     VALUES ('legacy', 'not json', 'x', 'x')",
                    [],
                )?;
                Ok(())
            })
            .await
            .unwrap();
        assert_eq!(
            store.get_keystore("legacy").await.unwrap(),
            Some(json!("not json"))
        );
    }

    #[tokio::test]
    async fn keys_are_sorted_and_blank_keys_rejected() {
        let (store, _) = open_store().await;
        for key in ["zeta", "alpha", "mid"] {
            store.set_keystore(key, json!(1)).await.unwrap();
        }
        assert_eq!(store.keystore_keys().await.unwrap(), ["alpha", "mid", "zeta"]);
        assert!(matches!(
            store.set_keystore(" ", json!(1)).await,
            Err(StoreError::Validation(_))
        ));
    }
}
