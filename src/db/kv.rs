//! `KvStore` over the `kv_store` table.

use crate::error::Result;
use crate::store::KvStore;
use crate::telemetry::metrics;
use opentelemetry::KeyValue;

impl KvStore for super::Db {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM kv_store WHERE key = ?1")
            .bind(key)
            .fetch_optional(self.pool())
            .await?;
        record("get");
        Ok(row.map(|(value,)| value))
    }

    async fn set(&self, key: &str, value: String) -> Result<()> {
        let now = chrono::Utc::now();
        sqlx::query(
            "INSERT INTO kv_store (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(value)
        .bind(now)
        .execute(self.pool())
        .await?;
        record("set");
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM kv_store WHERE key = ?1")
            .bind(key)
            .execute(self.pool())
            .await?;
        record("del");
        Ok(())
    }
}

fn record(operation: &'static str) {
    metrics::store_operations().add(
        1,
        &[
            KeyValue::new("backend", "sqlite"),
            KeyValue::new("operation", operation),
        ],
    );
}
