//! SQL-backed variant of the store contract. One jsonb table, upsert
//! semantics; selected at startup when a database URL is configured.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

use crate::{Result, StoreBackend, TransactionFn};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        Self::with_pool_size(database_url, 10).await
    }

    pub async fn with_pool_size(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        info!(max_connections, "connected to postgres");
        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<()> {
        sqlx::raw_sql(include_str!("../migrations/001_init.sql"))
            .execute(&self.pool)
            .await?;
        info!("store migrations complete");
        Ok(())
    }
}

#[async_trait]
impl StoreBackend for PgStore {
    async fn get(&self, ns: &str, key: &str) -> Result<Option<Value>> {
        let row: Option<(Value,)> =
            sqlx::query_as("SELECT value FROM kv_store WHERE namespace = $1 AND key = $2")
                .bind(ns)
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|r| r.0))
    }

    async fn set(&self, ns: &str, key: &str, value: Value) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO kv_store (namespace, key, value, updated_at)
               VALUES ($1, $2, $3, now())
               ON CONFLICT (namespace, key) DO UPDATE SET value = EXCLUDED.value, updated_at = now()"#,
        )
        .bind(ns)
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete(&self, ns: &str, key: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM kv_store WHERE namespace = $1 AND key = $2")
            .bind(ns)
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn keys(&self, ns: &str) -> Result<Vec<String>> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT key FROM kv_store WHERE namespace = $1")
                .bind(ns)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(|r| r.0).collect())
    }

    async fn get_all(&self, ns: &str) -> Result<HashMap<String, Value>> {
        let rows: Vec<(String, Value)> =
            sqlx::query_as("SELECT key, value FROM kv_store WHERE namespace = $1")
                .bind(ns)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().collect())
    }

    async fn has(&self, ns: &str, key: &str) -> Result<bool> {
        Ok(self.get(ns, key).await?.is_some())
    }

    async fn count(&self, ns: &str) -> Result<usize> {
        let row: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM kv_store WHERE namespace = $1")
                .bind(ns)
                .fetch_one(&self.pool)
                .await?;
        Ok(row.0 as usize)
    }

    async fn clear(&self, ns: &str) -> Result<()> {
        sqlx::query("DELETE FROM kv_store WHERE namespace = $1")
            .bind(ns)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn transaction(&self, ns: &str, f: TransactionFn) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let rows: Vec<(String, Value)> =
            sqlx::query_as("SELECT key, value FROM kv_store WHERE namespace = $1 FOR UPDATE")
                .bind(ns)
                .fetch_all(&mut *tx)
                .await?;
        let mut map: HashMap<String, Value> = rows.into_iter().collect();
        f(&mut map);

        sqlx::query("DELETE FROM kv_store WHERE namespace = $1")
            .bind(ns)
            .execute(&mut *tx)
            .await?;
        for (key, value) in map {
            sqlx::query(
                "INSERT INTO kv_store (namespace, key, value, updated_at) VALUES ($1, $2, $3, now())",
            )
            .bind(ns)
            .bind(&key)
            .bind(value)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        // Writes are synchronous against the pool; nothing is pending.
        Ok(())
    }
}
