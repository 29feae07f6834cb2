//! Namespaced key/value persistence with atomic writes.
//!
//! Two backends behind one contract: a debounced file-backed store (the
//! default) and a Postgres store selected by configuration at startup.

pub mod file;
pub mod postgres;

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

pub use file::{FileStore, StoreStats};
pub use postgres::PgStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("io error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Corrupt on-disk state is fatal; the operator must remove the file.
    #[error("corrupt store file {path}: {reason}")]
    Corrupt { path: String, reason: String },

    #[error("serialize error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("write failed: {0}")]
    WriteFailed(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Mutation applied atomically to a whole namespace under `transaction`.
pub type TransactionFn = Box<dyn FnOnce(&mut HashMap<String, Value>) + Send>;

#[async_trait]
pub trait StoreBackend: Send + Sync {
    async fn get(&self, ns: &str, key: &str) -> Result<Option<Value>>;
    async fn set(&self, ns: &str, key: &str, value: Value) -> Result<()>;
    async fn delete(&self, ns: &str, key: &str) -> Result<bool>;
    async fn keys(&self, ns: &str) -> Result<Vec<String>>;
    async fn get_all(&self, ns: &str) -> Result<HashMap<String, Value>>;
    async fn has(&self, ns: &str, key: &str) -> Result<bool>;
    async fn count(&self, ns: &str) -> Result<usize>;
    async fn clear(&self, ns: &str) -> Result<()>;

    /// Apply a closure to the namespace's full contents as one atomic unit.
    async fn transaction(&self, ns: &str, f: TransactionFn) -> Result<()>;

    /// Drain any pending debounced write. Surfaces the most recent write
    /// failure, if any. Awaited on shutdown.
    async fn flush(&self) -> Result<()>;
}
