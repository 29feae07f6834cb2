//! File-backed store. Each namespace serializes to one pretty-printed JSON
//! file; writes go through a temp sibling and an atomic rename. Mutations are
//! debounced (default 1000 ms, last-writer-wins) so bursts of metric updates
//! batch into a single rename.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::{Result, StoreBackend, StoreError, TransactionFn};

const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone, serde::Serialize)]
pub struct StoreStats {
    pub save_requests: u64,
    pub actual_writes: u64,
    pub debounced_skips: u64,
    pub failed_writes: u64,
    pub last_write_time: Option<i64>,
    pub last_error: Option<String>,
}

struct Inner {
    dir: PathBuf,
    debounce: Duration,
    data: Mutex<HashMap<String, HashMap<String, Value>>>,
    dirty: Mutex<HashSet<String>>,
    timer: Mutex<Option<JoinHandle<()>>>,
    save_requests: AtomicU64,
    actual_writes: AtomicU64,
    debounced_skips: AtomicU64,
    failed_writes: AtomicU64,
    last_write_time: Mutex<Option<i64>>,
    last_error: Mutex<Option<String>>,
}

pub struct FileStore {
    inner: Arc<Inner>,
}

impl FileStore {
    /// Open a store rooted at `dir`. A missing directory means an empty
    /// store; a present-but-unparseable namespace file is fatal.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        Self::with_debounce(dir, DEFAULT_DEBOUNCE)
    }

    pub fn with_debounce(dir: impl AsRef<Path>, debounce: Duration) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        let mut data = HashMap::new();

        if dir.is_dir() {
            let entries = std::fs::read_dir(&dir).map_err(|e| StoreError::Io {
                path: dir.display().to_string(),
                source: e,
            })?;
            for entry in entries.flatten() {
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) != Some("json") {
                    continue;
                }
                let Some(ns) = path.file_stem().and_then(|s| s.to_str()) else {
                    continue;
                };
                let raw = std::fs::read(&path).map_err(|e| StoreError::Io {
                    path: path.display().to_string(),
                    source: e,
                })?;
                let parsed: HashMap<String, Value> =
                    serde_json::from_slice(&raw).map_err(|e| StoreError::Corrupt {
                        path: path.display().to_string(),
                        reason: e.to_string(),
                    })?;
                debug!(namespace = ns, entries = parsed.len(), "loaded namespace");
                data.insert(ns.to_string(), parsed);
            }
        }

        Ok(Self {
            inner: Arc::new(Inner {
                dir,
                debounce,
                data: Mutex::new(data),
                dirty: Mutex::new(HashSet::new()),
                timer: Mutex::new(None),
                save_requests: AtomicU64::new(0),
                actual_writes: AtomicU64::new(0),
                debounced_skips: AtomicU64::new(0),
                failed_writes: AtomicU64::new(0),
                last_write_time: Mutex::new(None),
                last_error: Mutex::new(None),
            }),
        })
    }

    pub fn stats(&self) -> StoreStats {
        let inner = &self.inner;
        StoreStats {
            save_requests: inner.save_requests.load(Ordering::Relaxed),
            actual_writes: inner.actual_writes.load(Ordering::Relaxed),
            debounced_skips: inner.debounced_skips.load(Ordering::Relaxed),
            failed_writes: inner.failed_writes.load(Ordering::Relaxed),
            last_write_time: *inner.last_write_time.lock().unwrap(),
            last_error: inner.last_error.lock().unwrap().clone(),
        }
    }

    /// Discard any pending debounced write without persisting it.
    pub fn cancel(&self) {
        self.inner.abort_timer();
        self.inner.dirty.lock().unwrap().clear();
    }

    /// Write through immediately, invalidating any pending debounced write.
    pub fn save_immediate(&self, ns: &str, key: &str, value: Value) -> Result<()> {
        {
            let mut data = self.inner.data.lock().unwrap();
            data.entry(ns.to_string())
                .or_default()
                .insert(key.to_string(), value);
        }
        self.inner.save_requests.fetch_add(1, Ordering::Relaxed);
        self.inner.dirty.lock().unwrap().insert(ns.to_string());
        self.inner.abort_timer();
        self.inner.write_dirty()
    }
}

impl Inner {
    fn abort_timer(&self) {
        if let Some(handle) = self.timer.lock().unwrap().take() {
            handle.abort();
        }
    }

    /// Record a save request for `ns` and arm the debounce timer. Requests
    /// arriving while a timer is pending are the debounced skips.
    fn schedule(self: &Arc<Self>, ns: &str) {
        self.save_requests.fetch_add(1, Ordering::Relaxed);
        self.dirty.lock().unwrap().insert(ns.to_string());

        let mut timer = self.timer.lock().unwrap();
        let pending = timer.as_ref().map(|h| !h.is_finished()).unwrap_or(false);
        if pending {
            self.debounced_skips.fetch_add(1, Ordering::Relaxed);
            return;
        }
        let inner = Arc::clone(self);
        *timer = Some(tokio::spawn(async move {
            tokio::time::sleep(inner.debounce).await;
            if let Err(e) = inner.write_dirty() {
                warn!(error = %e, "debounced write failed");
            }
        }));
    }

    /// Serialize every dirty namespace and rename it into place. Synchronous
    /// on purpose: a timer abort can only land between namespaces, never in
    /// the middle of a temp-write/rename pair.
    fn write_dirty(&self) -> Result<()> {
        let dirty: Vec<String> = {
            let mut set = self.dirty.lock().unwrap();
            set.drain().collect()
        };
        if dirty.is_empty() {
            return Ok(());
        }

        std::fs::create_dir_all(&self.dir).map_err(|e| StoreError::Io {
            path: self.dir.display().to_string(),
            source: e,
        })?;

        let mut first_err: Option<StoreError> = None;
        for ns in dirty {
            let serialized = {
                let data = self.data.lock().unwrap();
                let empty = HashMap::new();
                let map = data.get(&ns).unwrap_or(&empty);
                serde_json::to_vec_pretty(map)?
            };
            let target = self.dir.join(format!("{}.json", ns));
            let tmp = self.dir.join(format!("{}.json.tmp", ns));

            let result = std::fs::write(&tmp, &serialized)
                .and_then(|_| std::fs::rename(&tmp, &target));
            match result {
                Ok(()) => {
                    self.actual_writes.fetch_add(1, Ordering::Relaxed);
                    *self.last_write_time.lock().unwrap() =
                        Some(chrono::Utc::now().timestamp_millis());
                    debug!(namespace = %ns, bytes = serialized.len(), "namespace persisted");
                }
                Err(e) => {
                    self.failed_writes.fetch_add(1, Ordering::Relaxed);
                    let msg = format!("{}: {}", target.display(), e);
                    *self.last_error.lock().unwrap() = Some(msg.clone());
                    if first_err.is_none() {
                        first_err = Some(StoreError::Io {
                            path: target.display().to_string(),
                            source: e,
                        });
                    }
                    warn!(namespace = %ns, error = %msg, "namespace write failed");
                }
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl StoreBackend for FileStore {
    async fn get(&self, ns: &str, key: &str) -> Result<Option<Value>> {
        let data = self.inner.data.lock().unwrap();
        Ok(data.get(ns).and_then(|m| m.get(key)).cloned())
    }

    async fn set(&self, ns: &str, key: &str, value: Value) -> Result<()> {
        {
            let mut data = self.inner.data.lock().unwrap();
            data.entry(ns.to_string())
                .or_default()
                .insert(key.to_string(), value);
        }
        self.inner.schedule(ns);
        Ok(())
    }

    async fn delete(&self, ns: &str, key: &str) -> Result<bool> {
        let removed = {
            let mut data = self.inner.data.lock().unwrap();
            data.get_mut(ns).map(|m| m.remove(key).is_some()).unwrap_or(false)
        };
        if removed {
            self.inner.schedule(ns);
        }
        Ok(removed)
    }

    async fn keys(&self, ns: &str) -> Result<Vec<String>> {
        let data = self.inner.data.lock().unwrap();
        Ok(data.get(ns).map(|m| m.keys().cloned().collect()).unwrap_or_default())
    }

    async fn get_all(&self, ns: &str) -> Result<HashMap<String, Value>> {
        let data = self.inner.data.lock().unwrap();
        Ok(data.get(ns).cloned().unwrap_or_default())
    }

    async fn has(&self, ns: &str, key: &str) -> Result<bool> {
        let data = self.inner.data.lock().unwrap();
        Ok(data.get(ns).map(|m| m.contains_key(key)).unwrap_or(false))
    }

    async fn count(&self, ns: &str) -> Result<usize> {
        let data = self.inner.data.lock().unwrap();
        Ok(data.get(ns).map(|m| m.len()).unwrap_or(0))
    }

    async fn clear(&self, ns: &str) -> Result<()> {
        {
            let mut data = self.inner.data.lock().unwrap();
            data.insert(ns.to_string(), HashMap::new());
        }
        self.inner.schedule(ns);
        Ok(())
    }

    async fn transaction(&self, ns: &str, f: TransactionFn) -> Result<()> {
        {
            let mut data = self.inner.data.lock().unwrap();
            let map = data.entry(ns.to_string()).or_default();
            f(map);
        }
        self.inner.schedule(ns);
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        self.inner.abort_timer();
        let write_result = self.inner.write_dirty();
        // Surface any failure recorded since the previous flush, even if the
        // final drain itself succeeded.
        let stored = self.inner.last_error.lock().unwrap().take();
        match (write_result, stored) {
            (Err(e), _) => Err(e),
            (Ok(()), Some(msg)) => Err(StoreError::WriteFailed(msg)),
            (Ok(()), None) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn debounce_batches_to_one_write() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();

        store.set("patterns", "k", json!("A")).await.unwrap();
        store.set("patterns", "k", json!("B")).await.unwrap();
        store.set("patterns", "k", json!("C")).await.unwrap();
        store.flush().await.unwrap();

        let stats = store.stats();
        assert_eq!(stats.save_requests, 3);
        assert_eq!(stats.actual_writes, 1);
        assert_eq!(stats.debounced_skips, 2);

        let raw = std::fs::read(dir.path().join("patterns.json")).unwrap();
        let on_disk: HashMap<String, Value> = serde_json::from_slice(&raw).unwrap();
        assert_eq!(on_disk.get("k"), Some(&json!("C")));
    }

    #[tokio::test]
    async fn save_immediate_is_durable() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        store.save_immediate("patterns", "p1", json!({"id": "p1"})).unwrap();

        let reopened = FileStore::open(dir.path()).unwrap();
        let got = reopened.get("patterns", "p1").await.unwrap();
        assert_eq!(got, Some(json!({"id": "p1"})));
    }

    #[tokio::test]
    async fn missing_dir_is_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path().join("nope")).unwrap();
        assert_eq!(store.count("patterns").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn corrupt_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("patterns.json"), b"{not json").unwrap();
        let err = FileStore::open(dir.path()).err().unwrap();
        assert!(matches!(err, StoreError::Corrupt { .. }));
    }

    #[tokio::test]
    async fn delete_and_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        store.set("ns", "a", json!(1)).await.unwrap();
        store.set("ns", "b", json!(2)).await.unwrap();
        assert!(store.delete("ns", "a").await.unwrap());
        assert!(!store.delete("ns", "a").await.unwrap());
        let mut keys = store.keys("ns").await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["b"]);
        store.cancel();
    }

    #[tokio::test]
    async fn transaction_applies_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        store
            .transaction(
                "ns",
                Box::new(|map| {
                    map.insert("x".into(), json!(1));
                    map.insert("y".into(), json!(2));
                }),
            )
            .await
            .unwrap();
        assert_eq!(store.count("ns").await.unwrap(), 2);
        store.flush().await.unwrap();
    }
}
