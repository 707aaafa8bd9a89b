//! Test coordination stores with operation tracing and failure injection.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use dtm_core::error::{Error, Result};
use dtm_core::store::{
    CoordinationStore, MemoryStore, Node, NodeStat, TxnOp, TxnResult, Version, WriteResult,
};

/// Record of a store call for test assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    /// `exists` call.
    Exists {
        /// Path that was checked.
        path: String,
    },
    /// `get` call.
    Get {
        /// Path that was read.
        path: String,
    },
    /// `create` call.
    Create {
        /// Path that was created.
        path: String,
    },
    /// `set_data` call.
    SetData {
        /// Path that was written.
        path: String,
        /// Version the caller expected.
        expected_version: Option<Version>,
    },
    /// `delete` call.
    Delete {
        /// Path that was deleted.
        path: String,
    },
    /// `children` call.
    Children {
        /// Parent path that was listed.
        path: String,
    },
    /// `multi` call.
    Multi {
        /// Paths touched by the transaction, in submission order.
        paths: Vec<String>,
        /// Whether the transaction committed.
        committed: bool,
    },
}

/// In-memory coordination store with operation tracing and failure injection.
///
/// Wraps a [`MemoryStore`]; injected failures surface as
/// [`Error::Storage`], the way a lost session does in production.
#[derive(Debug, Clone, Default)]
pub struct TracingStore {
    inner: MemoryStore,
    operations: Arc<Mutex<Vec<StoreOp>>>,
    fail_paths: Arc<Mutex<Vec<String>>>,
    fail_multis: Arc<Mutex<usize>>,
    latency: Option<Duration>,
}

impl TracingStore {
    /// Creates a new empty tracing store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store that sleeps before every call.
    #[must_use]
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency: Some(latency),
            ..Self::default()
        }
    }

    /// Returns the wrapped store, which bypasses tracing and failures.
    #[must_use]
    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }

    /// Returns all recorded operations.
    #[must_use]
    pub fn operations(&self) -> Vec<StoreOp> {
        self.operations.lock().expect("lock").clone()
    }

    /// Returns recorded transactions only.
    #[must_use]
    pub fn transactions(&self) -> Vec<StoreOp> {
        self.operations()
            .into_iter()
            .filter(|op| matches!(op, StoreOp::Multi { .. }))
            .collect()
    }

    /// Clears recorded operations.
    pub fn clear_operations(&self) {
        self.operations.lock().expect("lock").clear();
    }

    /// Fails every call touching a path with the given prefix.
    ///
    /// A transaction fails if any of its operations matches.
    pub fn inject_failure(&self, path_prefix: impl Into<String>) {
        self.fail_paths.lock().expect("lock").push(path_prefix.into());
    }

    /// Fails the next `count` transactions without applying them.
    pub fn fail_next_multis(&self, count: usize) {
        *self.fail_multis.lock().expect("lock") = count;
    }

    /// Clears all injected failures.
    pub fn clear_failures(&self) {
        self.fail_paths.lock().expect("lock").clear();
        *self.fail_multis.lock().expect("lock") = 0;
    }

    /// Returns the current version of a node.
    pub async fn version(&self, path: &str) -> Option<Version> {
        self.inner
            .exists(path)
            .await
            .expect("memory store exists")
            .map(|stat| stat.version)
    }

    fn record(&self, op: StoreOp) {
        self.operations.lock().expect("lock").push(op);
    }

    fn check_failure(&self, path: &str) -> Result<()> {
        let fail_paths = self.fail_paths.lock().expect("lock");
        if fail_paths.iter().any(|p| path.starts_with(p.as_str())) {
            return Err(Error::storage(format!("injected failure for path: {path}")));
        }
        Ok(())
    }

    fn check_multi_failure(&self, ops: &[TxnOp]) -> Result<()> {
        {
            let mut remaining = self.fail_multis.lock().expect("lock");
            if *remaining > 0 {
                *remaining -= 1;
                return Err(Error::storage("injected transaction failure"));
            }
        }
        ops.iter().try_for_each(|op| self.check_failure(op.path()))
    }

    async fn maybe_delay(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait::async_trait]
impl CoordinationStore for TracingStore {
    async fn exists(&self, path: &str) -> Result<Option<NodeStat>> {
        self.maybe_delay().await;
        self.check_failure(path)?;
        self.record(StoreOp::Exists {
            path: path.to_string(),
        });
        self.inner.exists(path).await
    }

    async fn get(&self, path: &str) -> Result<Option<Node>> {
        self.maybe_delay().await;
        self.check_failure(path)?;
        self.record(StoreOp::Get {
            path: path.to_string(),
        });
        self.inner.get(path).await
    }

    async fn create(&self, path: &str, data: Bytes) -> Result<WriteResult> {
        self.maybe_delay().await;
        self.check_failure(path)?;
        self.record(StoreOp::Create {
            path: path.to_string(),
        });
        self.inner.create(path, data).await
    }

    async fn set_data(
        &self,
        path: &str,
        data: Bytes,
        expected_version: Option<Version>,
    ) -> Result<WriteResult> {
        self.maybe_delay().await;
        self.check_failure(path)?;
        self.record(StoreOp::SetData {
            path: path.to_string(),
            expected_version,
        });
        self.inner.set_data(path, data, expected_version).await
    }

    async fn delete(&self, path: &str, expected_version: Option<Version>) -> Result<WriteResult> {
        self.maybe_delay().await;
        self.check_failure(path)?;
        self.record(StoreOp::Delete {
            path: path.to_string(),
        });
        self.inner.delete(path, expected_version).await
    }

    async fn children(&self, path: &str) -> Result<Vec<String>> {
        self.maybe_delay().await;
        self.check_failure(path)?;
        self.record(StoreOp::Children {
            path: path.to_string(),
        });
        self.inner.children(path).await
    }

    async fn multi(&self, ops: Vec<TxnOp>) -> Result<TxnResult> {
        self.maybe_delay().await;
        self.check_multi_failure(&ops)?;
        let paths = ops.iter().map(|op| op.path().to_string()).collect();
        let result = self.inner.multi(ops).await?;
        self.record(StoreOp::Multi {
            paths,
            committed: result.is_committed(),
        });
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_records_operations() {
        let store = TracingStore::new();
        store.create("/a", Bytes::new()).await.unwrap();
        store.get("/a").await.unwrap();

        let ops = store.operations();
        assert_eq!(ops.len(), 2);
        assert!(matches!(&ops[0], StoreOp::Create { path } if path == "/a"));
        assert!(matches!(&ops[1], StoreOp::Get { path } if path == "/a"));
    }

    #[tokio::test]
    async fn test_injected_path_failure_is_a_storage_error() {
        let store = TracingStore::new();
        store.inject_failure("/env/dm/delta");

        let err = store
            .create("/env/dm/delta", Bytes::new())
            .await
            .unwrap_err();
        assert!(err.is_unavailable());

        store.clear_failures();
        store.create("/env", Bytes::new()).await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_multi_applies_nothing() {
        let store = TracingStore::new();
        store.fail_next_multis(1);

        let err = store
            .multi(vec![TxnOp::create("/a", Bytes::new())])
            .await
            .unwrap_err();
        assert!(err.is_unavailable());
        assert_eq!(store.version("/a").await, None);

        let result = store
            .multi(vec![TxnOp::create("/a", Bytes::new())])
            .await
            .unwrap();
        assert!(result.is_committed());
        assert_eq!(store.version("/a").await, Some(0));
        assert_eq!(store.transactions().len(), 1);
    }
}
