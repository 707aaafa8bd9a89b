//! Executors: one function per delta operation.
//!
//! Every mutating executor follows the same shape: a `try_*` function reads
//! the state it needs, validates preconditions, and submits exactly one
//! version-checked transaction. If a concurrent writer wins the version check
//! the attempt reports `None` and the executor re-runs it from a fresh read,
//! up to `max_cas_retries` times.
//!
//! The `delta` node version guards ledger membership: register, promote,
//! delete-hot and mark-error all write or check it, so a transaction built
//! from a stale view of the ledger can never commit.

pub(crate) mod hot;
pub(crate) mod query;
pub(crate) mod write_op;

use std::sync::Arc;

use dtm_core::{CoordinationStore, NamespaceRegistry, TxnOp, TxnResult, Version};

use crate::codec::{DeltaRecord, decode};
use crate::config::DeltaServiceConfig;
use crate::error::{DeltaError, Result};
use crate::metrics;
use crate::paths::{DeltaPaths, parse_key};
use crate::sequence::DeltaSequence;
use crate::types::{DeltaWriteOp, HotDelta};

/// State shared by all executors.
pub(crate) struct DeltaContext {
    pub(crate) namespaces: NamespaceRegistry,
    pub(crate) config: DeltaServiceConfig,
}

/// A decoded record together with the node version it was read at.
#[derive(Debug, Clone)]
pub(crate) struct Versioned<T> {
    pub(crate) record: T,
    pub(crate) version: Version,
}

impl DeltaContext {
    pub(crate) fn store(&self) -> &Arc<dyn CoordinationStore> {
        self.namespaces.store()
    }

    /// Resolves the delta subtree of `datamart`, failing if its root is missing.
    pub(crate) async fn resolve(&self, datamart: &str) -> Result<DeltaPaths> {
        let root = self
            .namespaces
            .root_path(datamart)
            .map_err(|e| DeltaError::bad_request(e.to_string()))?;
        if self.store().exists(&root).await?.is_none() {
            return Err(DeltaError::NamespaceNotFound {
                datamart: datamart.to_string(),
            });
        }
        Ok(DeltaPaths::new(&root))
    }

    pub(crate) async fn read<T: DeltaRecord>(&self, path: &str) -> Result<Option<Versioned<T>>> {
        let Some(node) = self.store().get(path).await? else {
            return Ok(None);
        };
        Ok(Some(Versioned {
            record: decode(path, &node.data)?,
            version: node.stat.version,
        }))
    }

    pub(crate) async fn read_hot(&self, paths: &DeltaPaths) -> Result<Option<Versioned<HotDelta>>> {
        self.read(&paths.hot()).await
    }

    pub(crate) async fn require_hot(
        &self,
        datamart: &str,
        paths: &DeltaPaths,
    ) -> Result<Versioned<HotDelta>> {
        self.read_hot(paths).await?.ok_or_else(|| {
            DeltaError::not_found(format!("no hot delta is open in datamart {datamart}"))
        })
    }

    pub(crate) async fn read_sequence(
        &self,
        paths: &DeltaPaths,
    ) -> Result<Option<Versioned<DeltaSequence>>> {
        self.read(paths.delta()).await
    }

    /// Reads the sequence record that must accompany an open hot delta.
    pub(crate) async fn require_sequence(
        &self,
        datamart: &str,
        paths: &DeltaPaths,
    ) -> Result<Versioned<DeltaSequence>> {
        self.read_sequence(paths).await?.ok_or_else(|| {
            DeltaError::not_found(format!("delta sequence missing in datamart {datamart}"))
        })
    }

    /// Reads the ledger of the current hot delta, ordered by `sysCn`.
    ///
    /// Records that disappear between listing and reading were removed by a
    /// concurrent writer and are skipped; the caller's transaction will fail
    /// its version check in that case anyway.
    pub(crate) async fn read_ledger(
        &self,
        paths: &DeltaPaths,
    ) -> Result<Vec<Versioned<DeltaWriteOp>>> {
        let dir = paths.write_op_dir();
        let names = match self.store().children(&dir).await {
            Ok(names) => names,
            Err(dtm_core::Error::NotFound(_)) => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut ledger: Vec<Versioned<DeltaWriteOp>> = Vec::with_capacity(names.len());
        for sys_cn in names.iter().filter_map(|name| parse_key(name)) {
            if let Some(op) = self.read(&paths.write_op(sys_cn)).await? {
                ledger.push(op);
            }
        }
        ledger.sort_by_key(|op| op.record.sys_cn);
        Ok(ledger)
    }

    /// Submits one transaction. Returns `false` if a version check lost.
    pub(crate) async fn commit(&self, operation: &'static str, ops: Vec<TxnOp>) -> Result<bool> {
        match self.store().multi(ops).await? {
            TxnResult::Committed => Ok(true),
            TxnResult::Aborted {
                index,
                path,
                conflict,
            } => {
                tracing::debug!(operation, index, path = %path, ?conflict, "delta transaction aborted");
                Ok(false)
            }
        }
    }

    pub(crate) fn note_retry(&self, operation: &'static str, attempt: usize) {
        metrics::record_cas_retry(operation);
        tracing::warn!(
            operation,
            attempt,
            max_attempts = self.config.max_cas_retries,
            "concurrent delta update detected; retrying"
        );
    }

    pub(crate) fn retries_exhausted(&self, operation: &'static str, datamart: &str) -> DeltaError {
        DeltaError::conflict(format!(
            "{operation} on datamart {datamart} lost to concurrent writers {} times",
            self.config.max_cas_retries
        ))
    }
}
