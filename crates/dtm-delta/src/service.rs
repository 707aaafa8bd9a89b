//! Delta service orchestrator: the single entry point used by the query engine.
//!
//! Dispatch is a closed `match` over [`DeltaRequest`], so every operation name
//! in [`DeltaOperation`] is bound to exactly one executor at compile time.
//! The orchestrator keeps no state of its own; all authoritative state lives
//! in the coordination store.

use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use chrono::NaiveDateTime;
use dtm_core::{CoordinationStore, NamespaceRegistry, delta_span};
use tracing::Instrument as _;

use crate::config::DeltaServiceConfig;
use crate::error::{DeltaError, Result};
use crate::executor::{DeltaContext, hot, query, write_op};
use crate::metrics;
use crate::types::{DeltaWriteOp, DeltaWriteOpRequest, HotDelta, OkDelta};

/// Names of the operations the delta service exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeltaOperation {
    /// Open a new hot delta.
    WriteNewDeltaHot,
    /// Promote the hot delta to an ok delta.
    WriteDeltaHotSuccess,
    /// Mark the hot delta as failed.
    WriteDeltaError,
    /// Remove the hot delta and its ledger.
    DeleteDeltaHot,
    /// Register a write operation.
    WriteNewOperation,
    /// Mark a write operation as successful.
    WriteOperationSuccess,
    /// Mark a write operation as failed.
    WriteOperationError,
    /// Remove a write operation from the ledger.
    DeleteWriteOperation,
    /// Read the hot delta.
    GetDeltaHot,
    /// Read the latest ok delta.
    GetDeltaOk,
    /// Read an ok delta by number.
    GetDeltaByNum,
    /// Read the ok delta in effect at a point in time.
    GetDeltaByDateTime,
    /// Read the hot delta's ledger.
    GetDeltaWriteOperations,
}

impl DeltaOperation {
    /// Every operation, in declaration order.
    pub const ALL: [Self; 13] = [
        Self::WriteNewDeltaHot,
        Self::WriteDeltaHotSuccess,
        Self::WriteDeltaError,
        Self::DeleteDeltaHot,
        Self::WriteNewOperation,
        Self::WriteOperationSuccess,
        Self::WriteOperationError,
        Self::DeleteWriteOperation,
        Self::GetDeltaHot,
        Self::GetDeltaOk,
        Self::GetDeltaByNum,
        Self::GetDeltaByDateTime,
        Self::GetDeltaWriteOperations,
    ];

    /// Returns the operation name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::WriteNewDeltaHot => "writeNewDeltaHot",
            Self::WriteDeltaHotSuccess => "writeDeltaHotSuccess",
            Self::WriteDeltaError => "writeDeltaError",
            Self::DeleteDeltaHot => "deleteDeltaHot",
            Self::WriteNewOperation => "writeNewOperation",
            Self::WriteOperationSuccess => "writeOperationSuccess",
            Self::WriteOperationError => "writeOperationError",
            Self::DeleteWriteOperation => "deleteWriteOperation",
            Self::GetDeltaHot => "getDeltaHot",
            Self::GetDeltaOk => "getDeltaOk",
            Self::GetDeltaByNum => "getDeltaByNum",
            Self::GetDeltaByDateTime => "getDeltaByDateTime",
            Self::GetDeltaWriteOperations => "getDeltaWriteOperations",
        }
    }

    /// Returns true for operations that never mutate the store.
    #[must_use]
    pub const fn is_read_only(self) -> bool {
        matches!(
            self,
            Self::GetDeltaHot
                | Self::GetDeltaOk
                | Self::GetDeltaByNum
                | Self::GetDeltaByDateTime
                | Self::GetDeltaWriteOperations
        )
    }
}

impl fmt::Display for DeltaOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeltaOperation {
    type Err = DeltaError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| DeltaError::bad_request(format!("unknown delta operation: {s}")))
    }
}

/// A delta operation together with its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeltaRequest {
    /// See [`DeltaService::write_new_delta_hot`].
    WriteNewDeltaHot {
        /// Datamart name.
        datamart: String,
    },
    /// See [`DeltaService::write_delta_hot_success`].
    WriteDeltaHotSuccess {
        /// Datamart name.
        datamart: String,
        /// Commit timestamp; the current time when `None`.
        delta_date: Option<NaiveDateTime>,
    },
    /// See [`DeltaService::write_delta_error`].
    WriteDeltaError {
        /// Datamart name.
        datamart: String,
        /// `sysCn` at which the epoch failed.
        sys_cn: i64,
    },
    /// See [`DeltaService::delete_delta_hot`].
    DeleteDeltaHot {
        /// Datamart name.
        datamart: String,
    },
    /// See [`DeltaService::write_new_operation`].
    WriteNewOperation(DeltaWriteOpRequest),
    /// See [`DeltaService::write_operation_success`].
    WriteOperationSuccess {
        /// Datamart name.
        datamart: String,
        /// Operation to complete.
        sys_cn: i64,
    },
    /// See [`DeltaService::write_operation_error`].
    WriteOperationError {
        /// Datamart name.
        datamart: String,
        /// Operation to complete.
        sys_cn: i64,
    },
    /// See [`DeltaService::delete_write_operation`].
    DeleteWriteOperation {
        /// Datamart name.
        datamart: String,
        /// Operation to remove.
        sys_cn: i64,
    },
    /// See [`DeltaService::get_delta_hot`].
    GetDeltaHot {
        /// Datamart name.
        datamart: String,
    },
    /// See [`DeltaService::get_delta_ok`].
    GetDeltaOk {
        /// Datamart name.
        datamart: String,
    },
    /// See [`DeltaService::get_delta_by_num`].
    GetDeltaByNum {
        /// Datamart name.
        datamart: String,
        /// Ok delta number.
        delta_num: i64,
    },
    /// See [`DeltaService::get_delta_by_date_time`].
    GetDeltaByDateTime {
        /// Datamart name.
        datamart: String,
        /// Point in time to resolve.
        date_time: NaiveDateTime,
    },
    /// See [`DeltaService::get_delta_write_operations`].
    GetDeltaWriteOperations {
        /// Datamart name.
        datamart: String,
    },
}

impl DeltaRequest {
    /// Returns the operation this request invokes.
    #[must_use]
    pub const fn operation(&self) -> DeltaOperation {
        match self {
            Self::WriteNewDeltaHot { .. } => DeltaOperation::WriteNewDeltaHot,
            Self::WriteDeltaHotSuccess { .. } => DeltaOperation::WriteDeltaHotSuccess,
            Self::WriteDeltaError { .. } => DeltaOperation::WriteDeltaError,
            Self::DeleteDeltaHot { .. } => DeltaOperation::DeleteDeltaHot,
            Self::WriteNewOperation(_) => DeltaOperation::WriteNewOperation,
            Self::WriteOperationSuccess { .. } => DeltaOperation::WriteOperationSuccess,
            Self::WriteOperationError { .. } => DeltaOperation::WriteOperationError,
            Self::DeleteWriteOperation { .. } => DeltaOperation::DeleteWriteOperation,
            Self::GetDeltaHot { .. } => DeltaOperation::GetDeltaHot,
            Self::GetDeltaOk { .. } => DeltaOperation::GetDeltaOk,
            Self::GetDeltaByNum { .. } => DeltaOperation::GetDeltaByNum,
            Self::GetDeltaByDateTime { .. } => DeltaOperation::GetDeltaByDateTime,
            Self::GetDeltaWriteOperations { .. } => DeltaOperation::GetDeltaWriteOperations,
        }
    }

    /// Returns the datamart the request targets.
    #[must_use]
    pub fn datamart(&self) -> &str {
        match self {
            Self::WriteNewOperation(request) => &request.datamart,
            Self::WriteNewDeltaHot { datamart }
            | Self::WriteDeltaHotSuccess { datamart, .. }
            | Self::WriteDeltaError { datamart, .. }
            | Self::DeleteDeltaHot { datamart }
            | Self::WriteOperationSuccess { datamart, .. }
            | Self::WriteOperationError { datamart, .. }
            | Self::DeleteWriteOperation { datamart, .. }
            | Self::GetDeltaHot { datamart }
            | Self::GetDeltaOk { datamart }
            | Self::GetDeltaByNum { datamart, .. }
            | Self::GetDeltaByDateTime { datamart, .. }
            | Self::GetDeltaWriteOperations { datamart } => datamart,
        }
    }
}

/// Result of [`DeltaService::execute`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeltaResponse {
    /// A hot delta (open, read).
    HotDelta(HotDelta),
    /// An ok delta (reads).
    OkDelta(OkDelta),
    /// The `sysCn` allocated for a new write operation.
    SysCn(i64),
    /// The hot delta's ledger.
    WriteOperations(Vec<DeltaWriteOp>),
    /// The mutation was applied; there is nothing to return.
    Done,
}

/// Delta coordination service.
///
/// Cheap to clone; clones share the same store handle.
#[derive(Clone)]
pub struct DeltaService {
    ctx: Arc<DeltaContext>,
}

impl fmt::Debug for DeltaService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeltaService")
            .field("config", &self.ctx.config)
            .finish_non_exhaustive()
    }
}

impl DeltaService {
    /// Creates a service over `store`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(
        store: Arc<dyn CoordinationStore>,
        config: DeltaServiceConfig,
    ) -> dtm_core::Result<Self> {
        config.validate()?;
        let namespaces = NamespaceRegistry::new(store, config.env_name.clone())?;
        Ok(Self {
            ctx: Arc::new(DeltaContext { namespaces, config }),
        })
    }

    /// Returns the service configuration.
    #[must_use]
    pub fn config(&self) -> &DeltaServiceConfig {
        &self.ctx.config
    }

    /// Returns the namespace registry for the configured environment.
    #[must_use]
    pub fn namespaces(&self) -> &NamespaceRegistry {
        &self.ctx.namespaces
    }

    /// Dispatches `request` to its executor.
    ///
    /// # Errors
    ///
    /// Returns the executor's error; see the typed methods for details.
    pub async fn execute(&self, request: DeltaRequest) -> Result<DeltaResponse> {
        match request {
            DeltaRequest::WriteNewDeltaHot { datamart } => self
                .write_new_delta_hot(&datamart)
                .await
                .map(DeltaResponse::HotDelta),
            DeltaRequest::WriteDeltaHotSuccess {
                datamart,
                delta_date,
            } => self
                .write_delta_hot_success(&datamart, delta_date)
                .await
                .map(|()| DeltaResponse::Done),
            DeltaRequest::WriteDeltaError { datamart, sys_cn } => self
                .write_delta_error(&datamart, sys_cn)
                .await
                .map(|()| DeltaResponse::Done),
            DeltaRequest::DeleteDeltaHot { datamart } => self
                .delete_delta_hot(&datamart)
                .await
                .map(|()| DeltaResponse::Done),
            DeltaRequest::WriteNewOperation(request) => self
                .write_new_operation(request)
                .await
                .map(DeltaResponse::SysCn),
            DeltaRequest::WriteOperationSuccess { datamart, sys_cn } => self
                .write_operation_success(&datamart, sys_cn)
                .await
                .map(|()| DeltaResponse::Done),
            DeltaRequest::WriteOperationError { datamart, sys_cn } => self
                .write_operation_error(&datamart, sys_cn)
                .await
                .map(|()| DeltaResponse::Done),
            DeltaRequest::DeleteWriteOperation { datamart, sys_cn } => self
                .delete_write_operation(&datamart, sys_cn)
                .await
                .map(|()| DeltaResponse::Done),
            DeltaRequest::GetDeltaHot { datamart } => self
                .get_delta_hot(&datamart)
                .await
                .map(DeltaResponse::HotDelta),
            DeltaRequest::GetDeltaOk { datamart } => self
                .get_delta_ok(&datamart)
                .await
                .map(DeltaResponse::OkDelta),
            DeltaRequest::GetDeltaByNum {
                datamart,
                delta_num,
            } => self
                .get_delta_by_num(&datamart, delta_num)
                .await
                .map(DeltaResponse::OkDelta),
            DeltaRequest::GetDeltaByDateTime {
                datamart,
                date_time,
            } => self
                .get_delta_by_date_time(&datamart, date_time)
                .await
                .map(DeltaResponse::OkDelta),
            DeltaRequest::GetDeltaWriteOperations { datamart } => self
                .get_delta_write_operations(&datamart)
                .await
                .map(DeltaResponse::WriteOperations),
        }
    }

    /// Opens a new hot delta.
    ///
    /// `deltaNum` is the last committed number plus one (0 for the first
    /// epoch) and `cnFrom` is the next unused `sysCn`.
    ///
    /// # Errors
    ///
    /// - `AlreadyOpen` if a hot delta exists
    /// - `NamespaceNotFound` if the datamart root is missing
    pub async fn write_new_delta_hot(&self, datamart: &str) -> Result<HotDelta> {
        self.observe(
            DeltaOperation::WriteNewDeltaHot,
            datamart,
            hot::write_new_delta_hot(&self.ctx, datamart),
        )
        .await
    }

    /// Promotes the hot delta to an ok delta and clears its ledger atomically.
    ///
    /// # Errors
    ///
    /// - `NotFound` if no hot delta is open
    /// - `NotFinished` if any write operation is still in progress
    /// - `RollingBack` if the hot delta was marked as failed
    /// - `BadRequest` if `delta_date` precedes the previous ok delta's date
    pub async fn write_delta_hot_success(
        &self,
        datamart: &str,
        delta_date: Option<NaiveDateTime>,
    ) -> Result<()> {
        self.observe(
            DeltaOperation::WriteDeltaHotSuccess,
            datamart,
            hot::write_delta_hot_success(&self.ctx, datamart, delta_date),
        )
        .await
    }

    /// Marks the hot delta as failed at `sys_cn` without touching its ledger.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no hot delta is open.
    pub async fn write_delta_error(&self, datamart: &str, sys_cn: i64) -> Result<()> {
        self.observe(
            DeltaOperation::WriteDeltaError,
            datamart,
            hot::write_delta_error(&self.ctx, datamart, sys_cn),
        )
        .await
    }

    /// Removes the hot delta and its ledger regardless of operation status.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no hot delta is open.
    pub async fn delete_delta_hot(&self, datamart: &str) -> Result<()> {
        self.observe(
            DeltaOperation::DeleteDeltaHot,
            datamart,
            hot::delete_delta_hot(&self.ctx, datamart),
        )
        .await
    }

    /// Registers a write operation and returns its `sysCn`.
    ///
    /// # Errors
    ///
    /// - `NotFound` if no hot delta is open
    /// - `TableBlocked` if the table has an operation in progress
    /// - `RollingBack` if the hot delta was marked as failed
    pub async fn write_new_operation(&self, request: DeltaWriteOpRequest) -> Result<i64> {
        let datamart = request.datamart.clone();
        self.observe(
            DeltaOperation::WriteNewOperation,
            &datamart,
            write_op::write_new_operation(&self.ctx, request),
        )
        .await
    }

    /// Marks the write operation with `sys_cn` as successful.
    ///
    /// # Errors
    ///
    /// - `NotFound` if no hot delta is open or no operation has `sys_cn`
    /// - `BadRequest` if the operation already finished with `ERROR`
    pub async fn write_operation_success(&self, datamart: &str, sys_cn: i64) -> Result<()> {
        self.observe(
            DeltaOperation::WriteOperationSuccess,
            datamart,
            write_op::write_operation_success(&self.ctx, datamart, sys_cn),
        )
        .await
    }

    /// Marks the write operation with `sys_cn` as failed.
    ///
    /// # Errors
    ///
    /// - `NotFound` if no hot delta is open or no operation has `sys_cn`
    /// - `BadRequest` if the operation already finished with `SUCCESS`
    pub async fn write_operation_error(&self, datamart: &str, sys_cn: i64) -> Result<()> {
        self.observe(
            DeltaOperation::WriteOperationError,
            datamart,
            write_op::write_operation_error(&self.ctx, datamart, sys_cn),
        )
        .await
    }

    /// Removes the write operation with `sys_cn` from the ledger.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no hot delta is open or no operation has `sys_cn`.
    pub async fn delete_write_operation(&self, datamart: &str, sys_cn: i64) -> Result<()> {
        self.observe(
            DeltaOperation::DeleteWriteOperation,
            datamart,
            write_op::delete_write_operation(&self.ctx, datamart, sys_cn),
        )
        .await
    }

    /// Reads the hot delta.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no hot delta is open.
    pub async fn get_delta_hot(&self, datamart: &str) -> Result<HotDelta> {
        self.observe(
            DeltaOperation::GetDeltaHot,
            datamart,
            query::get_delta_hot(&self.ctx, datamart),
        )
        .await
    }

    /// Reads the latest ok delta.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if nothing has been committed.
    pub async fn get_delta_ok(&self, datamart: &str) -> Result<OkDelta> {
        self.observe(
            DeltaOperation::GetDeltaOk,
            datamart,
            query::get_delta_ok(&self.ctx, datamart),
        )
        .await
    }

    /// Reads the ok delta numbered `delta_num`.
    ///
    /// # Errors
    ///
    /// - `NotCommitted` if `delta_num` is the open hot delta
    /// - `NotFound` otherwise when no such ok delta exists
    pub async fn get_delta_by_num(&self, datamart: &str, delta_num: i64) -> Result<OkDelta> {
        self.observe(
            DeltaOperation::GetDeltaByNum,
            datamart,
            query::get_delta_by_num(&self.ctx, datamart, delta_num),
        )
        .await
    }

    /// Reads the ok delta with the greatest date not after `date_time`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no ok delta qualifies.
    pub async fn get_delta_by_date_time(
        &self,
        datamart: &str,
        date_time: NaiveDateTime,
    ) -> Result<OkDelta> {
        self.observe(
            DeltaOperation::GetDeltaByDateTime,
            datamart,
            query::get_delta_by_date_time(&self.ctx, datamart, date_time),
        )
        .await
    }

    /// Reads the hot delta's ledger, ordered by `sysCn`.
    ///
    /// Returns an empty list when no hot delta is open.
    ///
    /// # Errors
    ///
    /// Returns `NamespaceNotFound` or `StoreUnavailable`; never `NotFound`.
    pub async fn get_delta_write_operations(&self, datamart: &str) -> Result<Vec<DeltaWriteOp>> {
        self.observe(
            DeltaOperation::GetDeltaWriteOperations,
            datamart,
            query::get_delta_write_operations(&self.ctx, datamart),
        )
        .await
    }

    async fn observe<T>(
        &self,
        operation: DeltaOperation,
        datamart: &str,
        executor: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        let span = delta_span(
            operation.as_str(),
            self.ctx.namespaces.env_name(),
            datamart,
        );
        let started = Instant::now();
        let result = executor.instrument(span.clone()).await;

        let outcome = match &result {
            Ok(_) => "ok",
            Err(err) => {
                let _guard = span.enter();
                if err.is_retryable() || matches!(err, DeltaError::Serialization { .. }) {
                    tracing::warn!(error = %err, kind = err.kind(), "delta operation failed");
                } else {
                    tracing::debug!(error = %err, kind = err.kind(), "delta operation rejected");
                }
                err.kind()
            }
        };
        metrics::record_operation(operation.as_str(), outcome, started.elapsed());
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_names_roundtrip() {
        for op in DeltaOperation::ALL {
            assert_eq!(op.as_str().parse::<DeltaOperation>().unwrap(), op);
        }
    }

    #[test]
    fn test_unknown_operation_is_rejected() {
        let err = "writeEverything".parse::<DeltaOperation>().unwrap_err();
        assert!(matches!(err, DeltaError::BadRequest { .. }));
    }

    #[test]
    fn test_request_reports_operation_and_datamart() {
        let request = DeltaRequest::WriteNewOperation(DeltaWriteOpRequest::new(
            "sales", "orders", "orders_ext", "insert into orders ...",
        ));
        assert_eq!(request.operation(), DeltaOperation::WriteNewOperation);
        assert_eq!(request.datamart(), "sales");

        let request = DeltaRequest::GetDeltaByNum {
            datamart: "hr".into(),
            delta_num: 3,
        };
        assert_eq!(request.operation(), DeltaOperation::GetDeltaByNum);
        assert!(request.operation().is_read_only());
        assert_eq!(request.datamart(), "hr");
    }
}
