//! Write operation ledger: register, complete, delete.

use dtm_core::TxnOp;

use super::{DeltaContext, Versioned};
use crate::codec::encode;
use crate::error::{DeltaError, Result};
use crate::paths::DeltaPaths;
use crate::types::{DeltaWriteOp, DeltaWriteOpRequest, WriteOpStatus};

const REGISTER: &str = "writeNewOperation";
const SUCCESS: &str = "writeOperationSuccess";
const ERROR: &str = "writeOperationError";
const DELETE: &str = "deleteWriteOperation";

/// Registers a write operation in the hot delta and returns its `sysCn`.
///
/// Fails with `TableBlocked` if the table already has an operation in
/// progress. The conflict check and the `sysCn` allocation commit together.
pub(crate) async fn write_new_operation(
    ctx: &DeltaContext,
    request: DeltaWriteOpRequest,
) -> Result<i64> {
    if request.table_name.trim().is_empty() {
        return Err(DeltaError::bad_request("table name cannot be empty"));
    }
    let paths = ctx.resolve(&request.datamart).await?;

    for attempt in 1..=ctx.config.max_cas_retries {
        if let Some(sys_cn) = try_register(ctx, &paths, &request).await? {
            tracing::debug!(
                table = %request.table_name,
                sys_cn,
                "registered write operation"
            );
            return Ok(sys_cn);
        }
        ctx.note_retry(REGISTER, attempt);
    }
    Err(ctx.retries_exhausted(REGISTER, &request.datamart))
}

async fn try_register(
    ctx: &DeltaContext,
    paths: &DeltaPaths,
    request: &DeltaWriteOpRequest,
) -> Result<Option<i64>> {
    let datamart = request.datamart.as_str();
    let hot = ctx.read_hot(paths).await?.ok_or_else(|| {
        DeltaError::not_found(format!(
            "no hot delta is open in datamart {datamart}; writes require an open delta"
        ))
    })?;
    if hot.record.rolling_back {
        return Err(DeltaError::RollingBack {
            datamart: datamart.to_string(),
            delta_num: hot.record.delta_num,
        });
    }
    let sequence = ctx.require_sequence(datamart, paths).await?;
    let ledger = ctx.read_ledger(paths).await?;

    if let Some(blocking) = ledger.iter().find(|op| {
        op.record.table_name == request.table_name && !op.record.status.is_terminal()
    }) {
        return Err(DeltaError::TableBlocked {
            datamart: datamart.to_string(),
            table: request.table_name.clone(),
            sys_cn: blocking.record.sys_cn,
        });
    }

    let (sys_cn, next) = sequence.record.allocate_cn();
    let op = request.clone().into_write_op(sys_cn);
    let ops = vec![
        TxnOp::set_data(paths.delta(), encode(&next)?, sequence.version),
        TxnOp::check(paths.hot(), hot.version),
        TxnOp::create(paths.write_op(sys_cn), encode(&op)?),
    ];

    Ok(ctx.commit(REGISTER, ops).await?.then_some(sys_cn))
}

/// Marks the operation with `sys_cn` as `SUCCESS`.
pub(crate) async fn write_operation_success(
    ctx: &DeltaContext,
    datamart: &str,
    sys_cn: i64,
) -> Result<()> {
    complete(ctx, SUCCESS, datamart, sys_cn, WriteOpStatus::Success).await
}

/// Marks the operation with `sys_cn` as `ERROR`.
pub(crate) async fn write_operation_error(
    ctx: &DeltaContext,
    datamart: &str,
    sys_cn: i64,
) -> Result<()> {
    complete(ctx, ERROR, datamart, sys_cn, WriteOpStatus::Error).await
}

async fn complete(
    ctx: &DeltaContext,
    operation: &'static str,
    datamart: &str,
    sys_cn: i64,
    status: WriteOpStatus,
) -> Result<()> {
    let paths = ctx.resolve(datamart).await?;
    for attempt in 1..=ctx.config.max_cas_retries {
        if try_complete(ctx, operation, datamart, &paths, sys_cn, status).await? {
            tracing::debug!(sys_cn, %status, "completed write operation");
            return Ok(());
        }
        ctx.note_retry(operation, attempt);
    }
    Err(ctx.retries_exhausted(operation, datamart))
}

async fn try_complete(
    ctx: &DeltaContext,
    operation: &'static str,
    datamart: &str,
    paths: &DeltaPaths,
    sys_cn: i64,
    status: WriteOpStatus,
) -> Result<bool> {
    let hot = ctx.require_hot(datamart, paths).await?;
    let op = require_write_op(ctx, datamart, paths, sys_cn).await?;

    if op.record.status == status {
        return Ok(true);
    }
    if op.record.status.is_terminal() {
        return Err(DeltaError::bad_request(format!(
            "write operation {sys_cn} in datamart {datamart} is already finished with status {}",
            op.record.status
        )));
    }

    let updated = DeltaWriteOp {
        status,
        ..op.record
    };
    let ops = vec![
        TxnOp::check(paths.hot(), hot.version),
        TxnOp::set_data(paths.write_op(sys_cn), encode(&updated)?, op.version),
    ];
    ctx.commit(operation, ops).await
}

/// Removes the operation with `sys_cn` from the ledger.
pub(crate) async fn delete_write_operation(
    ctx: &DeltaContext,
    datamart: &str,
    sys_cn: i64,
) -> Result<()> {
    let paths = ctx.resolve(datamart).await?;
    for attempt in 1..=ctx.config.max_cas_retries {
        let hot = ctx.require_hot(datamart, &paths).await?;
        let op = require_write_op(ctx, datamart, &paths, sys_cn).await?;
        let ops = vec![
            TxnOp::check(paths.hot(), hot.version),
            TxnOp::delete(paths.write_op(sys_cn), op.version),
        ];
        if ctx.commit(DELETE, ops).await? {
            tracing::debug!(sys_cn, table = %op.record.table_name, "deleted write operation");
            return Ok(());
        }
        ctx.note_retry(DELETE, attempt);
    }
    Err(ctx.retries_exhausted(DELETE, datamart))
}

async fn require_write_op(
    ctx: &DeltaContext,
    datamart: &str,
    paths: &DeltaPaths,
    sys_cn: i64,
) -> Result<Versioned<DeltaWriteOp>> {
    ctx.read(&paths.write_op(sys_cn)).await?.ok_or_else(|| {
        DeltaError::not_found(format!(
            "write operation {sys_cn} not found in hot delta of datamart {datamart}"
        ))
    })
}
