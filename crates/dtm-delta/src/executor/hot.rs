//! Hot delta lifecycle: open, promote, mark as failed, delete.

use bytes::Bytes;
use chrono::{NaiveDateTime, SubsecRound};
use dtm_core::TxnOp;

use super::{DeltaContext, Versioned};
use crate::codec::encode;
use crate::error::{DeltaError, Result};
use crate::paths::DeltaPaths;
use crate::types::{HotDelta, OkDelta};

const OPEN: &str = "writeNewDeltaHot";
const PROMOTE: &str = "writeDeltaHotSuccess";
const MARK_ERROR: &str = "writeDeltaError";
const DELETE: &str = "deleteDeltaHot";

/// Opens a new hot delta; fails with `AlreadyOpen` if one exists.
pub(crate) async fn write_new_delta_hot(ctx: &DeltaContext, datamart: &str) -> Result<HotDelta> {
    let paths = ctx.resolve(datamart).await?;
    for attempt in 1..=ctx.config.max_cas_retries {
        if let Some(hot) = try_open(ctx, datamart, &paths).await? {
            tracing::info!(
                delta_num = hot.delta_num,
                cn_from = hot.cn_from,
                "opened hot delta"
            );
            return Ok(hot);
        }
        ctx.note_retry(OPEN, attempt);
    }
    Err(ctx.retries_exhausted(OPEN, datamart))
}

async fn try_open(
    ctx: &DeltaContext,
    datamart: &str,
    paths: &DeltaPaths,
) -> Result<Option<HotDelta>> {
    if let Some(current) = ctx.read_hot(paths).await? {
        return Err(DeltaError::AlreadyOpen {
            datamart: datamart.to_string(),
            delta_num: current.record.delta_num,
        });
    }

    let sequence = ctx.read_sequence(paths).await?;
    let state = sequence
        .as_ref()
        .map(|s| s.record.clone())
        .unwrap_or_default();
    let hot = HotDelta {
        delta_num: state.next_delta_num(),
        opened_at: ctx.config.now(),
        cn_from: state.next_cn,
        rolling_back: false,
        failed_cn: None,
    };

    let mut ops = match &sequence {
        Some(existing) => vec![TxnOp::check(paths.delta(), existing.version)],
        // First epoch of this datamart: lay out the subtree in the same transaction.
        None => vec![
            TxnOp::create(paths.delta(), encode(&state)?),
            TxnOp::create(paths.ok_dir(), Bytes::new()),
            TxnOp::create(paths.write_op_dir(), Bytes::new()),
        ],
    };
    ops.push(TxnOp::create(paths.hot(), encode(&hot)?));

    Ok(ctx.commit(OPEN, ops).await?.then_some(hot))
}

/// Promotes the hot delta to an ok delta once every write operation is terminal.
///
/// `delta_date` defaults to the current time in the configured zone and is
/// truncated to whole seconds.
pub(crate) async fn write_delta_hot_success(
    ctx: &DeltaContext,
    datamart: &str,
    delta_date: Option<NaiveDateTime>,
) -> Result<()> {
    let paths = ctx.resolve(datamart).await?;
    let delta_date = delta_date
        .unwrap_or_else(|| ctx.config.now())
        .trunc_subsecs(0);

    for attempt in 1..=ctx.config.max_cas_retries {
        if let Some(ok) = try_promote(ctx, datamart, &paths, delta_date).await? {
            tracing::info!(
                delta_num = ok.delta_num,
                cn_from = ok.cn_from,
                cn_to = ok.cn_to,
                delta_date = %ok.delta_date,
                "committed delta"
            );
            return Ok(());
        }
        ctx.note_retry(PROMOTE, attempt);
    }
    Err(ctx.retries_exhausted(PROMOTE, datamart))
}

async fn try_promote(
    ctx: &DeltaContext,
    datamart: &str,
    paths: &DeltaPaths,
    delta_date: NaiveDateTime,
) -> Result<Option<OkDelta>> {
    let hot = ctx.require_hot(datamart, paths).await?;
    if hot.record.rolling_back {
        return Err(DeltaError::RollingBack {
            datamart: datamart.to_string(),
            delta_num: hot.record.delta_num,
        });
    }
    let sequence = ctx.require_sequence(datamart, paths).await?;
    let ledger = ctx.read_ledger(paths).await?;

    let pending: Vec<i64> = ledger
        .iter()
        .filter(|op| !op.record.status.is_terminal())
        .map(|op| op.record.sys_cn)
        .collect();
    if !pending.is_empty() {
        return Err(DeltaError::NotFinished {
            datamart: datamart.to_string(),
            pending,
        });
    }

    if let Some(previous_num) = sequence.record.last_delta_num {
        let previous: Option<Versioned<OkDelta>> = ctx.read(&paths.ok(previous_num)).await?;
        if let Some(previous) = previous {
            if delta_date < previous.record.delta_date {
                return Err(DeltaError::bad_request(format!(
                    "delta date {delta_date} is earlier than delta {} date {}",
                    previous.record.delta_num, previous.record.delta_date
                )));
            }
        }
    }

    let (ok, next) = sequence.record.promote(&hot.record, delta_date);

    let mut ops = Vec::with_capacity(ledger.len() + 3);
    ops.push(TxnOp::set_data(paths.delta(), encode(&next)?, sequence.version));
    ops.extend(
        ledger
            .iter()
            .map(|op| TxnOp::delete(paths.write_op(op.record.sys_cn), op.version)),
    );
    ops.push(TxnOp::delete(paths.hot(), hot.version));
    ops.push(TxnOp::create(paths.ok(ok.delta_num), encode(&ok)?));

    Ok(ctx.commit(PROMOTE, ops).await?.then_some(ok))
}

/// Marks the hot delta as failed at `sys_cn`. The ledger is preserved until
/// the hot delta is deleted.
pub(crate) async fn write_delta_error(
    ctx: &DeltaContext,
    datamart: &str,
    sys_cn: i64,
) -> Result<()> {
    let paths = ctx.resolve(datamart).await?;
    for attempt in 1..=ctx.config.max_cas_retries {
        if let Some(hot) = try_mark_error(ctx, datamart, &paths, sys_cn).await? {
            tracing::info!(
                delta_num = hot.delta_num,
                failed_cn = sys_cn,
                "marked hot delta as failed"
            );
            return Ok(());
        }
        ctx.note_retry(MARK_ERROR, attempt);
    }
    Err(ctx.retries_exhausted(MARK_ERROR, datamart))
}

async fn try_mark_error(
    ctx: &DeltaContext,
    datamart: &str,
    paths: &DeltaPaths,
    sys_cn: i64,
) -> Result<Option<HotDelta>> {
    let hot = ctx.require_hot(datamart, paths).await?;
    let sequence = ctx.require_sequence(datamart, paths).await?;

    let failed = HotDelta {
        rolling_back: true,
        failed_cn: Some(sys_cn),
        ..hot.record
    };
    let ops = vec![
        TxnOp::check(paths.delta(), sequence.version),
        TxnOp::set_data(paths.hot(), encode(&failed)?, hot.version),
    ];

    Ok(ctx.commit(MARK_ERROR, ops).await?.then_some(failed))
}

/// Removes the hot delta and its whole ledger regardless of operation status.
pub(crate) async fn delete_delta_hot(ctx: &DeltaContext, datamart: &str) -> Result<()> {
    let paths = ctx.resolve(datamart).await?;
    for attempt in 1..=ctx.config.max_cas_retries {
        if let Some((hot, discarded)) = try_delete(ctx, datamart, &paths).await? {
            tracing::info!(
                delta_num = hot.delta_num,
                discarded_write_ops = discarded,
                "deleted hot delta"
            );
            return Ok(());
        }
        ctx.note_retry(DELETE, attempt);
    }
    Err(ctx.retries_exhausted(DELETE, datamart))
}

async fn try_delete(
    ctx: &DeltaContext,
    datamart: &str,
    paths: &DeltaPaths,
) -> Result<Option<(HotDelta, usize)>> {
    let hot = ctx.require_hot(datamart, paths).await?;
    let sequence = ctx.require_sequence(datamart, paths).await?;
    let ledger = ctx.read_ledger(paths).await?;

    let mut ops = Vec::with_capacity(ledger.len() + 2);
    ops.push(TxnOp::check(paths.delta(), sequence.version));
    ops.extend(
        ledger
            .iter()
            .map(|op| TxnOp::delete(paths.write_op(op.record.sys_cn), op.version)),
    );
    ops.push(TxnOp::delete(paths.hot(), hot.version));

    let discarded = ledger.len();
    Ok(ctx
        .commit(DELETE, ops)
        .await?
        .then_some((hot.record, discarded)))
}
