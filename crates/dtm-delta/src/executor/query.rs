//! Read-only projections of the delta subtree.

use chrono::NaiveDateTime;

use super::{DeltaContext, Versioned};
use crate::error::{DeltaError, Result};
use crate::paths::parse_key;
use crate::types::{DeltaWriteOp, HotDelta, OkDelta, WriteOpStatus};

pub(crate) async fn get_delta_hot(ctx: &DeltaContext, datamart: &str) -> Result<HotDelta> {
    let paths = ctx.resolve(datamart).await?;
    Ok(ctx.require_hot(datamart, &paths).await?.record)
}

/// Returns the latest ok delta.
pub(crate) async fn get_delta_ok(ctx: &DeltaContext, datamart: &str) -> Result<OkDelta> {
    let paths = ctx.resolve(datamart).await?;
    let last = ctx
        .read_sequence(&paths)
        .await?
        .and_then(|sequence| sequence.record.last_delta_num)
        .ok_or_else(|| no_committed_delta(datamart))?;

    let ok: Option<Versioned<OkDelta>> = ctx.read(&paths.ok(last)).await?;
    ok.map(|ok| ok.record).ok_or_else(|| {
        DeltaError::not_found(format!("ok delta {last} not found in datamart {datamart}"))
    })
}

/// Returns the ok delta numbered `delta_num`.
///
/// Asking for the open hot delta's number fails with `NotCommitted` rather
/// than `NotFound`.
pub(crate) async fn get_delta_by_num(
    ctx: &DeltaContext,
    datamart: &str,
    delta_num: i64,
) -> Result<OkDelta> {
    let paths = ctx.resolve(datamart).await?;
    if delta_num >= 0 {
        let ok: Option<Versioned<OkDelta>> = ctx.read(&paths.ok(delta_num)).await?;
        if let Some(ok) = ok {
            return Ok(ok.record);
        }
    }

    match ctx.read_hot(&paths).await? {
        Some(hot) if hot.record.delta_num == delta_num => Err(DeltaError::NotCommitted {
            message: format!("delta {delta_num} of datamart {datamart} is still hot"),
        }),
        _ => Err(DeltaError::not_found(format!(
            "ok delta {delta_num} not found in datamart {datamart}"
        ))),
    }
}

/// Returns the ok delta with the latest date not after `date_time`.
///
/// Ok delta dates never decrease with `deltaNum`, so the scan walks from the
/// newest delta backwards and stops at the first match.
pub(crate) async fn get_delta_by_date_time(
    ctx: &DeltaContext,
    datamart: &str,
    date_time: NaiveDateTime,
) -> Result<OkDelta> {
    let paths = ctx.resolve(datamart).await?;
    let names = match ctx.store().children(&paths.ok_dir()).await {
        Ok(names) => names,
        Err(dtm_core::Error::NotFound(_)) => Vec::new(),
        Err(e) => return Err(e.into()),
    };

    for delta_num in names.iter().rev().filter_map(|name| parse_key(name)) {
        let ok: Option<Versioned<OkDelta>> = ctx.read(&paths.ok(delta_num)).await?;
        if let Some(ok) = ok.filter(|ok| ok.record.delta_date <= date_time) {
            return Ok(ok.record);
        }
    }

    Err(DeltaError::not_found(format!(
        "no ok delta committed at or before {date_time} in datamart {datamart}"
    )))
}

/// Returns the unfinished part of the hot delta's ledger, in `sysCn` order.
///
/// Successful operations stay in the store until promotion but are not
/// listed, so a re-registered table shows only its newest operation.
/// Empty when no hot delta is open.
pub(crate) async fn get_delta_write_operations(
    ctx: &DeltaContext,
    datamart: &str,
) -> Result<Vec<DeltaWriteOp>> {
    let paths = ctx.resolve(datamart).await?;
    if ctx.read_hot(&paths).await?.is_none() {
        return Ok(Vec::new());
    }
    Ok(ctx
        .read_ledger(&paths)
        .await?
        .into_iter()
        .map(|op| op.record)
        .filter(|op| op.status != WriteOpStatus::Success)
        .collect())
}

fn no_committed_delta(datamart: &str) -> DeltaError {
    DeltaError::not_found(format!("no committed delta in datamart {datamart}"))
}
