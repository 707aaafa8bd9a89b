//! Failure injection tests for the delta service.
//!
//! # Invariants Tested
//!
//! 1. **Atomic promotion**: a failed promotion leaves the hot delta and its
//!    ledger exactly as they were; no ok delta becomes visible
//! 2. **No lost allocations**: a failed registration consumes no `sysCn`
//! 3. **Error propagation**: store failures surface as retryable
//!    `StoreUnavailable`, corrupt records as `Serialization`

#![allow(clippy::expect_used, clippy::unwrap_used)]

mod common;

use bytes::Bytes;
use common::{TestContext, at, tables};
use dtm_core::CoordinationStore;
use dtm_delta::DeltaError;
use dtm_delta::paths::DeltaPaths;
use dtm_test_utils::StoreOp;

fn paths() -> DeltaPaths {
    DeltaPaths::new("/test/dtm")
}

async fn open_with_completed_ops(ctx: &TestContext, count: usize) {
    ctx.service.write_new_delta_hot(ctx.datamart).await.unwrap();
    for table in tables(count) {
        let sys_cn = ctx
            .service
            .write_new_operation(ctx.request(&table))
            .await
            .unwrap();
        ctx.service
            .write_operation_success(ctx.datamart, sys_cn)
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn test_failed_promotion_changes_nothing() {
    let ctx = TestContext::new().await;
    open_with_completed_ops(&ctx, 3).await;
    let hot_before = ctx.service.get_delta_hot(ctx.datamart).await.unwrap();
    let ledger_before = ctx
        .memory()
        .children(paths().write_op_dir().as_str())
        .await
        .unwrap();
    assert_eq!(ledger_before.len(), 3);

    ctx.store.fail_next_multis(1);
    let err = ctx
        .service
        .write_delta_hot_success(ctx.datamart, Some(at(10, 0)))
        .await
        .unwrap_err();
    assert!(matches!(err, DeltaError::StoreUnavailable(_)));
    assert!(err.is_retryable());

    assert_eq!(
        ctx.service.get_delta_hot(ctx.datamart).await.unwrap(),
        hot_before
    );
    assert_eq!(
        ctx.memory()
            .children(paths().write_op_dir().as_str())
            .await
            .unwrap(),
        ledger_before
    );
    assert!(matches!(
        ctx.service.get_delta_ok(ctx.datamart).await.unwrap_err(),
        DeltaError::NotFound { .. }
    ));
    assert!(ctx.memory().get(&paths().ok(0)).await.unwrap().is_none());

    // The caller retries once the store is back.
    ctx.service
        .write_delta_hot_success(ctx.datamart, Some(at(10, 0)))
        .await
        .unwrap();
    let ok = ctx.service.get_delta_ok(ctx.datamart).await.unwrap();
    assert_eq!((ok.delta_num, ok.cn_from, ok.cn_to), (0, 0, 2));
}

#[tokio::test]
async fn test_promotion_is_a_single_transaction() {
    let ctx = TestContext::new().await;
    open_with_completed_ops(&ctx, 2).await;
    ctx.store.clear_operations();

    ctx.service
        .write_delta_hot_success(ctx.datamart, Some(at(10, 0)))
        .await
        .unwrap();

    let paths = paths();
    let transactions = ctx.store.transactions();
    assert_eq!(transactions.len(), 1, "promotion must commit exactly once");
    let StoreOp::Multi { paths: touched, committed } = &transactions[0] else {
        panic!("expected a transaction");
    };
    assert!(*committed);
    assert_eq!(
        touched,
        &vec![
            paths.delta().to_string(),
            paths.write_op(0),
            paths.write_op(1),
            paths.hot(),
            paths.ok(0),
        ]
    );

    // No single-node writes bypass the transaction.
    assert!(!ctx.store.operations().iter().any(|op| matches!(
        op,
        StoreOp::Create { .. } | StoreOp::SetData { .. } | StoreOp::Delete { .. }
    )));
}

#[tokio::test]
async fn test_failed_registration_consumes_no_sys_cn() {
    let ctx = TestContext::new().await;
    ctx.service.write_new_delta_hot(ctx.datamart).await.unwrap();

    ctx.store.fail_next_multis(1);
    let err = ctx
        .service
        .write_new_operation(ctx.request("tbl0"))
        .await
        .unwrap_err();
    assert!(matches!(err, DeltaError::StoreUnavailable(_)));
    assert_eq!(err.kind(), "store_unavailable");

    let sys_cn = ctx
        .service
        .write_new_operation(ctx.request("tbl0"))
        .await
        .unwrap();
    assert_eq!(sys_cn, 0);
}

#[tokio::test]
async fn test_failed_open_leaves_datamart_untouched() {
    let ctx = TestContext::new().await;

    ctx.store.fail_next_multis(1);
    let err = ctx
        .service
        .write_new_delta_hot(ctx.datamart)
        .await
        .unwrap_err();
    assert!(matches!(err, DeltaError::StoreUnavailable(_)));
    assert!(ctx.memory().exists(paths().delta()).await.unwrap().is_none());

    let hot = ctx.service.write_new_delta_hot(ctx.datamart).await.unwrap();
    assert_eq!((hot.delta_num, hot.cn_from), (0, 0));
}

#[tokio::test]
async fn test_failed_abort_keeps_ledger() {
    let ctx = TestContext::new().await;
    ctx.service.write_new_delta_hot(ctx.datamart).await.unwrap();
    ctx.service
        .write_new_operation(ctx.request("tbl0"))
        .await
        .unwrap();

    ctx.store.fail_next_multis(1);
    let err = ctx.service.delete_delta_hot(ctx.datamart).await.unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(
        ctx.service
            .get_delta_write_operations(ctx.datamart)
            .await
            .unwrap()
            .len(),
        1
    );

    ctx.service.delete_delta_hot(ctx.datamart).await.unwrap();
    assert!(ctx.service.get_delta_hot(ctx.datamart).await.is_err());
}

#[tokio::test]
async fn test_read_failures_propagate() {
    let ctx = TestContext::new().await;
    ctx.commit_epoch(&["tbl0"], at(11, 0)).await;

    ctx.store.inject_failure(paths().ok_dir());
    for err in [
        ctx.service
            .get_delta_by_date_time(ctx.datamart, at(12, 0))
            .await
            .unwrap_err(),
        ctx.service.get_delta_ok(ctx.datamart).await.unwrap_err(),
        ctx.service
            .get_delta_by_num(ctx.datamart, 0)
            .await
            .unwrap_err(),
    ] {
        assert!(matches!(err, DeltaError::StoreUnavailable(_)), "{err}");
    }

    // Without a hot delta the ledger is never listed.
    ctx.store.inject_failure(paths().write_op_dir());
    assert!(
        ctx.service
            .get_delta_write_operations(ctx.datamart)
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn test_ledger_listing_failure_is_not_an_empty_ledger() {
    let ctx = TestContext::new().await;
    ctx.service.write_new_delta_hot(ctx.datamart).await.unwrap();
    ctx.service
        .write_new_operation(ctx.request("tbl0"))
        .await
        .unwrap();

    ctx.store.inject_failure(paths().write_op_dir());
    let err = ctx
        .service
        .get_delta_write_operations(ctx.datamart)
        .await
        .unwrap_err();
    assert!(matches!(err, DeltaError::StoreUnavailable(_)));
}

#[tokio::test]
async fn test_corrupt_record_is_a_serialization_error() {
    let ctx = TestContext::new().await;
    ctx.service.write_new_delta_hot(ctx.datamart).await.unwrap();

    ctx.memory()
        .set_data(&paths().hot(), Bytes::from_static(b"{not json"), None)
        .await
        .unwrap();

    let err = ctx.service.get_delta_hot(ctx.datamart).await.unwrap_err();
    assert!(matches!(err, DeltaError::Serialization { .. }));
    assert!(!err.is_retryable());
    assert!(err.to_string().contains("hot delta"));
}
