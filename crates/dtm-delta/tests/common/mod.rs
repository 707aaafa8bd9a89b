//! Shared setup for `dtm-delta` integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{NaiveDateTime, TimeDelta};
use dtm_core::{CoordinationStore, MemoryStore};
use dtm_delta::{DeltaService, DeltaServiceConfig, DeltaWriteOpRequest};
use dtm_test_utils::{TEST_DATAMART, TEST_ENV, TracingStore, create_datamart};

/// A service over a fresh store with the test datamart created.
pub struct TestContext {
    pub service: DeltaService,
    pub store: TracingStore,
    pub datamart: &'static str,
}

impl TestContext {
    pub async fn new() -> Self {
        Self::with_config(DeltaServiceConfig::for_env(TEST_ENV)).await
    }

    pub async fn with_config(config: DeltaServiceConfig) -> Self {
        Self::with_store(TracingStore::new(), config).await
    }

    pub async fn with_store(store: TracingStore, config: DeltaServiceConfig) -> Self {
        dtm_test_utils::init_test_logging();
        let shared: Arc<dyn CoordinationStore> = Arc::new(store.clone());
        create_datamart(Arc::clone(&shared), TEST_ENV, TEST_DATAMART).await;
        let service = DeltaService::new(shared, config).expect("valid config");
        Self {
            service,
            store,
            datamart: TEST_DATAMART,
        }
    }

    /// Store contents as seen by a second service instance.
    pub fn memory(&self) -> &MemoryStore {
        self.store.inner()
    }

    pub fn request(&self, table: &str) -> DeltaWriteOpRequest {
        op_request(self.datamart, table)
    }

    /// Opens a hot delta, registers one successful write per table, and
    /// promotes it at `date`. Returns the allocated `sysCn` values.
    pub async fn commit_epoch<S: AsRef<str>>(&self, tables: &[S], date: NaiveDateTime) -> Vec<i64> {
        self.service
            .write_new_delta_hot(self.datamart)
            .await
            .expect("open hot delta");
        let mut issued = Vec::with_capacity(tables.len());
        for table in tables {
            let sys_cn = self
                .service
                .write_new_operation(self.request(table.as_ref()))
                .await
                .expect("register write operation");
            self.service
                .write_operation_success(self.datamart, sys_cn)
                .await
                .expect("complete write operation");
            issued.push(sys_cn);
        }
        self.service
            .write_delta_hot_success(self.datamart, Some(date))
            .await
            .expect("promote hot delta");
        issued
    }
}

pub fn op_request(datamart: &str, table: &str) -> DeltaWriteOpRequest {
    DeltaWriteOpRequest::new(datamart, table, format!("{table}_ext"), "select 1")
}

pub fn tables(count: usize) -> Vec<String> {
    (0..count).map(|i| format!("tbl{i}")).collect()
}

/// A fixed, whole-second timestamp.
pub fn at(day: u32, hour: u32) -> NaiveDateTime {
    chrono::NaiveDate::from_ymd_opt(2021, 3, day)
        .expect("valid date")
        .and_hms_opt(hour, 0, 0)
        .expect("valid time")
}

pub fn hours(n: i64) -> TimeDelta {
    TimeDelta::hours(n)
}

/// Another service instance sharing `store`, as a second process would.
pub fn peer(store: &TracingStore, max_cas_retries: usize) -> DeltaService {
    let config = DeltaServiceConfig {
        max_cas_retries,
        ..DeltaServiceConfig::for_env(TEST_ENV)
    };
    DeltaService::new(Arc::new(store.clone()), config).expect("valid config")
}
