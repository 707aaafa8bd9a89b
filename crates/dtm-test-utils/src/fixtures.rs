//! Fixtures for building coordination store state in tests.

use std::sync::Arc;

use dtm_core::{CoordinationStore, MemoryStore, NamespaceRegistry};

/// Environment name used by test fixtures.
pub const TEST_ENV: &str = "test";

/// Datamart name used by test fixtures.
pub const TEST_DATAMART: &str = "dtm";

/// Creates the root node of `datamart` under `env`, including the
/// environment node, and returns the datamart root path.
pub async fn create_datamart(
    store: Arc<dyn CoordinationStore>,
    env: &str,
    datamart: &str,
) -> String {
    NamespaceRegistry::new(store, env)
        .expect("valid environment name")
        .ensure_exists(datamart)
        .await
        .expect("create datamart root")
}

/// Returns a memory store that already contains [`TEST_DATAMART`] under
/// [`TEST_ENV`].
pub async fn store_with_datamart() -> MemoryStore {
    let store = MemoryStore::new();
    create_datamart(Arc::new(store.clone()), TEST_ENV, TEST_DATAMART).await;
    store
}
