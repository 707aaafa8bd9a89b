//! Shared test utilities for DTM crates.
//!
//! This crate provides:
//! - [`TracingStore`]: in-memory coordination store with operation recording
//!   and failure injection
//! - Fixtures for creating environments and datamart roots
//!
//! # Example
//!
//! ```rust,ignore
//! use dtm_test_utils::{TracingStore, create_datamart};
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let store = TracingStore::new();
//!     create_datamart(Arc::new(store.clone()), "test", "dtm").await;
//!     store.fail_next_multis(1);
//!     // ... run test ...
//! }
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]
#![allow(clippy::must_use_candidate)]
// Test utilities use expect/unwrap for cleaner test code - panics are acceptable in tests
#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::missing_panics_doc)]

pub mod fixtures;
pub mod storage;

pub use fixtures::*;
pub use storage::*;

/// Initialize test logging (call once per test module).
pub fn init_test_logging() {
    use tracing_subscriber::{EnvFilter, fmt};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("dtm_delta=debug".parse().expect("valid directive")),
        )
        .with_test_writer()
        .try_init();
}
