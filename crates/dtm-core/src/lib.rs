//! # dtm-core
//!
//! Core abstractions shared by the DTM query engine components:
//!
//! - **Coordination Store**: hierarchical, versioned key tree with CAS writes
//!   and atomic multi-node transactions ([`CoordinationStore`], [`MemoryStore`])
//! - **Namespaces**: environment-scoped datamart roots ([`NamespaceRegistry`])
//! - **Error Types**: shared error definitions and result types
//! - **Observability**: logging initialization and standard spans
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use dtm_core::{MemoryStore, NamespaceRegistry};
//!
//! let store = Arc::new(MemoryStore::new());
//! let registry = NamespaceRegistry::new(store, "dev").unwrap();
//! assert_eq!(registry.root_path("sales").unwrap(), "/dev/sales");
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]
#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod error;
pub mod namespace;
pub mod observability;
pub mod store;

pub use error::{Error, Result};
pub use namespace::{NamespaceRegistry, validate_name};
pub use observability::{LogFormat, delta_span, init_logging};
pub use store::{
    CoordinationStore, MemoryStore, Node, NodeStat, TxnConflict, TxnOp, TxnResult, Version,
    WriteResult, join_path, validate_path,
};
