//! Delta coordination for the DTM query engine.
//!
//! Writes to a datamart are grouped into epochs called deltas. At most one
//! hot delta is open per datamart; it accumulates a ledger of write
//! operations, each stamped with a monotonically increasing `sysCn`. Once
//! every operation in the ledger has finished, the hot delta is promoted to
//! an immutable ok delta covering a contiguous `sysCn` range. Readers pin a
//! consistent snapshot by resolving an ok delta by number or by time.
//!
//! All state lives in a [`dtm_core::CoordinationStore`]; every mutation is a
//! single version-checked transaction, so concurrent service instances
//! sharing a store never interleave partial updates.
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use dtm_core::MemoryStore;
//! use dtm_delta::{DeltaService, DeltaServiceConfig, DeltaWriteOpRequest};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(MemoryStore::new());
//! let service = DeltaService::new(store, DeltaServiceConfig::for_env("dev"))?;
//! service.namespaces().ensure_exists("sales").await?;
//!
//! let hot = service.write_new_delta_hot("sales").await?;
//! let sys_cn = service
//!     .write_new_operation(DeltaWriteOpRequest::new(
//!         "sales", "orders", "orders_ext", "insert into orders ...",
//!     ))
//!     .await?;
//! service.write_operation_success("sales", sys_cn).await?;
//! service.write_delta_hot_success("sales", None).await?;
//!
//! let ok = service.get_delta_ok("sales").await?;
//! assert_eq!((ok.delta_num, ok.cn_from, ok.cn_to), (hot.delta_num, 0, 0));
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]
#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod codec;
pub mod config;
pub mod error;
mod executor;
pub mod metrics;
pub mod paths;
pub mod sequence;
pub mod service;
pub mod types;

pub use config::{DEFAULT_MAX_CAS_RETRIES, DeltaServiceConfig};
pub use error::{DeltaError, Result};
pub use sequence::DeltaSequence;
pub use service::{DeltaOperation, DeltaRequest, DeltaResponse, DeltaService};
pub use types::{DeltaWriteOp, DeltaWriteOpRequest, HotDelta, OkDelta, WriteOpStatus};
