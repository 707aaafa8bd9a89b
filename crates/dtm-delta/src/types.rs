//! Delta records (hot delta, ok delta, write operations) and request types.

use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// The currently open, mutable epoch of a datamart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HotDelta {
    /// Epoch number; the next ok delta will carry it.
    pub delta_num: i64,
    /// When the epoch was opened (configured time zone, whole seconds).
    pub opened_at: NaiveDateTime,
    /// First `sysCn` this epoch may allocate.
    pub cn_from: i64,
    /// Set once the epoch has been marked as failed.
    #[serde(default)]
    pub rolling_back: bool,
    /// `sysCn` at which the epoch was marked as failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_cn: Option<i64>,
}

/// An immutable, committed epoch.
///
/// An empty epoch is recorded with `cn_to == cn_from - 1`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OkDelta {
    /// Epoch number.
    pub delta_num: i64,
    /// Commit timestamp (configured time zone, whole seconds).
    pub delta_date: NaiveDateTime,
    /// First `sysCn` covered by the epoch.
    pub cn_from: i64,
    /// Last `sysCn` covered by the epoch (inclusive).
    pub cn_to: i64,
}

impl OkDelta {
    /// Returns true if no write was committed in this epoch.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.cn_to < self.cn_from
    }
}

/// Status of a write operation in the hot delta's ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WriteOpStatus {
    /// Registered and not yet resolved; blocks the table.
    InProgress,
    /// Completed successfully.
    Success,
    /// Completed with an error.
    Error,
}

impl WriteOpStatus {
    /// Returns true for `Success` and `Error`.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::InProgress)
    }
}

impl fmt::Display for WriteOpStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::InProgress => "IN_PROGRESS",
            Self::Success => "SUCCESS",
            Self::Error => "ERROR",
        })
    }
}

/// A registered intent to modify one table within the hot delta.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeltaWriteOp {
    /// Datamart name.
    pub datamart: String,
    /// Logical table name.
    pub table_name: String,
    /// External (staging) table name.
    pub table_name_ext: String,
    /// Statement text.
    pub query: String,
    /// Sequence number allocated at registration.
    pub sys_cn: i64,
    /// Current status.
    pub status: WriteOpStatus,
}

/// Arguments for registering a write operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeltaWriteOpRequest {
    /// Datamart name.
    pub datamart: String,
    /// Logical table name.
    pub table_name: String,
    /// External (staging) table name.
    pub table_name_ext: String,
    /// Statement text.
    pub query: String,
}

impl DeltaWriteOpRequest {
    /// Creates a request.
    #[must_use]
    pub fn new(
        datamart: impl Into<String>,
        table_name: impl Into<String>,
        table_name_ext: impl Into<String>,
        query: impl Into<String>,
    ) -> Self {
        Self {
            datamart: datamart.into(),
            table_name: table_name.into(),
            table_name_ext: table_name_ext.into(),
            query: query.into(),
        }
    }

    pub(crate) fn into_write_op(self, sys_cn: i64) -> DeltaWriteOp {
        DeltaWriteOp {
            datamart: self.datamart,
            table_name: self.table_name,
            table_name_ext: self.table_name_ext,
            query: self.query,
            sys_cn,
            status: WriteOpStatus::InProgress,
        }
    }
}
