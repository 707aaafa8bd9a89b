//! JSON codec for delta records stored as coordination store payloads.

use bytes::Bytes;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{DeltaError, Result};
use crate::sequence::DeltaSequence;
use crate::types::{DeltaWriteOp, HotDelta, OkDelta};

/// A record persisted under the delta subtree.
pub trait DeltaRecord: Serialize + DeserializeOwned {
    /// Record kind, used in error messages.
    const KIND: &'static str;
}

impl DeltaRecord for HotDelta {
    const KIND: &'static str = "hot delta";
}

impl DeltaRecord for OkDelta {
    const KIND: &'static str = "ok delta";
}

impl DeltaRecord for DeltaWriteOp {
    const KIND: &'static str = "write operation";
}

impl DeltaRecord for DeltaSequence {
    const KIND: &'static str = "delta sequence";
}

/// Serializes a record into a node payload.
///
/// # Errors
///
/// Returns `DeltaError::Serialization` if the record cannot be encoded.
pub fn encode<T: DeltaRecord>(record: &T) -> Result<Bytes> {
    serde_json::to_vec(record)
        .map(Bytes::from)
        .map_err(|e| DeltaError::serialization(format!("failed to serialize {}: {e}", T::KIND)))
}

/// Deserializes a node payload read from `path`.
///
/// # Errors
///
/// Returns `DeltaError::Serialization` naming the record kind and path.
pub fn decode<T: DeltaRecord>(path: &str, data: &[u8]) -> Result<T> {
    serde_json::from_slice(data).map_err(|e| {
        DeltaError::serialization(format!("failed to deserialize {} at {path}: {e}", T::KIND))
    })
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::types::WriteOpStatus;

    #[test]
    fn test_ok_delta_wire_format() {
        let delta = OkDelta {
            delta_num: 1,
            delta_date: NaiveDate::from_ymd_opt(2021, 3, 4)
                .unwrap()
                .and_hms_opt(10, 20, 30)
                .unwrap(),
            cn_from: 5,
            cn_to: 15,
        };
        let json: serde_json::Value = serde_json::from_slice(&encode(&delta).unwrap()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "deltaNum": 1,
                "deltaDate": "2021-03-04T10:20:30",
                "cnFrom": 5,
                "cnTo": 15,
            })
        );
    }

    #[test]
    fn test_write_op_status_wire_format() {
        let op = DeltaWriteOp {
            datamart: "dtm".into(),
            table_name: "tbl0".into(),
            table_name_ext: "tbl0_ext".into(),
            query: "select 1".into(),
            sys_cn: 3,
            status: WriteOpStatus::InProgress,
        };
        let json: serde_json::Value = serde_json::from_slice(&encode(&op).unwrap()).unwrap();
        assert_eq!(json["status"], "IN_PROGRESS");
        assert_eq!(json["tableNameExt"], "tbl0_ext");
        assert_eq!(json["sysCn"], 3);
    }

    #[test]
    fn test_hot_delta_defaults_missing_flags() {
        let hot: HotDelta = decode(
            "/test/dtm/delta/hot",
            br#"{"deltaNum":2,"openedAt":"2021-03-04T10:20:30","cnFrom":16}"#,
        )
        .unwrap();
        assert!(!hot.rolling_back);
        assert_eq!(hot.failed_cn, None);
    }

    #[test]
    fn test_decode_failure_names_kind_and_path() {
        let err = decode::<OkDelta>("/test/dtm/delta/num/0", b"not json").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("ok delta"), "{message}");
        assert!(message.contains("/test/dtm/delta/num/0"), "{message}");
    }
}
