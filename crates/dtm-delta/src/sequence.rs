//! Per-datamart sequence allocator for `sysCn` and `deltaNum`.
//!
//! The sequence record lives on the `delta` node itself. Every mutation that
//! changes the ledger's membership writes (or version-checks) this node inside
//! its transaction, which is what serializes concurrent registrations.

use serde::{Deserialize, Serialize};

use crate::types::{HotDelta, OkDelta};

/// Sequence state persisted on the datamart's `delta` node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeltaSequence {
    /// Next unused `sysCn`. Never rewinds, even when an epoch is aborted.
    pub next_cn: i64,
    /// Number of the latest ok delta, if any epoch has been committed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_delta_num: Option<i64>,
}

impl DeltaSequence {
    /// Number the next hot delta will receive.
    #[must_use]
    pub fn next_delta_num(&self) -> i64 {
        self.last_delta_num.map_or(0, |num| num + 1)
    }

    /// Returns the `sysCn` to hand out and the sequence state after the
    /// allocation.
    #[must_use]
    pub fn allocate_cn(&self) -> (i64, Self) {
        let sys_cn = self.next_cn;
        let advanced = Self {
            next_cn: sys_cn + 1,
            last_delta_num: self.last_delta_num,
        };
        (sys_cn, advanced)
    }

    /// Last `sysCn` allocated so far; `-1` before the first allocation.
    #[must_use]
    pub fn last_allocated_cn(&self) -> i64 {
        self.next_cn - 1
    }

    /// Builds the ok delta for `hot` and the sequence state after promotion.
    ///
    /// The epoch covers `[hot.cn_from, next_cn - 1]`, so an epoch without
    /// registrations gets the empty range `cn_to == cn_from - 1`.
    #[must_use]
    pub fn promote(&self, hot: &HotDelta, delta_date: chrono::NaiveDateTime) -> (OkDelta, Self) {
        let ok = OkDelta {
            delta_num: hot.delta_num,
            delta_date,
            cn_from: hot.cn_from,
            cn_to: self.last_allocated_cn().max(hot.cn_from - 1),
        };
        let advanced = Self {
            next_cn: self.next_cn,
            last_delta_num: Some(hot.delta_num),
        };
        (ok, advanced)
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn hot(delta_num: i64, cn_from: i64) -> HotDelta {
        HotDelta {
            delta_num,
            opened_at: NaiveDate::from_ymd_opt(2021, 1, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
            cn_from,
            rolling_back: false,
            failed_cn: None,
        }
    }

    #[test]
    fn test_fresh_sequence_starts_at_zero() {
        let seq = DeltaSequence::default();
        assert_eq!(seq.next_delta_num(), 0);
        assert_eq!(seq.last_allocated_cn(), -1);
    }

    #[test]
    fn test_allocation_is_strictly_increasing() {
        let mut seq = DeltaSequence::default();
        let mut issued = Vec::new();
        for _ in 0..5 {
            let (cn, next) = seq.allocate_cn();
            issued.push(cn);
            seq = next;
        }
        assert_eq!(issued, vec![0, 1, 2, 3, 4]);
        assert_eq!(seq.next_cn, 5);
    }

    #[test]
    fn test_promote_covers_allocated_range() {
        let seq = DeltaSequence {
            next_cn: 16,
            last_delta_num: Some(0),
        };
        let date = NaiveDate::from_ymd_opt(2021, 1, 2)
            .unwrap()
            .and_hms_opt(3, 4, 5)
            .unwrap();
        let (ok, next) = seq.promote(&hot(1, 5), date);
        assert_eq!((ok.delta_num, ok.cn_from, ok.cn_to), (1, 5, 15));
        assert_eq!(next.last_delta_num, Some(1));
        assert_eq!(next.next_cn, 16);
        assert_eq!(next.next_delta_num(), 2);
    }

    #[test]
    fn test_promote_empty_epoch_marks_empty_range() {
        let seq = DeltaSequence {
            next_cn: 16,
            last_delta_num: Some(1),
        };
        let date = NaiveDate::from_ymd_opt(2021, 1, 2)
            .unwrap()
            .and_hms_opt(3, 4, 5)
            .unwrap();
        let (ok, next) = seq.promote(&hot(2, 16), date);
        assert_eq!((ok.cn_from, ok.cn_to), (16, 15));
        assert!(ok.is_empty());
        // The next epoch opens at the same cn
        assert_eq!(next.next_cn, 16);
    }
}
