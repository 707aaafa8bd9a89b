//! Persisted layout of a datamart's delta subtree.
//!
//! ```text
//! {root}/delta                   sequence record
//! {root}/delta/hot               current hot delta (absent when none)
//! {root}/delta/num/{deltaNum}    ok deltas
//! {root}/delta/write_op/{sysCn}  ledger of the current hot delta
//! ```
//!
//! Numeric keys are zero-padded so lexicographic child order is numeric order.

use dtm_core::join_path;

/// Paths for one datamart's delta subtree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeltaPaths {
    delta: String,
}

impl DeltaPaths {
    /// Creates paths under the datamart root (e.g. `/dev/sales`).
    #[must_use]
    pub fn new(datamart_root: &str) -> Self {
        Self {
            delta: join_path(datamart_root, "delta"),
        }
    }

    /// The `delta` node holding the sequence record.
    #[must_use]
    pub fn delta(&self) -> &str {
        &self.delta
    }

    /// The hot delta slot.
    #[must_use]
    pub fn hot(&self) -> String {
        join_path(&self.delta, "hot")
    }

    /// Parent of all ok delta records.
    #[must_use]
    pub fn ok_dir(&self) -> String {
        join_path(&self.delta, "num")
    }

    /// The ok delta record for `delta_num`.
    #[must_use]
    pub fn ok(&self, delta_num: i64) -> String {
        join_path(&self.ok_dir(), &format_key(delta_num))
    }

    /// Parent of the hot delta's write operation records.
    #[must_use]
    pub fn write_op_dir(&self) -> String {
        join_path(&self.delta, "write_op")
    }

    /// The write operation record for `sys_cn`.
    #[must_use]
    pub fn write_op(&self, sys_cn: i64) -> String {
        join_path(&self.write_op_dir(), &format_key(sys_cn))
    }
}

fn format_key(value: i64) -> String {
    format!("{value:020}")
}

/// Parses a child name produced by the layout back into its number.
#[must_use]
pub fn parse_key(name: &str) -> Option<i64> {
    if name.len() != 20 {
        return None;
    }
    name.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout() {
        let paths = DeltaPaths::new("/test/dtm");
        assert_eq!(paths.delta(), "/test/dtm/delta");
        assert_eq!(paths.hot(), "/test/dtm/delta/hot");
        assert_eq!(paths.ok(1), "/test/dtm/delta/num/00000000000000000001");
        assert_eq!(
            paths.write_op(15),
            "/test/dtm/delta/write_op/00000000000000000015"
        );
    }

    #[test]
    fn test_keys_sort_numerically() {
        let mut keys: Vec<String> = [10, 9, 100].iter().map(|n| format_key(*n)).collect();
        keys.sort();
        let parsed: Vec<i64> = keys.iter().filter_map(|k| parse_key(k)).collect();
        assert_eq!(parsed, vec![9, 10, 100]);
    }

    #[test]
    fn test_parse_key_rejects_foreign_names() {
        assert_eq!(parse_key("15"), None);
        assert_eq!(parse_key("hot"), None);
    }
}
