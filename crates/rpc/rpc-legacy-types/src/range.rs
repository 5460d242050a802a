//! Block range resolution, splitting at the cutoff and merging of split log results.

use crate::{LegacyRpcError, LegacyRpcResult};
use alloy_eips::BlockNumberOrTag;
use alloy_primitives::BlockNumber;
use serde_json::Value;

/// An inclusive, non-empty range of concrete block numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRange {
    /// First block of the range.
    pub from: BlockNumber,
    /// Last block of the range, inclusive.
    pub to: BlockNumber,
}

impl BlockRange {
    /// Create a range, rejecting `from > to`.
    pub fn new(from: BlockNumber, to: BlockNumber) -> LegacyRpcResult<Self> {
        if from > to {
            return Err(LegacyRpcError::InvalidRange { from, to })
        }
        Ok(Self { from, to })
    }

    /// Split the range at the cutoff.
    ///
    /// The legacy part is `[from, min(to, cutoff - 1)]` if `from < cutoff`, the local part is
    /// `[max(from, cutoff), to]` if `to >= cutoff`. Both parts are disjoint and together cover
    /// the whole range.
    pub fn split(self, cutoff: BlockNumber) -> SplitRange {
        let legacy = (self.from < cutoff).then(|| Self { from: self.from, to: self.to.min(cutoff - 1) });
        let local = (self.to >= cutoff).then(|| Self { from: self.from.max(cutoff), to: self.to });
        SplitRange { legacy, local }
    }
}

/// A block range split at the cutoff. An empty part is `None` and its backend is never contacted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitRange {
    /// Part served by the legacy node.
    pub legacy: Option<BlockRange>,
    /// Part served by the local node.
    pub local: Option<BlockRange>,
}

impl SplitRange {
    /// Returns true if both backends are involved.
    pub const fn is_cross_boundary(&self) -> bool {
        self.legacy.is_some() && self.local.is_some()
    }
}

/// Returns true if resolving the block requires the local head.
pub const fn needs_head(block: Option<BlockNumberOrTag>) -> bool {
    !matches!(block, Some(BlockNumberOrTag::Number(_) | BlockNumberOrTag::Earliest))
}

/// Returns true if the end of a range follows the chain head. A missing bound means `latest`.
pub const fn is_open_ended(to_block: Option<BlockNumberOrTag>) -> bool {
    needs_head(to_block)
}

/// Resolve an optional block bound to a concrete number against a snapshot of the local head.
///
/// A missing bound means `latest`. `safe` and `finalized` are resolved like `latest`.
pub const fn resolve_block(block: Option<BlockNumberOrTag>, local_head: BlockNumber) -> BlockNumber {
    match block {
        Some(BlockNumberOrTag::Number(n)) => n,
        Some(BlockNumberOrTag::Earliest) => 0,
        _ => local_head,
    }
}

/// Block number of a log entry, decoded from its hex `blockNumber` field.
///
/// Pending logs carry no block number and yield `None`.
pub fn log_block_number(log: &Value) -> Option<BlockNumber> {
    let hex = log.get("blockNumber")?.as_str()?;
    let digits = hex.strip_prefix("0x").or_else(|| hex.strip_prefix("0X"))?;
    BlockNumber::from_str_radix(digits, 16).ok()
}

/// Highest block number among the given entries.
pub fn max_block_number(logs: &[Value]) -> Option<BlockNumber> {
    logs.iter().filter_map(log_block_number).max()
}

/// Merge the results of a split log query into a single sequence.
///
/// Legacy entries come first, then local ones, each in the order their backend emitted them.
/// The legacy range ends below the cutoff and the local one starts at it, so the concatenation is
/// ascending by block number without sorting.
pub fn merge_logs(mut legacy: Vec<Value>, mut local: Vec<Value>) -> Vec<Value> {
    if legacy.is_empty() {
        return local
    }
    legacy.append(&mut local);
    legacy
}

/// Parse a backend result into a sequence of entries. `null` is treated as empty.
pub fn into_entries(value: Value) -> Option<Vec<Value>> {
    match value {
        Value::Array(entries) => Some(entries),
        Value::Null => Some(Vec::new()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn log(block: u64, tag: &str) -> Value {
        json!({ "blockNumber": format!("{block:#x}"), "data": tag })
    }

    fn tags(logs: &[Value]) -> Vec<&str> {
        logs.iter().map(|log| log["data"].as_str().unwrap()).collect()
    }

    #[test]
    fn rejects_inverted_range() {
        assert_matches!(BlockRange::new(10, 9), Err(LegacyRpcError::InvalidRange { from: 10, to: 9 }));
        assert!(BlockRange::new(9, 9).is_ok());
    }

    #[test]
    fn split_cross_boundary() {
        let split = BlockRange::new(990, 1010).unwrap().split(1000);
        assert_eq!(split.legacy, Some(BlockRange { from: 990, to: 999 }));
        assert_eq!(split.local, Some(BlockRange { from: 1000, to: 1010 }));
        assert!(split.is_cross_boundary());
    }

    #[test]
    fn split_pure_legacy_and_pure_local() {
        let split = BlockRange::new(10, 999).unwrap().split(1000);
        assert_eq!(split.legacy, Some(BlockRange { from: 10, to: 999 }));
        assert_eq!(split.local, None);

        let split = BlockRange::new(1000, 1000).unwrap().split(1000);
        assert_eq!(split.legacy, None);
        assert_eq!(split.local, Some(BlockRange { from: 1000, to: 1000 }));
    }

    #[test]
    fn split_with_zero_cutoff() {
        let split = BlockRange::new(0, 5).unwrap().split(0);
        assert_eq!(split.legacy, None);
        assert_eq!(split.local, Some(BlockRange { from: 0, to: 5 }));
    }

    #[test]
    fn split_parts_are_disjoint_and_cover_the_range() {
        let cutoff = 100;
        for from in 90..110 {
            for to in from..115 {
                let range = BlockRange::new(from, to).unwrap();
                let split = range.split(cutoff);
                let mut covered: Vec<u64> = Vec::new();
                if let Some(legacy) = split.legacy {
                    assert!(legacy.to < cutoff);
                    covered.extend(legacy.from..=legacy.to);
                }
                if let Some(local) = split.local {
                    assert!(local.from >= cutoff);
                    covered.extend(local.from..=local.to);
                }
                assert_eq!(covered, (from..=to).collect::<Vec<_>>(), "range {from}..={to}");
            }
        }
    }

    #[test]
    fn resolves_tags_against_head_snapshot() {
        assert_eq!(resolve_block(Some(BlockNumberOrTag::Number(5)), 2000), 5);
        assert_eq!(resolve_block(Some(BlockNumberOrTag::Earliest), 2000), 0);
        assert_eq!(resolve_block(Some(BlockNumberOrTag::Latest), 2000), 2000);
        assert_eq!(resolve_block(Some(BlockNumberOrTag::Finalized), 2000), 2000);
        assert_eq!(resolve_block(None, 2000), 2000);
        assert!(!needs_head(Some(BlockNumberOrTag::Number(1))));
        assert!(needs_head(Some(BlockNumberOrTag::Pending)));
        assert!(is_open_ended(None));
    }

    #[test]
    fn decodes_block_numbers() {
        assert_eq!(log_block_number(&log(1005, "a")), Some(1005));
        assert_eq!(log_block_number(&json!({ "blockNumber": null })), None);
        assert_eq!(log_block_number(&json!({})), None);
    }

    #[test]
    fn merge_places_legacy_first() {
        let legacy = vec![log(995, "l0"), log(995, "l1")];
        let local = vec![log(1005, "r0"), log(1005, "r1"), log(1005, "r2")];
        let merged = merge_logs(legacy, local);
        assert_eq!(tags(&merged), ["l0", "l1", "r0", "r1", "r2"]);
        assert_eq!(max_block_number(&merged), Some(1005));
    }

    #[test]
    fn merge_keeps_backend_order() {
        // a reorg announces the removal before the replacement, the merge must not reorder them
        let legacy = vec![log(7, "b"), log(7, "a")];
        let local = vec![log(1001, "removed"), log(1000, "removed"), log(1000, "z"), log(1001, "y")];
        let merged = merge_logs(legacy, local);
        assert_eq!(tags(&merged), ["b", "a", "removed", "removed", "z", "y"]);
        assert!(merge_logs(vec![], vec![]).is_empty());
    }

    #[test]
    fn into_entries_accepts_arrays_and_null() {
        assert_eq!(into_entries(json!([1, 2])), Some(vec![json!(1), json!(2)]));
        assert_eq!(into_entries(Value::Null), Some(vec![]));
        assert_eq!(into_entries(json!("0x1")), None);
    }
}
