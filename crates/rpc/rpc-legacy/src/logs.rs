//! `eth_getLogs` across the cutoff: split the block range, query both backends concurrently and
//! merge the results.

use crate::{Backends, HashResolver};
use alloy_eips::BlockNumberOrTag;
use alloy_primitives::BlockNumber;
use alloy_rpc_types_eth::{Filter, FilterBlockOption};
use futures::future::{join, OptionFuture};
use serde_json::{json, Value};
use std::future::Future;
use tracing::debug;
use xlayer_rpc_legacy_types::{
    range::{into_entries, merge_logs, needs_head, resolve_block},
    Backend, BlockRange, LegacyRpcError, LegacyRpcResult, SplitRange,
};

/// Splits log queries at the cutoff and merges the per-backend results.
#[derive(Debug, Clone)]
pub struct LogRouter {
    cutoff_block: BlockNumber,
    backends: Backends,
    resolver: HashResolver,
}

impl LogRouter {
    /// Create a log router for the given cutoff.
    pub const fn new(cutoff_block: BlockNumber, backends: Backends, resolver: HashResolver) -> Self {
        Self { cutoff_block, backends, resolver }
    }

    /// Resolve the bounds of a filter to concrete block numbers.
    ///
    /// Tags are resolved against a single snapshot of the local head, fetched only if a bound
    /// needs it. The legacy node is never asked: its head is fixed at `cutoff - 1`.
    pub async fn resolve_bounds(
        &self,
        from_block: Option<BlockNumberOrTag>,
        to_block: Option<BlockNumberOrTag>,
    ) -> LegacyRpcResult<(BlockNumber, BlockNumber)> {
        let head = if needs_head(from_block) || needs_head(to_block) {
            self.backends.local_head().await?
        } else {
            0
        };
        Ok((resolve_block(from_block, head), resolve_block(to_block, head)))
    }

    /// Resolve a filter's block range and split it at the cutoff.
    pub async fn split_filter(&self, filter: &Filter) -> LegacyRpcResult<SplitRange> {
        let (from, to) = self
            .resolve_bounds(
                filter.block_option.get_from_block().copied(),
                filter.block_option.get_to_block().copied(),
            )
            .await?;
        Ok(BlockRange::new(from, to)?.split(self.cutoff_block))
    }

    /// Returns all logs matching the filter, ascending by block number.
    ///
    /// An empty result is a success. If any backend involved fails, the whole query fails: partial
    /// log sets are never returned.
    pub async fn get_logs(&self, filter: Filter) -> LegacyRpcResult<Vec<Value>> {
        if let FilterBlockOption::AtBlockHash(hash) = &filter.block_option {
            let hash = *hash;
            let backend = self.resolver.locate_block(hash).await?.unwrap_or(Backend::Local);
            debug!(target: "rpc::legacy", %hash, %backend, "routing getLogs by block hash");
            return self.logs_from(backend, &filter).await
        }

        let split = self.split_filter(&filter).await?;
        debug!(target: "rpc::legacy", ?split, "routing getLogs");
        self.fan_out(split, |backend, range| {
            let filter = filter.clone().from_block(range.from).to_block(range.to);
            async move { self.logs_from(backend, &filter).await }
        })
        .await
    }

    async fn logs_from(&self, backend: Backend, filter: &Filter) -> LegacyRpcResult<Vec<Value>> {
        let result = self.backends.call(backend, "eth_getLogs", json!([filter])).await?;
        entries(backend, "eth_getLogs", result)
    }

    /// Run `query` for each populated side of the split concurrently and merge legacy-then-local.
    ///
    /// A side without a range is never contacted. Both queries run to completion before the merge,
    /// dropping the returned future cancels both.
    pub async fn fan_out<F, Fut>(&self, split: SplitRange, query: F) -> LegacyRpcResult<Vec<Value>>
    where
        F: Fn(Backend, BlockRange) -> Fut,
        Fut: Future<Output = LegacyRpcResult<Vec<Value>>>,
    {
        let legacy = OptionFuture::from(split.legacy.map(|range| query(Backend::Legacy, range)));
        let local = OptionFuture::from(split.local.map(|range| query(Backend::Local, range)));
        let (legacy, local) = join(legacy, local).await;
        merge_legs(legacy, local)
    }
}

/// Merge the outcome of both legs, failing if any leg that ran failed.
pub(crate) fn merge_legs(
    legacy: Option<LegacyRpcResult<Vec<Value>>>,
    local: Option<LegacyRpcResult<Vec<Value>>>,
) -> LegacyRpcResult<Vec<Value>> {
    let split = legacy.is_some() && local.is_some();
    let (legacy, legacy_err) = split_outcome(legacy);
    let (local, local_err) = split_outcome(local);
    if let Some(err) = LegacyRpcError::from_legs(legacy_err, local_err, split) {
        return Err(err)
    }
    Ok(merge_logs(legacy, local))
}

/// Separate the entries of a leg from its failure. A leg that did not run has no entries.
pub(crate) fn split_outcome(
    outcome: Option<LegacyRpcResult<Vec<Value>>>,
) -> (Vec<Value>, Option<LegacyRpcError>) {
    match outcome {
        Some(Ok(entries)) => (entries, None),
        Some(Err(err)) => (Vec::new(), Some(err)),
        None => (Vec::new(), None),
    }
}

/// Decode a backend result into entries.
pub(crate) fn entries(backend: Backend, method: &str, result: Value) -> LegacyRpcResult<Vec<Value>> {
    into_entries(result).ok_or_else(|| LegacyRpcError::InvalidResponse {
        backend,
        reason: format!("{method} did not return an array"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::MockBackend;
    use alloy_primitives::B256;
    use assert_matches::assert_matches;
    use std::{sync::Arc, time::Duration};

    const CUTOFF: u64 = 1000;

    fn router(legacy: MockBackend, local: MockBackend) -> (LogRouter, Arc<MockBackend>, Arc<MockBackend>) {
        let legacy = Arc::new(legacy);
        let local = Arc::new(local);
        let backends = Backends::new(legacy.clone(), local.clone(), Duration::from_secs(5));
        let resolver = HashResolver::new(backends.clone());
        (LogRouter::new(CUTOFF, backends, resolver), legacy, local)
    }

    fn seeded() -> (LogRouter, Arc<MockBackend>, Arc<MockBackend>) {
        router(
            MockBackend::new(Backend::Legacy).with_log(995, "l0").with_log(995, "l1"),
            MockBackend::new(Backend::Local)
                .with_head(1020)
                .with_log(1005, "r0")
                .with_log(1005, "r1")
                .with_log(1005, "r2"),
        )
    }

    fn blocks(logs: &[Value]) -> Vec<u64> {
        logs.iter()
            .map(|log| xlayer_rpc_legacy_types::range::log_block_number(log).unwrap())
            .collect()
    }

    fn tags(logs: &[Value]) -> Vec<&str> {
        logs.iter().map(|log| log["data"].as_str().unwrap()).collect()
    }

    #[tokio::test]
    async fn cross_boundary_logs_are_merged_in_order() {
        let (router, legacy, local) = seeded();
        let logs = router.get_logs(Filter::new().from_block(990u64).to_block(1010u64)).await.unwrap();

        assert_eq!(blocks(&logs), [995, 995, 1005, 1005, 1005]);
        assert_eq!(tags(&logs), ["l0", "l1", "r0", "r1", "r2"]);

        // each backend only sees its own side of the cutoff
        let legacy_filter = &legacy.params_of("eth_getLogs")[0][0];
        assert_eq!(legacy_filter["fromBlock"], "0x3de");
        assert_eq!(legacy_filter["toBlock"], "0x3e7");
        let local_filter = &local.params_of("eth_getLogs")[0][0];
        assert_eq!(local_filter["fromBlock"], "0x3e8");
        assert_eq!(local_filter["toBlock"], "0x3f2");
    }

    #[tokio::test]
    async fn pure_ranges_contact_one_backend() {
        let (router, legacy, local) = seeded();
        let logs = router.get_logs(Filter::new().from_block(900u64).to_block(999u64)).await.unwrap();
        assert_eq!(tags(&logs), ["l0", "l1"]);
        assert_eq!(local.total_calls(), 0);

        let logs = router.get_logs(Filter::new().from_block(1000u64).to_block(1010u64)).await.unwrap();
        assert_eq!(tags(&logs), ["r0", "r1", "r2"]);
        assert_eq!(legacy.calls_to("eth_getLogs"), 1);
    }

    #[tokio::test]
    async fn latest_resolves_against_local_head() {
        let (router, _, local) = seeded();
        let logs = router
            .get_logs(Filter::new().from_block(990u64).to_block(BlockNumberOrTag::Latest))
            .await
            .unwrap();
        assert_eq!(logs.len(), 5);
        assert_eq!(local.calls_to("eth_blockNumber"), 1);
        assert_eq!(local.params_of("eth_getLogs")[0][0]["toBlock"], "0x3fc");
    }

    #[tokio::test]
    async fn concrete_bounds_skip_head_lookup() {
        let (router, _, local) = seeded();
        router.get_logs(Filter::new().from_block(990u64).to_block(1010u64)).await.unwrap();
        assert_eq!(local.calls_to("eth_blockNumber"), 0);
    }

    #[tokio::test]
    async fn empty_result_is_success() {
        let (router, _, _) = seeded();
        let logs = router.get_logs(Filter::new().from_block(10u64).to_block(1001u64)).await.unwrap();
        assert_eq!(logs.len(), 2);
        let logs = router.get_logs(Filter::new().from_block(10u64).to_block(20u64)).await.unwrap();
        assert!(logs.is_empty());
    }

    #[tokio::test]
    async fn inverted_range_is_rejected() {
        let (router, legacy, local) = seeded();
        let err =
            router.get_logs(Filter::new().from_block(1010u64).to_block(990u64)).await.unwrap_err();
        assert_matches!(err, LegacyRpcError::InvalidRange { from: 1010, to: 990 });
        assert_eq!(legacy.total_calls() + local.total_calls(), 0);
    }

    #[tokio::test]
    async fn one_failing_leg_fails_the_query() {
        let (router, legacy, _) = seeded();
        legacy.set_unavailable(true);
        let err =
            router.get_logs(Filter::new().from_block(990u64).to_block(1010u64)).await.unwrap_err();
        assert_matches!(err, LegacyRpcError::PartialMergeFailure { failed: Backend::Legacy, .. });
    }

    #[tokio::test]
    async fn both_legs_failing_is_combined() {
        let (router, legacy, local) = seeded();
        legacy.set_unavailable(true);
        local.set_unavailable(true);
        let err =
            router.get_logs(Filter::new().from_block(990u64).to_block(1010u64)).await.unwrap_err();
        assert_matches!(err, LegacyRpcError::CombinedFailure { .. });
    }

    #[tokio::test]
    async fn single_leg_failure_keeps_its_cause() {
        let (router, _, local) = seeded();
        local.set_unavailable(true);
        let err =
            router.get_logs(Filter::new().from_block(1000u64).to_block(1010u64)).await.unwrap_err();
        assert_matches!(err, LegacyRpcError::BackendUnavailable { backend: Backend::Local, .. });
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_query_cancels_both_legs() {
        let delay = Duration::from_secs(2);
        let (router, legacy, local) = router(
            MockBackend::new(Backend::Legacy).with_log(995, "l0").with_delay(delay),
            MockBackend::new(Backend::Local).with_log(1005, "r0").with_delay(delay),
        );

        {
            let query = router.get_logs(Filter::new().from_block(990u64).to_block(1010u64));
            let mut query = std::pin::pin!(query);
            assert!(futures::poll!(query.as_mut()).is_pending());
        }
        tokio::time::sleep(delay * 2).await;

        // a leg that kept running would have reached its backend after the delay
        assert_eq!(legacy.total_calls(), 0);
        assert_eq!(local.total_calls(), 0);
    }

    #[tokio::test]
    async fn block_hash_filter_goes_to_owner() {
        let hash = B256::repeat_byte(7);
        let (router, legacy, local) = router(
            MockBackend::new(Backend::Legacy)
                .with_log(995, "l0")
                .with_response("eth_getBlockByHash", None, json!({ "number": "0x3e3" })),
            MockBackend::new(Backend::Local),
        );
        router.get_logs(Filter::new().at_block_hash(hash)).await.unwrap();
        assert_eq!(legacy.calls_to("eth_getLogs"), 1);
        assert_eq!(local.calls_to("eth_getLogs"), 0);
    }

    #[tokio::test]
    async fn non_array_result_is_invalid() {
        let (router, _, _) = router(
            MockBackend::new(Backend::Legacy),
            MockBackend::new(Backend::Local).with_head(2000),
        );
        let split = SplitRange { legacy: None, local: Some(BlockRange { from: 1, to: 2 }) };
        let err = router
            .fan_out(split, |backend, _| async move { entries(backend, "eth_getLogs", json!("0x1")) })
            .await
            .unwrap_err();
        assert_matches!(err, LegacyRpcError::InvalidResponse { backend: Backend::Local, .. });
    }
}
