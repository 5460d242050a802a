//! Filter lifecycle across the two upstream filter stores.

use crate::{
    logs::{entries, merge_legs, split_outcome},
    Backends, LogRouter,
};
use alloy_primitives::BlockNumber;
use alloy_rpc_types_eth::{Filter, FilterBlockOption, FilterId};
use futures::future::{join, OptionFuture};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};
use xlayer_rpc_legacy_types::{
    range::is_open_ended, Backend, BlockRange, FilterKind, FilterRegistry, FilterState,
    FilterType, LegacyRpcError, LegacyRpcResult, SplitRange,
};

/// Creates, polls and tears down filters that may be backed by a filter on each node.
#[derive(Debug)]
pub struct FilterManager {
    cutoff_block: BlockNumber,
    backends: Backends,
    logs: LogRouter,
    registry: FilterRegistry,
}

impl FilterManager {
    /// Create a manager with an empty registry.
    pub fn new(cutoff_block: BlockNumber, backends: Backends, logs: LogRouter) -> Self {
        Self { cutoff_block, backends, logs, registry: FilterRegistry::new() }
    }

    /// Returns the underlying registry.
    pub const fn registry(&self) -> &FilterRegistry {
        &self.registry
    }

    /// Split a log filter at the cutoff, frozen for the lifetime of the filter.
    ///
    /// A filter with a symbolic or omitted `toBlock` always has a local leg, even if the local
    /// head is still below its start, so it keeps following the chain.
    async fn split_filter(&self, filter: &Filter) -> LegacyRpcResult<SplitRange> {
        let to_block = filter.block_option.get_to_block().copied();
        let (from, to) =
            self.logs.resolve_bounds(filter.block_option.get_from_block().copied(), to_block).await?;
        let to = if is_open_ended(to_block) { to.max(from).max(self.cutoff_block) } else { to };
        Ok(BlockRange::new(from, to)?.split(self.cutoff_block))
    }

    /// `eth_newFilter`: create an upstream filter for every populated side of the split.
    ///
    /// The legacy leg is pinned to its sub-range. The local leg starts at the cutoff and keeps
    /// the original `toBlock` if that follows the head. If either creation fails the call fails
    /// and the leg that succeeded is uninstalled again.
    pub async fn new_filter(&self, filter: Filter) -> LegacyRpcResult<FilterId> {
        if matches!(filter.block_option, FilterBlockOption::AtBlockHash(_)) {
            return Err(LegacyRpcError::InvalidParams(
                "blockHash is not supported by eth_newFilter".to_string(),
            ))
        }

        let split = self.split_filter(&filter).await?;
        let open_ended = is_open_ended(filter.block_option.get_to_block().copied());
        let legacy = split.legacy.map(|range| filter.clone().from_block(range.from).to_block(range.to));
        let local = split.local.map(|range| {
            let local = filter.clone().from_block(range.from);
            if open_ended {
                local
            } else {
                local.to_block(range.to)
            }
        });
        debug!(
            target: "rpc::legacy",
            ?split,
            filter_type = ?FilterType::from_split(&split),
            open_ended,
            "creating filter"
        );

        let legacy = OptionFuture::from(
            legacy.map(|filter| self.create(Backend::Legacy, "eth_newFilter", json!([filter]))),
        );
        let local = OptionFuture::from(
            local.map(|filter| self.create(Backend::Local, "eth_newFilter", json!([filter]))),
        );
        let (legacy, local) = join(legacy, local).await;

        let (legacy_handle, legacy_err) = split_handle(legacy);
        let (local_handle, local_err) = split_handle(local);
        if let Some(err) =
            LegacyRpcError::from_legs(legacy_err, local_err, split.is_cross_boundary())
        {
            self.teardown(legacy_handle, local_handle).await;
            return Err(err)
        }

        Ok(self.install(FilterKind::Log(Box::new(filter)), split, legacy_handle, local_handle))
    }

    /// `eth_newBlockFilter`: new blocks only exist on the local node.
    pub async fn new_block_filter(&self) -> LegacyRpcResult<FilterId> {
        let handle = self.create(Backend::Local, "eth_newBlockFilter", json!([])).await?;
        Ok(self.install(FilterKind::Block, head_only(), None, Some(handle)))
    }

    /// `eth_newPendingTransactionFilter`: the pool only exists on the local node.
    pub async fn new_pending_transaction_filter(&self, params: Value) -> LegacyRpcResult<FilterId> {
        let handle = self.create(Backend::Local, "eth_newPendingTransactionFilter", params).await?;
        Ok(self.install(FilterKind::PendingTransaction, head_only(), None, Some(handle)))
    }

    fn install(
        &self,
        kind: FilterKind,
        split: SplitRange,
        legacy_handle: Option<FilterId>,
        local_handle: Option<FilterId>,
    ) -> FilterId {
        let id = self.registry.install(kind, split, legacy_handle, local_handle);
        metrics::gauge!("rpc_legacy_active_filters").increment(1.0);
        id
    }

    async fn create(&self, backend: Backend, method: &str, params: Value) -> LegacyRpcResult<FilterId> {
        let id = self.backends.call(backend, method, params).await?;
        serde_json::from_value(id).map_err(|err| LegacyRpcError::InvalidResponse {
            backend,
            reason: format!("{method}: {err}"),
        })
    }

    /// `eth_getFilterLogs`: all logs of the filter, merged legacy then local. Does not move the
    /// cursor.
    pub async fn get_filter_logs(&self, id: &FilterId) -> LegacyRpcResult<Vec<Value>> {
        let record = self.registry.get(id)?;
        let (legacy, local) = {
            let record = record.lock().await;
            record.ensure_active()?;
            (record.legacy_handle.clone(), record.local_handle.clone())
        };
        let (legacy, local) = self.poll(legacy, local, "eth_getFilterLogs").await;
        merge_legs(legacy, local)
    }

    /// `eth_getFilterChanges`: entries since the last poll.
    ///
    /// The record stays locked while both legs are polled, so concurrent polls of the same filter
    /// are serialized and never hand out an entry twice. If one leg fails the call fails and the
    /// cursor stays in place; the changes the other leg already consumed upstream are held back
    /// and delivered by the next successful poll.
    pub async fn get_filter_changes(&self, id: &FilterId) -> LegacyRpcResult<Vec<Value>> {
        let record = self.registry.get(id)?;
        let mut record = record.lock().await;
        record.ensure_active()?;

        let (legacy, local) = self
            .poll(record.legacy_handle.clone(), record.local_handle.clone(), "eth_getFilterChanges")
            .await;
        record.touch(Instant::now());

        let split = legacy.is_some() && local.is_some();
        let (legacy, legacy_err) = split_outcome(legacy);
        let (local, local_err) = split_outcome(local);
        match LegacyRpcError::from_legs(legacy_err, local_err, split) {
            None => Ok(record.deliver(legacy, local)),
            Some(err) => {
                record.hold_back(Backend::Legacy, legacy);
                record.hold_back(Backend::Local, local);
                debug!(
                    target: "rpc::legacy",
                    ?id,
                    held_legacy = record.pending_legacy.len(),
                    held_local = record.pending_local.len(),
                    %err,
                    "filter poll failed, holding back changes"
                );
                Err(err)
            }
        }
    }

    /// Poll every stored handle concurrently.
    async fn poll(
        &self,
        legacy: Option<FilterId>,
        local: Option<FilterId>,
        method: &'static str,
    ) -> (Option<LegacyRpcResult<Vec<Value>>>, Option<LegacyRpcResult<Vec<Value>>>) {
        let legacy = OptionFuture::from(legacy.map(|id| self.poll_leg(Backend::Legacy, method, id)));
        let local = OptionFuture::from(local.map(|id| self.poll_leg(Backend::Local, method, id)));
        join(legacy, local).await
    }

    async fn poll_leg(
        &self,
        backend: Backend,
        method: &str,
        id: FilterId,
    ) -> LegacyRpcResult<Vec<Value>> {
        let result = self.backends.call(backend, method, json!([id])).await?;
        entries(backend, method, result)
    }

    /// `eth_uninstallFilter`.
    ///
    /// The first call tears down the upstream filters and returns `true`. The record lingers as a
    /// tombstone so a repeated call returns `false`; after that the id is unknown.
    pub async fn uninstall_filter(&self, id: &FilterId) -> LegacyRpcResult<bool> {
        let record = self.registry.get(id)?;
        let mut guard = record.lock().await;
        match guard.state {
            FilterState::Active => {
                let (legacy, local) = guard.mark_uninstalled(Instant::now());
                drop(guard);
                metrics::gauge!("rpc_legacy_active_filters").decrement(1.0);
                self.teardown(legacy, local).await;
                Ok(true)
            }
            FilterState::Uninstalled => {
                drop(guard);
                self.registry.remove(id);
                Ok(false)
            }
        }
    }

    /// Uninstall upstream filters, best-effort: failures are logged and never stop the other leg.
    async fn teardown(&self, legacy: Option<FilterId>, local: Option<FilterId>) {
        let legacy = OptionFuture::from(legacy.map(|id| self.uninstall_leg(Backend::Legacy, id)));
        let local = OptionFuture::from(local.map(|id| self.uninstall_leg(Backend::Local, id)));
        join(legacy, local).await;
    }

    async fn uninstall_leg(&self, backend: Backend, id: FilterId) {
        match self.backends.call(backend, "eth_uninstallFilter", json!([id])).await {
            Ok(Value::Bool(true)) => {}
            Ok(result) => {
                warn!(target: "rpc::legacy", %backend, ?id, %result, "upstream filter was already gone")
            }
            Err(err) => {
                warn!(target: "rpc::legacy", %backend, ?id, %err, "failed to uninstall upstream filter")
            }
        }
    }

    /// Evict filters not polled within `ttl` and drop tombstones older than `ttl`.
    ///
    /// Filters that are busy are skipped until the next sweep. Returns the number of evicted
    /// filters.
    pub async fn clear_stale_filters(&self, now: Instant, ttl: Duration) -> usize {
        let mut evicted = 0;
        for (id, record) in self.registry.snapshot() {
            let Ok(mut guard) = record.try_lock() else { continue };
            if !guard.is_stale(now, ttl) {
                continue
            }
            match guard.state {
                FilterState::Active => {
                    let (legacy, local) = guard.mark_uninstalled(now);
                    drop(guard);
                    warn!(target: "rpc::legacy", ?id, "evicting stale filter");
                    metrics::gauge!("rpc_legacy_active_filters").decrement(1.0);
                    self.teardown(legacy, local).await;
                    evicted += 1;
                }
                FilterState::Uninstalled => drop(guard),
            }
            self.registry.remove(&id);
        }
        evicted
    }

    /// Tear down every active filter and clear the registry.
    pub async fn uninstall_all(&self) {
        for (id, record) in self.registry.snapshot() {
            let mut guard = record.lock().await;
            if guard.state == FilterState::Active {
                let (legacy, local) = guard.mark_uninstalled(Instant::now());
                drop(guard);
                metrics::gauge!("rpc_legacy_active_filters").decrement(1.0);
                self.teardown(legacy, local).await;
            }
            self.registry.remove(&id);
        }
    }
}

const fn head_only() -> SplitRange {
    SplitRange { legacy: None, local: None }
}

fn split_handle(
    outcome: Option<LegacyRpcResult<FilterId>>,
) -> (Option<FilterId>, Option<LegacyRpcError>) {
    match outcome {
        Some(Ok(id)) => (Some(id), None),
        Some(Err(err)) => (None, Some(err)),
        None => (None, None),
    }
}
