//! The router: a single entry point that dispatches each call to the backend owning its data.

use crate::{
    utils::{parse_optional_param, parse_param},
    Backends, FilterManager, HashResolver, LogRouter, RpcBackend, HASH_KEYED_METHODS,
};
use alloy_eips::BlockId;
use alloy_rpc_types_eth::{Filter, FilterId};
use jsonrpsee::{core::RegisterMethodError, types::ErrorObjectOwned, RpcModule};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::{
    sync::{Arc, Weak},
    time::Duration,
};
use tokio::{runtime::Handle, task::JoinHandle, time::Instant};
use tracing::{debug, info, trace, warn};
use xlayer_rpc_legacy_types::{Backend, BoundaryClassifier, LegacyRpcConfig, LegacyRpcResult, Route};

/// Methods served by the RPC module. Methods not listed here are still routed by
/// [`LegacyRouter::dispatch`], to the local node.
pub const ROUTED_METHODS: &[&str] = &[
    // block scoped
    "eth_getBlockByNumber",
    "eth_getBlockTransactionCountByNumber",
    "eth_getUncleCountByBlockNumber",
    "eth_getTransactionByBlockNumberAndIndex",
    "eth_getUncleByBlockNumberAndIndex",
    "eth_getBlockReceipts",
    "eth_getBalance",
    "eth_getCode",
    "eth_getTransactionCount",
    "eth_getStorageAt",
    "eth_call",
    "eth_estimateGas",
    "eth_createAccessList",
    "eth_getProof",
    "eth_feeHistory",
    // hash keyed
    "eth_getTransactionByHash",
    "eth_getTransactionReceipt",
    "eth_getRawTransactionByHash",
    "eth_getBlockByHash",
    "eth_getBlockTransactionCountByHash",
    "eth_getUncleCountByBlockHash",
    "eth_getTransactionByBlockHashAndIndex",
    "eth_getUncleByBlockHashAndIndex",
    // logs and filters
    "eth_getLogs",
    "eth_newFilter",
    "eth_newBlockFilter",
    "eth_newPendingTransactionFilter",
    "eth_getFilterLogs",
    "eth_getFilterChanges",
    "eth_uninstallFilter",
    // head
    "eth_chainId",
    "eth_blockNumber",
    "eth_syncing",
    "eth_gasPrice",
    "eth_maxPriorityFeePerGas",
    "eth_blobBaseFee",
    "eth_sendRawTransaction",
    "net_version",
    "web3_clientVersion",
];

/// How a method is dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MethodRoute {
    /// Single-block call, classified by the block id at the given param index.
    Block(usize),
    /// Hash-keyed lookup with the hash-based fallback.
    Hash,
    Logs,
    NewFilter,
    NewBlockFilter,
    NewPendingTransactionFilter,
    FilterLogs,
    FilterChanges,
    UninstallFilter,
    /// Forwarded to the local node unmodified.
    PassThrough,
}

impl MethodRoute {
    fn of(method: &str) -> Self {
        match method {
            "eth_getBlockByNumber" |
            "eth_getBlockTransactionCountByNumber" |
            "eth_getUncleCountByBlockNumber" |
            "eth_getTransactionByBlockNumberAndIndex" |
            "eth_getUncleByBlockNumberAndIndex" |
            "eth_getBlockReceipts" => Self::Block(0),
            "eth_getBalance" |
            "eth_getCode" |
            "eth_getTransactionCount" |
            "eth_call" |
            "eth_estimateGas" |
            "eth_createAccessList" |
            "eth_feeHistory" => Self::Block(1),
            "eth_getStorageAt" | "eth_getProof" => Self::Block(2),
            "eth_getLogs" => Self::Logs,
            "eth_newFilter" => Self::NewFilter,
            "eth_newBlockFilter" => Self::NewBlockFilter,
            "eth_newPendingTransactionFilter" => Self::NewPendingTransactionFilter,
            "eth_getFilterLogs" => Self::FilterLogs,
            "eth_getFilterChanges" => Self::FilterChanges,
            "eth_uninstallFilter" => Self::UninstallFilter,
            method if HASH_KEYED_METHODS.contains(&method) => Self::Hash,
            _ => Self::PassThrough,
        }
    }
}

/// Routes `eth` calls between a legacy node holding blocks below the cutoff and the local node
/// holding the rest.
///
/// Cheap to clone.
#[derive(Debug, Clone)]
pub struct LegacyRouter {
    inner: Arc<LegacyRouterInner>,
}

#[derive(Debug)]
struct LegacyRouterInner {
    config: LegacyRpcConfig,
    classifier: BoundaryClassifier,
    backends: Backends,
    resolver: HashResolver,
    logs: LogRouter,
    filters: FilterManager,
    eviction: Mutex<Option<JoinHandle<()>>>,
}

impl LegacyRouter {
    /// Create the router and start evicting stale filters in the background.
    ///
    /// Eviction only runs if called within a tokio runtime.
    pub fn start(
        config: LegacyRpcConfig,
        legacy: Arc<dyn RpcBackend>,
        local: Arc<dyn RpcBackend>,
    ) -> Self {
        let cutoff_block = config.cutoff_block;
        let backends = Backends::new(legacy, local, config.timeout);
        let resolver = HashResolver::new(backends.clone());
        let logs = LogRouter::new(cutoff_block, backends.clone(), resolver.clone());
        let filters = FilterManager::new(cutoff_block, backends.clone(), logs.clone());
        let router = Self {
            inner: Arc::new(LegacyRouterInner {
                classifier: BoundaryClassifier::new(cutoff_block),
                config,
                backends,
                resolver,
                logs,
                filters,
                eviction: Mutex::new(None),
            }),
        };

        match Handle::try_current() {
            Ok(handle) => {
                let task = handle.spawn(evict_stale_filters(
                    Arc::downgrade(&router.inner),
                    router.inner.config.stale_filter_ttl,
                ));
                *router.inner.eviction.lock() = Some(task);
            }
            Err(_) => warn!(target: "rpc::legacy", "no runtime, stale filters will not be evicted"),
        }

        info!(target: "rpc::legacy", cutoff_block, "legacy router started");
        router
    }

    /// Stop evicting filters and tear down every filter still installed upstream.
    pub async fn stop(&self) {
        if let Some(task) = self.inner.eviction.lock().take() {
            task.abort();
        }
        self.inner.filters.uninstall_all().await;
        info!(target: "rpc::legacy", "legacy router stopped");
    }

    /// Returns the configuration the router was started with.
    pub fn config(&self) -> &LegacyRpcConfig {
        &self.inner.config
    }

    /// Returns the filter lifecycle manager.
    pub fn filters(&self) -> &FilterManager {
        &self.inner.filters
    }

    /// Dispatch a call with positional params and return its raw result.
    pub async fn dispatch(&self, method: &str, params: Value) -> LegacyRpcResult<Value> {
        let route = MethodRoute::of(method);
        trace!(target: "rpc::legacy", method, ?route, "dispatching");

        let inner = &self.inner;
        match route {
            MethodRoute::Block(index) => {
                let block = parse_optional_param::<BlockId>(&params, index)?;
                let backend = self.route_block(block).await?;
                debug!(target: "rpc::legacy", method, ?block, %backend, "routing by block");
                inner.backends.call(backend, method, params).await
            }
            MethodRoute::Hash => inner.resolver.resolve(method, params).await,
            MethodRoute::Logs => {
                let filter = parse_param::<Filter>(&params, 0)?;
                Ok(Value::Array(inner.logs.get_logs(filter).await?))
            }
            MethodRoute::NewFilter => {
                let filter = parse_param::<Filter>(&params, 0)?;
                Ok(json!(inner.filters.new_filter(filter).await?))
            }
            MethodRoute::NewBlockFilter => Ok(json!(inner.filters.new_block_filter().await?)),
            MethodRoute::NewPendingTransactionFilter => {
                Ok(json!(inner.filters.new_pending_transaction_filter(params).await?))
            }
            MethodRoute::FilterLogs => {
                let id = parse_param::<FilterId>(&params, 0)?;
                Ok(Value::Array(inner.filters.get_filter_logs(&id).await?))
            }
            MethodRoute::FilterChanges => {
                let id = parse_param::<FilterId>(&params, 0)?;
                Ok(Value::Array(inner.filters.get_filter_changes(&id).await?))
            }
            MethodRoute::UninstallFilter => {
                let id = parse_param::<FilterId>(&params, 0)?;
                Ok(json!(inner.filters.uninstall_filter(&id).await?))
            }
            MethodRoute::PassThrough => inner.backends.call(Backend::Local, method, params).await,
        }
    }

    /// Pick the backend for a single-block call. A block given by hash belongs to whichever node
    /// knows it, the local node if neither does.
    async fn route_block(&self, block: Option<BlockId>) -> LegacyRpcResult<Backend> {
        match self.inner.classifier.classify(block) {
            Route::Backend(backend) => Ok(backend),
            Route::ResolveHash(hash) => {
                Ok(self.inner.resolver.locate_block(hash).await?.unwrap_or(Backend::Local))
            }
        }
    }

    /// Expose the router as an RPC module serving [`ROUTED_METHODS`].
    pub fn into_rpc_module(self) -> Result<RpcModule<Self>, RegisterMethodError> {
        let mut module = RpcModule::new(self);
        for &method in ROUTED_METHODS {
            module.register_async_method(method, move |params, router, _| async move {
                let params = params.parse::<Value>()?;
                router.dispatch(method, params).await.map_err(ErrorObjectOwned::from)
            })?;
        }
        Ok(module)
    }
}

/// Periodically evict filters that were not polled within `ttl`, until the router is dropped.
async fn evict_stale_filters(router: Weak<LegacyRouterInner>, ttl: Duration) {
    let mut interval = tokio::time::interval((ttl / 2).max(Duration::from_secs(1)));
    interval.tick().await;
    loop {
        interval.tick().await;
        let Some(router) = router.upgrade() else { break };
        let evicted = router.filters.clear_stale_filters(Instant::now(), ttl).await;
        if evicted > 0 {
            debug!(target: "rpc::legacy", evicted, "evicted stale filters");
        }
    }
}
