//! Hash-based fallback: resolve hash-keyed queries against the local node first, then the legacy
//! node.

use crate::Backends;
use alloy_primitives::BlockHash;
use serde_json::{json, Value};
use tracing::debug;
use xlayer_rpc_legacy_types::{Backend, LegacyRpcResult};

/// Methods keyed by a transaction or block hash, resolved with the hash-based fallback.
pub const HASH_KEYED_METHODS: &[&str] = &[
    "eth_getTransactionByHash",
    "eth_getTransactionReceipt",
    "eth_getRawTransactionByHash",
    "eth_getBlockByHash",
    "eth_getBlockTransactionCountByHash",
    "eth_getUncleCountByBlockHash",
    "eth_getTransactionByBlockHashAndIndex",
    "eth_getUncleByBlockHashAndIndex",
];

/// Resolves hash-keyed queries whose block height is unknown upfront.
#[derive(Debug, Clone)]
pub struct HashResolver {
    backends: Backends,
}

impl HashResolver {
    /// Create a resolver over the given backends.
    pub const fn new(backends: Backends) -> Self {
        Self { backends }
    }

    /// Query the local node with the full params. If it answers `null`, ask the legacy node with
    /// the same params and return whatever it yields, `null` included.
    ///
    /// A failing local call is surfaced as is: a failure is never mistaken for "not found".
    pub async fn resolve(&self, method: &str, params: Value) -> LegacyRpcResult<Value> {
        let local = self.backends.call(Backend::Local, method, params.clone()).await?;
        if !local.is_null() {
            return Ok(local)
        }

        debug!(target: "rpc::legacy", method, "not found locally, falling back to legacy");
        self.backends.call(Backend::Legacy, method, params).await
    }

    /// Find the backend that owns the block with the given hash, `None` if neither does.
    pub async fn locate_block(&self, hash: BlockHash) -> LegacyRpcResult<Option<Backend>> {
        let params = json!([hash, false]);
        let local = self.backends.call(Backend::Local, "eth_getBlockByHash", params.clone()).await?;
        if !local.is_null() {
            return Ok(Some(Backend::Local))
        }

        let legacy = self.backends.call(Backend::Legacy, "eth_getBlockByHash", params).await?;
        Ok((!legacy.is_null()).then_some(Backend::Legacy))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::MockBackend;
    use assert_matches::assert_matches;
    use std::{sync::Arc, time::Duration};
    use xlayer_rpc_legacy_types::LegacyRpcError;

    const METHOD: &str = "eth_getTransactionByHash";

    fn tx_hash(byte: u8) -> Value {
        json!(format!("0x{}", hex_byte(byte).repeat(32)))
    }

    fn hex_byte(byte: u8) -> String {
        format!("{byte:02x}")
    }

    fn resolver(
        legacy: MockBackend,
        local: MockBackend,
    ) -> (HashResolver, Arc<MockBackend>, Arc<MockBackend>) {
        let legacy = Arc::new(legacy);
        let local = Arc::new(local);
        let backends = Backends::new(legacy.clone(), local.clone(), Duration::from_secs(5));
        (HashResolver::new(backends), legacy, local)
    }

    #[tokio::test]
    async fn local_hit_skips_legacy() {
        let tx = json!({ "hash": tx_hash(1), "blockNumber": "0x3ed" });
        let (resolver, legacy, _) = resolver(
            MockBackend::new(Backend::Legacy),
            MockBackend::new(Backend::Local).with_response(METHOD, Some(tx_hash(1)), tx.clone()),
        );
        assert_eq!(resolver.resolve(METHOD, json!([tx_hash(1)])).await.unwrap(), tx);
        assert_eq!(legacy.total_calls(), 0);
    }

    #[tokio::test]
    async fn falls_back_to_legacy() {
        let tx = json!({ "hash": tx_hash(2), "blockNumber": "0x3e3" });
        let (resolver, legacy, local) = resolver(
            MockBackend::new(Backend::Legacy).with_response(METHOD, Some(tx_hash(2)), tx.clone()),
            MockBackend::new(Backend::Local),
        );
        assert_eq!(resolver.resolve(METHOD, json!([tx_hash(2)])).await.unwrap(), tx);
        assert_eq!(local.calls_to(METHOD), 1);
        assert_eq!(legacy.params_of(METHOD), vec![json!([tx_hash(2)])]);
    }

    #[tokio::test]
    async fn unknown_hash_is_null() {
        let (resolver, _, _) =
            resolver(MockBackend::new(Backend::Legacy), MockBackend::new(Backend::Local));
        assert_eq!(resolver.resolve(METHOD, json!([tx_hash(3)])).await.unwrap(), Value::Null);
    }

    #[tokio::test]
    async fn local_failure_is_not_masked() {
        let (resolver, legacy, _) = resolver(
            MockBackend::new(Backend::Legacy),
            MockBackend::new(Backend::Local).with_error(METHOD, -32000, "header not found"),
        );
        let err = resolver.resolve(METHOD, json!([tx_hash(4)])).await.unwrap_err();
        assert_matches!(err, LegacyRpcError::BackendError { backend: Backend::Local, .. });
        assert_eq!(legacy.total_calls(), 0);
    }

    #[tokio::test]
    async fn legacy_failure_after_miss_is_surfaced() {
        let legacy = MockBackend::new(Backend::Legacy);
        legacy.set_unavailable(true);
        let (resolver, _, _) = resolver(legacy, MockBackend::new(Backend::Local));
        let err = resolver.resolve(METHOD, json!([tx_hash(5)])).await.unwrap_err();
        assert_matches!(err, LegacyRpcError::BackendUnavailable { backend: Backend::Legacy, .. });
    }

    #[tokio::test]
    async fn locates_blocks_by_hash() {
        let hash = BlockHash::repeat_byte(0x42);
        let (resolver, _, _) = resolver(
            MockBackend::new(Backend::Legacy).with_response(
                "eth_getBlockByHash",
                Some(json!(hash)),
                json!({ "number": "0x10" }),
            ),
            MockBackend::new(Backend::Local),
        );
        assert_eq!(resolver.locate_block(hash).await.unwrap(), Some(Backend::Legacy));
        assert_eq!(resolver.locate_block(BlockHash::ZERO).await.unwrap(), None);
    }
}
