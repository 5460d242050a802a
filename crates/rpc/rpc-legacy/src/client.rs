//! Upstream clients for the legacy and local nodes.

use alloy_primitives::{BlockNumber, U64};
use async_trait::async_trait;
use jsonrpsee::{
    core::{client::ClientT, params::ArrayParams, ClientError},
    http_client::{HttpClient, HttpClientBuilder},
};
use serde_json::Value;
use std::{
    fmt,
    sync::Arc,
    time::{Duration, Instant},
};
use tracing::{debug, trace};
use xlayer_rpc_legacy_types::{Backend, LegacyRpcError, LegacyRpcResult};

/// Request/response transport to one upstream JSON-RPC endpoint.
///
/// A `null` result is a regular answer, only transport failures and JSON-RPC error objects are
/// errors.
#[async_trait]
pub trait RpcBackend: fmt::Debug + Send + Sync + 'static {
    /// Which side of the cutoff this backend serves.
    fn kind(&self) -> Backend;

    /// Send a request with positional params and return the raw result.
    async fn call(&self, method: &str, params: Value) -> LegacyRpcResult<Value>;
}

/// HTTP client for interacting with an upstream RPC endpoint.
#[derive(Clone)]
pub struct HttpBackend {
    kind: Backend,
    endpoint: String,
    client: HttpClient,
}

impl fmt::Debug for HttpBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpBackend")
            .field("kind", &self.kind)
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl HttpBackend {
    /// Create a new client for the endpoint. Fails if the URL is unusable.
    pub fn new(kind: Backend, endpoint: &str, timeout: Duration) -> LegacyRpcResult<Self> {
        let client = HttpClientBuilder::default().request_timeout(timeout).build(endpoint).map_err(
            |err| LegacyRpcError::BackendUnavailable { backend: kind, reason: err.to_string() },
        )?;
        Ok(Self { kind, endpoint: endpoint.to_string(), client })
    }

    /// Returns the endpoint URL.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl RpcBackend for HttpBackend {
    fn kind(&self) -> Backend {
        self.kind
    }

    async fn call(&self, method: &str, params: Value) -> LegacyRpcResult<Value> {
        let params = array_params(self.kind, params)?;
        self.client.request::<Value, _>(method, params).await.map_err(|err| match err {
            ClientError::Call(error) => LegacyRpcError::BackendError { backend: self.kind, error },
            err => LegacyRpcError::BackendUnavailable { backend: self.kind, reason: err.to_string() },
        })
    }
}

/// Convert positional JSON params into jsonrpsee params. A non-array value is sent as the only
/// param.
fn array_params(backend: Backend, params: Value) -> LegacyRpcResult<ArrayParams> {
    let items = match params {
        Value::Null => Vec::new(),
        Value::Array(items) => items,
        other => vec![other],
    };
    let mut out = ArrayParams::new();
    for item in items {
        out.insert(item).map_err(|err| LegacyRpcError::InvalidParams(format!(
            "failed to encode params for {backend} backend: {err}"
        )))?;
    }
    Ok(out)
}

/// The two upstream backends, with the per-call timeout applied to every request.
#[derive(Debug, Clone)]
pub struct Backends {
    legacy: Arc<dyn RpcBackend>,
    local: Arc<dyn RpcBackend>,
    timeout: Duration,
}

impl Backends {
    /// Bundle the two backends.
    pub fn new(legacy: Arc<dyn RpcBackend>, local: Arc<dyn RpcBackend>, timeout: Duration) -> Self {
        Self { legacy, local, timeout }
    }

    /// Returns the backend of the given kind.
    pub fn get(&self, backend: Backend) -> &Arc<dyn RpcBackend> {
        match backend {
            Backend::Legacy => &self.legacy,
            Backend::Local => &self.local,
        }
    }

    /// Call a backend, bounded by the per-call timeout. A timeout is a backend failure, never a
    /// "not found".
    pub async fn call(
        &self,
        backend: Backend,
        method: &str,
        params: Value,
    ) -> LegacyRpcResult<Value> {
        trace!(target: "rpc::legacy", %backend, method, "calling backend");
        metrics::counter!("rpc_legacy_backend_calls", "backend" => backend.as_str()).increment(1);
        let started = Instant::now();

        let result =
            match tokio::time::timeout(self.timeout, self.get(backend).call(method, params)).await {
                Ok(result) => result,
                Err(_) => Err(LegacyRpcError::BackendUnavailable {
                    backend,
                    reason: format!("{method} timed out after {:?}", self.timeout),
                }),
            };

        metrics::histogram!("rpc_legacy_backend_call_duration_seconds", "backend" => backend.as_str())
            .record(started.elapsed().as_secs_f64());
        if let Err(err) = &result {
            metrics::counter!("rpc_legacy_backend_errors", "backend" => backend.as_str()).increment(1);
            debug!(target: "rpc::legacy", %backend, method, %err, "backend call failed");
        }
        result
    }

    /// Current head of the local node.
    pub async fn local_head(&self) -> LegacyRpcResult<BlockNumber> {
        let head = self.call(Backend::Local, "eth_blockNumber", Value::Array(Vec::new())).await?;
        serde_json::from_value::<U64>(head).map(|head| head.to::<BlockNumber>()).map_err(|err| {
            LegacyRpcError::InvalidResponse {
                backend: Backend::Local,
                reason: format!("eth_blockNumber: {err}"),
            }
        })
    }
}
