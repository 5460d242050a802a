//! In-memory backend for tests.

use crate::RpcBackend;
use async_trait::async_trait;
use jsonrpsee::types::ErrorObject;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::{collections::HashMap, time::Duration};
use xlayer_rpc_legacy_types::{range::log_block_number, Backend, LegacyRpcError, LegacyRpcResult};

/// A scripted upstream node.
///
/// Serves `eth_blockNumber`, `eth_getLogs` and the filter methods from an in-memory log store;
/// every other method answers with a canned response, or `null`.
#[derive(Debug)]
pub struct MockBackend {
    kind: Backend,
    delay: Option<Duration>,
    state: Mutex<MockState>,
}

#[derive(Debug, Default)]
struct MockState {
    head: u64,
    logs: Vec<Value>,
    responses: Vec<(String, Option<Value>, Value)>,
    errors: HashMap<String, (i32, String)>,
    unavailable: bool,
    filters: HashMap<u64, MockFilter>,
    next_filter: u64,
    calls: Vec<(String, Value)>,
}

#[derive(Debug)]
struct MockFilter {
    from: u64,
    to: Option<u64>,
    delivered: Option<u64>,
    logs: bool,
}

impl MockBackend {
    /// Create an empty backend with head `0`.
    pub fn new(kind: Backend) -> Self {
        Self { kind, delay: None, state: Mutex::new(MockState { next_filter: 0x10, ..Default::default() }) }
    }

    /// Set the head block number.
    pub fn with_head(self, head: u64) -> Self {
        self.set_head(head);
        self
    }

    /// Add a log at the given block. `tag` ends up in the `data` field.
    pub fn with_log(self, block: u64, tag: &str) -> Self {
        self.push_log(block, tag);
        self
    }

    /// Answer `method` with `result` when its first param equals `first_param`, or always if
    /// `first_param` is `None`.
    pub fn with_response(self, method: &str, first_param: Option<Value>, result: Value) -> Self {
        self.state.lock().responses.push((method.to_string(), first_param, result));
        self
    }

    /// Answer `method` with a JSON-RPC error.
    pub fn with_error(self, method: &str, code: i32, message: &str) -> Self {
        self.state.lock().errors.insert(method.to_string(), (code, message.to_string()));
        self
    }

    /// Delay every answer.
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Set the head block number.
    pub fn set_head(&self, head: u64) {
        self.state.lock().head = head;
    }

    /// Add a log at the given block.
    pub fn push_log(&self, block: u64, tag: &str) {
        self.state.lock().logs.push(json!({
            "blockNumber": format!("{block:#x}"),
            "data": tag,
        }));
    }

    /// Make every call fail at the transport level.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.lock().unavailable = unavailable;
    }

    /// Number of calls made to `method`.
    pub fn calls_to(&self, method: &str) -> usize {
        self.state.lock().calls.iter().filter(|(m, _)| m == method).count()
    }

    /// Params of every call made to `method`.
    pub fn params_of(&self, method: &str) -> Vec<Value> {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|(m, _)| m == method)
            .map(|(_, params)| params.clone())
            .collect()
    }

    /// Total number of calls.
    pub fn total_calls(&self) -> usize {
        self.state.lock().calls.len()
    }

    /// Number of upstream filters currently installed.
    pub fn installed_filters(&self) -> usize {
        self.state.lock().filters.len()
    }
}

impl MockState {
    fn logs_in(&self, from: u64, to: u64) -> Vec<Value> {
        self.logs
            .iter()
            .filter(|log| log_block_number(log).is_some_and(|block| from <= block && block <= to))
            .cloned()
            .collect()
    }

    fn filter_id(params: &Value) -> Option<u64> {
        let id = params.get(0)?;
        id.as_u64().or_else(|| parse_hex(id.as_str()?))
    }
}

fn parse_hex(value: &str) -> Option<u64> {
    u64::from_str_radix(value.strip_prefix("0x")?, 16).ok()
}

/// Concrete block of a filter bound, `None` for tags that follow the head.
fn bound(value: Option<&Value>) -> Option<u64> {
    match value.and_then(Value::as_str) {
        Some("earliest") => Some(0),
        Some(other) => parse_hex(other),
        None => None,
    }
}

#[async_trait]
impl RpcBackend for MockBackend {
    fn kind(&self) -> Backend {
        self.kind
    }

    async fn call(&self, method: &str, params: Value) -> LegacyRpcResult<Value> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock();
        state.calls.push((method.to_string(), params.clone()));
        if state.unavailable {
            return Err(LegacyRpcError::BackendUnavailable {
                backend: self.kind,
                reason: "connection refused".to_string(),
            })
        }
        if let Some((code, message)) = state.errors.get(method) {
            return Err(LegacyRpcError::BackendError {
                backend: self.kind,
                error: ErrorObject::owned(*code, message.clone(), None::<()>),
            })
        }

        let head = state.head;
        let result = match method {
            "eth_blockNumber" => json!(format!("{head:#x}")),
            "eth_getLogs" => {
                let filter = params.get(0).cloned().unwrap_or_default();
                let from = bound(filter.get("fromBlock")).unwrap_or(head);
                let to = bound(filter.get("toBlock")).unwrap_or(head);
                Value::Array(state.logs_in(from, to))
            }
            "eth_newFilter" => {
                let filter = params.get(0).cloned().unwrap_or_default();
                let from = bound(filter.get("fromBlock")).unwrap_or(head);
                let to = bound(filter.get("toBlock"));
                let id = state.next_filter;
                state.next_filter += 1;
                state.filters.insert(id, MockFilter { from, to, delivered: None, logs: true });
                json!(format!("{id:#x}"))
            }
            "eth_newBlockFilter" | "eth_newPendingTransactionFilter" => {
                let id = state.next_filter;
                state.next_filter += 1;
                state.filters.insert(id, MockFilter { from: head, to: None, delivered: None, logs: false });
                json!(format!("{id:#x}"))
            }
            "eth_getFilterLogs" | "eth_getFilterChanges" => {
                let Some(filter) = MockState::filter_id(&params).and_then(|id| state.filters.get(&id))
                else {
                    return Err(LegacyRpcError::BackendError {
                        backend: self.kind,
                        error: ErrorObject::owned(-32000, "filter not found", None::<()>),
                    })
                };
                if !filter.logs {
                    return Ok(json!([]))
                }
                let to = filter.to.unwrap_or(head).min(head);
                let from = match (method, filter.delivered) {
                    ("eth_getFilterChanges", Some(delivered)) => filter.from.max(delivered + 1),
                    _ => filter.from,
                };
                let logs = state.logs_in(from, to);
                if method == "eth_getFilterChanges" {
                    let id = MockState::filter_id(&params).unwrap_or_default();
                    if let Some(filter) = state.filters.get_mut(&id) {
                        filter.delivered = Some(to);
                    }
                }
                Value::Array(logs)
            }
            "eth_uninstallFilter" => {
                let removed = MockState::filter_id(&params)
                    .and_then(|id| state.filters.remove(&id))
                    .is_some();
                json!(removed)
            }
            _ => {
                let first = params.get(0);
                state
                    .responses
                    .iter()
                    .find(|(m, key, _)| m == method && key.as_ref().is_none_or(|key| Some(key) == first))
                    .map(|(_, _, result)| result.clone())
                    .unwrap_or(Value::Null)
            }
        };
        Ok(result)
    }
}
