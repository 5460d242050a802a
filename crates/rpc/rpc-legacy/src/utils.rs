//! Helpers for positional JSON-RPC params.

use serde::de::DeserializeOwned;
use serde_json::Value;
use xlayer_rpc_legacy_types::{LegacyRpcError, LegacyRpcResult};

/// Returns the param at `index`, `None` if it is missing or `null`.
pub fn param_at(params: &Value, index: usize) -> Option<&Value> {
    params.as_array()?.get(index).filter(|param| !param.is_null())
}

/// Decode the required param at `index`.
pub fn parse_param<T: DeserializeOwned>(params: &Value, index: usize) -> LegacyRpcResult<T> {
    let param = param_at(params, index)
        .ok_or_else(|| LegacyRpcError::InvalidParams(format!("missing param at index {index}")))?;
    T::deserialize(param)
        .map_err(|err| LegacyRpcError::InvalidParams(format!("invalid param at index {index}: {err}")))
}

/// Decode the optional param at `index`.
pub fn parse_optional_param<T: DeserializeOwned>(
    params: &Value,
    index: usize,
) -> LegacyRpcResult<Option<T>> {
    param_at(params, index)
        .map(|param| {
            T::deserialize(param).map_err(|err| {
                LegacyRpcError::InvalidParams(format!("invalid param at index {index}: {err}"))
            })
        })
        .transpose()
}
