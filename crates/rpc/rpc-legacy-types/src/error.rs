//! Error types of the legacy RPC router.

use crate::Backend;
use alloy_primitives::BlockNumber;
use alloy_rpc_types_eth::FilterId;
use jsonrpsee_types::error::{ErrorObject, ErrorObjectOwned, INTERNAL_ERROR_CODE, INVALID_PARAMS_CODE};

/// Result alias for router operations.
pub type LegacyRpcResult<T> = Result<T, LegacyRpcError>;

/// Errors raised while routing a request across the legacy and local nodes.
///
/// A "not found" answer from a backend is never an error: it surfaces as a `null` result or an
/// empty sequence.
#[derive(Debug, thiserror::Error)]
pub enum LegacyRpcError {
    /// The backend could not be reached or did not answer in time.
    #[error("{backend} backend unavailable: {reason}")]
    BackendUnavailable {
        /// Backend that failed.
        backend: Backend,
        /// Transport level reason.
        reason: String,
    },
    /// The backend answered with a JSON-RPC error object.
    #[error("{backend} backend error: {}", .error.message())]
    BackendError {
        /// Backend that failed.
        backend: Backend,
        /// The upstream error object, forwarded verbatim.
        error: ErrorObjectOwned,
    },
    /// The backend answered with a result of an unexpected shape.
    #[error("{backend} backend returned an invalid response: {reason}")]
    InvalidResponse {
        /// Backend that answered.
        backend: Backend,
        /// What was wrong with the response.
        reason: String,
    },
    /// No active filter with the given id.
    #[error("filter not found")]
    UnknownFilter(FilterId),
    /// The resolved block range is empty.
    #[error("invalid block range params: from block {from} is greater than to block {to}")]
    InvalidRange {
        /// Resolved start of the range.
        from: BlockNumber,
        /// Resolved end of the range.
        to: BlockNumber,
    },
    /// Request parameters could not be interpreted.
    #[error("invalid params: {0}")]
    InvalidParams(String),
    /// One leg of a query split across both backends failed.
    #[error("cross-boundary query failed on the {failed} leg: {source}")]
    PartialMergeFailure {
        /// The leg that failed.
        failed: Backend,
        /// Why it failed.
        source: Box<LegacyRpcError>,
    },
    /// Both legs of a query split across both backends failed.
    #[error("cross-boundary query failed on both legs: legacy: {legacy}; local: {local}")]
    CombinedFailure {
        /// Failure of the legacy leg.
        legacy: Box<LegacyRpcError>,
        /// Failure of the local leg.
        local: Box<LegacyRpcError>,
    },
}

impl LegacyRpcError {
    /// Backend that caused the error, if a single one did.
    pub fn backend(&self) -> Option<Backend> {
        match self {
            Self::BackendUnavailable { backend, .. } |
            Self::BackendError { backend, .. } |
            Self::InvalidResponse { backend, .. } => Some(*backend),
            Self::PartialMergeFailure { failed, .. } => Some(*failed),
            _ => None,
        }
    }

    /// Combine the outcome of the two legs of a split query.
    ///
    /// Returns `None` if both legs succeeded or were skipped.
    pub fn from_legs(legacy: Option<Self>, local: Option<Self>, split: bool) -> Option<Self> {
        match (legacy, local) {
            (None, None) => None,
            (Some(legacy), Some(local)) => {
                Some(Self::CombinedFailure { legacy: Box::new(legacy), local: Box::new(local) })
            }
            (Some(err), None) if split => {
                Some(Self::PartialMergeFailure { failed: Backend::Legacy, source: Box::new(err) })
            }
            (None, Some(err)) if split => {
                Some(Self::PartialMergeFailure { failed: Backend::Local, source: Box::new(err) })
            }
            (Some(err), None) | (None, Some(err)) => Some(err),
        }
    }
}

impl From<LegacyRpcError> for ErrorObjectOwned {
    fn from(err: LegacyRpcError) -> Self {
        match err {
            LegacyRpcError::BackendError { error, .. } => error,
            LegacyRpcError::UnknownFilter(_) => {
                ErrorObject::owned(INVALID_PARAMS_CODE, "filter not found", None::<()>)
            }
            err @ (LegacyRpcError::InvalidRange { .. } | LegacyRpcError::InvalidParams(_)) => {
                ErrorObject::owned(INVALID_PARAMS_CODE, err.to_string(), None::<()>)
            }
            err => ErrorObject::owned(INTERNAL_ERROR_CODE, err.to_string(), None::<()>),
        }
    }
}
