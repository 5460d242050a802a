//! Configuration for legacy RPC routing.

use alloy_primitives::BlockNumber;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default per-call timeout for upstream requests.
pub const DEFAULT_LEGACY_RPC_TIMEOUT: Duration = Duration::from_secs(30);

/// Default duration after which a filter that has not been polled is evicted.
pub const DEFAULT_STALE_FILTER_TTL: Duration = Duration::from_secs(5 * 60);

/// Configuration for legacy RPC routing.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct LegacyRpcConfig {
    /// Block number below which requests should be routed to legacy RPC.
    /// Requests for blocks >= cutoff_block are handled locally.
    pub cutoff_block: BlockNumber,

    /// Legacy RPC endpoint URL (e.g., "http://legacy-node:8545").
    pub legacy_endpoint: String,

    /// Local RPC endpoint URL.
    pub local_endpoint: String,

    /// Request timeout for upstream RPC calls.
    #[serde(with = "humantime_serde", default = "default_timeout")]
    pub timeout: Duration,

    /// Filters that are not polled within this duration are evicted.
    #[serde(with = "humantime_serde", default = "default_stale_filter_ttl")]
    pub stale_filter_ttl: Duration,
}

const fn default_timeout() -> Duration {
    DEFAULT_LEGACY_RPC_TIMEOUT
}

const fn default_stale_filter_ttl() -> Duration {
    DEFAULT_STALE_FILTER_TTL
}

impl LegacyRpcConfig {
    /// Create a new legacy RPC configuration.
    pub fn new(
        cutoff_block: BlockNumber,
        legacy_endpoint: impl Into<String>,
        local_endpoint: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            cutoff_block,
            legacy_endpoint: legacy_endpoint.into(),
            local_endpoint: local_endpoint.into(),
            timeout,
            stale_filter_ttl: DEFAULT_STALE_FILTER_TTL,
        }
    }

    /// Set the stale filter TTL.
    pub const fn with_stale_filter_ttl(mut self, ttl: Duration) -> Self {
        self.stale_filter_ttl = ttl;
        self
    }
}
