use clap::Args;
use std::time::Duration;
use xlayer_rpc_legacy_types::{
    config::{DEFAULT_LEGACY_RPC_TIMEOUT, DEFAULT_STALE_FILTER_TTL},
    LegacyRpcConfig,
};

/// Parameters to route queries for blocks below a cutoff to a legacy node
#[derive(Debug, Args, PartialEq, Eq, Default, Clone)]
#[command(next_help_heading = "Legacy RPC")]
pub struct LegacyRpcArgs {
    /// HTTP endpoint of the legacy node serving blocks below the cutoff.
    ///
    /// Routing is disabled unless both this and `--rpc.legacy-cutoff-block` are set.
    #[arg(long = "rpc.legacy-url", value_name = "URL", requires = "cutoff_block")]
    pub legacy_url: Option<String>,

    /// First block served by the local node. Every lower block is served by the legacy node.
    #[arg(long = "rpc.legacy-cutoff-block", value_name = "BLOCK", requires = "legacy_url")]
    pub cutoff_block: Option<u64>,

    /// Timeout of a single call to either node.
    #[arg(
        long = "rpc.legacy-timeout",
        value_name = "DURATION",
        value_parser = humantime::parse_duration,
        default_value = "30s"
    )]
    pub timeout: Duration,

    /// Filters not polled for this long are uninstalled.
    #[arg(
        long = "rpc.legacy-filter-ttl",
        value_name = "DURATION",
        value_parser = humantime::parse_duration,
        default_value = "5m"
    )]
    pub filter_ttl: Duration,
}

impl LegacyRpcArgs {
    /// Returns the router configuration, `None` if routing is disabled.
    ///
    /// `local_url` is the endpoint of the node serving blocks from the cutoff on.
    pub fn to_config(&self, local_url: impl Into<String>) -> Option<LegacyRpcConfig> {
        let (Some(legacy_url), Some(cutoff_block)) = (&self.legacy_url, self.cutoff_block) else {
            return None
        };
        Some(
            LegacyRpcConfig::new(cutoff_block, legacy_url.clone(), local_url, self.timeout)
                .with_stale_filter_ttl(self.filter_ttl),
        )
    }

    /// Returns true if routing is configured.
    pub const fn is_enabled(&self) -> bool {
        self.legacy_url.is_some() && self.cutoff_block.is_some()
    }
}
