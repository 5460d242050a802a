//! Legacy router initialization from configuration.

use crate::{HttpBackend, LegacyRouter};
use std::sync::Arc;
use xlayer_rpc_legacy_types::{Backend, LegacyRpcConfig, LegacyRpcResult};

/// Build the HTTP backends for both endpoints and start the router.
///
/// Fails if either endpoint URL is unusable. No request is sent: an unreachable node only shows
/// up once calls are routed to it.
///
/// # Example
/// ```ignore
/// let router = init_legacy_router(config)?;
/// server.start(router.into_rpc_module()?);
/// ```
pub fn init_legacy_router(config: LegacyRpcConfig) -> LegacyRpcResult<LegacyRouter> {
    let backends = HttpBackend::new(Backend::Legacy, &config.legacy_endpoint, config.timeout)
        .and_then(|legacy| {
            let local = HttpBackend::new(Backend::Local, &config.local_endpoint, config.timeout)?;
            Ok((legacy, local))
        });

    match backends {
        Ok((legacy, local)) => {
            tracing::info!(
                target: "rpc::legacy",
                cutoff_block = config.cutoff_block,
                legacy = %config.legacy_endpoint,
                local = %config.local_endpoint,
                "Legacy RPC routing initialized"
            );
            Ok(LegacyRouter::start(config, Arc::new(legacy), Arc::new(local)))
        }
        Err(err) => {
            tracing::warn!(
                target: "rpc::legacy",
                %err,
                legacy = %config.legacy_endpoint,
                local = %config.local_endpoint,
                "Failed to initialize legacy RPC routing"
            );
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::time::Duration;
    use xlayer_rpc_legacy_types::LegacyRpcError;

    #[tokio::test]
    async fn test_init_with_valid_urls() {
        let config = LegacyRpcConfig::new(
            1000000,
            "http://127.0.0.1:8546",
            "http://127.0.0.1:8545",
            Duration::from_secs(30),
        );
        let router = init_legacy_router(config).unwrap();
        assert_eq!(router.config().cutoff_block, 1000000);
        router.stop().await;
    }

    #[test]
    fn test_init_with_invalid_legacy_url() {
        let config = LegacyRpcConfig::new(
            1000000,
            "invalid://url",
            "http://127.0.0.1:8545",
            Duration::from_secs(30),
        );
        assert_matches!(
            init_legacy_router(config),
            Err(LegacyRpcError::BackendUnavailable { backend: Backend::Legacy, .. })
        );
    }

    #[tokio::test]
    async fn test_init_with_invalid_local_url() {
        let config = LegacyRpcConfig::new(
            1000000,
            "http://127.0.0.1:8546",
            "not a url",
            Duration::from_secs(30),
        );
        assert_matches!(
            init_legacy_router(config),
            Err(LegacyRpcError::BackendUnavailable { backend: Backend::Local, .. })
        );
    }
}
