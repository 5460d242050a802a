//! Serves the `eth` namespace of a chain split between a legacy node and a local node.

use clap::Parser;
use eyre::{eyre, WrapErr};
use jsonrpsee::server::ServerBuilder;
use std::net::SocketAddr;
use tracing::info;
use tracing_subscriber::EnvFilter;
use xlayer_node_core::args::LegacyRpcArgs;
use xlayer_rpc_legacy::init_legacy_router;

/// Route JSON-RPC calls for blocks below a cutoff to a legacy node.
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Address the router listens on.
    #[arg(long = "http.addr", value_name = "ADDR", default_value = "127.0.0.1:8545")]
    http_addr: SocketAddr,

    /// HTTP endpoint of the local node serving blocks from the cutoff on.
    #[arg(long = "rpc.local-url", value_name = "URL", env = "LOCAL_RPC_URL")]
    local_url: String,

    #[command(flatten)]
    legacy: LegacyRpcArgs,
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = cli
        .legacy
        .to_config(cli.local_url)
        .ok_or_else(|| eyre!("--rpc.legacy-url and --rpc.legacy-cutoff-block are required"))?;

    let router = init_legacy_router(config)?;
    let server = ServerBuilder::default()
        .build(cli.http_addr)
        .await
        .wrap_err_with(|| format!("failed to bind {}", cli.http_addr))?;
    let addr = server.local_addr()?;
    let handle = server.start(router.clone().into_rpc_module()?);
    info!(%addr, "RPC HTTP server started");

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    router.stop().await;
    handle.stop()?;
    handle.stopped().await;
    Ok(())
}
