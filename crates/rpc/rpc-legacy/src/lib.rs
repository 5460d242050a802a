//! Legacy RPC routing.
//!
//! A chain migrated to a new node keeps its history below a cutoff block on a frozen legacy node.
//! [`LegacyRouter`] sits in front of both nodes and serves the `eth` namespace as if they were one:
//!
//! - single-block calls go to the node owning the block,
//! - hash lookups try the local node first and fall back to the legacy node,
//! - `eth_getLogs` and log filters spanning the cutoff are split, queried on both nodes
//!   concurrently and merged in block order.

#![cfg_attr(not(test), warn(unused_crate_dependencies))]

mod client;
mod filters;
mod init;
mod logs;
mod resolver;
mod router;
pub mod utils;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use client::{Backends, HttpBackend, RpcBackend};
pub use filters::FilterManager;
pub use init::init_legacy_router;
pub use logs::LogRouter;
pub use resolver::{HashResolver, HASH_KEYED_METHODS};
pub use router::{LegacyRouter, ROUTED_METHODS};

pub use xlayer_rpc_legacy_types::{Backend, LegacyRpcConfig, LegacyRpcError, LegacyRpcResult};
