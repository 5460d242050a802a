//! Parameters for configuring the node.

/// `LegacyRpcArgs` for routing historical queries to a legacy node
mod legacy_rpc;
pub use legacy_rpc::LegacyRpcArgs;
