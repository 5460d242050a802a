//! Types supporting the legacy RPC router.
//!
//! Requests for blocks below a cutoff are served by a frozen legacy node, everything at and above
//! the cutoff by the local node. This crate holds the I/O-free pieces of that split: the boundary
//! classifier, block range resolution and splitting, the log merge, the filter registry, the
//! configuration and the error type.

#![cfg_attr(not(test), warn(unused_crate_dependencies))]

pub mod block;
pub mod config;
pub mod error;
pub mod filter;
pub mod range;

pub use block::{Backend, BoundaryClassifier, Route};
pub use config::LegacyRpcConfig;
pub use error::{LegacyRpcError, LegacyRpcResult};
pub use filter::{
    FilterKind, FilterRecord, FilterRegistry, FilterState, FilterType, SharedFilterRecord,
};
pub use range::{BlockRange, SplitRange};
