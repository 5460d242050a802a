//! Boundary classification of block references.

use alloy_eips::{BlockId, BlockNumberOrTag};
use alloy_primitives::{BlockHash, BlockNumber};
use serde::{Deserialize, Serialize};

/// One of the two upstream nodes behind the router.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// The frozen node serving blocks below the cutoff.
    #[display("legacy")]
    Legacy,
    /// The node serving blocks at and above the cutoff, authoritative for the chain head.
    #[display("local")]
    Local,
}

impl Backend {
    /// Static label, used for metrics and log fields.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Legacy => "legacy",
            Self::Local => "local",
        }
    }
}

/// Where a request keyed by a single block reference has to go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Serve from the given backend.
    Backend(Backend),
    /// The reference is a block hash; its owner is unknown until looked up.
    ResolveHash(BlockHash),
}

/// Pure mapping from a block reference to the backend that owns it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundaryClassifier {
    cutoff_block: BlockNumber,
}

impl BoundaryClassifier {
    /// Create a classifier for the given cutoff. The cutoff is the first block owned by the local
    /// node.
    pub const fn new(cutoff_block: BlockNumber) -> Self {
        Self { cutoff_block }
    }

    /// Returns the cutoff block number.
    pub const fn cutoff_block(&self) -> BlockNumber {
        self.cutoff_block
    }

    /// Classify a concrete block number.
    #[inline]
    pub const fn classify_number(&self, number: BlockNumber) -> Backend {
        if number < self.cutoff_block { Backend::Legacy } else { Backend::Local }
    }

    /// Classify a block number or tag.
    ///
    /// Head-relative tags always belong to the local node. `earliest` belongs to the legacy node
    /// unless the legacy node owns no blocks at all.
    pub const fn classify_tag(&self, block: BlockNumberOrTag) -> Backend {
        match block {
            BlockNumberOrTag::Number(n) => self.classify_number(n),
            BlockNumberOrTag::Earliest => self.classify_number(0),
            BlockNumberOrTag::Latest |
            BlockNumberOrTag::Pending |
            BlockNumberOrTag::Safe |
            BlockNumberOrTag::Finalized => Backend::Local,
        }
    }

    /// Classify an optional block id. A missing id means `latest`.
    pub const fn classify(&self, block_id: Option<BlockId>) -> Route {
        match block_id {
            None => Route::Backend(Backend::Local),
            Some(BlockId::Number(number)) => Route::Backend(self.classify_tag(number)),
            Some(BlockId::Hash(hash)) => Route::ResolveHash(hash.block_hash),
        }
    }
}
