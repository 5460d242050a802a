//! Registry of filters that may span the legacy and local nodes.

use crate::{
    range::{log_block_number, max_block_number, merge_logs},
    Backend, LegacyRpcError, LegacyRpcResult, SplitRange,
};
use alloy_primitives::BlockNumber;
use alloy_rpc_types_eth::{Filter, FilterId};
use parking_lot::RwLock;
use serde_json::Value;
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{sync::Mutex, time::Instant};
use tracing::trace;

/// Filter type classification for hybrid filter management.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterType {
    /// Filter only queries legacy data (to_block < cutoff).
    PureLegacy,
    /// Filter only queries local data (from_block >= cutoff).
    PureLocal,
    /// Filter spans both legacy and local data.
    Hybrid,
}

impl FilterType {
    /// Classify a split range. `None` if neither side is populated.
    pub const fn from_split(split: &SplitRange) -> Option<Self> {
        match (split.legacy.is_some(), split.local.is_some()) {
            (true, true) => Some(Self::Hybrid),
            (true, false) => Some(Self::PureLegacy),
            (false, true) => Some(Self::PureLocal),
            (false, false) => None,
        }
    }
}

/// What a filter watches.
#[derive(Debug, Clone)]
pub enum FilterKind {
    /// Logs matching the original filter.
    Log(Box<Filter>),
    /// New block hashes.
    Block,
    /// New pending transactions.
    PendingTransaction,
}

/// Lifecycle of a filter record. `Uninstalled` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterState {
    /// Upstream handles are live.
    Active,
    /// Upstream handles were torn down; the record only remains as a tombstone.
    Uninstalled,
}

/// A filter owned by the router and the upstream filters backing it.
#[derive(Debug)]
pub struct FilterRecord {
    /// Router-side filter id.
    pub id: FilterId,
    /// What the filter watches.
    pub kind: FilterKind,
    /// Block range split frozen at creation time. Empty for block and pending transaction
    /// filters.
    pub split: SplitRange,
    /// Upstream filter id on the legacy node.
    pub legacy_handle: Option<FilterId>,
    /// Upstream filter id on the local node.
    pub local_handle: Option<FilterId>,
    /// Highest block number delivered through `eth_getFilterChanges`.
    pub cursor: Option<BlockNumber>,
    /// Lowest block announced as removed by a reorg whose replacement has not yet moved past the
    /// cursor. Entries from this block on are delivered even if they are at or below the cursor.
    pub reorg_floor: Option<BlockNumber>,
    /// Changes of the legacy leg consumed upstream by a poll that failed on the other leg.
    pub pending_legacy: Vec<Value>,
    /// Changes of the local leg consumed upstream by a poll that failed on the other leg.
    pub pending_local: Vec<Value>,
    /// Lifecycle state.
    pub state: FilterState,
    /// Last time the filter was polled, or uninstalled.
    pub last_poll: Instant,
}

impl FilterRecord {
    /// Returns the filter type derived from the frozen split. Head-only filters are local.
    pub const fn filter_type(&self) -> Option<FilterType> {
        match self.kind {
            FilterKind::Log(_) => FilterType::from_split(&self.split),
            FilterKind::Block | FilterKind::PendingTransaction => Some(FilterType::PureLocal),
        }
    }

    /// Returns an error unless the filter is active.
    pub fn ensure_active(&self) -> LegacyRpcResult<()> {
        match self.state {
            FilterState::Active => Ok(()),
            FilterState::Uninstalled => Err(LegacyRpcError::UnknownFilter(self.id.clone())),
        }
    }

    /// Record a poll at the given instant.
    pub fn touch(&mut self, now: Instant) {
        self.last_poll = now;
    }

    /// Returns true if the filter was not polled within `ttl`.
    pub fn is_stale(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.last_poll) >= ttl
    }

    /// Keep the changes of a leg whose poll succeeded while the other leg failed.
    ///
    /// The upstream filter already moved past them, they are handed out by the next successful
    /// poll.
    pub fn hold_back(&mut self, backend: Backend, entries: Vec<Value>) {
        match backend {
            Backend::Legacy => self.pending_legacy.extend(entries),
            Backend::Local => self.pending_local.extend(entries),
        }
    }

    /// Merge the changes of both legs behind the held back ones, drop replays and advance the
    /// cursor.
    ///
    /// A log at or below the cursor was already delivered and is dropped. Removals always pass,
    /// and a removal at block `N` reopens every block from `N` on for its replacement logs until
    /// the chain moves past the cursor again. Entries of block and pending transaction filters
    /// are passed through.
    pub fn deliver(&mut self, legacy: Vec<Value>, local: Vec<Value>) -> Vec<Value> {
        let mut held_legacy = std::mem::take(&mut self.pending_legacy);
        held_legacy.extend(legacy);
        let mut held_local = std::mem::take(&mut self.pending_local);
        held_local.extend(local);
        let entries = merge_logs(held_legacy, held_local);
        if !matches!(self.kind, FilterKind::Log(_)) {
            return entries
        }

        let cursor = self.cursor;
        let mut floor = self.reorg_floor;
        let mut moved_past = false;
        let mut fresh = Vec::with_capacity(entries.len());
        for entry in entries {
            let Some(block) = log_block_number(&entry) else {
                fresh.push(entry);
                continue
            };
            if is_removed(&entry) {
                floor = Some(floor.map_or(block, |floor| floor.min(block)));
                fresh.push(entry);
                continue
            }
            let above_cursor = cursor.is_none_or(|cursor| block > cursor);
            if above_cursor || floor.is_some_and(|floor| block >= floor) {
                moved_past |= above_cursor;
                fresh.push(entry);
            }
        }

        self.reorg_floor = floor.filter(|_| !moved_past);
        if let Some(highest) = max_block_number(&fresh) {
            self.cursor = Some(self.cursor.map_or(highest, |cursor| cursor.max(highest)));
        }
        fresh
    }

    /// Transition to `Uninstalled`, handing out the upstream handles to tear down.
    pub fn mark_uninstalled(&mut self, now: Instant) -> (Option<FilterId>, Option<FilterId>) {
        self.state = FilterState::Uninstalled;
        self.last_poll = now;
        self.pending_legacy.clear();
        self.pending_local.clear();
        (self.legacy_handle.take(), self.local_handle.take())
    }
}

fn is_removed(entry: &Value) -> bool {
    entry.get("removed").and_then(Value::as_bool).unwrap_or(false)
}

/// Shared handle to a filter record. Each record is locked independently.
pub type SharedFilterRecord = Arc<Mutex<FilterRecord>>;

/// All filters known to the router.
///
/// The id to record mapping is guarded by its own lock, held only for lookups and inserts, so a
/// slow upstream call on one filter never blocks operations on another.
#[derive(Debug)]
pub struct FilterRegistry {
    filters: RwLock<HashMap<FilterId, SharedFilterRecord>>,
    next_id: AtomicU64,
}

impl Default for FilterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl FilterRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self { filters: RwLock::new(HashMap::new()), next_id: AtomicU64::new(1) }
    }

    /// Generate a new filter ID.
    fn generate_id(&self) -> FilterId {
        FilterId::from(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Register a new active filter backed by the given upstream handles.
    pub fn install(
        &self,
        kind: FilterKind,
        split: SplitRange,
        legacy_handle: Option<FilterId>,
        local_handle: Option<FilterId>,
    ) -> FilterId {
        let id = self.generate_id();
        let record = FilterRecord {
            id: id.clone(),
            kind,
            split,
            legacy_handle,
            local_handle,
            cursor: None,
            reorg_floor: None,
            pending_legacy: Vec::new(),
            pending_local: Vec::new(),
            state: FilterState::Active,
            last_poll: Instant::now(),
        };
        trace!(target: "rpc::legacy", ?id, filter_type = ?record.filter_type(), "installed filter");
        self.filters.write().insert(id.clone(), Arc::new(Mutex::new(record)));
        id
    }

    /// Get the record of a filter.
    pub fn get(&self, id: &FilterId) -> LegacyRpcResult<SharedFilterRecord> {
        self.filters.read().get(id).cloned().ok_or_else(|| LegacyRpcError::UnknownFilter(id.clone()))
    }

    /// Remove a filter record.
    pub fn remove(&self, id: &FilterId) -> Option<SharedFilterRecord> {
        let removed = self.filters.write().remove(id);
        if removed.is_some() {
            trace!(target: "rpc::legacy", ?id, "removed filter record");
        }
        removed
    }

    /// Returns all records.
    pub fn snapshot(&self) -> Vec<(FilterId, SharedFilterRecord)> {
        self.filters.read().iter().map(|(id, record)| (id.clone(), record.clone())).collect()
    }

    /// Number of records, tombstones included.
    pub fn len(&self) -> usize {
        self.filters.read().len()
    }

    /// Returns true if there are no records.
    pub fn is_empty(&self) -> bool {
        self.filters.read().is_empty()
    }
}
