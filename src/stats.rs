//! Statistics and diagnostics types.

#[cfg(feature = "metrics")]
use std::sync::atomic::{AtomicU64, Ordering};

/// Operation counts for one DistMap instance (all zero without the `metrics` feature).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MapOps {
    /// Writes applied directly to the local shard.
    pub local_writes: u64,
    /// Writes buffered for a remote shard.
    pub remote_writes: u64,
    /// Buffered writes received from other ranks and merged locally.
    pub merged_writes: u64,
    /// Completed flushes.
    pub flushes: u64,
}

/// Thread-safe operation counters for a DistMap.
#[cfg(feature = "metrics")]
pub(crate) struct MapCounters {
    local_writes: AtomicU64,
    remote_writes: AtomicU64,
    merged_writes: AtomicU64,
    flushes: AtomicU64,
}

#[cfg(feature = "metrics")]
impl MapCounters {
    pub fn new() -> Self {
        Self {
            local_writes: AtomicU64::new(0),
            remote_writes: AtomicU64::new(0),
            merged_writes: AtomicU64::new(0),
            flushes: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn record_local_write(&self) {
        self.local_writes.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_remote_write(&self) {
        self.remote_writes.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_merged_writes(&self, n: u64) {
        self.merged_writes.fetch_add(n, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_flush(&self) {
        self.flushes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MapOps {
        MapOps {
            local_writes: self.local_writes.load(Ordering::Relaxed),
            remote_writes: self.remote_writes.load(Ordering::Relaxed),
            merged_writes: self.merged_writes.load(Ordering::Relaxed),
            flushes: self.flushes.load(Ordering::Relaxed),
        }
    }
}

/// Zero-sized placeholder when metrics are disabled.
#[cfg(not(feature = "metrics"))]
pub(crate) struct MapCounters;

#[cfg(not(feature = "metrics"))]
impl MapCounters {
    pub fn new() -> Self {
        MapCounters
    }

    #[inline]
    pub fn record_local_write(&self) {}

    #[inline]
    pub fn record_remote_write(&self) {}

    #[inline]
    pub fn record_merged_writes(&self, _n: u64) {}

    #[inline]
    pub fn record_flush(&self) {}

    pub fn snapshot(&self) -> MapOps {
        MapOps::default()
    }
}

impl Default for MapCounters {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of one rank's view of a DistMap.
#[derive(Debug, Clone)]
pub struct Stats {
    /// Rank owning the local shard.
    pub rank: usize,
    /// Number of ranks (and shards).
    pub n_ranks: usize,
    /// Keys in the local shard.
    pub local_keys: usize,
    /// Buckets allocated by the local shard.
    pub n_buckets: usize,
    /// `local_keys / n_buckets`.
    pub load_factor: f64,
    /// Max load factor of the local shard.
    pub max_load_factor: f64,
    /// Distinct keys waiting in each outbound buffer, indexed by destination rank.
    pub pending_writes: Vec<usize>,
    /// Operation counts.
    pub operations: MapOps,
}
