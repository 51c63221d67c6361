//! Parallel map-reduce over an integer id space.
//!
//! The range `[low, high)` is split into one contiguous block per rank; rayon
//! then splits each block across its worker threads. Every fold task gathers
//! its emissions in a private [`HashTable`], pre-combined with the reducer,
//! and hands the table to the accumulator map in one batch. A final flush
//! delivers everything owned by other ranks.

use crate::config::DistMapBuilder;
use crate::dist_map::DistMap;
use crate::error::Error;
use crate::hash::ShardHasher;
use crate::table::HashTable;
use rayon::prelude::*;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::hash::Hash;
use std::ops::Range;
use tracing::{debug, debug_span, warn};

/// Integer types usable as range bounds.
pub trait RangeBound: Copy + Ord + Send + Sync + std::fmt::Debug + 'static {
    /// Widen to `i128` for partition arithmetic.
    fn to_i128(self) -> i128;
    /// Narrow back from a value known to lie within the original range.
    fn from_i128(value: i128) -> Self;
}

macro_rules! impl_range_bound {
    ($($t:ty),*) => {
        $(
            impl RangeBound for $t {
                #[inline]
                fn to_i128(self) -> i128 {
                    self as i128
                }

                #[inline]
                fn from_i128(value: i128) -> Self {
                    value as $t
                }
            }
        )*
    };
}

impl_range_bound!(i32, i64, isize, u32, u64, usize);

/// Sink handed to mappers for emitting key/value pairs.
pub struct Emitter<'a, K, V> {
    table: &'a mut HashTable<K, V>,
    hasher: &'a ShardHasher,
    reducer: &'a (dyn Fn(V, V) -> V + Sync),
}

impl<K: Hash + Eq, V> Emitter<'_, K, V> {
    /// Emit a pair. Pairs with equal keys are combined with the mapreduce reducer.
    pub fn emit(&mut self, key: K, value: V) {
        let hash = self.hasher.hash_key(&key);
        self.table.set_with(key, hash, value, self.reducer);
    }
}

/// Half-open id range `[low, high)` partitioned across ranks and threads.
#[derive(Debug, Clone)]
pub struct DistRange<T> {
    low: T,
    high: T,
    builder: DistMapBuilder,
}

impl<T: RangeBound> DistRange<T> {
    /// Create a single-rank range. Requires `low <= high`.
    pub fn new(low: T, high: T) -> Result<Self, Error> {
        Self::with_builder(low, high, DistMapBuilder::new())
    }

    /// Create a range whose results are collected in maps built from `builder`,
    /// which also supplies this process's rank.
    pub fn with_builder(low: T, high: T, builder: DistMapBuilder) -> Result<Self, Error> {
        if low > high {
            return Err(Error::InvalidRange {
                low: format!("{:?}", low),
                high: format!("{:?}", high),
            });
        }
        Ok(Self { low, high, builder })
    }

    /// Inclusive lower bound.
    pub fn low(&self) -> T {
        self.low
    }

    /// Exclusive upper bound.
    pub fn high(&self) -> T {
        self.high
    }

    /// The contiguous block of ids this rank processes.
    pub fn local_block(&self) -> Range<T> {
        let config = self.builder.config();
        block(self.low, self.high, config.rank(), config.n_ranks())
    }
}

/// Block `rank` of `n_ranks` near-equal contiguous blocks of `[low, high)`.
fn block<T: RangeBound>(low: T, high: T, rank: usize, n_ranks: usize) -> Range<T> {
    let (low, high) = (low.to_i128(), high.to_i128());
    let len = high - low;
    let start = low + len * rank as i128 / n_ranks as i128;
    let end = low + len * (rank as i128 + 1) / n_ranks as i128;
    T::from_i128(start)..T::from_i128(end)
}

impl<T> DistRange<T>
where
    T: RangeBound,
    Range<T>: IntoParallelIterator<Item = T>,
{
    /// Run `mapper` on every id of the range and reduce the emissions by key.
    ///
    /// Collective: every rank must call it. Returns this rank's shard of the
    /// result; `default_value` is what the returned map reads for missing keys.
    /// A panicking mapper aborts the whole call.
    pub fn mapreduce<K, V, M, R>(
        &self,
        mapper: M,
        reducer: R,
        default_value: V,
    ) -> Result<DistMap<K, V>, Error>
    where
        K: Hash + Eq + Send + Sync + Serialize + DeserializeOwned,
        V: Clone + Send + Sync + Serialize + DeserializeOwned,
        M: Fn(T, &mut Emitter<'_, K, V>) + Sync + Send,
        R: Fn(V, V) -> V + Sync + Send,
    {
        self.try_mapreduce(
            |id, emitter: &mut Emitter<'_, K, V>| {
                mapper(id, emitter);
                Ok::<(), Error>(())
            },
            reducer,
            default_value,
        )
    }

    /// Like [`mapreduce`](DistRange::mapreduce), for mappers that can fail.
    ///
    /// The first error stops the local computation and is returned. Nothing
    /// is rolled back; the flush is skipped and the transport is aborted, so
    /// the other ranks leave their flush with [`Error::Transport`].
    pub fn try_mapreduce<K, V, E, M, R>(
        &self,
        mapper: M,
        reducer: R,
        default_value: V,
    ) -> Result<DistMap<K, V>, E>
    where
        K: Hash + Eq + Send + Sync + Serialize + DeserializeOwned,
        V: Clone + Send + Sync + Serialize + DeserializeOwned,
        E: From<Error> + Send,
        M: Fn(T, &mut Emitter<'_, K, V>) -> Result<(), E> + Sync + Send,
        R: Fn(V, V) -> V + Sync + Send,
    {
        let accumulator: DistMap<K, V> = self.builder.clone().build_with_default(default_value)?;
        let block = self.local_block();
        let span = debug_span!(
            "mapreduce",
            rank = accumulator.rank(),
            low = ?block.start,
            high = ?block.end
        );
        let _enter = span.enter();

        let hasher = accumulator.hasher();
        let emit_reducer: &(dyn Fn(V, V) -> V + Sync) = &reducer;
        let mapped = block
            .into_par_iter()
            .try_fold(HashTable::<K, V>::new, |mut table, id| {
                let mut emitter = Emitter {
                    table: &mut table,
                    hasher,
                    reducer: emit_reducer,
                };
                mapper(id, &mut emitter)?;
                Ok::<_, E>(table)
            })
            .try_for_each(|table| {
                accumulator.absorb(table?, &reducer);
                Ok::<(), E>(())
            });
        if let Err(err) = mapped {
            warn!(rank = accumulator.rank(), "mapper failed, aborting the group");
            accumulator.abort_group();
            return Err(err);
        }

        debug!(
            n_keys = accumulator.n_keys(),
            pending = accumulator.pending_writes(),
            "map phase complete"
        );
        accumulator.flush_with(&reducer)?;
        Ok(accumulator)
    }
}
