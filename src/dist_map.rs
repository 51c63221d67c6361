use crate::codec::{self, Message};
use crate::config::{create_hasher, Config, ShardRouter};
use crate::error::Error;
use crate::hash::ShardHasher;
use crate::iter::SnapshotIter;
use crate::reducer;
use crate::stats::{MapCounters, Stats};
use crate::table::HashTable;
use crate::transport::{LocalTransport, Transport};
use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::borrow::Borrow;
use std::hash::Hash;
use std::sync::Arc;
use tracing::{debug, debug_span, trace};

/// Hash map sharded across the ranks of a process group.
///
/// Each rank materializes one shard, the keys whose hash routes to it. Writes
/// to keys owned by this rank are applied immediately; writes to keys owned by
/// another rank are buffered per destination and delivered by the next
/// [`flush`](DistMap::flush). Reads, sizes and capacity management all act on
/// the local shard.
///
/// All methods take `&self`, so a map can be shared by the threads of one
/// process. Structural changes of the local shard happen under its write lock.
///
/// # Example
///
/// ```rust
/// use distreduce::{reducer, DistMap};
///
/// let map: DistMap<String, i32> = DistMap::new();
/// map.async_set("aa".to_string(), 1);
/// map.async_set_with("aa".to_string(), 2, reducer::sum);
/// map.flush().unwrap();
/// assert_eq!(map.get("aa"), 3);
/// assert_eq!(map.get("missing"), 0);
/// ```
pub struct DistMap<K, V> {
    local: RwLock<HashTable<K, V>>,
    outbound: Vec<Mutex<HashTable<K, V>>>,
    rank: usize,
    n_ranks: usize,
    hasher: ShardHasher,
    router: Arc<dyn ShardRouter>,
    transport: Arc<dyn Transport>,
    default_value: V,
    counters: MapCounters,
}

impl<K, V> DistMap<K, V>
where
    K: Hash + Eq,
    V: Clone,
{
    /// Create a single-rank map whose reads of missing keys return `V::default()`.
    pub fn new() -> Self
    where
        V: Default,
    {
        Self::with_parts(Config::default(), Arc::new(LocalTransport), V::default())
    }

    pub(crate) fn with_parts(
        config: Config,
        transport: Arc<dyn Transport>,
        default_value: V,
    ) -> Self {
        let mut local = HashTable::with_load_factor_unchecked(config.max_load_factor);
        if let Some(n_buckets) = config.initial_buckets {
            local.reserve(n_buckets);
        }
        Self {
            local: RwLock::new(local),
            outbound: Self::empty_outbound(config.n_ranks),
            rank: config.rank,
            n_ranks: config.n_ranks,
            hasher: create_hasher(config.hash_function),
            router: config.routing.into_router(),
            transport,
            default_value,
            counters: MapCounters::new(),
        }
    }

    fn empty_outbound(n_ranks: usize) -> Vec<Mutex<HashTable<K, V>>> {
        (0..n_ranks).map(|_| Mutex::new(HashTable::new())).collect()
    }

    /// This process's rank.
    pub fn rank(&self) -> usize {
        self.rank
    }

    /// Number of ranks, which is also the number of shards.
    pub fn n_ranks(&self) -> usize {
        self.n_ranks
    }

    /// The value returned by [`get`](DistMap::get) for missing keys.
    pub fn default_value(&self) -> &V {
        &self.default_value
    }

    pub(crate) fn hasher(&self) -> &ShardHasher {
        &self.hasher
    }

    #[inline]
    fn route(&self, hash: u64) -> usize {
        let shard = self.router.route(hash, self.n_ranks);
        debug_assert!(shard < self.n_ranks, "router returned shard {} of {}", shard, self.n_ranks);
        shard
    }

    /// The rank that owns `key`.
    pub fn shard_of<Q>(&self, key: &Q) -> usize
    where
        K: Borrow<Q>,
        Q: Hash + ?Sized,
    {
        self.route(self.hasher.hash_key(key))
    }

    /// Check if `key` is owned by this rank.
    pub fn is_local<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + ?Sized,
    {
        self.shard_of(key) == self.rank
    }

    /// Write `key`, replacing any existing value at its owner.
    pub fn async_set(&self, key: K, value: V) {
        self.async_set_with(key, value, reducer::overwrite);
    }

    /// Write `key`, combining with any existing value through `reducer(old, new)`.
    ///
    /// Keys owned by this rank are updated before this returns. Keys owned by
    /// another rank are buffered; writes to the same key are combined in
    /// arrival order, and the result is merged at the owner on the next flush.
    pub fn async_set_with<R>(&self, key: K, value: V, reducer: R)
    where
        R: FnOnce(V, V) -> V,
    {
        let hash = self.hasher.hash_key(&key);
        self.async_set_hashed(key, hash, value, reducer);
    }

    pub(crate) fn async_set_hashed<R>(&self, key: K, hash: u64, value: V, reducer: R)
    where
        R: FnOnce(V, V) -> V,
    {
        let dest = self.route(hash);
        if dest == self.rank {
            self.local.write().set_with(key, hash, value, reducer);
            self.counters.record_local_write();
        } else {
            self.outbound[dest].lock().set_with(key, hash, value, reducer);
            self.counters.record_remote_write();
        }
    }

    /// Route every entry of a privately built table, holding the local write
    /// lock once for the whole batch.
    pub(crate) fn absorb<R>(&self, table: HashTable<K, V>, reducer: &R)
    where
        R: Fn(V, V) -> V,
    {
        let mut local = self.local.write();
        for (key, hash, value) in table.into_entries() {
            let dest = self.route(hash);
            if dest == self.rank {
                local.set_with(key, hash, value, reducer);
                self.counters.record_local_write();
            } else {
                self.outbound[dest].lock().set_with(key, hash, value, reducer);
                self.counters.record_remote_write();
            }
        }
    }

    /// Get a copy of the value for `key` from the local shard.
    ///
    /// Returns `None` for keys owned by another rank: writes to them are
    /// delivered to their owner, not cached here.
    pub fn find<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = self.hasher.hash_key(key);
        self.local.read().find(key, hash).cloned()
    }

    /// Get the value for `key`, or the map's default value if absent.
    pub fn get<Q>(&self, key: &Q) -> V
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.find(key).unwrap_or_else(|| self.default_value.clone())
    }

    /// Get the value for `key`, or `default` if absent.
    pub fn get_or<Q>(&self, key: &Q, default: V) -> V
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.find(key).unwrap_or(default)
    }

    /// Check if `key` is present in the local shard.
    pub fn has<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = self.hasher.hash_key(key);
        self.local.read().has(key, hash)
    }

    /// Remove `key` from the local shard. Returns `false` if it was absent.
    pub fn unset<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = self.hasher.hash_key(key);
        self.local.write().unset(key, hash)
    }

    /// Grow the local shard so that `n_buckets() >= n_buckets`.
    pub fn reserve(&self, n_buckets: usize) {
        self.local.write().reserve(n_buckets);
    }

    /// Buckets allocated by the local shard.
    pub fn n_buckets(&self) -> usize {
        self.local.read().n_buckets()
    }

    /// Keys in the local shard. See [`global_n_keys`](DistMap::global_n_keys)
    /// for the group-wide count.
    pub fn n_keys(&self) -> usize {
        self.local.read().n_keys()
    }

    /// Check if the local shard is empty.
    pub fn is_empty(&self) -> bool {
        self.local.read().is_empty()
    }

    /// Max load factor of the local shard.
    pub fn max_load_factor(&self) -> f64 {
        self.local.read().max_load_factor()
    }

    /// Set the max load factor of the local shard. Must lie in `(0, 1]`.
    pub fn set_max_load_factor(&self, max_load_factor: f64) -> Result<(), Error> {
        self.local.write().set_max_load_factor(max_load_factor)
    }

    /// Remove every key from the local shard and drop all buffered writes.
    pub fn clear(&self) {
        self.local.write().clear();
        for buffer in &self.outbound {
            buffer.lock().clear();
        }
    }

    /// Like [`clear`](DistMap::clear), also releasing the shard's bucket array.
    pub fn clear_and_shrink(&self) {
        self.local.write().clear_and_shrink();
        for buffer in &self.outbound {
            *buffer.lock() = HashTable::new();
        }
    }

    /// Distinct keys buffered for other ranks and not yet flushed.
    pub fn pending_writes(&self) -> usize {
        self.outbound.iter().map(|b| b.lock().n_keys()).sum()
    }

    /// Call `f` on every entry of the local shard under a read lock.
    ///
    /// `f` must not write to this map: the lock is not reentrant, so a call to
    /// `async_set`, `unset` or any other writer from inside `f` deadlocks. Use
    /// [`iter_snapshot`](DistMap::iter_snapshot) to visit entries while writing.
    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(&K, &V),
    {
        for (key, value) in self.local.read().iter() {
            f(key, value);
        }
    }

    /// Snapshot the local shard into an owning iterator.
    pub fn iter_snapshot(&self) -> SnapshotIter<K, V>
    where
        K: Clone,
    {
        SnapshotIter::new(&self.local)
    }

    /// Mark the process group failed so that other ranks leave their
    /// collectives with an error.
    pub(crate) fn abort_group(&self) {
        self.transport.abort();
    }

    fn or_abort<T>(&self, result: Result<T, Error>) -> Result<T, Error> {
        if result.is_err() {
            self.abort_group();
        }
        result
    }

    /// Get a snapshot of this rank's view of the map.
    pub fn stats(&self) -> Stats {
        let local = self.local.read();
        let n_buckets = local.n_buckets();
        Stats {
            rank: self.rank,
            n_ranks: self.n_ranks,
            local_keys: local.n_keys(),
            n_buckets,
            load_factor: local.n_keys() as f64 / n_buckets as f64,
            max_load_factor: local.max_load_factor(),
            pending_writes: self.outbound.iter().map(|b| b.lock().n_keys()).collect(),
            operations: self.counters.snapshot(),
        }
    }
}

impl<K, V> DistMap<K, V>
where
    K: Hash + Eq + Serialize + DeserializeOwned,
    V: Clone + Serialize + DeserializeOwned,
{
    /// Deliver buffered writes, overwriting whatever their owners hold.
    ///
    /// Collective: every rank must call it.
    pub fn flush(&self) -> Result<(), Error> {
        self.flush_with(reducer::overwrite)
    }

    /// Deliver buffered writes to their owners, which merge each one into
    /// their shard with `reducer(existing, incoming)`.
    ///
    /// Collective: every rank must call it, and none returns before all have
    /// merged what they received.
    ///
    /// On error the process group is aborted, so ranks still waiting in the
    /// flush fail instead of blocking.
    pub fn flush_with<R>(&self, reducer: R) -> Result<(), Error>
    where
        R: Fn(V, V) -> V,
    {
        self.or_abort(self.exchange_writes(reducer))
    }

    fn exchange_writes<R>(&self, reducer: R) -> Result<(), Error>
    where
        R: Fn(V, V) -> V,
    {
        let span = debug_span!("flush", rank = self.rank, n_ranks = self.n_ranks);
        let _enter = span.enter();

        for dest in (0..self.n_ranks).filter(|&dest| dest != self.rank) {
            let pending = std::mem::take(&mut *self.outbound[dest].lock());
            if pending.is_empty() {
                continue;
            }
            let entries: Vec<(K, u64, V)> = pending.into_entries().collect();
            let n_entries = entries.len();
            let payload = codec::serialize(&Message::Writes(entries))?;
            debug!(dest, entries = n_entries, bytes = payload.len(), "sending buffered writes");
            self.transport.send(dest, payload)?;
        }
        self.transport.barrier()?;

        let mut merged = 0u64;
        for payload in self.transport.drain()? {
            match codec::parse::<Message<K, V>>(&payload)? {
                Message::Writes(entries) => {
                    trace!(entries = entries.len(), "merging buffered writes");
                    merged += entries.len() as u64;
                    let mut local = self.local.write();
                    for (key, hash, value) in entries {
                        local.set_with(key, hash, value, &reducer);
                    }
                }
                Message::KeyCount(_) => {
                    return Err(Error::Transport(
                        "received a key count while flushing writes".to_string(),
                    ));
                }
            }
        }
        self.counters.record_merged_writes(merged);
        self.transport.barrier()?;
        self.counters.record_flush();
        debug!(merged, n_keys = self.n_keys(), "flush complete");
        Ok(())
    }

    /// Sum of the local key counts of every rank.
    ///
    /// Collective: every rank must call it.
    pub fn global_n_keys(&self) -> Result<usize, Error> {
        self.or_abort(self.exchange_key_counts())
    }

    fn exchange_key_counts(&self) -> Result<usize, Error> {
        let local = self.n_keys() as u64;
        let payload = codec::serialize(&Message::<K, V>::KeyCount(local))?;
        for dest in (0..self.n_ranks).filter(|&dest| dest != self.rank) {
            self.transport.send(dest, payload.clone())?;
        }
        self.transport.barrier()?;

        let mut total = local;
        for payload in self.transport.drain()? {
            match codec::parse::<Message<K, V>>(&payload)? {
                Message::KeyCount(n) => total += n,
                Message::Writes(_) => {
                    return Err(Error::Transport(
                        "received buffered writes while counting keys".to_string(),
                    ));
                }
            }
        }
        self.transport.barrier()?;
        Ok(total as usize)
    }

    /// Encode the local shard.
    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        codec::serialize(&*self.local.read())
    }

    /// Replace the local shard with one decoded from [`to_bytes`](DistMap::to_bytes).
    ///
    /// Buffered writes are kept.
    pub fn load_bytes(&self, bytes: &[u8]) -> Result<(), Error> {
        let table: HashTable<K, V> = codec::parse(bytes)?;
        *self.local.write() = table;
        Ok(())
    }
}

impl<K, V> Default for DistMap<K, V>
where
    K: Hash + Eq,
    V: Clone + Default,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Deep-copies the local shard. The copy starts with empty outbound buffers
/// and shares the source's rank configuration and transport.
impl<K, V> Clone for DistMap<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    fn clone(&self) -> Self {
        Self {
            local: RwLock::new(self.local.read().clone()),
            outbound: Self::empty_outbound(self.n_ranks),
            rank: self.rank,
            n_ranks: self.n_ranks,
            hasher: self.hasher.clone(),
            router: Arc::clone(&self.router),
            transport: Arc::clone(&self.transport),
            default_value: self.default_value.clone(),
            counters: MapCounters::new(),
        }
    }
}

impl<K, V> std::fmt::Debug for DistMap<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let local = self.local.read();
        f.debug_struct("DistMap")
            .field("rank", &self.rank)
            .field("n_ranks", &self.n_ranks)
            .field("n_keys", &local.n_keys())
            .field("n_buckets", &local.n_buckets())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DistMapBuilder, RoutingConfig};

    /// Routes even hashes to rank 0 and odd hashes to rank 1.
    struct ParityRouter;

    impl ShardRouter for ParityRouter {
        fn route(&self, key_hash: u64, shard_count: usize) -> usize {
            (key_hash % 2) as usize % shard_count
        }
    }

    #[test]
    fn test_remote_writes_are_buffered() {
        // Rank 0 of 2 with a transport that nobody else drains: only local
        // bookkeeping is exercised here.
        let endpoints = crate::transport::InMemoryFabric::endpoints(2);
        let map: DistMap<u64, u64> = DistMapBuilder::new()
            .ranks(0, 2)
            .unwrap()
            .transport(endpoints[0].clone())
            .routing(RoutingConfig::Custom(Arc::new(ParityRouter)))
            .build()
            .unwrap();

        let mut local = 0;
        for i in 0..100u64 {
            map.async_set_with(i, 1, reducer::sum);
            map.async_set_with(i, 1, reducer::sum);
            if map.is_local(&i) {
                local += 1;
                assert_eq!(map.get(&i), 2);
            } else {
                assert_eq!(map.find(&i), None);
            }
        }
        assert_eq!(map.n_keys(), local);
        assert_eq!(map.pending_writes(), 100 - local);
        assert_eq!(map.stats().pending_writes[1], 100 - local);

        map.clear();
        assert_eq!(map.pending_writes(), 0);
        assert_eq!(map.n_keys(), 0);
    }

    #[test]
    fn test_clone_drops_pending_buffers() {
        let endpoints = crate::transport::InMemoryFabric::endpoints(2);
        let map: DistMap<u64, u64> = DistMapBuilder::new()
            .ranks(1, 2)
            .unwrap()
            .transport(endpoints[1].clone())
            .build()
            .unwrap();
        for i in 0..50u64 {
            map.async_set(i, i);
        }
        let copy = map.clone();
        assert_eq!(copy.pending_writes(), 0);
        assert_eq!(copy.n_keys(), map.n_keys());
        assert_eq!(copy.rank(), 1);
    }

    #[test]
    fn test_single_rank_collectives() {
        let map: DistMap<String, i32> = DistMap::new();
        map.async_set("aa".to_string(), 1);
        map.flush().unwrap();
        assert_eq!(map.global_n_keys().unwrap(), 1);
        assert_eq!(map.pending_writes(), 0);
    }

    #[test]
    fn test_bytes_round_trip() {
        let map: DistMap<String, i32> = DistMap::new();
        map.async_set("aa".to_string(), 1);
        map.async_set("bbb".to_string(), 2);
        let bytes = map.to_bytes().unwrap();

        let restored: DistMap<String, i32> = DistMap::new();
        restored.load_bytes(&bytes).unwrap();
        assert_eq!(restored.n_keys(), 2);
        assert_eq!(restored.get("aa"), 1);
        assert_eq!(restored.get("bbb"), 2);
        assert!(restored.load_bytes(&[0xff]).is_err());
    }
}
