//! Open-addressing hash table used as the storage engine of every shard.
//!
//! Hashes are supplied by the caller so that one hash computation serves both
//! shard routing and bucket placement. Every occupied bucket caches its hash,
//! which lets a rehash reinsert entries without touching the keys.
//!
//! Deletion leaves a tombstone. Tombstones count towards occupancy when
//! deciding whether to rehash and are dropped by every rehash.

use crate::error::Error;
use crate::iter::{Hashed, Iter};
use serde::de::Error as _;
use serde::ser::SerializeStruct;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::borrow::Borrow;
use tracing::debug;

/// Smallest bucket array a table ever holds.
pub const MIN_BUCKETS: usize = 8;

/// Max load factor of a freshly created table.
pub const DEFAULT_MAX_LOAD_FACTOR: f64 = 0.7;

// 2^64 / golden ratio; spreads the hash before taking its high bits.
const HASH_MIX: u64 = 0x9e37_79b9_7f4a_7c15;

#[derive(Debug, Clone)]
pub(crate) enum Bucket<K, V> {
    Empty,
    Tombstone,
    Occupied { key: K, hash: u64, value: V },
}

enum Probe {
    Found(usize),
    Vacant(usize),
}

/// Open-addressing map from key to value with caller-supplied hashes.
///
/// Cloning deep-copies the bucket array and counters.
#[derive(Debug, Clone)]
pub struct HashTable<K, V> {
    buckets: Vec<Bucket<K, V>>,
    n_keys: usize,
    n_tombstones: usize,
    max_load_factor: f64,
}

#[inline]
pub(crate) fn valid_load_factor(max_load_factor: f64) -> bool {
    max_load_factor > 0.0 && max_load_factor <= 1.0
}

/// Whether `used` occupied-or-tombstone buckets are allowed in a table of
/// `n_buckets`. At least one bucket always stays empty so probes terminate.
#[inline]
fn fits(n_buckets: usize, used: usize, max_load_factor: f64) -> bool {
    used <= (n_buckets as f64 * max_load_factor) as usize && used < n_buckets
}

/// Smallest power-of-two bucket count that holds `n_keys` under the load factor.
fn buckets_for(n_keys: usize, max_load_factor: f64) -> usize {
    let mut n_buckets = MIN_BUCKETS;
    while !fits(n_buckets, n_keys, max_load_factor) {
        n_buckets = n_buckets.checked_mul(2).unwrap_or_else(|| capacity_overflow());
    }
    n_buckets
}

#[cold]
#[inline(never)]
fn capacity_overflow() -> ! {
    panic!("hash table capacity overflow");
}

fn empty_buckets<K, V>(n_buckets: usize) -> Vec<Bucket<K, V>> {
    std::iter::repeat_with(|| Bucket::Empty).take(n_buckets).collect()
}

/// Home bucket of a hash: the high bits of the mixed hash. Shard routing
/// consumes the hash modulo the shard count, so the low bits of every key in
/// one shard may be correlated.
#[inline]
fn home(hash: u64, n_buckets: usize) -> usize {
    let bits = n_buckets.trailing_zeros();
    (hash.wrapping_mul(HASH_MIX) >> (64 - bits)) as usize
}

impl<K, V> HashTable<K, V> {
    /// Create an empty table with [`MIN_BUCKETS`] buckets.
    pub fn new() -> Self {
        Self::with_load_factor_unchecked(DEFAULT_MAX_LOAD_FACTOR)
    }

    /// Create an empty table with at least `n_buckets` buckets.
    pub fn with_buckets(n_buckets: usize) -> Self {
        let mut table = Self::new();
        table.reserve(n_buckets);
        table
    }

    pub(crate) fn with_load_factor_unchecked(max_load_factor: f64) -> Self {
        Self {
            buckets: empty_buckets(MIN_BUCKETS),
            n_keys: 0,
            n_tombstones: 0,
            max_load_factor,
        }
    }

    /// Number of keys stored.
    #[inline]
    pub fn n_keys(&self) -> usize {
        self.n_keys
    }

    /// Number of buckets allocated.
    #[inline]
    pub fn n_buckets(&self) -> usize {
        self.buckets.len()
    }

    /// Check if the table holds no keys.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.n_keys == 0
    }

    /// The occupancy ratio above which the table rehashes.
    #[inline]
    pub fn max_load_factor(&self) -> f64 {
        self.max_load_factor
    }

    /// Set the max load factor. Must lie in `(0, 1]`.
    ///
    /// Lowering it below the current occupancy rehashes immediately.
    pub fn set_max_load_factor(&mut self, max_load_factor: f64) -> Result<(), Error> {
        if !valid_load_factor(max_load_factor) {
            return Err(Error::InvalidLoadFactor);
        }
        self.max_load_factor = max_load_factor;
        if !fits(self.buckets.len(), self.n_keys + self.n_tombstones, max_load_factor) {
            let target = buckets_for(self.n_keys, max_load_factor).max(self.buckets.len());
            self.rehash(target);
        }
        Ok(())
    }

    /// Grow the bucket array so that `n_buckets() >= n_buckets`. Never shrinks.
    pub fn reserve(&mut self, n_buckets: usize) {
        if n_buckets <= self.buckets.len() {
            return;
        }
        let target = n_buckets
            .checked_next_power_of_two()
            .unwrap_or_else(|| capacity_overflow());
        self.rehash(target);
    }

    /// Remove every key, keeping the bucket array.
    pub fn clear(&mut self) {
        self.buckets.iter_mut().for_each(|b| *b = Bucket::Empty);
        self.n_keys = 0;
        self.n_tombstones = 0;
    }

    /// Remove every key and release the bucket array down to [`MIN_BUCKETS`].
    pub fn clear_and_shrink(&mut self) {
        self.buckets = empty_buckets(MIN_BUCKETS);
        self.n_keys = 0;
        self.n_tombstones = 0;
    }

    /// Iterate over `(key, value)` pairs in bucket order.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter::new(&self.buckets, self.n_keys)
    }

    pub(crate) fn iter_hashed(&self) -> Hashed<'_, K, V> {
        Hashed::new(&self.buckets, self.n_keys)
    }

    /// Consume the table, yielding `(key, hash, value)` for every entry.
    pub fn into_entries(self) -> impl Iterator<Item = (K, u64, V)> {
        self.buckets.into_iter().filter_map(|bucket| match bucket {
            Bucket::Occupied { key, hash, value } => Some((key, hash, value)),
            _ => None,
        })
    }

    /// Reinsert every occupied bucket into a fresh array of `n_buckets`.
    fn rehash(&mut self, n_buckets: usize) {
        debug!(
            from = self.buckets.len(),
            to = n_buckets,
            n_keys = self.n_keys,
            tombstones = self.n_tombstones,
            "rehashing table"
        );
        let old = std::mem::replace(&mut self.buckets, empty_buckets(n_buckets));
        self.n_tombstones = 0;
        for bucket in old {
            if let Bucket::Occupied { key, hash, value } = bucket {
                let idx = self.vacant_slot(hash);
                self.buckets[idx] = Bucket::Occupied { key, hash, value };
            }
        }
    }

    /// First reusable bucket on the probe sequence of `hash`.
    fn vacant_slot(&self, hash: u64) -> usize {
        let mask = self.buckets.len() - 1;
        let mut idx = home(hash, self.buckets.len());
        let mut step = 0;
        loop {
            if !matches!(self.buckets[idx], Bucket::Occupied { .. }) {
                return idx;
            }
            step += 1;
            idx = (idx + step) & mask;
        }
    }

    /// Make room for one more key before it is written.
    fn grow_for_insert(&mut self) {
        let needed = self.n_keys + 1;
        let threshold = (self.buckets.len() as f64 * self.max_load_factor) as usize;
        if self.n_tombstones > 0 && needed * 2 <= threshold {
            // Mostly tombstones: compact in place.
            self.rehash(self.buckets.len());
            return;
        }
        let doubled = self
            .buckets
            .len()
            .checked_mul(2)
            .unwrap_or_else(|| capacity_overflow());
        self.rehash(buckets_for(needed, self.max_load_factor).max(doubled));
    }
}

impl<K: Eq, V> HashTable<K, V> {
    /// Walk the probe sequence of `hash`. Keys are compared only after a hash
    /// match; tombstones are skipped but remembered as insertion targets.
    fn probe<Q>(&self, key: &Q, hash: u64) -> Probe
    where
        K: Borrow<Q>,
        Q: Eq + ?Sized,
    {
        let n_buckets = self.buckets.len();
        let mask = n_buckets - 1;
        let mut idx = home(hash, n_buckets);
        let mut first_tombstone = None;
        // Triangular steps visit every bucket of a power-of-two table.
        for step in 1..=n_buckets {
            match &self.buckets[idx] {
                Bucket::Empty => return Probe::Vacant(first_tombstone.unwrap_or(idx)),
                Bucket::Tombstone => {
                    first_tombstone.get_or_insert(idx);
                }
                Bucket::Occupied { key: k, hash: h, .. } => {
                    if *h == hash && <K as Borrow<Q>>::borrow(k) == key {
                        return Probe::Found(idx);
                    }
                }
            }
            idx = (idx + step) & mask;
        }
        match first_tombstone {
            Some(idx) => Probe::Vacant(idx),
            None => unreachable!("hash table has no empty bucket"),
        }
    }

    /// Look up a key, returning a reference to its value.
    pub fn find<Q>(&self, key: &Q, hash: u64) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Eq + ?Sized,
    {
        match self.probe(key, hash) {
            Probe::Found(idx) => match &self.buckets[idx] {
                Bucket::Occupied { value, .. } => Some(value),
                _ => None,
            },
            Probe::Vacant(_) => None,
        }
    }

    /// Look up a key, returning a mutable reference to its value.
    pub fn find_mut<Q>(&mut self, key: &Q, hash: u64) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: Eq + ?Sized,
    {
        match self.probe(key, hash) {
            Probe::Found(idx) => match &mut self.buckets[idx] {
                Bucket::Occupied { value, .. } => Some(value),
                _ => None,
            },
            Probe::Vacant(_) => None,
        }
    }

    /// Get a copy of the value for `key`, or `V::default()` if absent.
    pub fn get<Q>(&self, key: &Q, hash: u64) -> V
    where
        K: Borrow<Q>,
        Q: Eq + ?Sized,
        V: Default + Clone,
    {
        self.find(key, hash).cloned().unwrap_or_default()
    }

    /// Get a copy of the value for `key`, or `default` if absent.
    pub fn get_or<Q>(&self, key: &Q, hash: u64, default: V) -> V
    where
        K: Borrow<Q>,
        Q: Eq + ?Sized,
        V: Clone,
    {
        self.find(key, hash).cloned().unwrap_or(default)
    }

    /// Check if a key is present.
    pub fn has<Q>(&self, key: &Q, hash: u64) -> bool
    where
        K: Borrow<Q>,
        Q: Eq + ?Sized,
    {
        matches!(self.probe(key, hash), Probe::Found(_))
    }

    /// Insert a key, replacing any existing value.
    pub fn set(&mut self, key: K, hash: u64, value: V) {
        self.set_with(key, hash, value, crate::reducer::overwrite);
    }

    /// Insert a key, folding `reducer(existing, value)` if it is already present.
    pub fn set_with<R>(&mut self, key: K, hash: u64, value: V, reducer: R)
    where
        R: FnOnce(V, V) -> V,
    {
        match self.probe(&key, hash) {
            Probe::Found(idx) => {
                let bucket = std::mem::replace(&mut self.buckets[idx], Bucket::Tombstone);
                if let Bucket::Occupied { key, hash, value: old } = bucket {
                    // Counted as removed while the reducer runs: if it panics,
                    // the key is gone and the counters agree.
                    self.n_keys -= 1;
                    self.n_tombstones += 1;
                    let value = reducer(old, value);
                    self.buckets[idx] = Bucket::Occupied { key, hash, value };
                    self.n_keys += 1;
                    self.n_tombstones -= 1;
                }
            }
            Probe::Vacant(mut idx) => {
                let used = self.n_keys + self.n_tombstones;
                let reuses_tombstone = matches!(self.buckets[idx], Bucket::Tombstone);
                if !reuses_tombstone && !fits(self.buckets.len(), used + 1, self.max_load_factor) {
                    self.grow_for_insert();
                    idx = self.vacant_slot(hash);
                }
                if matches!(self.buckets[idx], Bucket::Tombstone) {
                    self.n_tombstones -= 1;
                }
                self.buckets[idx] = Bucket::Occupied { key, hash, value };
                self.n_keys += 1;
            }
        }
    }

    /// Remove a key. Returns `false` if it was absent.
    pub fn unset<Q>(&mut self, key: &Q, hash: u64) -> bool
    where
        K: Borrow<Q>,
        Q: Eq + ?Sized,
    {
        match self.probe(key, hash) {
            Probe::Found(idx) => {
                self.buckets[idx] = Bucket::Tombstone;
                self.n_keys -= 1;
                self.n_tombstones += 1;
                true
            }
            Probe::Vacant(_) => false,
        }
    }

    /// Fold every entry of `other` into this table with `reducer`.
    pub fn merge<R>(&mut self, other: HashTable<K, V>, reducer: R)
    where
        R: Fn(V, V) -> V,
    {
        for (key, hash, value) in other.into_entries() {
            self.set_with(key, hash, value, &reducer);
        }
    }
}

impl<K, V> Default for HashTable<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

struct Entries<'a, K, V>(&'a HashTable<K, V>);

impl<K: Serialize, V: Serialize> Serialize for Entries<'_, K, V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.0.iter_hashed())
    }
}

impl<K: Serialize, V: Serialize> Serialize for HashTable<K, V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("HashTable", 3)?;
        state.serialize_field("n_keys", &self.n_keys)?;
        state.serialize_field("max_load_factor", &self.max_load_factor)?;
        state.serialize_field("entries", &Entries(self))?;
        state.end()
    }
}

#[derive(Deserialize)]
#[serde(rename = "HashTable")]
struct TableRepr<K, V> {
    n_keys: usize,
    max_load_factor: f64,
    entries: Vec<(K, u64, V)>,
}

impl<'de, K, V> Deserialize<'de> for HashTable<K, V>
where
    K: Deserialize<'de> + Eq,
    V: Deserialize<'de>,
{
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let repr = TableRepr::<K, V>::deserialize(deserializer)?;
        if !valid_load_factor(repr.max_load_factor) {
            return Err(D::Error::custom("max load factor must be in (0, 1]"));
        }
        if repr.entries.len() != repr.n_keys {
            return Err(D::Error::custom(format!(
                "key count {} disagrees with {} entries",
                repr.n_keys,
                repr.entries.len()
            )));
        }
        let mut table = Self::with_load_factor_unchecked(repr.max_load_factor);
        table.reserve(buckets_for(repr.n_keys, repr.max_load_factor));
        for (key, hash, value) in repr.entries {
            table.set(key, hash, value);
        }
        if table.n_keys != repr.n_keys {
            return Err(D::Error::custom("duplicate key in serialized table"));
        }
        Ok(table)
    }
}
