use crate::error::Error;
use crate::table::HashTable;
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;

/// Key-only variant of [`HashTable`], sharing its probing and rehash rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(serialize = "K: Serialize", deserialize = "K: Deserialize<'de> + Eq"))]
pub struct HashSet<K> {
    table: HashTable<K, ()>,
}

impl<K: Eq> HashSet<K> {
    /// Create an empty set.
    pub fn new() -> Self {
        Self {
            table: HashTable::new(),
        }
    }

    /// Insert a key. Inserting a present key is a no-op.
    pub fn set(&mut self, key: K, hash: u64) {
        self.table.set_with(key, hash, (), crate::reducer::keep);
    }

    /// Remove a key. Returns `false` if it was absent.
    pub fn unset<Q>(&mut self, key: &Q, hash: u64) -> bool
    where
        K: Borrow<Q>,
        Q: Eq + ?Sized,
    {
        self.table.unset(key, hash)
    }

    /// Check if a key is present.
    pub fn has<Q>(&self, key: &Q, hash: u64) -> bool
    where
        K: Borrow<Q>,
        Q: Eq + ?Sized,
    {
        self.table.has(key, hash)
    }

    /// Number of keys stored.
    pub fn n_keys(&self) -> usize {
        self.table.n_keys()
    }

    /// Number of buckets allocated.
    pub fn n_buckets(&self) -> usize {
        self.table.n_buckets()
    }

    /// See [`HashTable::max_load_factor`].
    pub fn max_load_factor(&self) -> f64 {
        self.table.max_load_factor()
    }

    /// See [`HashTable::set_max_load_factor`].
    pub fn set_max_load_factor(&mut self, max_load_factor: f64) -> Result<(), Error> {
        self.table.set_max_load_factor(max_load_factor)
    }

    /// See [`HashTable::reserve`].
    pub fn reserve(&mut self, n_buckets: usize) {
        self.table.reserve(n_buckets);
    }

    /// Remove every key, keeping the bucket array.
    pub fn clear(&mut self) {
        self.table.clear();
    }

    /// Remove every key and release the bucket array.
    pub fn clear_and_shrink(&mut self) {
        self.table.clear_and_shrink();
    }

    /// Iterate over the keys in bucket order.
    pub fn keys(&self) -> impl Iterator<Item = &K> + '_ {
        self.table.iter().map(|(k, _)| k)
    }
}

impl<K> Default for HashSet<K> {
    fn default() -> Self {
        Self {
            table: HashTable::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::ShardHasher;

    fn h<Q: std::hash::Hash + ?Sized>(key: &Q) -> u64 {
        ShardHasher::default().hash_key(key)
    }

    #[test]
    fn test_initialization() {
        let m: HashSet<String> = HashSet::new();
        assert_eq!(m.n_keys(), 0);
    }

    #[test]
    fn test_set_has_unset() {
        let mut m: HashSet<String> = HashSet::new();
        m.set("aa".to_string(), h("aa"));
        m.set("aa".to_string(), h("aa"));
        assert!(m.has("aa", h("aa")));
        assert_eq!(m.n_keys(), 1);
        assert!(m.unset("aa", h("aa")));
        assert!(!m.has("aa", h("aa")));
        assert!(!m.unset("aa", h("aa")));
    }

    #[test]
    fn test_copy() {
        let mut m: HashSet<String> = HashSet::new();
        m.set("aa".to_string(), h("aa"));
        let m2 = m.clone();
        m.clear();
        assert!(m2.has("aa", h("aa")));
    }

    #[test]
    fn test_round_trip() {
        let mut m: HashSet<u64> = HashSet::new();
        for i in 0..50u64 {
            m.set(i, h(&i));
        }
        let bytes = crate::codec::serialize(&m).unwrap();
        let m2: HashSet<u64> = crate::codec::parse(&bytes).unwrap();
        assert_eq!(m2.n_keys(), 50);
        assert!((0..50u64).all(|i| m2.has(&i, h(&i))));
        assert_eq!(m2.keys().count(), 50);
    }
}
