use crate::table::{Bucket, HashTable};
use parking_lot::RwLock;

/// Borrowing iterator over the occupied buckets of a [`HashTable`].
pub struct Iter<'a, K, V> {
    buckets: std::slice::Iter<'a, Bucket<K, V>>,
    remaining: usize,
}

impl<'a, K, V> Iter<'a, K, V> {
    pub(crate) fn new(buckets: &'a [Bucket<K, V>], n_keys: usize) -> Self {
        Self {
            buckets: buckets.iter(),
            remaining: n_keys,
        }
    }
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        for bucket in self.buckets.by_ref() {
            if let Bucket::Occupied { key, value, .. } = bucket {
                self.remaining -= 1;
                return Some((key, value));
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V> ExactSizeIterator for Iter<'_, K, V> {}

/// Like [`Iter`] but also yields the cached hash of each entry.
pub(crate) struct Hashed<'a, K, V> {
    buckets: std::slice::Iter<'a, Bucket<K, V>>,
    remaining: usize,
}

impl<'a, K, V> Hashed<'a, K, V> {
    pub(crate) fn new(buckets: &'a [Bucket<K, V>], n_keys: usize) -> Self {
        Self {
            buckets: buckets.iter(),
            remaining: n_keys,
        }
    }
}

impl<'a, K, V> Iterator for Hashed<'a, K, V> {
    type Item = (&'a K, u64, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        for bucket in self.buckets.by_ref() {
            if let Bucket::Occupied { key, hash, value } = bucket {
                self.remaining -= 1;
                return Some((key, *hash, value));
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V> ExactSizeIterator for Hashed<'_, K, V> {}

/// Snapshot-based iterator over the local shard of a distributed map.
///
/// Entries are copied out under a single read lock, so the iterator does not
/// see writes made after it was created.
pub struct SnapshotIter<K, V> {
    entries: std::vec::IntoIter<(K, V)>,
}

impl<K, V> SnapshotIter<K, V>
where
    K: Clone,
    V: Clone,
{
    pub(crate) fn new(table: &RwLock<HashTable<K, V>>) -> Self {
        let table = table.read();
        let entries: Vec<(K, V)> = table.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        Self {
            entries: entries.into_iter(),
        }
    }
}

impl<K, V> Iterator for SnapshotIter<K, V> {
    type Item = (K, V);

    fn next(&mut self) -> Option<Self::Item> {
        self.entries.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.entries.size_hint()
    }
}

impl<K, V> ExactSizeIterator for SnapshotIter<K, V> {}
