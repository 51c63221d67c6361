use std::hash::{BuildHasher, Hash};

// Fixed seeds so every process derives the same hash, and hence the same
// owning shard, for a key.
const AHASH_SEEDS: [u64; 4] = [
    0x243f_6a88_85a3_08d3,
    0x1319_8a2e_0370_7344,
    0xa409_3822_299f_31d0,
    0x082e_fa98_ec4e_6c89,
];

/// Hash function implementation for bucket placement and shard routing.
/// Uses an enum to avoid trait object limitations with generics.
#[derive(Clone)]
pub enum ShardHasher {
    /// AHash with fixed seeds (default, fast and well-distributed).
    AHash(ahash::RandomState),
    /// FxHash implementation (faster but potentially less distributed).
    #[cfg(feature = "fxhash")]
    FxHash,
}

impl ShardHasher {
    /// Hash a key. The result is stable across processes running the same build.
    pub fn hash_key<Q: Hash + ?Sized>(&self, key: &Q) -> u64 {
        match self {
            ShardHasher::AHash(state) => BuildHasher::hash_one(state, key),
            #[cfg(feature = "fxhash")]
            ShardHasher::FxHash => fxhash::hash64(key),
        }
    }
}

impl Default for ShardHasher {
    fn default() -> Self {
        let [k0, k1, k2, k3] = AHASH_SEEDS;
        ShardHasher::AHash(ahash::RandomState::with_seeds(k0, k1, k2, k3))
    }
}

impl std::fmt::Debug for ShardHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShardHasher::AHash(_) => write!(f, "ShardHasher::AHash"),
            #[cfg(feature = "fxhash")]
            ShardHasher::FxHash => write!(f, "ShardHasher::FxHash"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_deterministic_across_instances() {
        let a = ShardHasher::default();
        let b = ShardHasher::default();
        for i in 0..100u64 {
            assert_eq!(a.hash_key(&i), b.hash_key(&i));
        }
        assert_eq!(a.hash_key("aa"), b.hash_key(&"aa".to_string()));
    }
}
