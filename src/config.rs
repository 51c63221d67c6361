use crate::dist_map::DistMap;
use crate::error::Error;
use crate::hash::ShardHasher;
use crate::table::{valid_load_factor, DEFAULT_MAX_LOAD_FACTOR};
use crate::transport::{LocalTransport, Transport};
use std::hash::Hash;
use std::sync::Arc;

/// Which hash function to use for bucket placement and shard routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HashFunction {
    /// Use ahash with fixed seeds (default, fast and well-distributed).
    #[default]
    AHash,
    /// Use fxhash (faster but potentially less distributed).
    #[cfg(feature = "fxhash")]
    FxHash,
}

/// User-provided shard selection.
///
/// Every rank must route identically, so implementations have to be
/// deterministic functions of the hash and shard count.
pub trait ShardRouter: Send + Sync {
    /// Return the shard index in `[0, shard_count)` for the given key hash.
    fn route(&self, key_hash: u64, shard_count: usize) -> usize;
}

/// Default routing: `hash mod shard_count`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultRouter;

impl ShardRouter for DefaultRouter {
    #[inline]
    fn route(&self, key_hash: u64, shard_count: usize) -> usize {
        (key_hash % shard_count as u64) as usize
    }
}

/// Routing strategy for shard selection.
#[derive(Clone, Default)]
pub enum RoutingConfig {
    /// Default: hash mod shard_count.
    #[default]
    Default,
    /// User-provided router.
    Custom(Arc<dyn ShardRouter>),
}

impl std::fmt::Debug for RoutingConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RoutingConfig::Default => write!(f, "RoutingConfig::Default"),
            RoutingConfig::Custom(_) => write!(f, "RoutingConfig::Custom(...)"),
        }
    }
}

impl RoutingConfig {
    pub(crate) fn into_router(self) -> Arc<dyn ShardRouter> {
        match self {
            RoutingConfig::Default => Arc::new(DefaultRouter),
            RoutingConfig::Custom(router) => router,
        }
    }
}

/// Configuration for a DistMap instance.
#[derive(Debug, Clone)]
pub struct Config {
    pub(crate) rank: usize,
    pub(crate) n_ranks: usize,
    pub(crate) hash_function: HashFunction,
    pub(crate) max_load_factor: f64,
    pub(crate) initial_buckets: Option<usize>,
    pub(crate) routing: RoutingConfig,
}

impl Config {
    /// Create a new config with defaults (rank 0 of 1, ahash, load factor 0.7).
    pub fn new() -> Self {
        Self::default()
    }

    /// Set this process's rank and the size of the process group.
    /// Requires `rank < n_ranks`.
    pub fn ranks(mut self, rank: usize, n_ranks: usize) -> Result<Self, Error> {
        if n_ranks == 0 || rank >= n_ranks {
            return Err(Error::InvalidRank { rank, n_ranks });
        }
        self.rank = rank;
        self.n_ranks = n_ranks;
        Ok(self)
    }

    /// Set the hash function to use.
    pub fn hash_function(mut self, hash_fn: HashFunction) -> Self {
        self.hash_function = hash_fn;
        self
    }

    /// Set the max load factor of the local shard. Must lie in `(0, 1]`.
    pub fn max_load_factor(mut self, max_load_factor: f64) -> Result<Self, Error> {
        if !valid_load_factor(max_load_factor) {
            return Err(Error::InvalidLoadFactor);
        }
        self.max_load_factor = max_load_factor;
        Ok(self)
    }

    /// Reserve at least this many buckets in the local shard up front.
    pub fn initial_buckets(mut self, n_buckets: usize) -> Self {
        self.initial_buckets = Some(n_buckets);
        self
    }

    /// This process's rank.
    pub fn rank(&self) -> usize {
        self.rank
    }

    /// Size of the process group.
    pub fn n_ranks(&self) -> usize {
        self.n_ranks
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rank: 0,
            n_ranks: 1,
            hash_function: HashFunction::AHash,
            max_load_factor: DEFAULT_MAX_LOAD_FACTOR,
            initial_buckets: None,
            routing: RoutingConfig::Default,
        }
    }
}

/// Builder for creating a DistMap with custom configuration.
#[derive(Clone)]
pub struct DistMapBuilder {
    config: Config,
    transport: Option<Arc<dyn Transport>>,
}

impl DistMapBuilder {
    /// Create a new builder with default configuration.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
            transport: None,
        }
    }

    /// Set this process's rank and the size of the process group.
    pub fn ranks(mut self, rank: usize, n_ranks: usize) -> Result<Self, Error> {
        self.config = self.config.ranks(rank, n_ranks)?;
        Ok(self)
    }

    /// Set the transport used by collectives. Required when `n_ranks > 1`.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Set the hash function to use.
    pub fn hash_function(mut self, hash_fn: HashFunction) -> Self {
        self.config = self.config.hash_function(hash_fn);
        self
    }

    /// Set the max load factor of the local shard.
    pub fn max_load_factor(mut self, max_load_factor: f64) -> Result<Self, Error> {
        self.config = self.config.max_load_factor(max_load_factor)?;
        Ok(self)
    }

    /// Reserve at least this many buckets in the local shard up front.
    pub fn initial_buckets(mut self, n_buckets: usize) -> Self {
        self.config = self.config.initial_buckets(n_buckets);
        self
    }

    /// Use a custom shard router.
    pub fn routing(mut self, routing: RoutingConfig) -> Self {
        self.config.routing = routing;
        self
    }

    /// The configuration built so far.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Build a DistMap whose reads of missing keys return `V::default()`.
    pub fn build<K, V>(self) -> Result<DistMap<K, V>, Error>
    where
        K: Hash + Eq,
        V: Clone + Default,
    {
        self.build_with_default(V::default())
    }

    /// Build a DistMap whose reads of missing keys return `default_value`.
    ///
    /// Fails with [`Error::InvalidRank`] if the transport reports a rank or
    /// group size other than the configured ones.
    pub fn build_with_default<K, V>(self, default_value: V) -> Result<DistMap<K, V>, Error>
    where
        K: Hash + Eq,
        V: Clone,
    {
        let transport = match self.transport {
            Some(transport) => transport,
            None if self.config.n_ranks == 1 => Arc::new(LocalTransport),
            None => return Err(Error::MissingTransport),
        };
        if let Some(ranks) = transport.ranks() {
            if ranks != (self.config.rank, self.config.n_ranks) {
                return Err(Error::InvalidRank {
                    rank: self.config.rank,
                    n_ranks: self.config.n_ranks,
                });
            }
        }
        Ok(DistMap::with_parts(self.config, transport, default_value))
    }
}

impl Default for DistMapBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DistMapBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DistMapBuilder")
            .field("config", &self.config)
            .field("transport", &self.transport.as_ref().map(|_| "..."))
            .finish()
    }
}

/// Create a hash function instance based on the configuration.
pub(crate) fn create_hasher(hash_fn: HashFunction) -> ShardHasher {
    match hash_fn {
        HashFunction::AHash => ShardHasher::default(),
        #[cfg(feature = "fxhash")]
        HashFunction::FxHash => ShardHasher::FxHash,
    }
}
