//! # distreduce
//!
//! A process-distributed hash map and a parallel map-reduce engine built on it.
//!
//! Every rank of a process group owns one shard: an open-addressing
//! [`HashTable`] holding the keys whose hash routes to that rank. Writes to
//! keys owned elsewhere are buffered per destination and delivered in bulk by
//! a collective flush, where the owner merges them with a reducer.
//! [`DistRange::mapreduce`] drives a mapper over an integer range in parallel
//! and funnels every emitted pair into such a map.
//!
//! ## Features
//!
//! - **Caller-supplied hashes**: one hash serves both shard routing and bucket placement
//! - **Buffered remote writes**: bursts to the same destination become one payload
//! - **Pluggable transport**: collectives only need `send`, `drain` and `barrier`
//! - **Plain reducers**: any `Fn(V, V) -> V`, with common ones in [`reducer`]
//! - **Statistics**: per-rank load and buffering snapshot
//!
//! ## Example
//!
//! ```rust
//! use distreduce::{reducer, DistRange, Emitter};
//!
//! // Count ids by their last decimal digit.
//! let range = DistRange::new(0u64, 1000)?;
//! let counts = range.mapreduce(
//!     |id, emitter: &mut Emitter<'_, u64, u64>| emitter.emit(id % 10, 1),
//!     reducer::sum,
//!     0,
//! )?;
//!
//! assert_eq!(counts.get(&3), 100);
//! assert_eq!(counts.n_keys(), 10);
//! # Ok::<(), distreduce::Error>(())
//! ```
//!
//! ## Configuration
//!
//! ```rust
//! use distreduce::{DistMapBuilder, HashFunction};
//!
//! let map = DistMapBuilder::new()
//!     .ranks(0, 1)?
//!     .max_load_factor(0.5)?
//!     .hash_function(HashFunction::AHash)
//!     .initial_buckets(1024)
//!     .build::<String, i32>()?;
//! assert!(map.n_buckets() >= 1024);
//! # Ok::<(), distreduce::Error>(())
//! ```

#![deny(missing_docs)]
#![warn(clippy::all)]

/// Opaque binary encoding.
pub mod codec;
/// Configuration and builder types.
pub mod config;
/// Sharded distributed map.
pub mod dist_map;
/// Error types.
pub mod error;
/// Hash function implementations.
pub mod hash;
/// Key-only hash table.
pub mod hash_set;
/// Iterator implementations.
pub mod iter;
/// Range partitioning and the map-reduce engine.
pub mod range;
/// Combine functions.
pub mod reducer;
/// Statistics and metrics collection.
pub mod stats;
/// Local open-addressing hash table.
pub mod table;
/// Point-to-point transport between ranks.
pub mod transport;

// Re-export main types
pub use config::{Config, DistMapBuilder, HashFunction, RoutingConfig, ShardRouter};
pub use dist_map::DistMap;
pub use error::Error;
pub use hash_set::HashSet;
pub use range::{DistRange, Emitter};
pub use stats::{MapOps, Stats};
pub use table::HashTable;
pub use transport::{InMemoryFabric, LocalTransport, Transport};
