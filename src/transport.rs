//! Point-to-point transfer between ranks.
//!
//! The distributed map only needs three things from the process group: a
//! non-blocking `send` of an opaque payload, a way to collect what other
//! ranks sent, and a collective `barrier`. Bootstrapping a real process group
//! is out of scope; [`InMemoryFabric`] wires ranks together inside one
//! process, one thread per rank.
//!
//! A rank that gives up on a collective calls [`Transport::abort`] so that the
//! others fail out of their barriers instead of waiting forever.

use crate::error::Error;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use tracing::warn;

/// Messaging capability consumed by [`DistMap`](crate::DistMap) collectives.
pub trait Transport: Send + Sync {
    /// Queue `payload` for delivery to rank `dest`. Must not wait on the receiver.
    fn send(&self, dest: usize, payload: Vec<u8>) -> Result<(), Error>;

    /// Take every payload delivered to this rank so far.
    fn drain(&self) -> Result<Vec<Vec<u8>>, Error>;

    /// Block until every rank has called `barrier`.
    fn barrier(&self) -> Result<(), Error>;

    /// Mark the process group failed. Ranks blocked in, or later entering, a
    /// `barrier` get an error.
    fn abort(&self) {}

    /// `(rank, n_ranks)` of this endpoint, if the transport knows them.
    fn ranks(&self) -> Option<(usize, usize)> {
        None
    }
}

/// Transport for a single-rank process group. Every collective is a no-op.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalTransport;

impl Transport for LocalTransport {
    fn send(&self, dest: usize, _payload: Vec<u8>) -> Result<(), Error> {
        Err(Error::Transport(format!(
            "cannot send to rank {} from a single-rank group",
            dest
        )))
    }

    fn drain(&self) -> Result<Vec<Vec<u8>>, Error> {
        Ok(Vec::new())
    }

    fn barrier(&self) -> Result<(), Error> {
        Ok(())
    }

    fn ranks(&self) -> Option<(usize, usize)> {
        Some((0, 1))
    }
}

struct BarrierState {
    arrived: usize,
    generation: u64,
    failed: bool,
}

/// Shared mailboxes and barrier for ranks living in one process.
///
/// The fabric fails as a whole once any endpoint aborts or is dropped; every
/// barrier that has not yet completed then returns [`Error::Transport`].
pub struct InMemoryFabric {
    inboxes: Vec<Mutex<Vec<Vec<u8>>>>,
    state: Mutex<BarrierState>,
    released: Condvar,
}

impl InMemoryFabric {
    /// Create a fabric for `n_ranks` ranks and return one endpoint per rank.
    pub fn endpoints(n_ranks: usize) -> Vec<Arc<InMemoryEndpoint>> {
        let fabric = Arc::new(Self {
            inboxes: (0..n_ranks).map(|_| Mutex::new(Vec::new())).collect(),
            state: Mutex::new(BarrierState {
                arrived: 0,
                generation: 0,
                failed: false,
            }),
            released: Condvar::new(),
        });
        (0..n_ranks)
            .map(|rank| {
                Arc::new(InMemoryEndpoint {
                    rank,
                    fabric: Arc::clone(&fabric),
                })
            })
            .collect()
    }

    fn wait(&self) -> Result<(), Error> {
        let mut state = self.state.lock();
        if state.failed {
            return Err(group_failed());
        }
        let generation = state.generation;
        state.arrived += 1;
        if state.arrived == self.inboxes.len() {
            state.arrived = 0;
            state.generation += 1;
            self.released.notify_all();
            return Ok(());
        }
        // A completed generation wins over a later failure.
        while state.generation == generation {
            if state.failed {
                return Err(group_failed());
            }
            self.released.wait(&mut state);
        }
        Ok(())
    }

    fn fail(&self) {
        let mut state = self.state.lock();
        state.failed = true;
        self.released.notify_all();
    }
}

fn group_failed() -> Error {
    Error::Transport("process group failed".to_string())
}

/// One rank's handle onto an [`InMemoryFabric`].
pub struct InMemoryEndpoint {
    rank: usize,
    fabric: Arc<InMemoryFabric>,
}

impl InMemoryEndpoint {
    /// The rank this endpoint receives for.
    pub fn rank(&self) -> usize {
        self.rank
    }

    /// Number of ranks on the fabric.
    pub fn n_ranks(&self) -> usize {
        self.fabric.inboxes.len()
    }
}

impl Transport for InMemoryEndpoint {
    fn send(&self, dest: usize, payload: Vec<u8>) -> Result<(), Error> {
        let inbox = self
            .fabric
            .inboxes
            .get(dest)
            .ok_or_else(|| Error::Transport(format!("no rank {} on fabric", dest)))?;
        inbox.lock().push(payload);
        Ok(())
    }

    fn drain(&self) -> Result<Vec<Vec<u8>>, Error> {
        Ok(std::mem::take(&mut *self.fabric.inboxes[self.rank].lock()))
    }

    fn barrier(&self) -> Result<(), Error> {
        self.fabric.wait()
    }

    fn abort(&self) {
        warn!(rank = self.rank, "aborting in-memory process group");
        self.fabric.fail();
    }

    fn ranks(&self) -> Option<(usize, usize)> {
        Some((self.rank, self.n_ranks()))
    }
}

/// A rank that goes away, for instance by unwinding, can no longer join
/// barriers, so the rest of the group is failed.
impl Drop for InMemoryEndpoint {
    fn drop(&mut self) {
        self.fabric.fail();
    }
}
