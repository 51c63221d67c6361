use distreduce::{DistMapBuilder, InMemoryFabric};
use std::sync::Arc;
use std::thread;

/// Run `f` once per rank of an in-memory process group, one thread per rank,
/// and collect the results in rank order.
///
/// A rank that panics drops its endpoint, which fails the barriers of the
/// others, so a broken assertion surfaces as a panic rather than a hang.
pub fn run_ranks<T, F>(n_ranks: usize, f: F) -> Vec<T>
where
    T: Send + 'static,
    F: Fn(DistMapBuilder) -> T + Send + Sync + 'static,
{
    let f = Arc::new(f);
    let handles: Vec<_> = InMemoryFabric::endpoints(n_ranks)
        .into_iter()
        .map(|endpoint| {
            let f = Arc::clone(&f);
            thread::spawn(move || {
                let builder = DistMapBuilder::new()
                    .ranks(endpoint.rank(), endpoint.n_ranks())
                    .unwrap()
                    .transport(endpoint);
                f(builder)
            })
        })
        .collect();

    handles.into_iter().map(|h| h.join().unwrap()).collect()
}
