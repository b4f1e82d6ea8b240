//! The abstract dispatch contract a parallelization backend must satisfy.
//! The core never spawns threads itself; all fan-out concurrency lives
//! behind this trait.

use crate::cache::CacheOracle;
use crate::error::Result;
use crate::registry::Batch;
use std::sync::Arc;

/// Opaque handle to one submitted [`Batch`]. Backends are free to choose the
/// representation; the reference [`crate::pool::ThreadPoolBackend`] uses a
/// monotonic counter.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct JobHandle(pub u64);

/// An executor for batches. Implementors are responsible for running each
/// submitted batch's batcher and persisting its results into the supplied
/// cache oracle — the driver's only visibility into completion is through
/// `prune`, never through a result channel.
pub trait Backend: Send + Sync {
    /// Accept one batch for asynchronous execution against `cache`, returning
    /// an opaque handle the driver will later pass to `prune`.
    fn submit(&self, cache: Arc<dyn CacheOracle>, batch: Batch) -> Result<JobHandle>;

    /// Given the current set of outstanding handles, return the subset still
    /// incomplete. Called repeatedly by the driver until it returns empty.
    fn prune(&self, handles: &[JobHandle]) -> Result<Vec<JobHandle>>;
}
