//! The pending-call registry: aggregation of call records into [`Batch`]es
//! sharing a batch key, keyed by (function identity, batch key).
//!
//! Heterogeneous `Parallelizable<A, R, K>` instances share one registry, so
//! individual call arguments are stored behind `Box<dyn Any + Send>` and
//! recovered through the owning function's [`ErasedRunner`], which is the
//! only thing that knows the concrete `A`/`R`/`K` to downcast back to.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use crate::cache::CacheOracle;
use crate::error::Result;
use crate::fingerprint::BatchKeyBytes;

/// A type-erased handle to one `Parallelizable<A, R, K>`, captured via the
/// arbitrary-self-type `self: &Arc<Self>` receiver at call time so the
/// registry never needs a separate function lookup table.
pub trait ErasedRunner: Send + Sync {
    /// The stable name by which a genuinely out-of-process backend would
    /// resolve this function; recorded on every `CallRecord` it produces.
    fn identity(&self) -> &str;

    /// Run the batcher over every argument recorded for one batch key and
    /// persist each result into `cache`, keyed by that argument's
    /// fingerprint. `args` are the `Box<dyn Any + Send>` values pushed by
    /// `push`, in arrival order.
    fn run_batch(&self, cache: &dyn CacheOracle, args: Vec<Box<dyn Any + Send>>) -> Result<()>;
}

/// Groups the [`CallRecord`]s sharing one (function identity, batch key).
/// Discarded after the owning backend job completes successfully.
pub struct Batch {
    runner: Arc<dyn ErasedRunner>,
    key_bytes: BatchKeyBytes,
    args: Vec<Box<dyn Any + Send>>,
}

impl Batch {
    fn new(runner: Arc<dyn ErasedRunner>, key_bytes: BatchKeyBytes) -> Self {
        Self {
            runner,
            key_bytes,
            args: Vec::new(),
        }
    }

    pub fn identity(&self) -> &str {
        self.runner.identity()
    }

    pub fn key_bytes(&self) -> &BatchKeyBytes {
        &self.key_bytes
    }

    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    /// Runs this batch's batcher and persists its results. Consumes the
    /// batch — called exactly once, by whichever backend it was submitted
    /// to.
    pub fn run(self, cache: &dyn CacheOracle) -> Result<()> {
        self.runner.run_batch(cache, self.args)
    }
}

#[derive(Clone, PartialEq, Eq, Hash)]
struct PendingKey {
    identity: String,
    key_bytes: BatchKeyBytes,
}

/// The driver's pending-call registry: mutated only during CAPTURING, read
/// (and frozen) when CAPTURING ends.
#[derive(Default)]
pub struct Registry {
    batches: HashMap<PendingKey, Batch>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            batches: HashMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    pub fn clear(&mut self) {
        self.batches.clear();
    }

    /// Record one call's argument under its owning function and batch key.
    pub fn push(
        &mut self,
        runner: Arc<dyn ErasedRunner>,
        key_bytes: BatchKeyBytes,
        arg: Box<dyn Any + Send>,
    ) {
        let pending_key = PendingKey {
            identity: runner.identity().to_string(),
            key_bytes: key_bytes.clone(),
        };
        let batch = self
            .batches
            .entry(pending_key)
            .or_insert_with(|| Batch::new(runner, key_bytes));
        batch.args.push(arg);
    }

    /// Freeze the registry, returning every accumulated batch and leaving it
    /// empty. Called once, at the CAPTURING → COMPUTING transition.
    pub fn drain(&mut self) -> Vec<Batch> {
        self.batches.drain().map(|(_, batch)| batch).collect()
    }
}
