//! `ThreadPoolBackend` — the reference [`Backend`] implementation, a
//! fixed-size pool of persistent worker threads.
//!
//! ## Design
//!
//! Each pool slot is a dedicated OS thread that:
//! 1. Blocks indefinitely on a `Receiver<WorkItem>` channel.
//! 2. On receiving a work item: runs the batch's batcher against the shared
//!    cache oracle, records the outcome, and returns its sender to the
//!    available queue.
//!
//! This is a persistent-thread-per-slot actor model, the same one a
//! worker pool for a non-`Send` interpreter would use, generalized here
//! from "run source on a non-`Send` VM" to "run an opaque, already-resolved
//! `Batch`".
//! Because the batch's [`crate::registry::ErasedRunner`] is captured directly
//! from the `Parallelizable` at batch-aggregation time rather than looked up
//! by name on the worker side, this backend is necessarily in-process — a
//! genuinely out-of-process backend (subprocess, cluster, queue) would
//! resolve the function fresh from `Batch::identity()` on the worker side.
//! This simplification is recorded in `DESIGN.md`.
//!
//! ## Thread safety
//!
//! Slot dispatch uses `Mutex<VecDeque<SyncSender<WorkItem>>>` + `Condvar` to
//! hand work channels to calling threads.
//!
//! ## Pool size
//!
//! Configured via `CAPTURE_DRIVER_POOL_SIZE` env var at first call to
//! [`ThreadPoolBackend::global`]. Default: 4.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, OnceLock};

use tracing::{debug, warn};

use crate::backend::{Backend, JobHandle};
use crate::cache::CacheOracle;
use crate::error::{Error, Result};
use crate::registry::Batch;

enum JobStatus {
    Pending,
    Done(Result<()>),
}

struct WorkItem {
    handle: JobHandle,
    batch: Batch,
    cache: Arc<dyn CacheOracle>,
}

fn start_slot_thread(
    slot_id: usize,
    available: Arc<(Mutex<VecDeque<std::sync::mpsc::SyncSender<WorkItem>>>, Condvar)>,
    statuses: Arc<Mutex<HashMap<JobHandle, JobStatus>>>,
) -> std::sync::mpsc::SyncSender<WorkItem> {
    let (tx, rx) = std::sync::mpsc::sync_channel::<WorkItem>(1);
    let tx_for_pool = tx.clone();

    std::thread::Builder::new()
        .name(format!("capture-driver-pool-slot-{slot_id}"))
        .spawn(move || {
            {
                let (lock, cvar) = &*available;
                let mut queue = lock.lock().expect("pool slot queue poisoned");
                queue.push_back(tx.clone());
                cvar.notify_one();
            }

            loop {
                let item = match rx.recv() {
                    Ok(item) => item,
                    Err(_) => break,
                };

                debug!(slot = slot_id, identity = item.batch.identity(), "running batch");
                let outcome = item.batch.run(item.cache.as_ref());
                if let Err(ref e) = outcome {
                    warn!(slot = slot_id, error = %e, "batch failed");
                }

                {
                    let mut statuses = statuses.lock().expect("job status map poisoned");
                    statuses.insert(item.handle, JobStatus::Done(outcome));
                }

                {
                    let (lock, cvar) = &*available;
                    let mut queue = lock.lock().expect("pool slot queue poisoned");
                    queue.push_back(tx.clone());
                    cvar.notify_one();
                }
            }
        })
        .expect("failed to spawn pool slot thread");

    tx_for_pool
}

/// Fixed-size pool of persistent worker threads, the reference [`Backend`].
pub struct ThreadPoolBackend {
    available: Arc<(Mutex<VecDeque<std::sync::mpsc::SyncSender<WorkItem>>>, Condvar)>,
    statuses: Arc<Mutex<HashMap<JobHandle, JobStatus>>>,
    next_handle: AtomicU64,
    target_size: usize,
}

impl ThreadPoolBackend {
    /// Creates and pre-warms a pool of `size` worker threads. Blocks until
    /// all slots have reported themselves available. `size == 0` is treated
    /// as 1.
    pub fn new(size: usize) -> Self {
        let target_size = size.max(1);
        let available = Arc::new((
            Mutex::new(VecDeque::with_capacity(target_size)),
            Condvar::new(),
        ));
        let statuses = Arc::new(Mutex::new(HashMap::new()));

        for slot_id in 0..target_size {
            start_slot_thread(slot_id, Arc::clone(&available), Arc::clone(&statuses));
        }

        {
            let (lock, cvar) = &*available;
            let mut queue = lock.lock().expect("pool queue poisoned");
            while queue.len() < target_size {
                queue = cvar.wait(queue).expect("pool condvar poisoned");
            }
        }

        ThreadPoolBackend {
            available,
            statuses,
            next_handle: AtomicU64::new(0),
            target_size,
        }
    }

    /// Returns the process-global pool singleton, sized from
    /// `CAPTURE_DRIVER_POOL_SIZE` (default 4).
    pub fn global() -> &'static ThreadPoolBackend {
        static INSTANCE: OnceLock<ThreadPoolBackend> = OnceLock::new();
        INSTANCE.get_or_init(|| {
            let size: usize = std::env::var("CAPTURE_DRIVER_POOL_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(4);
            ThreadPoolBackend::new(size)
        })
    }

    /// Number of idle (available) slots.
    pub fn idle_count(&self) -> usize {
        let (lock, _) = &*self.available;
        lock.lock().expect("pool queue poisoned").len()
    }

    /// Configured pool size (idle + active).
    pub fn size(&self) -> usize {
        self.target_size
    }
}

impl Backend for ThreadPoolBackend {
    fn submit(&self, cache: Arc<dyn CacheOracle>, batch: Batch) -> Result<JobHandle> {
        let handle = JobHandle(self.next_handle.fetch_add(1, Ordering::SeqCst));
        {
            let mut statuses = self.statuses.lock().expect("job status map poisoned");
            statuses.insert(handle, JobStatus::Pending);
        }

        let (lock, cvar) = &*self.available;
        let slot_tx = {
            let mut queue = lock.lock().expect("pool queue poisoned");
            loop {
                if let Some(tx) = queue.pop_front() {
                    break tx;
                }
                queue = cvar.wait(queue).expect("pool condvar poisoned");
            }
        };

        slot_tx
            .send(WorkItem { handle, batch, cache })
            .map_err(|_| Error::backend("pool slot thread is no longer accepting work"))?;

        Ok(handle)
    }

    fn prune(&self, handles: &[JobHandle]) -> Result<Vec<JobHandle>> {
        let mut statuses = self.statuses.lock().expect("job status map poisoned");
        let mut still_incomplete = Vec::new();
        for handle in handles {
            match statuses.get(handle) {
                Some(JobStatus::Pending) | None => still_incomplete.push(*handle),
                Some(JobStatus::Done(Ok(()))) => {
                    statuses.remove(handle);
                }
                Some(JobStatus::Done(Err(_))) => {
                    let err = match statuses.remove(handle) {
                        Some(JobStatus::Done(Err(e))) => e,
                        _ => unreachable!(),
                    };
                    return Err(err);
                }
            }
        }
        Ok(still_incomplete)
    }
}
