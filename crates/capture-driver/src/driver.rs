//! The capture/replay driver: the scoped environment that runs a user body
//! twice, coordinating wrappers through the global mode slot and the backend
//! through the pending-call registry.

use std::any::Any;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{debug, info};

use crate::backend::{Backend, JobHandle};
use crate::cache::CacheOracle;
use crate::error::{Error, Result};
use crate::fingerprint::BatchKeyBytes;
use crate::globals::{self, active_cache};
use crate::registry::{ErasedRunner, Registry};

/// Where a driver scope currently sits in the capture/replay state machine.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Mode {
    Idle,
    Capturing,
    Computing,
    Replaying,
    Done,
}

pub(crate) struct DriverInner {
    backend: Arc<dyn Backend>,
    mode: Mutex<Mode>,
    registry: Mutex<Registry>,
}

impl DriverInner {
    pub(crate) fn mode(&self) -> Mode {
        *self.mode.lock().expect("driver mode mutex poisoned")
    }

    /// Called by a [`crate::wrapper::Parallelizable`] during CAPTURING: look
    /// the call up in the active cache first (a call already memoized from a
    /// prior run needs no placeholder), and failing that, record it.
    pub(crate) fn record_call(
        &self,
        runner: Arc<dyn ErasedRunner>,
        key_bytes: BatchKeyBytes,
        arg: Box<dyn Any + Send>,
    ) {
        self.registry
            .lock()
            .expect("driver registry mutex poisoned")
            .push(runner, key_bytes, arg);
    }
}

/// The orchestrator. Construct with a backend, then [`Driver::scope`] to
/// acquire the process-wide active-driver slot.
pub struct Driver {
    inner: Arc<DriverInner>,
}

impl Driver {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Driver {
            inner: Arc::new(DriverInner {
                backend,
                mode: Mutex::new(Mode::Idle),
                registry: Mutex::new(Registry::new()),
            }),
        }
    }

    /// Acquire the process-wide active-driver slot for the duration of the
    /// returned scope. Fails if another scope is already active.
    pub fn scope(self) -> Result<DriverScope> {
        globals::install_driver(Arc::clone(&self.inner))?;
        Ok(DriverScope { driver: self })
    }
}

/// A driver with the active-driver slot held. Releases it on drop,
/// including on panic unwind, so the exclusive driver scope is never left
/// occupied by a scope that is no longer reachable.
pub struct DriverScope {
    driver: Driver,
}

impl Drop for DriverScope {
    fn drop(&mut self) {
        globals::uninstall_driver();
    }
}

impl DriverScope {
    /// Drives the three-call capture/replay protocol. Intended usage:
    /// `while scope.run()? { body }`.
    pub fn run(&self) -> Result<bool> {
        let inner = &self.driver.inner;
        let current = inner.mode();
        match current {
            Mode::Idle => {
                *inner.mode.lock().expect("driver mode mutex poisoned") = Mode::Capturing;
                inner
                    .registry
                    .lock()
                    .expect("driver registry mutex poisoned")
                    .clear();
                debug!("driver entering CAPTURING");
                Ok(true)
            }
            Mode::Capturing => {
                *inner.mode.lock().expect("driver mode mutex poisoned") = Mode::Computing;
                let batches = inner
                    .registry
                    .lock()
                    .expect("driver registry mutex poisoned")
                    .drain();

                if batches.is_empty() {
                    info!("no calls pending; skipping REPLAYING");
                    *inner.mode.lock().expect("driver mode mutex poisoned") = Mode::Done;
                    return Ok(false);
                }

                let outcome = (|| -> Result<()> {
                    let cache = active_cache().ok_or_else(crate::cache::no_active_cache_error)?;

                    debug!(count = batches.len(), "submitting batches");
                    let mut handles: Vec<JobHandle> = Vec::with_capacity(batches.len());
                    for batch in batches {
                        handles.push(inner.backend.submit(Arc::clone(&cache), batch)?);
                    }

                    wait_for_completion(inner.backend.as_ref(), handles)
                })();

                // Any failure while COMPUTING aborts the run and moves the
                // driver straight to DONE; the cache's already-committed
                // writes are not rolled back.
                match outcome {
                    Ok(()) => {
                        *inner.mode.lock().expect("driver mode mutex poisoned") = Mode::Replaying;
                        debug!("driver entering REPLAYING");
                        Ok(true)
                    }
                    Err(e) => {
                        *inner.mode.lock().expect("driver mode mutex poisoned") = Mode::Done;
                        Err(e)
                    }
                }
            }
            Mode::Replaying => {
                *inner.mode.lock().expect("driver mode mutex poisoned") = Mode::Done;
                debug!("driver DONE");
                Ok(false)
            }
            Mode::Computing => Err(Error::configuration(
                "run() invoked while the driver is internally computing a batch; this indicates \
                 the driven body re-entered run() from within its own body",
            )),
            Mode::Done => Ok(false),
        }
    }

    /// The current state-machine mode, primarily useful for diagnostics.
    pub fn mode(&self) -> Mode {
        self.driver.inner.mode()
    }
}

fn wait_for_completion(backend: &dyn Backend, mut handles: Vec<JobHandle>) -> Result<()> {
    while !handles.is_empty() {
        handles = backend.prune(&handles)?;
        if !handles.is_empty() {
            std::thread::sleep(Duration::from_micros(200));
        }
    }
    Ok(())
}

pub(crate) fn current_mode() -> Mode {
    globals::active_driver()
        .map(|inner| inner.mode())
        .unwrap_or(Mode::Idle)
}

pub(crate) fn record_call(
    runner: Arc<dyn ErasedRunner>,
    key_bytes: BatchKeyBytes,
    arg: Box<dyn Any + Send>,
) {
    if let Some(inner) = globals::active_driver() {
        inner.record_call(runner, key_bytes, arg);
    }
}

pub(crate) fn cache_lookup(fingerprint: &crate::fingerprint::Fingerprint) -> Result<Option<Vec<u8>>> {
    match active_cache() {
        Some(cache) => cache.get(fingerprint),
        None => Err(crate::cache::no_active_cache_error()),
    }
}
