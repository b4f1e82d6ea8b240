//! Process-wide slots a [`crate::wrapper::Parallelizable`] consults without
//! needing a driver or cache handle threaded through every call site.
//!
//! Both slots are exclusive, scoped, and released on every exit path
//! (including panics, via `Drop`). Nesting either scope is rejected outright
//! rather than silently stacking, to avoid ambiguous batch attribution.

use std::sync::{Arc, Mutex};

use crate::cache::CacheOracle;
use crate::driver::DriverInner;
use crate::error::Error;

static ACTIVE_DRIVER: Mutex<Option<Arc<DriverInner>>> = Mutex::new(None);
static ACTIVE_CACHE: Mutex<Option<Arc<dyn CacheOracle>>> = Mutex::new(None);

pub(crate) fn install_driver(inner: Arc<DriverInner>) -> Result<(), Error> {
    let mut slot = ACTIVE_DRIVER.lock().expect("active driver slot poisoned");
    if slot.is_some() {
        return Err(Error::configuration(
            "a driver scope is already active in this process; nested scopes are not supported",
        ));
    }
    *slot = Some(inner);
    Ok(())
}

pub(crate) fn uninstall_driver() {
    let mut slot = ACTIVE_DRIVER.lock().expect("active driver slot poisoned");
    *slot = None;
}

pub(crate) fn active_driver() -> Option<Arc<DriverInner>> {
    ACTIVE_DRIVER.lock().expect("active driver slot poisoned").clone()
}

/// RAII guard for an active cache-oracle context. Dropping it frees the slot.
pub struct CacheGuard {
    _private: (),
}

impl Drop for CacheGuard {
    fn drop(&mut self) {
        let mut slot = ACTIVE_CACHE.lock().expect("active cache slot poisoned");
        *slot = None;
    }
}

/// Makes `cache` the current persistent store for the lifetime of the
/// returned guard. A driver scope entered while no cache context is active
/// fails with `ConfigurationError`.
pub fn caching_into<C: CacheOracle + 'static>(cache: Arc<C>) -> Result<CacheGuard, Error> {
    let mut slot = ACTIVE_CACHE.lock().expect("active cache slot poisoned");
    if slot.is_some() {
        return Err(Error::configuration(
            "a cache context is already active in this process; nested scopes are not supported",
        ));
    }
    *slot = Some(cache as Arc<dyn CacheOracle>);
    Ok(CacheGuard { _private: () })
}

pub(crate) fn active_cache() -> Option<Arc<dyn CacheOracle>> {
    ACTIVE_CACHE.lock().expect("active cache slot poisoned").clone()
}
