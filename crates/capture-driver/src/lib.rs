//! capture-driver: a scoped execution harness that runs user code twice to
//! batch and memoize expensive, parallelizable calls.
//!
//! A [`Parallelizable`] wraps a user function; inside an active [`Driver`]
//! scope, a first ("capturing") pass returns placeholders and records calls
//! grouped by a batch key, and a second ("replaying") pass — run only after
//! every recorded batch has been dispatched to a [`Backend`] and committed to
//! an active [`CacheOracle`] — resolves each call from the cache. Outside any
//! scope the wrapper is transparent.
//!
//! ```no_run
//! use std::sync::Arc;
//! use capture_driver::{caching_into, parallelized, Driver, InMemoryCache, ThreadPoolBackend};
//!
//! let add = parallelized::<i64, i64, i64>("add", |a| a + 1, |_| 0, |a| *a);
//! let _cache = caching_into(Arc::new(InMemoryCache::new(256))).unwrap();
//! let scope = Driver::new(Arc::new(ThreadPoolBackend::new(4))).scope().unwrap();
//! let mut last = 0;
//! while scope.run().unwrap() {
//!     last = add.call(41).unwrap();
//! }
//! assert_eq!(last, 42);
//! ```

mod backend;
mod cache;
mod driver;
mod error;
mod fingerprint;
mod globals;
mod pool;
mod registry;
mod wrapper;

pub use backend::{Backend, JobHandle};
pub use cache::{CacheOracle, InMemoryCache};
pub use driver::{Driver, DriverScope, Mode};
pub use error::{Error, Result};
pub use fingerprint::Fingerprint;
pub use globals::{caching_into, CacheGuard};
pub use pool::ThreadPoolBackend;
pub use registry::{Batch, ErasedRunner};
pub use wrapper::{default_batcher, parallelized, parallelized_with_batcher, Parallelizable};
