//! The persistent memoization oracle the driver consults and populates.
//!
//! `CacheOracle` is the external collaborator the driver consults: it only
//! asks "is this call already cached?" and, transitively through
//! a backend, "record this call's result." The trait is kept object-safe and
//! non-generic — it stores and returns postcard-encoded bytes — so a single
//! process-wide instance can back every `Parallelizable<A, R, K>`, whatever
//! `A`/`R` they close over. Typed (de)serialization happens at the call site
//! in [`crate::wrapper`].
//!
//! [`InMemoryCache`] is the reference implementation: an LRU map behind a
//! `Mutex`, reached through a `OnceLock` singleton sized from an
//! environment variable.
//!
//! # Environment variable
//!
//! `CAPTURE_DRIVER_CACHE_CAPACITY` — maximum number of entries in the global
//! [`InMemoryCache`]; defaults to `1024`. `0` is treated as `1`.

use std::num::NonZeroUsize;
use std::sync::{Mutex, OnceLock};

use lru::LruCache;

use crate::error::{Error, Result};
use crate::fingerprint::Fingerprint;

/// The persistent store a driver scope is "caching into". Implementations
/// own their own concurrency discipline; the driver assumes strong
/// consistency (an entry written before a backend's `prune` reports its job
/// complete is visible to subsequent lookups).
pub trait CacheOracle: Send + Sync {
    /// Does an entry exist for this fingerprint?
    fn contains(&self, fingerprint: &Fingerprint) -> Result<bool>;

    /// Fetch the postcard-encoded value for this fingerprint, if present.
    fn get(&self, fingerprint: &Fingerprint) -> Result<Option<Vec<u8>>>;

    /// Record the postcard-encoded value for this fingerprint.
    fn put(&self, fingerprint: Fingerprint, value: Vec<u8>) -> Result<()>;
}

/// LRU in-memory [`CacheOracle`], the reference implementation shipped with
/// this crate. Not a production persistence layer — the cache is treated as
/// an external collaborator the driver is agnostic to — it exists so the
/// driver is independently runnable and testable.
pub struct InMemoryCache {
    inner: Mutex<LruCache<Fingerprint, Vec<u8>>>,
    capacity: usize,
}

impl InMemoryCache {
    /// Create a new cache with the given maximum number of entries.
    ///
    /// `capacity` is clamped to a minimum of `1`.
    pub fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity.max(1)).expect("capacity >= 1");
        Self {
            inner: Mutex::new(LruCache::new(cap)),
            capacity: capacity.max(1),
        }
    }

    /// Return the process-wide singleton [`InMemoryCache`].
    ///
    /// The capacity is read once from `CAPTURE_DRIVER_CACHE_CAPACITY`; absent
    /// or unparseable falls back to `1024`.
    pub fn global() -> &'static InMemoryCache {
        static INSTANCE: OnceLock<InMemoryCache> = OnceLock::new();
        INSTANCE.get_or_init(|| {
            let capacity = std::env::var("CAPTURE_DRIVER_CACHE_CAPACITY")
                .ok()
                .and_then(|v| v.parse::<usize>().ok())
                .unwrap_or(1024);
            InMemoryCache::new(capacity)
        })
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("InMemoryCache mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Remove all entries, leaving the cache empty. Primarily useful for
    /// test isolation when tests share the global singleton.
    pub fn clear(&self) {
        self.inner.lock().expect("InMemoryCache mutex poisoned").clear();
    }
}

impl CacheOracle for InMemoryCache {
    fn contains(&self, fingerprint: &Fingerprint) -> Result<bool> {
        Ok(self
            .inner
            .lock()
            .expect("InMemoryCache mutex poisoned")
            .contains(fingerprint))
    }

    fn get(&self, fingerprint: &Fingerprint) -> Result<Option<Vec<u8>>> {
        Ok(self
            .inner
            .lock()
            .expect("InMemoryCache mutex poisoned")
            .get(fingerprint)
            .cloned())
    }

    fn put(&self, fingerprint: Fingerprint, value: Vec<u8>) -> Result<()> {
        self.inner
            .lock()
            .expect("InMemoryCache mutex poisoned")
            .put(fingerprint, value);
        Ok(())
    }
}

/// Surfaced as a `ConfigurationError` when a driver scope is entered with no
/// cache context active.
pub fn no_active_cache_error() -> Error {
    Error::configuration(
        "no cache context is active; enter one with `caching_into` before driving a scope",
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fp(tag: &str) -> Fingerprint {
        Fingerprint::compute("test::fn", &tag.to_string()).unwrap()
    }

    #[test]
    fn miss_returns_none() {
        let cache = InMemoryCache::new(8);
        assert_eq!(cache.get(&fp("a")).unwrap(), None);
        assert!(!cache.contains(&fp("a")).unwrap());
    }

    #[test]
    fn put_then_get_round_trips() {
        let cache = InMemoryCache::new(8);
        let key = fp("a");
        cache.put(key, vec![1, 2, 3]).unwrap();
        assert!(cache.contains(&key).unwrap());
        assert_eq!(cache.get(&key).unwrap(), Some(vec![1, 2, 3]));
    }

    #[test]
    fn len_tracks_insertions() {
        let cache = InMemoryCache::new(8);
        assert_eq!(cache.len(), 0);
        cache.put(fp("a"), vec![1]).unwrap();
        assert_eq!(cache.len(), 1);
        cache.put(fp("b"), vec![2]).unwrap();
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn capacity_zero_treated_as_one() {
        let cache = InMemoryCache::new(0);
        assert_eq!(cache.capacity(), 1);
        cache.put(fp("a"), vec![1]).unwrap();
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn lru_eviction_with_capacity_one() {
        let cache = InMemoryCache::new(1);
        let a = fp("a");
        let b = fp("b");
        cache.put(a, vec![1]).unwrap();
        cache.put(b, vec![2]).unwrap();
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&a).unwrap(), None, "a should have been evicted");
        assert_eq!(cache.get(&b).unwrap(), Some(vec![2]));
    }

    #[test]
    fn overwrite_same_key_does_not_grow_len() {
        let cache = InMemoryCache::new(4);
        let key = fp("a");
        cache.put(key, vec![1]).unwrap();
        cache.put(key, vec![2]).unwrap();
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&key).unwrap(), Some(vec![2]));
    }

    #[test]
    fn clear_empties_cache() {
        let cache = InMemoryCache::new(8);
        cache.put(fp("a"), vec![1]).unwrap();
        cache.put(fp("b"), vec![2]).unwrap();
        cache.clear();
        assert_eq!(cache.len(), 0);
        assert!(cache.is_empty());
    }

    #[test]
    fn concurrent_put_and_get_no_panic() {
        use std::sync::Arc;
        use std::thread;

        let cache = Arc::new(InMemoryCache::new(64));
        let handles: Vec<_> = (0_u32..4)
            .map(|i| {
                let c = Arc::clone(&cache);
                thread::spawn(move || {
                    for j in 0_u32..16 {
                        let key = fp(&format!("thread_{i}_item_{j}"));
                        c.put(key, vec![i as u8, j as u8]).unwrap();
                        let _ = c.get(&key).unwrap();
                    }
                })
            })
            .collect();

        for h in handles {
            h.join().expect("thread should not panic");
        }
    }
}
