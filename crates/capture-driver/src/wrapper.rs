//! The parallelizable decoration: wraps a user function so its behavior
//! switches on the ambient driver mode, transparently when no driver scope
//! is active.

use std::any::Any;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::cache::CacheOracle;
use crate::driver::{self, Mode};
use crate::error::{Error, Result};
use crate::fingerprint::{BatchKeyBytes, Fingerprint};
use crate::registry::ErasedRunner;

/// Runs `underlying` once per argument, in order. The batcher of last
/// resort: correct but does not amortize shared setup across a batch.
pub fn default_batcher<A, R>(
    underlying: Arc<dyn Fn(&A) -> R + Send + Sync>,
) -> Arc<dyn Fn(&[A]) -> Vec<R> + Send + Sync>
where
    A: 'static,
    R: 'static,
{
    Arc::new(move |args: &[A]| args.iter().map(|a| (underlying)(a)).collect())
}

/// A user function decorated to participate in capture/replay. Build one
/// with [`parallelized`] or [`parallelized_with_batcher`], wrap it in an
/// `Arc`, and call it through [`Parallelizable::call`].
pub struct Parallelizable<A, R, K> {
    identity: String,
    underlying: Arc<dyn Fn(&A) -> R + Send + Sync>,
    placeholder: Arc<dyn Fn(&A) -> R + Send + Sync>,
    batch_key: Arc<dyn Fn(&A) -> K + Send + Sync>,
    batcher: Arc<dyn Fn(&[A]) -> Vec<R> + Send + Sync>,
}

/// Decorates `underlying` with the default (per-call) batcher.
pub fn parallelized<A, R, K>(
    identity: impl Into<String>,
    underlying: impl Fn(&A) -> R + Send + Sync + 'static,
    placeholder: impl Fn(&A) -> R + Send + Sync + 'static,
    batch_key: impl Fn(&A) -> K + Send + Sync + 'static,
) -> Arc<Parallelizable<A, R, K>>
where
    A: 'static,
    R: 'static,
    K: 'static,
{
    let underlying: Arc<dyn Fn(&A) -> R + Send + Sync> = Arc::new(underlying);
    let batcher = default_batcher(Arc::clone(&underlying));
    Arc::new(Parallelizable {
        identity: identity.into(),
        underlying,
        placeholder: Arc::new(placeholder),
        batch_key: Arc::new(batch_key),
        batcher,
    })
}

/// Decorates `underlying` with a user-supplied `batcher`, typically used to
/// amortize shared setup (dataset load, tensor assembly) across a batch.
pub fn parallelized_with_batcher<A, R, K>(
    identity: impl Into<String>,
    underlying: impl Fn(&A) -> R + Send + Sync + 'static,
    placeholder: impl Fn(&A) -> R + Send + Sync + 'static,
    batch_key: impl Fn(&A) -> K + Send + Sync + 'static,
    batcher: impl Fn(&[A]) -> Vec<R> + Send + Sync + 'static,
) -> Arc<Parallelizable<A, R, K>>
where
    A: 'static,
    R: 'static,
    K: 'static,
{
    Arc::new(Parallelizable {
        identity: identity.into(),
        underlying: Arc::new(underlying),
        placeholder: Arc::new(placeholder),
        batch_key: Arc::new(batch_key),
        batcher: Arc::new(batcher),
    })
}

impl<A, R, K> Parallelizable<A, R, K>
where
    A: Serialize + Send + Sync + 'static,
    R: Serialize + DeserializeOwned + Send + Sync + 'static,
    K: Serialize + Send + Sync + 'static,
{
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Invoke the wrapped function with `arg`, behaving per the ambient
    /// driver mode. Transparent (calls straight through to the underlying
    /// function) when no driver scope is active.
    pub fn call(self: &Arc<Self>, arg: A) -> Result<R> {
        match driver::current_mode() {
            Mode::Idle | Mode::Done => Ok((self.underlying)(&arg)),
            Mode::Capturing => self.call_capturing(arg),
            Mode::Replaying => self.call_replaying(arg),
            Mode::Computing => Err(Error::configuration(
                "a parallelizable call was issued while the driver is internally computing a batch",
            )),
        }
    }

    fn call_capturing(self: &Arc<Self>, arg: A) -> Result<R> {
        let fingerprint = Fingerprint::compute(&self.identity, &arg)?;
        if let Some(bytes) = driver::cache_lookup(&fingerprint)? {
            return decode::<R>(&bytes);
        }

        let key = (self.batch_key)(&arg);
        let key_bytes = BatchKeyBytes::compute(&key)?;
        let placeholder = (self.placeholder)(&arg);
        let runner: Arc<dyn ErasedRunner> = Arc::clone(self) as Arc<dyn ErasedRunner>;
        driver::record_call(runner, key_bytes, Box::new(arg));
        Ok(placeholder)
    }

    fn call_replaying(self: &Arc<Self>, arg: A) -> Result<R> {
        let fingerprint = Fingerprint::compute(&self.identity, &arg)?;
        match driver::cache_lookup(&fingerprint)? {
            Some(bytes) => decode::<R>(&bytes),
            None => Err(Error::capture_determinism(
                &self.identity,
                "call issued during replay has no corresponding cache entry from capture; the \
                 two executions of the driven body issued different calls",
            )),
        }
    }
}

impl<A, R, K> ErasedRunner for Parallelizable<A, R, K>
where
    A: Serialize + Send + Sync + 'static,
    R: Serialize + DeserializeOwned + Send + Sync + 'static,
    K: Serialize + Send + Sync + 'static,
{
    fn identity(&self) -> &str {
        &self.identity
    }

    fn run_batch(&self, cache: &dyn CacheOracle, args: Vec<Box<dyn Any + Send>>) -> Result<()> {
        let args: Vec<A> = args
            .into_iter()
            .map(|a| {
                *a.downcast::<A>()
                    .expect("argument type mismatch for this Parallelizable's ErasedRunner")
            })
            .collect();

        let results = (self.batcher)(&args);
        if results.len() != args.len() {
            return Err(Error::contract(format!(
                "batcher for `{}` returned {} results for {} arguments",
                self.identity,
                results.len(),
                args.len()
            )));
        }

        for (arg, result) in args.iter().zip(results.iter()) {
            let fingerprint = Fingerprint::compute(&self.identity, arg)?;
            let bytes = postcard::to_allocvec(result)
                .map_err(|e| Error::Serialization(format!("encoding batch result: {e}")))?;
            cache.put(fingerprint, bytes)?;
        }
        Ok(())
    }
}

fn decode<R: DeserializeOwned>(bytes: &[u8]) -> Result<R> {
    postcard::from_bytes(bytes)
        .map_err(|e| Error::Serialization(format!("decoding cached value: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Backend;
    use crate::cache::InMemoryCache;
    use crate::driver::Driver;
    use crate::globals::caching_into;
    use crate::pool::ThreadPoolBackend;
    use std::sync::Mutex as StdMutex;

    // The active-driver/active-cache slots are process-wide statics; tests
    // that touch them must not run concurrently with each other.
    static GLOBAL_TEST_LOCK: StdMutex<()> = StdMutex::new(());

    fn backend() -> Arc<dyn Backend> {
        Arc::new(ThreadPoolBackend::new(2))
    }

    #[test]
    fn transparent_outside_scope() {
        let _guard = GLOBAL_TEST_LOCK.lock().unwrap();
        let add = parallelized::<i64, i64, i64>(
            "add_one",
            |a| a + 1,
            |_a| 0,
            |a| *a,
        );
        assert_eq!(add.call(41).unwrap(), 42);
    }

    #[test]
    fn double_execution_and_cache_backed_replay() {
        let _guard = GLOBAL_TEST_LOCK.lock().unwrap();
        let add = parallelized::<i64, i64, i64>(
            "add_one_captured",
            |a| a + 1,
            |_a| 0,
            |a| *a,
        );

        let cache_guard = caching_into(Arc::new(InMemoryCache::new(16))).unwrap();
        let scope = Driver::new(backend()).scope().unwrap();

        let mut captured: Vec<i64> = Vec::new();
        let mut executions = 0;
        while scope.run().unwrap() {
            executions += 1;
            captured.push(add.call(10).unwrap());
        }

        assert_eq!(executions, 2, "body must run exactly twice");
        assert_eq!(captured, vec![0, 11], "capture yields placeholder, replay yields the real value");
        drop(cache_guard);
    }

    #[test]
    fn fully_cached_body_runs_once() {
        let _guard = GLOBAL_TEST_LOCK.lock().unwrap();
        let add = parallelized::<i64, i64, i64>(
            "add_one_precached",
            |a| a + 1,
            |_a| 0,
            |a| *a,
        );

        let cache = Arc::new(InMemoryCache::new(16));
        let fingerprint = Fingerprint::compute("add_one_precached", &10i64).unwrap();
        cache.put(fingerprint, postcard::to_allocvec(&11i64).unwrap()).unwrap();

        let cache_guard = caching_into(Arc::clone(&cache)).unwrap();
        let scope = Driver::new(backend()).scope().unwrap();

        let mut executions = 0;
        let mut captured = Vec::new();
        while scope.run().unwrap() {
            executions += 1;
            captured.push(add.call(10).unwrap());
        }

        assert_eq!(executions, 1, "a fully-cached body must run exactly once");
        assert_eq!(captured, vec![11]);
        drop(cache_guard);
    }
}
