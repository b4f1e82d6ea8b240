//! Contract-violation and configuration-failure paths for the parallelizable
//! wrapper.

use std::sync::{Arc, Mutex};

use capture_driver::{caching_into, parallelized, parallelized_with_batcher, Backend, Driver, Error, InMemoryCache, ThreadPoolBackend};

static SERIAL: Mutex<()> = Mutex::new(());

/// Entering CAPTURING with no active cache context fails with
/// `ConfigurationError` rather than silently proceeding.
#[test]
fn capturing_without_cache_context_is_configuration_error() {
    let _serial = SERIAL.lock().unwrap();
    let add = parallelized::<(i64, i64), i64, i64>("contract_add_no_cache", |(a, b)| a + b, |_| 0, |(a, _)| *a);

    let scope = Driver::new(Arc::new(ThreadPoolBackend::new(1)) as Arc<dyn Backend>)
        .scope()
        .unwrap();
    assert!(scope.run().unwrap());

    let err = add.call((1, 2)).unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));
}

/// A batcher that drops an argument (returns fewer results than it was
/// given) is a contract violation, surfaced during COMPUTING.
#[test]
fn batcher_result_count_mismatch_is_contract_error() {
    let _serial = SERIAL.lock().unwrap();
    let broken = parallelized_with_batcher::<i64, i64, i64>(
        "contract_broken_batcher",
        |a| *a,
        |_a| 0,
        |_a| 0i64,
        |args: &[i64]| args.iter().take(args.len().saturating_sub(1)).copied().collect(),
    );

    let _cache_guard = caching_into(Arc::new(InMemoryCache::new(8))).unwrap();
    let scope = Driver::new(Arc::new(ThreadPoolBackend::new(1)) as Arc<dyn Backend>)
        .scope()
        .unwrap();

    assert!(scope.run().unwrap());
    let _ = broken.call(1).unwrap();
    let _ = broken.call(2).unwrap();

    let err = scope.run().unwrap_err();
    assert!(matches!(err, Error::Contract(_)), "batcher contract violation surfaces as-is through the backend's job outcome");
}

/// Nesting a second driver scope while one is already active is rejected
/// rather than silently stacking.
#[test]
fn nested_driver_scope_is_rejected() {
    let _serial = SERIAL.lock().unwrap();
    let _cache_guard = caching_into(Arc::new(InMemoryCache::new(8))).unwrap();
    let _outer = Driver::new(Arc::new(ThreadPoolBackend::new(1)) as Arc<dyn Backend>)
        .scope()
        .unwrap();

    let err = Driver::new(Arc::new(ThreadPoolBackend::new(1)) as Arc<dyn Backend>)
        .scope()
        .unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));
}
