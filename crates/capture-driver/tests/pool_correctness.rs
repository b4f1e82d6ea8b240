//! Exercises `ThreadPoolBackend` through the public driver/wrapper surface
//! (the only way to construct a `Batch` outside the crate).

use std::sync::{Arc, Mutex};

use capture_driver::{caching_into, parallelized, Driver, InMemoryCache, ThreadPoolBackend};

// capture-driver's active-driver/active-cache slots are process-wide statics;
// tests in this file must not run concurrently with one another.
static SERIAL: Mutex<()> = Mutex::new(());

#[test]
fn two_batches_dispatch_concurrently() {
    let _guard = SERIAL.lock().unwrap();

    let add = parallelized::<(i64, i64), i64, i64>("pool_add", |(a, b)| a + b, |_| 0, |(a, _)| *a);

    let _cache_guard = caching_into(Arc::new(InMemoryCache::new(16))).unwrap();
    let backend = Arc::new(ThreadPoolBackend::new(2));
    let scope = Driver::new(Arc::clone(&backend) as Arc<dyn capture_driver::Backend>)
        .scope()
        .unwrap();

    let mut results = Vec::new();
    while scope.run().unwrap() {
        results.clear();
        results.push(add.call((1, 2)).unwrap());
        results.push(add.call((1, 4)).unwrap());
        results.push(add.call((2, 6)).unwrap());
    }

    assert_eq!(results, vec![3, 5, 8]);

    // The run only waits for job *status* to flip to done; a slot thread
    // pushes itself back onto the available queue immediately afterward, so
    // give it a moment before checking idle_count.
    std::thread::sleep(std::time::Duration::from_millis(50));
    assert_eq!(backend.idle_count(), backend.size(), "all slots must be idle once the run completes");
}

#[test]
fn backend_reports_available_slots_after_pool_new() {
    let backend = ThreadPoolBackend::new(3);
    assert_eq!(backend.size(), 3);
    assert_eq!(backend.idle_count(), 3);
}

#[test]
fn pool_size_is_clamped_to_at_least_one() {
    let backend = ThreadPoolBackend::new(0);
    assert_eq!(backend.size(), 1);
}
