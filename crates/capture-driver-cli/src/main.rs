//! Demo CLI: drives a capture/replay run over a toy `add(a, b)` function,
//! batched by its first argument, and reports the outcome as JSON.

use std::sync::Arc;

use capture_driver::{caching_into, parallelized, Driver, InMemoryCache, ThreadPoolBackend};
use clap::Parser;
use serde::Serialize;

/// Run a capture/replay demo over a toy batched `add` function.
#[derive(Parser, Debug)]
#[command(name = "capture-driver-cli", about = "Demo a capture/replay run over a toy parallelizable function")]
struct Args {
    /// Number of worker threads in the reference backend.
    #[arg(long, default_value_t = 4)]
    pool_size: usize,

    /// Maximum entries in the reference in-memory cache.
    #[arg(long, default_value_t = 256)]
    cache_capacity: usize,

    /// Comma-separated `a,b` pairs to add, e.g. "1,2;1,4;2,6".
    #[arg(long, default_value = "1,2;1,4;2,6")]
    calls: String,
}

#[derive(Serialize)]
struct RunReport {
    executions: u32,
    results: Vec<i64>,
    error: Option<String>,
}

fn parse_calls(spec: &str) -> Vec<(i64, i64)> {
    spec.split(';')
        .filter(|s| !s.trim().is_empty())
        .map(|pair| {
            let mut parts = pair.splitn(2, ',');
            let a: i64 = parts.next().unwrap_or("0").trim().parse().unwrap_or(0);
            let b: i64 = parts.next().unwrap_or("0").trim().parse().unwrap_or(0);
            (a, b)
        })
        .collect()
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let calls = parse_calls(&args.calls);

    let add = parallelized::<(i64, i64), i64, i64>(
        "add",
        |(a, b)| a + b,
        |_args| 0,
        |(a, _b)| *a,
    );

    let backend = Arc::new(ThreadPoolBackend::new(args.pool_size.max(1)));
    let cache = Arc::new(InMemoryCache::new(args.cache_capacity.max(1)));

    let report = (|| -> capture_driver::Result<RunReport> {
        let _cache_guard = caching_into(cache)?;
        let scope = Driver::new(backend).scope()?;

        let mut executions = 0u32;
        let mut results = Vec::new();
        while scope.run()? {
            executions += 1;
            results.clear();
            for call in &calls {
                results.push(add.call(*call)?);
            }
        }

        Ok(RunReport {
            executions,
            results,
            error: None,
        })
    })()
    .unwrap_or_else(|e| RunReport {
        executions: 0,
        results: Vec::new(),
        error: Some(e.to_string()),
    });

    let json = serde_json::to_string(&report).expect("RunReport is always serializable");
    println!("{json}");
    // Exit 0 always — failures are encoded in the JSON, not the exit code.
}
