//! Stress tests for boundsync.
//!
//! These tests verify behavior under heavy load and concurrent access.

use crate::fixtures::{repos, Repo};
use boundsync_engine::RateLimiter;
use boundsync_store::{Cursor, MemoryStore, PagedResult, RecordId, WriteBatch};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Outcome counts of a stress run.
///
/// What counts as a success depends on the run: a granted permit, an
/// applied batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StressTestResult {
    /// Operations that went through.
    pub successful_ops: usize,
    /// Operations that were denied or rejected.
    pub failed_ops: usize,
    /// Wall time of the run.
    pub duration: Duration,
}

impl StressTestResult {
    fn finish(successful: usize, failed: usize, start: Instant) -> Self {
        Self {
            successful_ops: successful,
            failed_ops: failed,
            duration: start.elapsed(),
        }
    }

    /// Every operation attempted.
    pub fn total_ops(&self) -> usize {
        self.successful_ops + self.failed_ops
    }
}

/// Configuration for stress tests.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Number of operations to perform (per thread for concurrent tests).
    pub operations: usize,
    /// Number of concurrent threads.
    pub threads: usize,
    /// Number of distinct keys.
    pub keys: usize,
    /// Records written per batch.
    pub batch_size: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            operations: 1_000,
            threads: 4,
            keys: 16,
            batch_size: 10,
        }
    }
}

/// Hammers `limiter` from several threads.
///
/// A permit counts as a success, a denial as a failure. With a window longer
/// than the run, exactly one permit per key is expected.
pub fn stress_rate_limiter(limiter: Arc<RateLimiter<String>>, config: &StressConfig) -> StressTestResult {
    let granted = Arc::new(AtomicUsize::new(0));
    let denied = Arc::new(AtomicUsize::new(0));
    let keys: Arc<Vec<String>> = Arc::new((0..config.keys.max(1)).map(|k| format!("key-{}", k)).collect());

    let start = Instant::now();

    let handles: Vec<_> = (0..config.threads)
        .map(|t| {
            let limiter = Arc::clone(&limiter);
            let granted = Arc::clone(&granted);
            let denied = Arc::clone(&denied);
            let keys = Arc::clone(&keys);
            let operations = config.operations;

            thread::spawn(move || {
                for i in 0..operations {
                    let key = &keys[(t + i) % keys.len()];
                    if limiter.should_fetch(key) {
                        granted.fetch_add(1, Ordering::Relaxed);
                    } else {
                        denied.fetch_add(1, Ordering::Relaxed);
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Thread panicked");
    }

    StressTestResult::finish(
        granted.load(Ordering::Relaxed),
        denied.load(Ordering::Relaxed),
        start,
    )
}

/// Applies paged batches to `store` from several threads.
///
/// Each batch writes `batch_size` records and a paged result listing them
/// under one of `keys` keys.
pub fn stress_concurrent_batches(store: Arc<MemoryStore<Repo>>, config: &StressConfig) -> StressTestResult {
    let successful = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));

    let start = Instant::now();

    let handles: Vec<_> = (0..config.threads)
        .map(|t| {
            let store = Arc::clone(&store);
            let successful = Arc::clone(&successful);
            let failed = Arc::clone(&failed);
            let config = config.clone();

            thread::spawn(move || {
                for i in 0..config.operations {
                    let first = ((t * config.operations + i) * config.batch_size) as RecordId + 1;
                    let ids: Vec<RecordId> = (first..first + config.batch_size as RecordId).collect();
                    let key = format!("key-{}", (t + i) % config.keys.max(1));
                    let paged = PagedResult::new(key, ids.clone(), ids.len() as u64, Some(Cursor::page(2)));

                    match store.apply(WriteBatch::new().with_paged(paged).with_records(repos(&ids))) {
                        Ok(_) => successful.fetch_add(1, Ordering::Relaxed),
                        Err(_) => failed.fetch_add(1, Ordering::Relaxed),
                    };
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Thread panicked");
    }

    StressTestResult::finish(
        successful.load(Ordering::Relaxed),
        failed.load(Ordering::Relaxed),
        start,
    )
}

/// Applies batches where every other one hits an injected write failure
/// halfway through.
pub fn stress_failing_batches(store: &MemoryStore<Repo>, config: &StressConfig) -> StressTestResult {
    let start = Instant::now();
    let mut successful = 0usize;
    let mut failed = 0usize;

    for i in 0..config.operations {
        let first = (i * config.batch_size) as RecordId + 1;
        let ids: Vec<RecordId> = (first..first + config.batch_size as RecordId).collect();

        // Every other batch will fail intentionally
        if i % 2 == 0 {
            store.fail_writes_after(config.batch_size / 2);
        }

        match store.apply(WriteBatch::new().with_records(repos(&ids))) {
            Ok(_) => successful += 1,
            Err(_) => failed += 1,
        }
    }

    StressTestResult::finish(successful, failed, start)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limiter_one_permit_per_key() {
        let limiter = Arc::new(RateLimiter::new(Duration::from_secs(3600)));
        let config = StressConfig {
            operations: 500,
            threads: 8,
            keys: 10,
            ..Default::default()
        };

        let result = stress_rate_limiter(Arc::clone(&limiter), &config);
        assert_eq!(result.successful_ops, 10);
        assert_eq!(result.total_ops(), 4_000);
        assert_eq!(limiter.len(), 10);
    }

    #[test]
    fn test_concurrent_batches() {
        let store = Arc::new(MemoryStore::new());
        let config = StressConfig {
            operations: 200,
            threads: 4,
            keys: 8,
            batch_size: 5,
        };

        let result = stress_concurrent_batches(Arc::clone(&store), &config);
        assert_eq!(result.failed_ops, 0);
        assert_eq!(store.sequence(), 800);
        assert_eq!(store.len(), 4_000);
    }

    #[test]
    fn test_failing_batches_leave_no_partial_writes() {
        let store = MemoryStore::new();
        let config = StressConfig {
            operations: 100,
            batch_size: 4,
            ..Default::default()
        };

        let result = stress_failing_batches(&store, &config);
        // Half should succeed, half should fail (intentionally)
        assert_eq!(result.successful_ops, 50);
        assert_eq!(result.failed_ops, 50);
        assert_eq!(store.len(), 200);
    }
}
