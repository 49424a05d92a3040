//! Stress tests for the storage backends.
//!
//! These drive a backend from many threads at once and check that the
//! final key set is exactly what the writers produced.

use crate::fixtures::{BlockingKv, DEFAULT_WAIT};
use nskv_storage::InternalKv;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};

/// Result of a stress test run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Total operations performed.
    pub total_ops: usize,
    /// Successful operations.
    pub successful_ops: usize,
    /// Failed operations.
    pub failed_ops: usize,
    /// Total duration.
    pub duration: Duration,
    /// Operations per second.
    pub ops_per_second: f64,
}

impl StressTestResult {
    /// Creates a new result.
    pub fn new(successful: usize, failed: usize, duration: Duration) -> Self {
        let total = successful + failed;
        let ops_per_second = if duration.as_secs_f64() > 0.0 {
            total as f64 / duration.as_secs_f64()
        } else {
            0.0
        };

        Self {
            total_ops: total,
            successful_ops: successful,
            failed_ops: failed,
            duration,
            ops_per_second,
        }
    }
}

/// Configuration for stress tests.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Keys written per thread.
    pub keys_per_thread: usize,
    /// Number of concurrent writer threads.
    pub threads: usize,
    /// Size of each value in bytes.
    pub value_size: usize,
    /// Namespace the test writes into.
    pub namespace: String,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            keys_per_thread: 1_000,
            threads: 4,
            value_size: 64,
            namespace: "stress".to_string(),
        }
    }
}

fn stress_key(thread: usize, i: usize) -> Vec<u8> {
    format!("t{thread}/k{i}").into_bytes()
}

/// Concurrent writers on disjoint keys.
///
/// Each thread writes its own key range without waiting for completions,
/// then waits for all of them.
pub fn stress_disjoint_writers(kv: Arc<dyn InternalKv>, config: &StressConfig) -> StressTestResult {
    let successful = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));
    let start = Instant::now();

    let handles: Vec<_> = (0..config.threads)
        .map(|t| {
            let kv = Arc::clone(&kv);
            let successful = Arc::clone(&successful);
            let failed = Arc::clone(&failed);
            let config = config.clone();

            thread::spawn(move || {
                let value = vec![t as u8; config.value_size];
                let (tx, rx) = mpsc::channel();
                for i in 0..config.keys_per_thread {
                    let tx = tx.clone();
                    kv.put(
                        &config.namespace,
                        &stress_key(t, i),
                        &value,
                        true,
                        Box::new(move |r| {
                            let _ = tx.send(r);
                        }),
                    );
                }
                drop(tx);
                for _ in 0..config.keys_per_thread {
                    match rx.recv_timeout(DEFAULT_WAIT) {
                        Ok(Ok(true)) => successful.fetch_add(1, Ordering::Relaxed),
                        _ => failed.fetch_add(1, Ordering::Relaxed),
                    };
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Thread panicked");
    }

    StressTestResult::new(
        successful.load(Ordering::Relaxed),
        failed.load(Ordering::Relaxed),
        start.elapsed(),
    )
}

/// Concurrent readers and writers on a shared key range.
///
/// Readers may observe either the old or the new value, never anything
/// else. A read that returns a value from neither generation is a failure.
pub fn stress_mixed_readers(kv: Arc<dyn InternalKv>, config: &StressConfig) -> StressTestResult {
    let old = vec![0u8; config.value_size];
    let new = vec![1u8; config.value_size];
    {
        let b = BlockingKv::new(kv.as_ref());
        for i in 0..config.keys_per_thread {
            b.put(&config.namespace, &stress_key(0, i), &old, true)
                .expect("Failed to seed key");
        }
    }

    let successful = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));
    let start = Instant::now();

    let handles: Vec<_> = (0..config.threads)
        .map(|t| {
            let kv = Arc::clone(&kv);
            let successful = Arc::clone(&successful);
            let failed = Arc::clone(&failed);
            let config = config.clone();
            let (old, new) = (old.clone(), new.clone());

            thread::spawn(move || {
                let b = BlockingKv::new(kv.as_ref());
                for i in 0..config.keys_per_thread {
                    let key = stress_key(0, i);
                    let ok = if t == 0 {
                        b.put(&config.namespace, &key, &new, true).is_ok()
                    } else {
                        matches!(
                            b.get(&config.namespace, &key),
                            Ok(Some(v)) if v == old || v == new
                        )
                    };
                    if ok {
                        successful.fetch_add(1, Ordering::Relaxed);
                    } else {
                        failed.fetch_add(1, Ordering::Relaxed);
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Thread panicked");
    }

    StressTestResult::new(
        successful.load(Ordering::Relaxed),
        failed.load(Ordering::Relaxed),
        start.elapsed(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::all_backends;

    fn small_config() -> StressConfig {
        StressConfig {
            keys_per_thread: 200,
            threads: 4,
            value_size: 16,
            namespace: "stress".to_string(),
        }
    }

    #[test]
    fn test_disjoint_writers() {
        let config = small_config();
        for backend in all_backends() {
            let result = stress_disjoint_writers(Arc::clone(&backend.kv), &config);
            assert_eq!(result.failed_ops, 0, "{}", backend.name);
            assert_eq!(result.successful_ops, config.threads * config.keys_per_thread);

            let keys = backend.blocking().keys(&config.namespace, b"").unwrap();
            assert_eq!(keys.len(), config.threads * config.keys_per_thread, "{}", backend.name);
            let t2 = backend.blocking().keys(&config.namespace, b"t2/").unwrap();
            assert_eq!(t2.len(), config.keys_per_thread);
        }
    }

    #[test]
    fn test_mixed_readers() {
        let config = small_config();
        for backend in all_backends() {
            let result = stress_mixed_readers(Arc::clone(&backend.kv), &config);
            assert_eq!(result.failed_ops, 0, "{}", backend.name);
            assert_eq!(result.total_ops, config.threads * config.keys_per_thread);
        }
    }

    #[test]
    fn test_result_rate() {
        let result = StressTestResult::new(90, 10, Duration::from_secs(2));
        assert_eq!(result.total_ops, 100);
        assert!((result.ops_per_second - 50.0).abs() < f64::EPSILON);
    }
}
