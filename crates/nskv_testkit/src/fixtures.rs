//! Test fixtures and backend helpers.
//!
//! Backends complete through callbacks on their own threads. The helpers
//! here park the test thread until the callback fires so tests can be
//! written as straight-line code.

use nskv_storage::{Callback, DurableKv, HashStore, InMemoryKv, InternalKv, StorageResult};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

/// How long a blocking call waits for its callback.
pub const DEFAULT_WAIT: Duration = Duration::from_secs(5);

/// Issues one backend call and blocks until its callback fires.
///
/// # Panics
///
/// Panics if the callback does not fire within `wait`, or fires on a
/// sender that was dropped without a value.
pub fn wait_for<T, F>(wait: Duration, issue: F) -> StorageResult<T>
where
    T: Send + 'static,
    F: FnOnce(Callback<T>),
{
    let (tx, rx) = mpsc::channel();
    issue(Box::new(move |result| {
        let _ = tx.send(result);
    }));
    rx.recv_timeout(wait)
        .expect("backend did not invoke the callback in time")
}

/// Blocking view of an [`InternalKv`].
///
/// Each call waits up to [`DEFAULT_WAIT`] for its callback.
pub struct BlockingKv<'a> {
    kv: &'a dyn InternalKv,
}

impl<'a> BlockingKv<'a> {
    /// Wraps a backend.
    pub fn new(kv: &'a dyn InternalKv) -> Self {
        Self { kv }
    }

    /// Blocking `get`.
    pub fn get(&self, ns: &str, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        wait_for(DEFAULT_WAIT, |cb| self.kv.get(ns, key, cb))
    }

    /// Blocking `put`.
    pub fn put(&self, ns: &str, key: &[u8], value: &[u8], overwrite: bool) -> StorageResult<bool> {
        wait_for(DEFAULT_WAIT, |cb| self.kv.put(ns, key, value, overwrite, cb))
    }

    /// Blocking `del`.
    pub fn del(&self, ns: &str, key: &[u8], by_prefix: bool) -> StorageResult<i64> {
        wait_for(DEFAULT_WAIT, |cb| self.kv.del(ns, key, by_prefix, cb))
    }

    /// Blocking `exists`.
    pub fn exists(&self, ns: &str, key: &[u8]) -> StorageResult<bool> {
        wait_for(DEFAULT_WAIT, |cb| self.kv.exists(ns, key, cb))
    }

    /// Blocking `keys`, sorted so results compare across backends.
    pub fn keys(&self, ns: &str, prefix: &[u8]) -> StorageResult<Vec<Vec<u8>>> {
        let mut keys = wait_for(DEFAULT_WAIT, |cb| self.kv.keys(ns, prefix, cb))?;
        keys.sort();
        Ok(keys)
    }
}

/// A named backend under test.
pub struct TestBackend {
    /// Short name for assertion messages.
    pub name: &'static str,
    /// The backend.
    pub kv: Arc<dyn InternalKv>,
}

impl TestBackend {
    /// A fresh in-memory backend.
    pub fn memory() -> Self {
        Self {
            name: "memory",
            kv: Arc::new(InMemoryKv::new().expect("Failed to start in-memory backend")),
        }
    }

    /// A fresh durable backend on an in-process hash store.
    pub fn loopback() -> Self {
        Self::loopback_with(HashStore::new())
    }

    /// A durable backend on `store`, which the caller can inspect.
    pub fn loopback_with(store: HashStore) -> Self {
        Self {
            name: "loopback",
            kv: Arc::new(DurableKv::new(store).expect("Failed to start durable backend")),
        }
    }

    /// Blocking view of this backend.
    pub fn blocking(&self) -> BlockingKv<'_> {
        BlockingKv::new(self.kv.as_ref())
    }
}

/// Fresh instances of every backend that runs without external services.
pub fn all_backends() -> Vec<TestBackend> {
    vec![TestBackend::memory(), TestBackend::loopback()]
}

/// Runs `f` once against each backend from [`all_backends`].
///
/// # Example
///
/// ```rust
/// use nskv_testkit::with_each_backend;
///
/// with_each_backend(|backend| {
///     let kv = backend.blocking();
///     assert!(kv.put("ns", b"k", b"v", true).unwrap());
/// });
/// ```
pub fn with_each_backend<F>(mut f: F)
where
    F: FnMut(&TestBackend),
{
    for backend in all_backends() {
        f(&backend);
    }
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;

    /// Writes `count` keys `{prefix}{i}` into `ns`, each with value `v{i}`.
    pub fn populate(kv: &BlockingKv<'_>, ns: &str, prefix: &str, count: usize) {
        for i in 0..count {
            let key = format!("{prefix}{i}");
            let value = format!("v{i}");
            kv.put(ns, key.as_bytes(), value.as_bytes(), true)
                .expect("Failed to put key");
        }
    }
}
