//! In-memory storage backend.

use crate::backend::{Callback, InternalKv};
use crate::error::StorageResult;
use crate::key;
use crate::worker::Worker;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// An in-memory storage backend.
///
/// Entries live in a single ordered map from flat key to value. This
/// backend is suitable for:
/// - Unit and integration tests
/// - Deployments that do not need metadata to survive a restart
///
/// # Thread Safety
///
/// Reads (`get`, `exists`, `keys`) take the shared lock; writes (`put`,
/// `del`) take the exclusive lock. The lock is always released before the
/// result is posted to the callback thread, so callbacks may re-enter the
/// backend.
///
/// # Example
///
/// ```rust
/// use nskv_storage::{InMemoryKv, InternalKv};
/// use std::sync::mpsc;
///
/// let kv = InMemoryKv::new().unwrap();
/// let (tx, rx) = mpsc::channel();
/// kv.put("ns", b"k", b"v", false, Box::new(move |added| tx.send(added).unwrap()));
/// assert!(rx.recv().unwrap().unwrap());
/// ```
pub struct InMemoryKv {
    map: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
    callbacks: Worker<Job>,
}

impl InMemoryKv {
    /// Creates a new empty in-memory backend and starts its callback thread.
    ///
    /// # Errors
    ///
    /// Returns an error if the callback thread cannot be spawned.
    pub fn new() -> StorageResult<Self> {
        Self::with_entries(BTreeMap::new())
    }

    /// Creates a backend pre-populated with flat keys.
    ///
    /// Useful for exercising decode edge cases with keys that `put` would
    /// never produce.
    pub fn with_entries(entries: BTreeMap<Vec<u8>, Vec<u8>>) -> StorageResult<Self> {
        let callbacks = Worker::spawn("nskv-callbacks", |job: Job| {
            if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
                tracing::error!("completion callback panicked");
            }
        })?;
        Ok(Self {
            map: RwLock::new(entries),
            callbacks,
        })
    }

    /// Returns the number of stored entries across all namespaces.
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.read().len()
    }

    /// Returns true if no entries are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.read().is_empty()
    }

    /// Returns a copy of every flat key, in order.
    ///
    /// Useful for testing and debugging.
    #[must_use]
    pub fn flat_keys(&self) -> Vec<Vec<u8>> {
        self.map.read().keys().cloned().collect()
    }

    fn complete<T: Send + 'static>(&self, callback: Callback<T>, result: T) {
        let job: Job = Box::new(move || callback(Ok(result)));
        if self.callbacks.send(job).is_err() {
            // The callback thread only stops when it panicked outside a job.
            tracing::error!("callback thread is gone, completion dropped");
        }
    }

    fn prefix_matches<'a>(
        map: &'a BTreeMap<Vec<u8>, Vec<u8>>,
        prefix: &'a [u8],
    ) -> impl Iterator<Item = &'a Vec<u8>> + 'a {
        map.range::<[u8], _>((std::ops::Bound::Included(prefix), std::ops::Bound::Unbounded))
            .map(|(k, _)| k)
            .take_while(move |k| k.starts_with(prefix))
    }
}

impl std::fmt::Debug for InMemoryKv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryKv")
            .field("entries", &self.len())
            .finish()
    }
}

impl InternalKv for InMemoryKv {
    fn get(&self, ns: &str, key: &[u8], callback: Callback<Option<Vec<u8>>>) {
        let flat = key::encode(ns, key);
        let value = self.map.read().get(&flat).cloned();
        self.complete(callback, value);
    }

    fn put(&self, ns: &str, key: &[u8], value: &[u8], overwrite: bool, callback: Callback<bool>) {
        let flat = key::encode(ns, key);
        let inserted = {
            let mut map = self.map.write();
            match map.get_mut(&flat) {
                Some(existing) => {
                    if overwrite {
                        *existing = value.to_vec();
                    }
                    false
                }
                None => {
                    map.insert(flat, value.to_vec());
                    true
                }
            }
        };
        self.complete(callback, inserted);
    }

    fn del(&self, ns: &str, key: &[u8], by_prefix: bool, callback: Callback<i64>) {
        let flat = key::encode(ns, key);
        let deleted = {
            let mut map = self.map.write();
            if by_prefix {
                let matched: Vec<Vec<u8>> = Self::prefix_matches(&map, &flat).cloned().collect();
                for k in &matched {
                    map.remove(k);
                }
                matched.len() as i64
            } else {
                i64::from(map.remove(&flat).is_some())
            }
        };
        self.complete(callback, deleted);
    }

    fn exists(&self, ns: &str, key: &[u8], callback: Callback<bool>) {
        let flat = key::encode(ns, key);
        let exists = self.map.read().contains_key(&flat);
        self.complete(callback, exists);
    }

    fn keys(&self, ns: &str, prefix: &[u8], callback: Callback<Vec<Vec<u8>>>) {
        let flat_prefix = key::encode(ns, prefix);
        let keys = {
            let map = self.map.read();
            Self::prefix_matches(&map, &flat_prefix)
                .map(|k| key::decode(k).to_vec())
                .collect::<Vec<_>>()
        };
        self.complete(callback, keys);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::sync::Arc;
    use std::thread;

    fn wait<T: Send + 'static>(op: impl FnOnce(Callback<T>)) -> T {
        let (tx, rx) = mpsc::channel();
        op(Box::new(move |result| {
            tx.send(result).unwrap();
        }));
        rx.recv().unwrap().unwrap()
    }

    #[test]
    fn memory_new_is_empty() {
        let kv = InMemoryKv::new().unwrap();
        assert!(kv.is_empty());
        assert!(wait(|cb| kv.get("", b"missing", cb)).is_none());
    }

    #[test]
    fn memory_put_then_get() {
        let kv = InMemoryKv::new().unwrap();
        assert!(wait(|cb| kv.put("ns", b"k", b"v", true, cb)));
        assert_eq!(wait(|cb| kv.get("ns", b"k", cb)), Some(b"v".to_vec()));
    }

    #[test]
    fn memory_insert_if_absent_keeps_first_value() {
        let kv = InMemoryKv::new().unwrap();
        assert!(wait(|cb| kv.put("ns", b"k", b"a", false, cb)));
        assert!(!wait(|cb| kv.put("ns", b"k", b"b", false, cb)));
        assert_eq!(wait(|cb| kv.get("ns", b"k", cb)), Some(b"a".to_vec()));
    }

    #[test]
    fn memory_overwrite_reports_update() {
        let kv = InMemoryKv::new().unwrap();
        assert!(wait(|cb| kv.put("ns", b"k", b"a", true, cb)));
        assert!(!wait(|cb| kv.put("ns", b"k", b"b", true, cb)));
        assert_eq!(wait(|cb| kv.get("ns", b"k", cb)), Some(b"b".to_vec()));
    }

    #[test]
    fn memory_stores_flat_keys() {
        let kv = InMemoryKv::new().unwrap();
        wait(|cb| kv.put("ns", b"k", b"v", true, cb));
        wait(|cb| kv.put("", b"g", b"v", true, cb));
        assert_eq!(
            kv.flat_keys(),
            vec![b"@namespace_ns:k".to_vec(), b"g".to_vec()]
        );
    }

    #[test]
    fn memory_keys_stop_at_first_mismatch() {
        let kv = InMemoryKv::new().unwrap();
        for k in [&b"a/1"[..], b"a/2", b"a0", b"b/1"] {
            wait(|cb| kv.put("ns", k, b"x", true, cb));
        }
        let mut keys = wait(|cb| kv.keys("ns", b"a/", cb));
        keys.sort();
        assert_eq!(keys, vec![b"a/1".to_vec(), b"a/2".to_vec()]);
    }

    #[test]
    fn memory_keys_decode_degenerate_entry_to_empty() {
        let mut entries = BTreeMap::new();
        entries.insert(b"@namespace_broken".to_vec(), b"v".to_vec());
        let kv = InMemoryKv::with_entries(entries).unwrap();
        // An empty namespace and empty prefix match every flat key.
        assert_eq!(wait(|cb| kv.keys("", b"", cb)), vec![Vec::<u8>::new()]);
    }

    #[test]
    fn memory_del_by_prefix_counts() {
        let kv = InMemoryKv::new().unwrap();
        for k in [&b"a/1"[..], b"a/2", b"b/1"] {
            wait(|cb| kv.put("ns", k, b"x", true, cb));
        }
        assert_eq!(wait(|cb| kv.del("ns", b"a/", true, cb)), 2);
        assert_eq!(kv.len(), 1);
        assert!(wait(|cb| kv.exists("ns", b"b/1", cb)));
    }

    #[test]
    fn memory_callback_runs_off_caller_thread() {
        let kv = InMemoryKv::new().unwrap();
        let caller = thread::current().id();
        let (tx, rx) = mpsc::channel();
        kv.exists(
            "",
            b"k",
            Box::new(move |_| tx.send(thread::current().id()).unwrap()),
        );
        assert_ne!(rx.recv().unwrap(), caller);
    }

    #[test]
    fn memory_callback_may_reenter_backend() {
        let kv = Arc::new(InMemoryKv::new().unwrap());
        let (tx, rx) = mpsc::channel();
        let inner = Arc::clone(&kv);
        kv.put(
            "ns",
            b"k",
            b"v",
            true,
            Box::new(move |_| {
                inner.get(
                    "ns",
                    b"k",
                    Box::new(move |value| tx.send(value.unwrap()).unwrap()),
                );
            }),
        );
        assert_eq!(rx.recv().unwrap(), Some(b"v".to_vec()));
    }

    #[test]
    fn memory_survives_panicking_callback() {
        let kv = InMemoryKv::new().unwrap();
        kv.exists("", b"k", Box::new(|_| panic!("callback failure")));
        assert!(!wait(|cb| kv.exists("", b"k", cb)));
    }
}
