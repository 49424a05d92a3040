//! Storage backend trait definition.

use crate::error::StorageResult;

/// Completion handler for an asynchronous backend operation.
///
/// Each operation invokes its callback exactly once.
pub type Callback<T> = Box<dyn FnOnce(StorageResult<T>) + Send + 'static>;

/// A namespaced key/value store with an asynchronous, callback-based API.
///
/// Keys are addressed by `(namespace, key)`. An empty namespace denotes the
/// global keyspace. Implementations encode both into a single flat key with
/// [`crate::key::encode`].
///
/// # Invariants
///
/// - Every operation invokes its callback exactly once, including on failure
/// - Callbacks never run on the caller's stack frame; they run on a thread
///   owned by the backend, so a callback may safely call back into the backend
/// - No ordering is guaranteed between independently issued operations.
///   Chain through the callback when one must observe the other
/// - Backends must be `Send + Sync` so one instance can serve many requests
///
/// # Implementors
///
/// - [`super::InMemoryKv`] - process-local ordered map
/// - [`super::DurableKv`] - remote hash store reached through a
///   [`super::CommandExecutor`]
pub trait InternalKv: Send + Sync {
    /// Reads the value stored under `(ns, key)`.
    ///
    /// Completes with `None` if the key does not exist.
    fn get(&self, ns: &str, key: &[u8], callback: Callback<Option<Vec<u8>>>);

    /// Stores `value` under `(ns, key)`.
    ///
    /// With `overwrite == false` an existing value is left untouched. In
    /// both modes the callback receives `true` only if the key was absent
    /// before the call.
    fn put(&self, ns: &str, key: &[u8], value: &[u8], overwrite: bool, callback: Callback<bool>);

    /// Deletes `(ns, key)`, or every key starting with `key` if `by_prefix`.
    ///
    /// Completes with the number of keys removed. Prefix deletion
    /// enumerates and then deletes; keys inserted concurrently under the
    /// prefix may or may not be removed.
    fn del(&self, ns: &str, key: &[u8], by_prefix: bool, callback: Callback<i64>);

    /// Checks whether `(ns, key)` exists.
    fn exists(&self, ns: &str, key: &[u8], callback: Callback<bool>);

    /// Lists the keys in `ns` that start with `prefix`.
    ///
    /// Returned keys have the namespace stripped. Ordering is unspecified.
    fn keys(&self, ns: &str, prefix: &[u8], callback: Callback<Vec<Vec<u8>>>);
}
