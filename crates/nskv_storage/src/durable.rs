//! Durable storage backend over a remote hash store.

use crate::backend::{Callback, InternalKv};
use crate::error::{StorageError, StorageResult};
use crate::executor::{CommandExecutor, ReplyHandler};
use crate::key;
use crate::worker::Worker;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::Sender;

/// Hash field holding the value of a logical record.
pub const VALUE_FIELD: &[u8] = b"value";

/// A command queued for the I/O thread.
struct Command {
    argv: Vec<Vec<u8>>,
    on_reply: ReplyHandler,
}

impl Command {
    fn reject(self) {
        (self.on_reply)(Err(StorageError::Closed));
    }
}

/// Queues a command, failing its handler if the I/O thread has stopped.
fn submit(sender: &Sender<Command>, argv: Vec<Vec<u8>>, on_reply: ReplyHandler) {
    if let Err(err) = sender.send(Command { argv, on_reply }) {
        err.0.reject();
    }
}

/// A storage backend that keeps no local state.
///
/// Each logical record is the field `value` of a remote hash named by the
/// flat key. Every command is handed to a single I/O thread that owns the
/// [`CommandExecutor`]; completion callbacks run on that thread as replies
/// arrive. A panicking callback is logged and does not stop the thread.
///
/// # Ordering
///
/// Independent operations may complete in any order. A prefix delete is a
/// `KEYS` scan followed by a `DEL` of exactly the scanned set, issued from
/// the scan's reply handler; keys written under the prefix in between are
/// not guaranteed to be removed.
///
/// # Example
///
/// ```rust
/// use nskv_storage::{DurableKv, HashStore, InternalKv};
/// use std::sync::mpsc;
///
/// let kv = DurableKv::new(HashStore::new()).unwrap();
/// let (tx, rx) = mpsc::channel();
/// kv.exists("ns", b"k", Box::new(move |found| tx.send(found).unwrap()));
/// assert!(!rx.recv().unwrap().unwrap());
/// ```
pub struct DurableKv {
    io: Worker<Command>,
}

impl DurableKv {
    /// Starts the I/O thread and moves `executor` onto it.
    ///
    /// # Errors
    ///
    /// Returns an error if the I/O thread cannot be spawned.
    pub fn new<E>(executor: E) -> StorageResult<Self>
    where
        E: CommandExecutor + 'static,
    {
        let mut executor = executor;
        let io = Worker::spawn("nskv-store-io", move |command: Command| {
            let Command { argv, on_reply } = command;
            let dispatch = AssertUnwindSafe(|| executor.run_argv_async(argv, on_reply));
            if panic::catch_unwind(dispatch).is_err() {
                tracing::error!("completion callback panicked");
            }
        })?;
        tracing::info!("durable key/value backend started");
        Ok(Self { io })
    }

    fn run(&self, argv: Vec<Vec<u8>>, on_reply: ReplyHandler) {
        if let Err(command) = self.io.send(Command { argv, on_reply }) {
            command.reject();
        }
    }
}

impl std::fmt::Debug for DurableKv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DurableKv").finish_non_exhaustive()
    }
}

/// Builds a glob pattern matching every key that starts with `prefix`.
///
/// Glob metacharacters in the prefix are escaped so it matches literally.
#[must_use]
pub fn prefix_pattern(prefix: &[u8]) -> Vec<u8> {
    let mut pattern = Vec::with_capacity(prefix.len() + 1);
    for &b in prefix {
        if matches!(b, b'*' | b'?' | b'[' | b']' | b'\\') {
            pattern.push(b'\\');
        }
        pattern.push(b);
    }
    pattern.push(b'*');
    pattern
}

fn argv(parts: &[&[u8]]) -> Vec<Vec<u8>> {
    parts.iter().map(|p| p.to_vec()).collect()
}

fn log_failure<T>(command: &str, result: &StorageResult<T>) {
    if let Err(err) = result {
        tracing::warn!(command, error = %err, "store command failed");
    }
}

impl InternalKv for DurableKv {
    fn get(&self, ns: &str, key: &[u8], callback: Callback<Option<Vec<u8>>>) {
        let flat = key::encode(ns, key);
        self.run(
            argv(&[b"HGET", &flat, VALUE_FIELD]),
            Box::new(move |reply| {
                let result = reply.and_then(|r| r.into_optional_string("HGET"));
                log_failure("HGET", &result);
                callback(result);
            }),
        );
    }

    fn put(&self, ns: &str, key: &[u8], value: &[u8], overwrite: bool, callback: Callback<bool>) {
        let flat = key::encode(ns, key);
        let command: &'static str = if overwrite { "HSET" } else { "HSETNX" };
        self.run(
            argv(&[command.as_bytes(), &flat, VALUE_FIELD, value]),
            Box::new(move |reply| {
                let result = reply.and_then(|r| r.into_integer(command)).map(|n| n != 0);
                log_failure(command, &result);
                callback(result);
            }),
        );
    }

    fn del(&self, ns: &str, key: &[u8], by_prefix: bool, callback: Callback<i64>) {
        let flat = key::encode(ns, key);
        if !by_prefix {
            self.run(
                argv(&[b"DEL", &flat]),
                Box::new(move |reply| {
                    let result = reply.and_then(|r| r.into_integer("DEL"));
                    log_failure("DEL", &result);
                    callback(result);
                }),
            );
            return;
        }

        let Some(pipeline) = self.io.sender() else {
            callback(Err(StorageError::Closed));
            return;
        };
        self.run(
            argv(&[b"KEYS", &prefix_pattern(&flat)]),
            Box::new(move |reply| {
                let matched = match reply.and_then(|r| r.into_string_array("KEYS")) {
                    Ok(matched) => matched,
                    Err(err) => {
                        tracing::warn!(command = "KEYS", error = %err, "store command failed");
                        callback(Err(err));
                        return;
                    }
                };
                if matched.is_empty() {
                    callback(Ok(0));
                    return;
                }
                let mut del = Vec::with_capacity(matched.len() + 1);
                del.push(b"DEL".to_vec());
                del.extend(matched);
                submit(
                    &pipeline,
                    del,
                    Box::new(move |reply| {
                        let result = reply.and_then(|r| r.into_integer("DEL"));
                        log_failure("DEL", &result);
                        callback(result);
                    }),
                );
            }),
        );
    }

    fn exists(&self, ns: &str, key: &[u8], callback: Callback<bool>) {
        let flat = key::encode(ns, key);
        self.run(
            argv(&[b"HEXISTS", &flat, VALUE_FIELD]),
            Box::new(move |reply| {
                let result = reply.and_then(|r| r.into_integer("HEXISTS")).map(|n| n > 0);
                log_failure("HEXISTS", &result);
                callback(result);
            }),
        );
    }

    fn keys(&self, ns: &str, prefix: &[u8], callback: Callback<Vec<Vec<u8>>>) {
        let flat_prefix = key::encode(ns, prefix);
        self.run(
            argv(&[b"KEYS", &prefix_pattern(&flat_prefix)]),
            Box::new(move |reply| {
                let result = reply
                    .and_then(|r| r.into_string_array("KEYS"))
                    .map(|flat_keys| {
                        flat_keys
                            .iter()
                            .map(|k| key::decode(k).to_vec())
                            .collect::<Vec<_>>()
                    });
                log_failure("KEYS", &result);
                callback(result);
            }),
        );
    }
}
