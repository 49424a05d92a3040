//! Backend conformance suite.
//!
//! Every check takes a `&dyn InternalKv` and panics on violation, so the
//! same checks run against each backend. [`run_all`] runs the lot.
//!
//! Prefix deletion enumerates and then deletes, so a key written under the
//! prefix between the two steps may survive. That is accepted behavior, not
//! a defect; [`check_prefix_delete_race`] asserts only what does hold.

use crate::fixtures::{wait_for, BlockingKv, DEFAULT_WAIT};
use crate::generators::KvOp;
use nskv_storage::{key, InternalKv};
use std::collections::BTreeMap;
use std::sync::mpsc;
use std::thread;

/// Reference model of the backend contract over flat keys.
#[derive(Debug, Default, Clone)]
pub struct ModelKv {
    entries: BTreeMap<Vec<u8>, Vec<u8>>,
}

/// Result of one operation, comparable across backends and the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// `get`
    Value(Option<Vec<u8>>),
    /// `put`
    Added(bool),
    /// `del`
    Deleted(i64),
    /// `exists`
    Exists(bool),
    /// `keys`, sorted
    Keys(Vec<Vec<u8>>),
}

impl ModelKv {
    /// Creates an empty model.
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one operation and returns its outcome.
    pub fn apply(&mut self, op: &KvOp) -> Outcome {
        match op {
            KvOp::Get { ns, key: k } => {
                Outcome::Value(self.entries.get(&key::encode(ns, k)).cloned())
            }
            KvOp::Put {
                ns,
                key: k,
                value,
                overwrite,
            } => {
                let flat = key::encode(ns, k);
                let absent = !self.entries.contains_key(&flat);
                if absent || *overwrite {
                    self.entries.insert(flat, value.clone());
                }
                Outcome::Added(absent)
            }
            KvOp::Del {
                ns,
                key: k,
                by_prefix: false,
            } => Outcome::Deleted(i64::from(self.entries.remove(&key::encode(ns, k)).is_some())),
            KvOp::Del {
                ns,
                key: k,
                by_prefix: true,
            } => {
                let matched = self.matching(&key::encode(ns, k));
                for flat in &matched {
                    self.entries.remove(flat);
                }
                Outcome::Deleted(matched.len() as i64)
            }
            KvOp::Exists { ns, key: k } => {
                Outcome::Exists(self.entries.contains_key(&key::encode(ns, k)))
            }
            KvOp::Keys { ns, prefix } => {
                let mut keys: Vec<Vec<u8>> = self
                    .matching(&key::encode(ns, prefix))
                    .iter()
                    .map(|flat| key::decode(flat).to_vec())
                    .collect();
                keys.sort();
                Outcome::Keys(keys)
            }
        }
    }

    /// Number of entries in the model.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the model is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn matching(&self, flat_prefix: &[u8]) -> Vec<Vec<u8>> {
        self.entries
            .range(flat_prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(flat_prefix))
            .map(|(k, _)| k.clone())
            .collect()
    }
}

/// Applies one operation to a backend and returns its outcome.
///
/// # Panics
///
/// Panics if the backend reports an error.
pub fn apply(kv: &dyn InternalKv, op: &KvOp) -> Outcome {
    let kv = BlockingKv::new(kv);
    let outcome = match op {
        KvOp::Get { ns, key } => kv.get(ns, key).map(Outcome::Value),
        KvOp::Put {
            ns,
            key,
            value,
            overwrite,
        } => kv.put(ns, key, value, *overwrite).map(Outcome::Added),
        KvOp::Del { ns, key, by_prefix } => kv.del(ns, key, *by_prefix).map(Outcome::Deleted),
        KvOp::Exists { ns, key } => kv.exists(ns, key).map(Outcome::Exists),
        KvOp::Keys { ns, prefix } => kv.keys(ns, prefix).map(Outcome::Keys),
    };
    outcome.unwrap_or_else(|e| panic!("{op:?} failed: {e}"))
}

/// Runs `ops` against the backend and the model, asserting equal outcomes.
pub fn check_against_model(kv: &dyn InternalKv, ops: &[KvOp]) {
    let mut model = ModelKv::new();
    for (i, op) in ops.iter().enumerate() {
        let expected = model.apply(op);
        let actual = apply(kv, op);
        assert_eq!(actual, expected, "step {i}: {op:?}");
    }
}

/// A written value reads back; a missing key reads as absent.
pub fn check_put_get(kv: &dyn InternalKv) {
    let b = BlockingKv::new(kv);
    assert_eq!(b.get("pg", b"k").unwrap(), None);
    assert!(b.put("pg", b"k", b"v1", true).unwrap());
    assert_eq!(b.get("pg", b"k").unwrap(), Some(b"v1".to_vec()));

    // Empty value is present, not absent.
    assert!(b.put("pg", b"empty", b"", true).unwrap());
    assert_eq!(b.get("pg", b"empty").unwrap(), Some(Vec::new()));
    assert!(b.exists("pg", b"empty").unwrap());
}

/// `overwrite = false` leaves an existing value alone.
pub fn check_insert_if_absent(kv: &dyn InternalKv) {
    let b = BlockingKv::new(kv);
    assert!(b.put("ia", b"k", b"first", false).unwrap());
    assert!(!b.put("ia", b"k", b"second", false).unwrap());
    assert_eq!(b.get("ia", b"k").unwrap(), Some(b"first".to_vec()));
}

/// `overwrite = true` replaces the value but reports only new keys.
pub fn check_overwrite(kv: &dyn InternalKv) {
    let b = BlockingKv::new(kv);
    assert!(b.put("ow", b"k", b"a", true).unwrap());
    assert!(!b.put("ow", b"k", b"b", true).unwrap());
    assert_eq!(b.get("ow", b"k").unwrap(), Some(b"b".to_vec()));
}

/// Single deletes report 1 for a present key and 0 otherwise.
pub fn check_delete_counts(kv: &dyn InternalKv) {
    let b = BlockingKv::new(kv);
    assert_eq!(b.del("dc", b"k", false).unwrap(), 0);
    b.put("dc", b"k", b"v", true).unwrap();
    assert_eq!(b.del("dc", b"k", false).unwrap(), 1);
    assert_eq!(b.del("dc", b"k", false).unwrap(), 0);
    assert!(!b.exists("dc", b"k").unwrap());
}

/// Keys lists exactly the keys under the prefix, namespace stripped.
pub fn check_prefix_enumeration(kv: &dyn InternalKv) {
    let b = BlockingKv::new(kv);
    for k in ["job/1", "job/2", "jobs", "task/1"] {
        b.put("pe", k.as_bytes(), b"x", true).unwrap();
    }
    assert_eq!(
        b.keys("pe", b"job/").unwrap(),
        vec![b"job/1".to_vec(), b"job/2".to_vec()]
    );
    assert_eq!(b.keys("pe", b"").unwrap().len(), 4);
    assert!(b.keys("pe", b"none").unwrap().is_empty());
}

/// The same key in different namespaces holds independent values.
pub fn check_namespace_isolation(kv: &dyn InternalKv) {
    let b = BlockingKv::new(kv);
    b.put("iso_a", b"k", b"in-a", true).unwrap();
    b.put("iso_ab", b"k", b"in-ab", true).unwrap();

    assert_eq!(b.get("iso_a", b"k").unwrap(), Some(b"in-a".to_vec()));
    assert_eq!(b.get("iso_ab", b"k").unwrap(), Some(b"in-ab".to_vec()));
    assert_eq!(b.get("iso_b", b"k").unwrap(), None);
    // A namespace that is a prefix of another does not see its keys.
    assert_eq!(b.keys("iso_a", b"").unwrap(), vec![b"k".to_vec()]);

    assert_eq!(b.del("iso_a", b"", true).unwrap(), 1);
    assert_eq!(b.get("iso_ab", b"k").unwrap(), Some(b"in-ab".to_vec()));
}

/// Prefix delete removes matching keys and reports how many.
pub fn check_prefix_delete(kv: &dyn InternalKv) {
    let b = BlockingKv::new(kv);
    for k in ["a/1", "a/2", "b/1"] {
        b.put("pd", k.as_bytes(), b"x", true).unwrap();
    }
    assert_eq!(b.del("pd", b"a/", true).unwrap(), 2);
    assert_eq!(b.keys("pd", b"").unwrap(), vec![b"b/1".to_vec()]);
    assert_eq!(b.del("pd", b"a/", true).unwrap(), 0);
}

/// Prefixes with glob metacharacters match literally.
pub fn check_literal_prefix(kv: &dyn InternalKv) {
    let b = BlockingKv::new(kv);
    for k in ["*x", "[ab]", "a", "b?"] {
        b.put("lit", k.as_bytes(), b"x", true).unwrap();
    }
    assert_eq!(b.keys("lit", b"*").unwrap(), vec![b"*x".to_vec()]);
    assert_eq!(b.keys("lit", b"[").unwrap(), vec![b"[ab]".to_vec()]);
    assert_eq!(b.del("lit", b"b?", true).unwrap(), 1);
    assert!(b.exists("lit", b"a").unwrap());
}

/// Callbacks run off the calling thread and may call back into the backend.
pub fn check_callback_threading(kv: &'static dyn InternalKv) {
    let caller = thread::current().id();
    let (tx, rx) = mpsc::channel();
    kv.put(
        "cb",
        b"k",
        b"v",
        true,
        Box::new(move |result| {
            let on_caller = thread::current().id() == caller;
            // Chained call from inside the completion.
            kv.get(
                "cb",
                b"k",
                Box::new(move |read| {
                    let _ = tx.send((on_caller, result.ok(), read.ok().flatten()));
                }),
            );
        }),
    );
    let (on_caller, put, read) = rx.recv_timeout(DEFAULT_WAIT).expect("chained callback");
    assert!(!on_caller, "callback ran on the caller's thread");
    assert_eq!(put, Some(true));
    assert_eq!(read, Some(b"v".to_vec()));
}

/// Each operation invokes its callback exactly once.
pub fn check_single_invocation(kv: &dyn InternalKv) {
    let (tx, rx) = mpsc::channel();
    for i in 0..16u8 {
        let tx = tx.clone();
        kv.put("once", &[i], b"v", true, Box::new(move |_| {
            let _ = tx.send(i);
        }));
    }
    drop(tx);
    let mut seen: Vec<u8> = rx.iter().collect();
    seen.sort_unstable();
    assert_eq!(seen, (0..16).collect::<Vec<_>>());

    let count = wait_for(DEFAULT_WAIT, |cb| kv.keys("once", b"", cb)).unwrap().len();
    assert_eq!(count, 16);
}

/// Prefix delete racing concurrent writers under the same prefix.
///
/// Whether a racing write survives is not specified. What holds: every
/// callback fires once, and each written key is either counted by the
/// delete or still present afterwards.
pub fn check_prefix_delete_race(kv: &dyn InternalKv) {
    const SEEDED: usize = 32;
    const RACING: usize = 64;

    let b = BlockingKv::new(kv);
    for i in 0..SEEDED {
        b.put("race", format!("p/seed{i}").as_bytes(), b"v", true)
            .expect("seed put failed");
    }

    let (put_tx, put_rx) = mpsc::channel();
    let (del_tx, del_rx) = mpsc::channel();
    thread::scope(|s| {
        s.spawn(|| {
            for i in 0..RACING {
                let tx = put_tx.clone();
                kv.put(
                    "race",
                    format!("p/new{i}").as_bytes(),
                    b"v",
                    true,
                    Box::new(move |added| {
                        let _ = tx.send(added);
                    }),
                );
            }
        });
        s.spawn(|| {
            let tx = del_tx.clone();
            kv.del(
                "race",
                b"p/",
                true,
                Box::new(move |deleted| {
                    let _ = tx.send(deleted);
                }),
            );
        });
    });
    drop(put_tx);
    drop(del_tx);

    let added: Vec<bool> = put_rx
        .iter()
        .map(|r| r.expect("racing put failed"))
        .collect();
    assert_eq!(added.len(), RACING, "every put callback fires once");
    assert!(added.iter().all(|a| *a), "racing keys are fresh");

    let deleted: Vec<i64> = del_rx
        .iter()
        .map(|r| r.expect("prefix delete failed"))
        .collect();
    assert_eq!(deleted.len(), 1, "delete callback fires once");

    let survivors = b.keys("race", b"p/").expect("keys failed").len();
    assert_eq!(deleted[0] as usize + survivors, SEEDED + RACING);
    assert!(deleted[0] as usize >= SEEDED, "seeded keys predate the delete");
}

/// Runs every single-threaded check against `kv`.
///
/// Checks use distinct namespaces so they can share one backend.
pub fn run_all(kv: &dyn InternalKv) {
    check_put_get(kv);
    check_insert_if_absent(kv);
    check_overwrite(kv);
    check_delete_counts(kv);
    check_prefix_enumeration(kv);
    check_namespace_isolation(kv);
    check_prefix_delete(kv);
    check_literal_prefix(kv);
    check_single_invocation(kv);
}
