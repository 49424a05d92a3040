//! Property-based test generators using proptest.
//!
//! Namespaces and keys are drawn from small alphabets so generated
//! operation sequences collide often enough to exercise overwrites,
//! prefix deletes and cross-namespace isolation.

use proptest::prelude::*;

/// Strategy for namespace names, including the empty (global) namespace.
///
/// Names never contain the `:` separator. Names that are prefixes of one
/// another (`a`, `ab`) are common.
pub fn namespace_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        Just(String::new()),
        prop::string::string_regex("[a-c_]{1,3}").expect("Invalid regex"),
    ]
}

/// Strategy for keys from a narrow alphabet, so prefixes overlap.
pub fn key_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(prop::sample::select(vec![b'a', b'b', b'/', b':']), 0..4)
}

/// Strategy for arbitrary binary keys.
pub fn binary_key_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..32)
}

/// Strategy for values, including the empty value.
pub fn value_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..64)
}

/// One backend call, for model-based tests.
#[derive(Debug, Clone)]
pub enum KvOp {
    /// `get(ns, key)`
    Get {
        /// Namespace.
        ns: String,
        /// Key.
        key: Vec<u8>,
    },
    /// `put(ns, key, value, overwrite)`
    Put {
        /// Namespace.
        ns: String,
        /// Key.
        key: Vec<u8>,
        /// Value.
        value: Vec<u8>,
        /// Overwrite flag.
        overwrite: bool,
    },
    /// `del(ns, key, by_prefix)`
    Del {
        /// Namespace.
        ns: String,
        /// Key or prefix.
        key: Vec<u8>,
        /// Prefix flag.
        by_prefix: bool,
    },
    /// `exists(ns, key)`
    Exists {
        /// Namespace.
        ns: String,
        /// Key.
        key: Vec<u8>,
    },
    /// `keys(ns, prefix)`
    Keys {
        /// Namespace.
        ns: String,
        /// Prefix.
        prefix: Vec<u8>,
    },
}

/// Strategy for a single operation.
pub fn op_strategy() -> impl Strategy<Value = KvOp> {
    prop_oneof![
        1 => (namespace_strategy(), key_strategy()).prop_map(|(ns, key)| KvOp::Get { ns, key }),
        3 => (namespace_strategy(), key_strategy(), value_strategy(), any::<bool>()).prop_map(
            |(ns, key, value, overwrite)| KvOp::Put {
                ns,
                key,
                value,
                overwrite
            }
        ),
        1 => (namespace_strategy(), key_strategy(), any::<bool>())
            .prop_map(|(ns, key, by_prefix)| KvOp::Del { ns, key, by_prefix }),
        1 => (namespace_strategy(), key_strategy()).prop_map(|(ns, key)| KvOp::Exists { ns, key }),
        1 => (namespace_strategy(), key_strategy())
            .prop_map(|(ns, prefix)| KvOp::Keys { ns, prefix }),
    ]
}

/// Strategy for a sequence of operations.
pub fn op_sequence_strategy(max_len: usize) -> impl Strategy<Value = Vec<KvOp>> {
    prop::collection::vec(op_strategy(), 1..max_len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::strategy::ValueTree;
    use proptest::test_runner::TestRunner;

    #[test]
    fn namespaces_include_global() {
        let mut runner = TestRunner::deterministic();
        let mut saw_global = false;
        for _ in 0..200 {
            let ns = namespace_strategy()
                .new_tree(&mut runner)
                .unwrap()
                .current();
            saw_global |= ns.is_empty();
        }
        assert!(saw_global);
    }

    proptest! {
        #[test]
        fn keys_use_narrow_alphabet(key in key_strategy()) {
            prop_assert!(key.len() < 4);
            prop_assert!(key.iter().all(|b| b"ab/:".contains(b)));
        }
    }
}
