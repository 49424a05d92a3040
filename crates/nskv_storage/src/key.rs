//! Namespace encoding for flat storage keys.
//!
//! Many logical keyspaces share one flat keyspace. A key in namespace `ns`
//! is stored as `@namespace_<ns>:<key>`; a key in the empty (global)
//! namespace is stored as-is.
//!
//! Decoding splits on the *first* separator after the marker. A namespace
//! that itself contains `:` therefore decodes to the wrong key, and a
//! marked key with no separator decodes to an empty key. Both cases are
//! preserved deliberately; callers must tolerate an empty decoded key.

/// Prefix that marks a flat key as namespaced.
pub const NAMESPACE_PREFIX: &[u8] = b"@namespace_";

/// Separator between the namespace and the caller's key.
pub const NAMESPACE_SEPARATOR: u8 = b':';

/// Encodes `(ns, key)` into the flat key stored by a backend.
///
/// # Example
///
/// ```rust
/// use nskv_storage::key;
///
/// assert_eq!(key::encode("", b"k"), b"k".to_vec());
/// assert_eq!(key::encode("jobs", b"k"), b"@namespace_jobs:k".to_vec());
/// ```
#[must_use]
pub fn encode(ns: &str, key: &[u8]) -> Vec<u8> {
    if ns.is_empty() {
        return key.to_vec();
    }
    let mut flat = Vec::with_capacity(NAMESPACE_PREFIX.len() + ns.len() + 1 + key.len());
    flat.extend_from_slice(NAMESPACE_PREFIX);
    flat.extend_from_slice(ns.as_bytes());
    flat.push(NAMESPACE_SEPARATOR);
    flat.extend_from_slice(key);
    flat
}

/// Strips the namespace from a flat key, returning the caller-relative key.
///
/// Unmarked keys are returned unchanged. A marked key without a separator
/// yields an empty slice.
#[must_use]
pub fn decode(flat: &[u8]) -> &[u8] {
    if !is_namespaced(flat) {
        return flat;
    }
    match flat.iter().position(|&b| b == NAMESPACE_SEPARATOR) {
        Some(pos) => &flat[pos + 1..],
        None => &[],
    }
}

/// Returns true if the flat key belongs to a non-global namespace.
#[must_use]
pub fn is_namespaced(flat: &[u8]) -> bool {
    flat.starts_with(NAMESPACE_PREFIX)
}
