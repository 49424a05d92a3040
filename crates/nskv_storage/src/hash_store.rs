//! In-process hash store speaking the command subset used by [`DurableKv`].
//!
//! [`DurableKv`]: crate::DurableKv

use crate::executor::{CommandExecutor, CommandReply, ReplyHandler};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

type Hash = BTreeMap<Vec<u8>, Vec<u8>>;

/// A loopback [`CommandExecutor`] that keeps hashes in process memory.
///
/// It answers `HGET`, `HSET`, `HSETNX`, `HEXISTS`, `DEL`, `KEYS` and `PING`
/// with the same reply shapes a Redis-compatible server would use, which
/// makes it a stand-in for the remote store in tests and single-node
/// deployments. Clones share the same data.
#[derive(Debug, Clone, Default)]
pub struct HashStore {
    objects: Arc<Mutex<BTreeMap<Vec<u8>, Hash>>>,
}

impl HashStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of hash objects held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.lock().len()
    }

    /// Returns true if no objects are held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.lock().is_empty()
    }

    /// Executes one command synchronously.
    pub fn execute(&self, argv: &[Vec<u8>]) -> CommandReply {
        let Some((name, args)) = argv.split_first() else {
            return CommandReply::Error("ERR empty command".into());
        };
        let name = String::from_utf8_lossy(name).to_ascii_uppercase();
        let mut objects = self.objects.lock();

        match (name.as_str(), args) {
            ("PING", []) => CommandReply::Status("PONG".into()),
            ("HGET", [key, field]) => match objects.get(key).and_then(|h| h.get(field)) {
                Some(value) => CommandReply::String(value.clone()),
                None => CommandReply::Nil,
            },
            ("HSET", [key, rest @ ..]) if !rest.is_empty() && rest.len() % 2 == 0 => {
                let hash = objects.entry(key.clone()).or_default();
                let added = rest
                    .chunks(2)
                    .filter(|pair| hash.insert(pair[0].clone(), pair[1].clone()).is_none())
                    .count();
                CommandReply::Integer(added as i64)
            }
            ("HSETNX", [key, field, value]) => {
                let hash = objects.entry(key.clone()).or_default();
                if hash.contains_key(field) {
                    CommandReply::Integer(0)
                } else {
                    hash.insert(field.clone(), value.clone());
                    CommandReply::Integer(1)
                }
            }
            ("HEXISTS", [key, field]) => {
                let found = objects.get(key).is_some_and(|h| h.contains_key(field));
                CommandReply::Integer(i64::from(found))
            }
            ("DEL", keys) if !keys.is_empty() => {
                let removed = keys.iter().filter(|k| objects.remove(*k).is_some()).count();
                CommandReply::Integer(removed as i64)
            }
            ("KEYS", [pattern]) => CommandReply::Array(
                objects
                    .keys()
                    .filter(|k| glob_match(pattern, k))
                    .cloned()
                    .collect(),
            ),
            ("PING" | "HGET" | "HSET" | "HSETNX" | "HEXISTS" | "DEL" | "KEYS", _) => {
                CommandReply::Error(format!(
                    "ERR wrong number of arguments for '{}' command",
                    name.to_ascii_lowercase()
                ))
            }
            _ => CommandReply::Error(format!("ERR unknown command '{name}'")),
        }
    }
}

impl CommandExecutor for HashStore {
    fn run_argv_async(&mut self, argv: Vec<Vec<u8>>, handler: ReplyHandler) {
        let reply = self.execute(&argv);
        handler(Ok(reply));
    }
}

/// Matches `text` against a glob `pattern`.
///
/// Supports `*`, `?`, `[...]` classes with ranges and `^` negation, and
/// `\` escapes.
pub fn glob_match(pattern: &[u8], text: &[u8]) -> bool {
    let (mut p, mut t) = (0usize, 0usize);
    // Position to resume from after the most recent `*`.
    let mut star: Option<(usize, usize)> = None;

    while t < text.len() {
        if p < pattern.len() {
            match pattern[p] {
                b'*' => {
                    star = Some((p, t));
                    p += 1;
                    continue;
                }
                b'?' => {
                    p += 1;
                    t += 1;
                    continue;
                }
                b'[' => {
                    if let Some((matched, next)) = match_class(pattern, p, text[t]) {
                        if matched {
                            p = next;
                            t += 1;
                            continue;
                        }
                    } else if text[t] == b'[' {
                        p += 1;
                        t += 1;
                        continue;
                    }
                }
                b'\\' if p + 1 < pattern.len() => {
                    if pattern[p + 1] == text[t] {
                        p += 2;
                        t += 1;
                        continue;
                    }
                }
                c => {
                    if c == text[t] {
                        p += 1;
                        t += 1;
                        continue;
                    }
                }
            }
        }
        match star {
            Some((star_p, star_t)) => {
                p = star_p + 1;
                t = star_t + 1;
                star = Some((star_p, star_t + 1));
            }
            None => return false,
        }
    }

    pattern[p..].iter().all(|&c| c == b'*')
}

/// Evaluates the class starting at `pattern[start] == b'['` against `c`.
///
/// Returns whether it matched and the index after the closing `]`, or
/// `None` if the class is unterminated.
fn match_class(pattern: &[u8], start: usize, c: u8) -> Option<(bool, usize)> {
    let mut i = start + 1;
    let negate = pattern.get(i) == Some(&b'^');
    if negate {
        i += 1;
    }
    let mut matched = false;
    while i < pattern.len() && pattern[i] != b']' {
        let mut lo = pattern[i];
        if lo == b'\\' && i + 1 < pattern.len() {
            i += 1;
            lo = pattern[i];
        }
        if i + 2 < pattern.len() && pattern[i + 1] == b'-' && pattern[i + 2] != b']' {
            let hi = pattern[i + 2];
            let (lo, hi) = if lo <= hi { (lo, hi) } else { (hi, lo) };
            matched |= (lo..=hi).contains(&c);
            i += 3;
        } else {
            matched |= lo == c;
            i += 1;
        }
    }
    if i >= pattern.len() {
        return None;
    }
    Some((matched != negate, i + 1))
}
