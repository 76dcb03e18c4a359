//! Key pool parsing and uniform random selection
//!
//! The pool is rebuilt from the raw key string on every dispatch, and
//! exclusions produce a new pool rather than mutating shared state, so a
//! key dropped for one request is back in play for the next. Raw key
//! material never appears in logs; `fingerprint` is the only permitted
//! representation.

use std::fmt;

use rand::RngExt;
use sha2::{Digest, Sha256};

/// Deduplicated, order-preserving pool of API keys.
#[derive(Clone)]
pub struct KeyPool {
    keys: Vec<String>,
}

impl KeyPool {
    /// Parse a raw key string into a pool.
    ///
    /// Splits on newlines and commas, trims surrounding whitespace, drops
    /// empty entries, and deduplicates while preserving first-seen order.
    /// An empty or all-whitespace input yields an empty pool.
    pub fn parse(raw: &str) -> Self {
        let mut keys: Vec<String> = Vec::new();
        for entry in raw.split(['\n', ',']) {
            let trimmed = entry.trim();
            if trimmed.is_empty() {
                continue;
            }
            if !keys.iter().any(|k| k == trimmed) {
                keys.push(trimmed.to_string());
            }
        }
        Self { keys }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.iter().any(|k| k == key)
    }

    /// Select a key uniformly at random, or `None` when the pool is empty.
    pub fn select_random<R: RngExt + ?Sized>(&self, rng: &mut R) -> Option<&str> {
        if self.keys.is_empty() {
            return None;
        }
        let idx = rng.random_range(0..self.keys.len());
        Some(&self.keys[idx])
    }

    /// Return a copy of the pool with every occurrence of `key` removed.
    pub fn exclude(&self, key: &str) -> Self {
        Self {
            keys: self
                .keys
                .iter()
                .filter(|k| k.as_str() != key)
                .cloned()
                .collect(),
        }
    }
}

impl fmt::Debug for KeyPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPool")
            .field("keys", &self.keys.len())
            .finish()
    }
}

/// Short non-reversible key identifier for logs.
///
/// First 8 hex characters of the SHA-256 digest. Collisions are harmless;
/// the fingerprint only needs to let an operator follow one key through a
/// log stream.
pub fn fingerprint(key: &str) -> String {
    let digest = Sha256::digest(key.as_bytes());
    digest[..4].iter().map(|b| format!("{b:02x}")).collect()
}
