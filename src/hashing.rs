//! This module provides a `HashMap` variant with a deterministic hasher. The hashing data
//! structures in the standard library are not deterministic:
//!
//! > By default, HashMap uses a hashing algorithm selected to provide
//! > resistance against HashDoS attacks. The algorithm is randomly seeded, and a
//! > reasonable best-effort is made to generate this seed from a high quality,
//! > secure source of randomness provided by the host without blocking the program.
//!
//! Iteration order of the maps here only depends on their contents, which keeps runs
//! reproducible. `HashMap<K, V, S>` does not have a `new` method for custom hashers; the
//! `HashMapExt` trait provides one and need only be in scope.
//!
//! The free functions `hash_str` and `hash_key` feed seed derivation in `crate::random`.

use xxhash_rust::xxh3::{xxh3_64, xxh3_64_with_seed};

pub use rustc_hash::FxHashMap as HashMap;

pub trait HashMapExt {
    fn new() -> Self;
    fn with_capacity(capacity: usize) -> Self;
}

impl<K, V> HashMapExt for HashMap<K, V> {
    fn new() -> Self {
        HashMap::default()
    }

    fn with_capacity(capacity: usize) -> Self {
        HashMap::with_capacity_and_hasher(capacity, rustc_hash::FxBuildHasher)
    }
}

/// A convenience method to compute the hash of a `&str`.
#[must_use]
pub fn hash_str(data: &str) -> u64 {
    xxh3_64(data.as_bytes())
}

/// Hashes an `(iteration, key)` pair, e.g. a simulated day and a person or container id.
#[must_use]
pub fn hash_key(iteration: i64, key: u64) -> u64 {
    let mut bytes = [0u8; 16];
    bytes[..8].copy_from_slice(&iteration.to_le_bytes());
    bytes[8..].copy_from_slice(&key.to_le_bytes());
    xxh3_64_with_seed(&bytes, 0x9e37_79b9_7f4a_7c15)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashes_strings() {
        let a = hash_str("hello");
        let b = hash_str("hello");
        let c = hash_str("world");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn hashes_keys() {
        assert_eq!(hash_key(3, 7), hash_key(3, 7));
        assert_ne!(hash_key(3, 7), hash_key(7, 3));
        assert_ne!(hash_key(-1, 0), hash_key(1, 0));
    }

    #[test]
    fn map_ext_constructors() {
        let mut map: HashMap<u32, u32> = HashMap::new();
        map.insert(1, 2);
        assert_eq!(map.get(&1), Some(&2));
        let with_capacity: HashMap<u8, u8> = HashMap::with_capacity(4);
        assert!(with_capacity.capacity() >= 4);
    }
}
