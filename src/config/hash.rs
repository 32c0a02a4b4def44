//! Fingerprints of desired resources.
//!
//! A fingerprint is the SHA-256 of the compact JSON form of a tree with
//! nulls removed. `serde_json` maps keep their keys sorted, so equal trees
//! always produce equal fingerprints.

use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::Result;

use super::manifest::Manifest;

/// Hasher for computing resource fingerprints.
#[derive(Debug, Default)]
pub struct ConfigHasher;

impl ConfigHasher {
    /// Creates a new hasher.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Computes the fingerprint of a resource tree.
    #[must_use]
    pub fn hash_tree(&self, tree: &Value) -> String {
        let mut hasher = Sha256::new();
        hasher.update(strip_nulls(tree).to_string().as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Computes the fingerprint of a manifest's resource.
    ///
    /// # Errors
    ///
    /// Returns an error if the resource cannot be serialized.
    pub fn hash_manifest(&self, manifest: &Manifest) -> Result<String> {
        Ok(self.hash_tree(&manifest.to_tree()?))
    }

    /// Computes a short hash (first 8 characters) for display purposes.
    #[must_use]
    pub fn short_hash(&self, hash: &str) -> String {
        hash.chars().take(8).collect()
    }

    /// Compares two hashes without short-circuiting on the first mismatch.
    #[must_use]
    pub fn hashes_match(hash1: &str, hash2: &str) -> bool {
        if hash1.len() != hash2.len() {
            return false;
        }

        hash1
            .bytes()
            .zip(hash2.bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

/// Returns a copy of `tree` without null members.
#[must_use]
pub fn strip_nulls(tree: &Value) -> Value {
    match tree {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k.clone(), strip_nulls(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(strip_nulls).collect()),
        other => other.clone(),
    }
}
