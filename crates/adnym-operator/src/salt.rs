//! Salt directory contract.
//!
//! The salt directory is an external service rotating per-bucket salts on
//! its own schedule. The operator needs three views of a snapshot: the
//! first-level salt, the rotating salt for a first-level key, and the
//! buckets rotated since a point in time (consumers poll the latter to
//! learn when stored advertising ids must be re-derived).

use sha2::{Digest, Sha256};

use crate::{OperatorError, Result};

/// One rotating-salt bucket.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SaltEntry {
    /// Bucket index.
    pub id: u32,
    /// The rotating salt itself. Never exposed to API consumers.
    pub salt: String,
    /// Stable opaque bucket identifier surfaced to consumers.
    pub bucket_id: String,
    /// When this bucket's salt last rotated (ms since epoch).
    pub last_updated: u64,
}

/// Snapshot interface of the salt directory.
pub trait SaltProvider: Send + Sync {
    /// The long-lived salt for first-level key derivation.
    fn first_level_salt(&self) -> Result<String>;

    /// The rotating-salt bucket a first-level key maps to.
    fn rotating_salt(&self, first_level_key: &str) -> Result<SaltEntry>;

    /// Buckets whose salts rotated at or after `since_ms`.
    fn modified_since(&self, since_ms: u64) -> Result<Vec<SaltEntry>>;
}

/// In-memory salt directory with a fixed set of buckets.
#[derive(Debug)]
pub struct MemorySaltProvider {
    first_level_salt: String,
    entries: Vec<SaltEntry>,
}

impl MemorySaltProvider {
    /// Create a directory over explicit buckets.
    ///
    /// At least one bucket is required; key-to-bucket assignment hashes the
    /// first-level key so it is stable across snapshots.
    pub fn new(first_level_salt: impl Into<String>, entries: Vec<SaltEntry>) -> Self {
        assert!(!entries.is_empty(), "at least one salt bucket is required");
        Self {
            first_level_salt: first_level_salt.into(),
            entries,
        }
    }

    /// Convenience constructor: `buckets` synthetic buckets stamped at
    /// `last_updated`.
    pub fn with_buckets(
        first_level_salt: impl Into<String>,
        buckets: u32,
        last_updated: u64,
    ) -> Self {
        let entries = (0..buckets)
            .map(|id| SaltEntry {
                id,
                salt: format!("rotating-salt-{id}"),
                bucket_id: format!("bucket-{id}"),
                last_updated,
            })
            .collect();
        Self::new(first_level_salt, entries)
    }
}

impl SaltProvider for MemorySaltProvider {
    fn first_level_salt(&self) -> Result<String> {
        Ok(self.first_level_salt.clone())
    }

    fn rotating_salt(&self, first_level_key: &str) -> Result<SaltEntry> {
        let digest = Sha256::digest(first_level_key.as_bytes());
        let index = u32::from_be_bytes(digest[..4].try_into().expect("4-byte prefix"));
        let entry = self
            .entries
            .get(index as usize % self.entries.len())
            .cloned()
            .ok_or_else(|| OperatorError::Salt("empty salt directory".into()))?;
        Ok(entry)
    }

    fn modified_since(&self, since_ms: u64) -> Result<Vec<SaltEntry>> {
        Ok(self
            .entries
            .iter()
            .filter(|entry| entry.last_updated >= since_ms)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_assignment_is_stable() {
        let provider = MemorySaltProvider::with_buckets("fls", 16, 1_000);
        let a = provider.rotating_salt("some-first-level-key").unwrap();
        let b = provider.rotating_salt("some-first-level-key").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_different_keys_can_hit_different_buckets() {
        let provider = MemorySaltProvider::with_buckets("fls", 16, 1_000);
        let buckets: std::collections::HashSet<u32> = (0..64)
            .map(|i| provider.rotating_salt(&format!("key-{i}")).unwrap().id)
            .collect();
        assert!(buckets.len() > 1);
    }

    #[test]
    fn test_modified_since_filters() {
        let provider = MemorySaltProvider::new(
            "fls",
            vec![
                SaltEntry {
                    id: 0,
                    salt: "a".into(),
                    bucket_id: "b0".into(),
                    last_updated: 1_000,
                },
                SaltEntry {
                    id: 1,
                    salt: "b".into(),
                    bucket_id: "b1".into(),
                    last_updated: 5_000,
                },
            ],
        );
        let modified = provider.modified_since(2_000).unwrap();
        assert_eq!(modified.len(), 1);
        assert_eq!(modified[0].id, 1);
        assert_eq!(provider.modified_since(0).unwrap().len(), 2);
    }
}
