//! Opt-out store contract.
//!
//! The opt-out store is an adjacent service; the operator only needs to
//! read the latest opt-out instant for a first-level key and to append an
//! entry when a user invalidates their tokens.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::Result;

/// Contract the operator requires from the opt-out service.
#[async_trait]
pub trait OptOutStore: Send + Sync {
    /// The most recent opt-out instant recorded for a first-level key.
    async fn latest_entry(&self, first_level_key: &str) -> Result<Option<u64>>;

    /// Record an opt-out at `now_ms`; returns the recorded instant.
    async fn add_entry(
        &self,
        first_level_key: &str,
        advertising_id: &str,
        now_ms: u64,
    ) -> Result<u64>;
}

/// In-memory opt-out store.
#[derive(Debug, Default)]
pub struct MemoryOptOutStore {
    entries: Mutex<HashMap<String, u64>>,
}

impl MemoryOptOutStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OptOutStore for MemoryOptOutStore {
    async fn latest_entry(&self, first_level_key: &str) -> Result<Option<u64>> {
        Ok(self
            .entries
            .lock()
            .expect("opt-out store lock poisoned")
            .get(first_level_key)
            .copied())
    }

    async fn add_entry(
        &self,
        first_level_key: &str,
        _advertising_id: &str,
        now_ms: u64,
    ) -> Result<u64> {
        let mut entries = self.entries.lock().expect("opt-out store lock poisoned");
        let entry = entries.entry(first_level_key.to_string()).or_insert(now_ms);
        if now_ms > *entry {
            *entry = now_ms;
        }
        Ok(*entry)
    }
}
