//! Record id allocation.
//!
//! Ids are `prefix + counter`, with one monotonic counter per prefix.
//! An [`IdAllocator`] is owned by a single ingestion run and starts every
//! prefix at `0`; counters are not persisted. A later run over the same
//! content therefore reissues the same ids and overwrites earlier records
//! positionally.
//!
//! [`IdStrategy::ContentHash`] is the opt-in alternative: ids derived from
//! the item location and body, stable across runs.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::Deserialize;
use sha2::{Digest, Sha256};

/// How record ids are assigned during ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdStrategy {
    /// Per-run counters (`txt0`, `txt1`, ...).
    #[default]
    Counter,
    /// `prefix` + first 16 hex chars of `sha256(location \0 body)`.
    ContentHash,
}

/// Per-prefix monotonic counters, safe to share across workers.
#[derive(Debug, Default)]
pub struct IdAllocator {
    counters: Mutex<HashMap<String, u64>>,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return `prefix` followed by the next counter value for that prefix.
    pub fn next(&self, prefix: &str) -> String {
        let mut counters = match self.counters.lock() {
            Ok(guard) => guard,
            // A panicking holder cannot leave the map half-updated.
            Err(poisoned) => poisoned.into_inner(),
        };
        let counter = counters.entry(prefix.to_string()).or_insert(0);
        let id = format!("{prefix}{counter}");
        *counter += 1;
        id
    }
}

/// Content-derived id: identical location and body always map to the same id.
pub fn content_id(prefix: &str, location: &str, body: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(location.as_bytes());
    hasher.update([0u8]);
    hasher.update(body);
    let digest = hasher.finalize();
    let hex: String = digest.iter().take(8).map(|b| format!("{b:02x}")).collect();
    format!("{prefix}{hex}")
}
