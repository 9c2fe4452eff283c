//! Single-flight leases keyed by session key.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::debug;

/// Set of session keys with a compaction in flight.
///
/// Each grant carries a generation, so a guard only ever releases the grant
/// it was issued for.
#[derive(Debug, Clone, Default)]
pub struct CompactionLeases {
    held: Arc<DashMap<String, u64>>,
    next_generation: Arc<AtomicU64>,
}

impl CompactionLeases {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically claim `key`. Returns `None` if it is already held.
    pub fn try_acquire(&self, key: &str) -> Option<CompactionLease> {
        match self.held.entry(key.to_string()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
                slot.insert(generation);
                debug!(session_key = %key, generation, "compaction lease acquired");
                Some(CompactionLease {
                    key: key.to_string(),
                    generation,
                    leases: self.clone(),
                })
            }
        }
    }

    /// Force-release `key` whoever holds it. Returns whether it was held.
    pub fn release(&self, key: &str) -> bool {
        let released = self.held.remove(key).is_some();
        if released {
            debug!(session_key = %key, "compaction lease released");
        }
        released
    }

    fn release_generation(&self, key: &str, generation: u64) {
        if self.held.remove_if(key, |_, held| *held == generation).is_some() {
            debug!(session_key = %key, generation, "compaction lease released");
        }
    }

    pub fn is_held(&self, key: &str) -> bool {
        self.held.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.held.len()
    }

    pub fn is_empty(&self) -> bool {
        self.held.is_empty()
    }
}

/// Guard for a held lease; releases the key when dropped.
#[derive(Debug)]
pub struct CompactionLease {
    key: String,
    generation: u64,
    leases: CompactionLeases,
}

impl CompactionLease {
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for CompactionLease {
    fn drop(&mut self) {
        self.leases.release_generation(&self.key, self.generation);
    }
}
