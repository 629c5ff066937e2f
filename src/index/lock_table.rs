use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::error::Result;

/// Table size at which unheld entries are reaped.
const REAP_THRESHOLD: usize = 1024;

/// Hands out one mutex per user key, serializing writers of the same key's
/// open temp segment. Writers touching disjoint keys proceed in parallel;
/// readers never take these locks.
#[derive(Default)]
pub struct KeyLockTable {
    entries: Mutex<HashMap<Vec<u8>, Arc<Mutex<()>>>>,
}

impl KeyLockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the lock handle for a key, creating it on first use. Entries
    /// no thread holds are reaped once the table grows past a threshold.
    pub fn handle(&self, key: &[u8]) -> Result<Arc<Mutex<()>>> {
        let mut entries = self.entries.lock()?;
        if entries.len() >= REAP_THRESHOLD {
            entries.retain(|_, lock| Arc::strong_count(lock) > 1);
        }
        Ok(entries.entry(key.to_vec()).or_default().clone())
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.lock().expect("lock table poisoned").len()
    }
}
