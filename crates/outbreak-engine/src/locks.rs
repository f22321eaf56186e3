//! Per-seed mutual exclusion.
//!
//! Every mutation of a seed's state runs while holding that seed's guard.
//! Guards for different seeds are independent.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Table of async locks keyed by seed id.
#[derive(Default)]
pub struct SeedLocks {
    table: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl SeedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, seed_id: &str) -> Arc<AsyncMutex<()>> {
        let mut table = self.table.lock().unwrap_or_else(|e| e.into_inner());
        table
            .entry(seed_id.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Wait for exclusive access to `seed_id`.
    ///
    /// The guard is owned so it can move into a blocking task.
    pub async fn lock(&self, seed_id: &str) -> OwnedMutexGuard<()> {
        self.entry(seed_id).lock_owned().await
    }

    /// Drop entries nobody holds or waits on.
    pub fn prune(&self) -> usize {
        let mut table = self.table.lock().unwrap_or_else(|e| e.into_inner());
        let before = table.len();
        table.retain(|_, lock| Arc::strong_count(lock) > 1);
        before - table.len()
    }

    pub fn len(&self) -> usize {
        self.table.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
