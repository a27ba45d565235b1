//! Per-asset serialization of ownership changes

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tranche_core::AssetId;

/// One async lock per asset, created on first use
#[derive(Default)]
pub struct AssetLocks {
    locks: Mutex<HashMap<AssetId, Arc<AsyncMutex<()>>>>,
}

impl AssetLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `asset_id`. Released on drop.
    pub async fn acquire(&self, asset_id: &AssetId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            // Drop entries nobody holds or waits on
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks.entry(asset_id.clone()).or_default().clone()
        };
        lock.lock_owned().await
    }

    /// Assets with a live lock
    pub fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
