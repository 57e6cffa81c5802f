//! Per-asset serialization
//!
//! One async mutex per `(asset, scope)`. Order placement, cancellation and
//! matching for an asset share the `Book` scope; primary issuance against an
//! asset's treasury uses the `Treasury` scope. Different assets never contend.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use types::ids::AssetId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockScope {
    Book,
    Treasury,
}

#[derive(Debug, Default)]
pub struct AssetLocks {
    locks: DashMap<(AssetId, LockScope), Arc<Mutex<()>>>,
}

impl AssetLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `asset_id` within `scope`
    pub async fn acquire(&self, asset_id: &AssetId, scope: LockScope) -> OwnedMutexGuard<()> {
        // Clone the Arc out so the map shard is released before awaiting
        let lock = self
            .locks
            .entry((asset_id.clone(), scope))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }
}
