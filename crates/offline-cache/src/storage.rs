use crate::store::NamedStore;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::sync::Arc;
use url::Origin;

/// Origin-scoped registry of named stores.
///
/// Names enumerate in creation order. A store is created lazily by
/// [`CacheStorage::open`] and dropped outright by [`CacheStorage::delete`];
/// anyone still holding the `Arc` keeps a detached store that no longer
/// appears here.
pub struct CacheStorage {
    origin: Origin,
    stores: RwLock<Vec<Arc<NamedStore>>>,
    /// Shared by writers, exclusive for a version swap.
    gate: RwLock<()>,
}

impl CacheStorage {
    pub fn new(origin: Origin) -> Self {
        Self {
            origin,
            stores: RwLock::new(Vec::new()),
            gate: RwLock::new(()),
        }
    }

    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    /// Held while a coordinator checks its state and writes, so a swap
    /// cannot retire it and delete its store in between.
    pub(crate) fn write_gate(&self) -> RwLockReadGuard<'_, ()> {
        self.gate.read()
    }

    /// Held across a version swap. Waits out in-flight writes.
    pub(crate) fn swap_gate(&self) -> RwLockWriteGuard<'_, ()> {
        self.gate.write()
    }

    /// Open a store, creating it if it does not exist.
    pub fn open(&self, name: &str) -> Arc<NamedStore> {
        if let Some(store) = self.get(name) {
            return store;
        }

        let mut stores = self.stores.write();
        // Re-check: another task may have created it between the locks.
        if let Some(store) = stores.iter().find(|s| s.name() == name) {
            return Arc::clone(store);
        }

        tracing::debug!(store = name, "creating store");
        let store = Arc::new(NamedStore::new(name));
        stores.push(Arc::clone(&store));
        store
    }

    /// Look up an existing store without creating it.
    pub fn get(&self, name: &str) -> Option<Arc<NamedStore>> {
        self.stores
            .read()
            .iter()
            .find(|s| s.name() == name)
            .map(Arc::clone)
    }

    pub fn has(&self, name: &str) -> bool {
        self.stores.read().iter().any(|s| s.name() == name)
    }

    pub fn delete(&self, name: &str) -> bool {
        let mut stores = self.stores.write();
        let before = stores.len();
        stores.retain(|s| s.name() != name);
        stores.len() != before
    }

    /// All store names, in creation order.
    pub fn keys(&self) -> Vec<String> {
        self.stores
            .read()
            .iter()
            .map(|s| s.name().to_string())
            .collect()
    }
}

impl std::fmt::Debug for CacheStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStorage")
            .field("origin", &self.origin)
            .field("store_count", &self.stores.read().len())
            .finish()
    }
}
