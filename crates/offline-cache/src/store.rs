use crate::arena::{Arena, Node};
use crate::request::RequestKey;
use crate::traits::{CachedResponse, StoreStats};
use ahash::AHashMap;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A named, insertion-ordered store of captured responses.
///
/// Order is tracked explicitly by an arena list, so "oldest" always means
/// "inserted first". Lookups never promote an entry, and overwriting a key
/// replaces the snapshot in place without moving it.
///
/// Every method takes the lock for its own duration only; nothing here is
/// held across an `.await`.
pub struct NamedStore {
    name: String,
    inner: RwLock<StoreInner>,
    hits: AtomicU64,
    misses: AtomicU64,
}

struct StoreInner {
    arena: Arena,
    index: AHashMap<RequestKey, u32>,
    inserts: u64,
    evictions: u64,
}

impl NamedStore {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_capacity(name, 0)
    }

    pub fn with_capacity(name: impl Into<String>, capacity: usize) -> Self {
        Self {
            name: name.into(),
            inner: RwLock::new(StoreInner {
                arena: Arena::new(capacity),
                index: AHashMap::with_capacity(capacity),
                inserts: 0,
                evictions: 0,
            }),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn lookup(&self, key: &RequestKey) -> Option<Arc<CachedResponse>> {
        let inner = self.inner.read();
        let found = inner
            .index
            .get(key)
            .and_then(|&index| inner.arena.get(index))
            .map(|node| Arc::clone(&node.value));

        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        found
    }

    pub fn contains(&self, key: &RequestKey) -> bool {
        self.inner.read().index.contains_key(key)
    }

    /// Insert or overwrite. Returns `true` when the key was not present.
    /// Does not evict; callers run the eviction pass afterwards.
    pub fn put(&self, key: RequestKey, value: Arc<CachedResponse>) -> bool {
        let mut guard = self.inner.write();
        let inner = &mut *guard;
        inner.inserts += 1;

        if let Some(&index) = inner.index.get(&key) {
            if let Some(node) = inner.arena.get_mut(index) {
                node.value = value;
                return false;
            }
        }

        let index = inner.arena.push_head(Node::new(key.clone(), value));
        inner.index.insert(key, index);
        true
    }

    pub fn delete(&self, key: &RequestKey) -> bool {
        let mut guard = self.inner.write();
        let inner = &mut *guard;
        match inner.index.remove(key) {
            Some(index) => inner.arena.remove(index).is_some(),
            None => false,
        }
    }

    /// All keys, oldest insertion first.
    pub fn keys(&self) -> Vec<RequestKey> {
        self.inner
            .read()
            .arena
            .oldest_first()
            .map(|node| node.key.clone())
            .collect()
    }

    /// Delete the oldest entries until at most `max_items` remain.
    /// Returns the evicted keys, oldest first.
    pub fn trim_to(&self, max_items: usize) -> Vec<RequestKey> {
        let mut guard = self.inner.write();
        let inner = &mut *guard;
        let excess = inner.arena.len().saturating_sub(max_items);
        let mut evicted = Vec::with_capacity(excess);

        for _ in 0..excess {
            match inner.arena.pop_tail() {
                Some(node) => {
                    inner.index.remove(&node.key);
                    evicted.push(node.key);
                }
                None => break,
            }
        }

        inner.evictions += evicted.len() as u64;
        evicted
    }

    pub fn clear(&self) {
        let mut guard = self.inner.write();
        let inner = &mut *guard;
        inner.arena.clear();
        inner.index.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.read().arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> StoreStats {
        let inner = self.inner.read();
        StoreStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            inserts: inner.inserts,
            evictions: inner.evictions,
            current_size: inner.arena.len(),
        }
    }
}

impl std::fmt::Debug for NamedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NamedStore")
            .field("name", &self.name)
            .field("entry_count", &self.len())
            .finish()
    }
}
