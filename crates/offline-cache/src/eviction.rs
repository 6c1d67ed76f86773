use crate::store::NamedStore;

/// Trim `store` back to `max_items`, dropping the earliest-inserted entries.
///
/// Runs after every insert. One pass is atomic with respect to other store
/// operations, but an insert from another task may land between a put and
/// its trim; the next pass corrects that.
pub fn trim(store: &NamedStore, max_items: usize) -> usize {
    let evicted = store.trim_to(max_items);
    if evicted.is_empty() {
        return 0;
    }

    metrics::counter!("offline_cache_evictions_total").increment(evicted.len() as u64);
    tracing::debug!(
        store = store.name(),
        evicted = evicted.len(),
        oldest = %evicted[0],
        max_items,
        "trimmed store"
    );
    evicted.len()
}
