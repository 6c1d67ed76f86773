use crate::request::RequestKey;
use crate::traits::CachedResponse;
use std::sync::Arc;

/// Sentinel value indicating "no node" (null pointer equivalent).
pub const NIL: u32 = u32::MAX;

/// A node in the arena-allocated doubly-linked list.
pub struct Node {
    pub key: RequestKey,
    pub value: Arc<CachedResponse>,
    pub prev: u32,
    pub next: u32,
}

impl Node {
    pub fn new(key: RequestKey, value: Arc<CachedResponse>) -> Self {
        Self {
            key,
            value,
            prev: NIL,
            next: NIL,
        }
    }
}

/// Arena-allocated doubly-linked list recording insertion order.
///
/// Head is the newest node, tail the oldest. Nodes live in a
/// `Vec<Option<Node>>` and `u32` indices serve as pointers. A free-list
/// tracks reclaimed slots; when it is empty the arena grows, since a store
/// may sit above its bound between an insert and the following trim.
pub struct Arena {
    slots: Vec<Option<Node>>,
    free_list: Vec<u32>,
    pub head: u32,
    pub tail: u32,
    len: usize,
}

impl Arena {
    /// Create an empty arena with room for `capacity` nodes before growing.
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free_list: Vec::new(),
            head: NIL,
            tail: NIL,
            len: 0,
        }
    }

    /// Number of active (occupied) nodes.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn get(&self, index: u32) -> Option<&Node> {
        self.slots.get(index as usize).and_then(|s| s.as_ref())
    }

    #[inline]
    pub fn get_mut(&mut self, index: u32) -> Option<&mut Node> {
        self.slots.get_mut(index as usize).and_then(|s| s.as_mut())
    }

    /// Insert a node as the newest entry and return its index.
    pub fn push_head(&mut self, mut node: Node) -> u32 {
        let index = match self.free_list.pop() {
            Some(index) => index,
            None => {
                self.slots.push(None);
                (self.slots.len() - 1) as u32
            }
        };

        node.prev = NIL;
        node.next = self.head;

        if let Some(old_head) = self.get_mut(self.head) {
            old_head.prev = index;
        }

        self.slots[index as usize] = Some(node);
        self.head = index;

        if self.tail == NIL {
            self.tail = index;
        }

        self.len += 1;
        index
    }

    /// Remove a node from the list and return it. The slot is reclaimed.
    pub fn remove(&mut self, index: u32) -> Option<Node> {
        let node = self.slots.get_mut(index as usize)?.take()?;

        let prev = node.prev;
        let next = node.next;

        match self.get_mut(prev) {
            Some(p) => p.next = next,
            None => self.head = next,
        }

        match self.get_mut(next) {
            Some(n) => n.prev = prev,
            None => self.tail = prev,
        }

        self.free_list.push(index);
        self.len -= 1;
        Some(node)
    }

    /// Remove the oldest node and return it.
    pub fn pop_tail(&mut self) -> Option<Node> {
        if self.tail == NIL {
            return None;
        }
        self.remove(self.tail)
    }

    /// Iterate from the oldest node to the newest.
    pub fn oldest_first(&self) -> OldestFirst<'_> {
        OldestFirst {
            arena: self,
            cursor: self.tail,
        }
    }

    /// Drop every node, keeping the allocation.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.free_list.clear();
        self.head = NIL;
        self.tail = NIL;
        self.len = 0;
    }
}

/// Tail-to-head walk over an [`Arena`].
pub struct OldestFirst<'a> {
    arena: &'a Arena,
    cursor: u32,
}

impl<'a> Iterator for OldestFirst<'a> {
    type Item = &'a Node;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.arena.get(self.cursor)?;
        self.cursor = node.prev;
        Some(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    fn test_node(path: &str) -> Node {
        let url = Url::parse("https://site.test").unwrap().join(path).unwrap();
        Node::new(
            RequestKey::new(&url),
            Arc::new(CachedResponse::new(200, vec![], "test")),
        )
    }

    fn paths(arena: &Arena) -> Vec<String> {
        arena
            .oldest_first()
            .map(|n| n.key.path().to_string())
            .collect()
    }

    #[test]
    fn empty_arena() {
        let arena = Arena::new(10);
        assert_eq!(arena.len(), 0);
        assert!(arena.is_empty());
        assert_eq!(arena.head, NIL);
        assert_eq!(arena.tail, NIL);
        assert_eq!(arena.oldest_first().count(), 0);
    }

    #[test]
    fn push_single() {
        let mut arena = Arena::new(10);
        let idx = arena.push_head(test_node("/a"));
        assert_eq!(arena.len(), 1);
        assert_eq!(arena.head, idx);
        assert_eq!(arena.tail, idx);
        assert_eq!(arena.get(idx).unwrap().key.path(), "/a");
    }

    #[test]
    fn push_multiple_maintains_order() {
        let mut arena = Arena::new(10);
        let a = arena.push_head(test_node("/a"));
        let b = arena.push_head(test_node("/b"));
        let c = arena.push_head(test_node("/c"));

        // head -> c -> b -> a -> tail
        assert_eq!(arena.head, c);
        assert_eq!(arena.tail, a);
        assert_eq!(arena.get(c).unwrap().next, b);
        assert_eq!(arena.get(b).unwrap().next, a);
        assert_eq!(arena.get(a).unwrap().next, NIL);
        assert_eq!(paths(&arena), ["/a", "/b", "/c"]);
    }

    #[test]
    fn remove_middle() {
        let mut arena = Arena::new(10);
        let a = arena.push_head(test_node("/a"));
        let b = arena.push_head(test_node("/b"));
        let c = arena.push_head(test_node("/c"));

        let removed = arena.remove(b).unwrap();
        assert_eq!(removed.key.path(), "/b");
        assert_eq!(arena.len(), 2);
        assert_eq!(arena.get(c).unwrap().next, a);
        assert_eq!(arena.get(a).unwrap().prev, c);
        assert!(arena.remove(b).is_none());
    }

    #[test]
    fn remove_head_and_tail() {
        let mut arena = Arena::new(10);
        let a = arena.push_head(test_node("/a"));
        let b = arena.push_head(test_node("/b"));
        let c = arena.push_head(test_node("/c"));

        arena.remove(c);
        assert_eq!(arena.head, b);
        arena.remove(a);
        assert_eq!(arena.tail, b);
        assert_eq!(paths(&arena), ["/b"]);
    }

    #[test]
    fn pop_tail_returns_oldest() {
        let mut arena = Arena::new(10);
        arena.push_head(test_node("/a"));
        arena.push_head(test_node("/b"));
        arena.push_head(test_node("/c"));

        assert_eq!(arena.pop_tail().unwrap().key.path(), "/a");
        assert_eq!(arena.pop_tail().unwrap().key.path(), "/b");
        assert_eq!(arena.len(), 1);
    }

    #[test]
    fn grows_past_initial_capacity() {
        let mut arena = Arena::new(2);
        for i in 0..5 {
            arena.push_head(test_node(&format!("/{i}")));
        }
        assert_eq!(arena.len(), 5);
        assert_eq!(paths(&arena), ["/0", "/1", "/2", "/3", "/4"]);
    }

    #[test]
    fn slot_reclamation() {
        let mut arena = Arena::new(2);
        let a = arena.push_head(test_node("/a"));
        arena.push_head(test_node("/b"));
        arena.remove(a);

        let c = arena.push_head(test_node("/c"));
        assert_eq!(c, a, "freed slot should be reused");
        assert_eq!(paths(&arena), ["/b", "/c"]);
    }

    #[test]
    fn clear_resets() {
        let mut arena = Arena::new(4);
        arena.push_head(test_node("/a"));
        arena.push_head(test_node("/b"));
        arena.clear();
        assert!(arena.is_empty());
        assert_eq!(arena.head, NIL);
        assert_eq!(arena.tail, NIL);
        arena.push_head(test_node("/c"));
        assert_eq!(paths(&arena), ["/c"]);
    }
}
