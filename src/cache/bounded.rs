//! Fixed-capacity key/value containers with a defined eviction order
//!
//! Both implementations keep their entries in a slab of doubly-linked nodes
//! addressed by index, so every reorder is O(1) without unsafe pointers.

use crate::cache::config::EvictionPolicy;
use std::hash::Hash;

/// Result of a [`BoundedCache::put`]
#[derive(Debug, PartialEq)]
pub struct Insertion<K, V> {
    /// Previous value when the key was already present
    pub replaced: Option<V>,
    /// Entry evicted to make room for a new key
    pub evicted: Option<(K, V)>,
}

/// Contract shared by the LRU and LFU containers
///
/// `len() <= capacity()` holds after every call.
pub trait BoundedCache<K, V>: Send + Sync
where
    K: Eq + Hash + Clone,
{
    /// Insert or update; evicts exactly one victim when a new key would overflow
    fn put(&mut self, key: K, value: V) -> Insertion<K, V>;

    /// Look up a value, recording the access for the eviction order
    fn get(&mut self, key: &K) -> Option<&V> {
        self.get_mut(key).map(|v| &*v)
    }

    /// Mutable lookup, recording the access for the eviction order
    fn get_mut(&mut self, key: &K) -> Option<&mut V>;

    /// Look up a value without touching the eviction order
    fn peek(&self, key: &K) -> Option<&V>;

    fn contains(&self, key: &K) -> bool {
        self.peek(key).is_some()
    }

    /// Remove a key; `None` when it was absent
    fn remove(&mut self, key: &K) -> Option<V>;

    /// Remove and return the entry the policy would evict next
    fn pop_victim(&mut self) -> Option<(K, V)>;

    /// Drop all entries
    fn clear(&mut self);

    /// Snapshot of keys, next victim first
    fn keys(&self) -> Vec<K>;

    /// Iterate entries without touching the eviction order, in no particular order
    fn iter(&self) -> Box<dyn Iterator<Item = (&K, &V)> + '_>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn capacity(&self) -> usize;

    /// Change capacity, returning the entries evicted to fit
    fn set_capacity(&mut self, capacity: usize) -> Vec<(K, V)>;

    /// Remove every entry, next victim first
    fn drain(&mut self) -> Vec<(K, V)> {
        let mut out = Vec::with_capacity(self.len());
        while let Some(entry) = self.pop_victim() {
            out.push(entry);
        }
        out
    }

    fn policy(&self) -> EvictionPolicy;
}

/// Build the container for a policy
pub fn with_policy<K, V>(policy: EvictionPolicy, capacity: usize) -> Box<dyn BoundedCache<K, V>>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    match policy {
        EvictionPolicy::Lru => Box::new(crate::cache::lru::LruCache::new(capacity)),
        EvictionPolicy::Lfu => Box::new(crate::cache::lfu::LfuCache::new(capacity)),
    }
}

/// Head and tail of one list threaded through a [`Slab`]
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Links {
    pub head: Option<usize>,
    pub tail: Option<usize>,
    pub len: usize,
}

impl Links {
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

#[derive(Debug)]
struct Slot<T> {
    item: Option<T>,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Arena of list nodes; several lists may share one slab
#[derive(Debug)]
pub(crate) struct Slab<T> {
    slots: Vec<Slot<T>>,
    free: Vec<usize>,
}

impl<T> Slab<T> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
        }
    }

    /// Store an item and append it to the back of `links`
    pub fn push_back(&mut self, links: &mut Links, item: T) -> usize {
        let slot = Slot {
            item: Some(item),
            prev: None,
            next: None,
        };
        let idx = match self.free.pop() {
            Some(idx) => {
                self.slots[idx] = slot;
                idx
            }
            None => {
                self.slots.push(slot);
                self.slots.len() - 1
            }
        };
        self.link_back(links, idx);
        idx
    }

    /// Append a detached node to the back of `links`
    pub fn link_back(&mut self, links: &mut Links, idx: usize) {
        self.slots[idx].prev = links.tail;
        self.slots[idx].next = None;
        match links.tail {
            Some(tail) => self.slots[tail].next = Some(idx),
            None => links.head = Some(idx),
        }
        links.tail = Some(idx);
        links.len += 1;
    }

    /// Detach a node from `links`, keeping its item in place
    pub fn unlink(&mut self, links: &mut Links, idx: usize) {
        let (prev, next) = (self.slots[idx].prev, self.slots[idx].next);
        match prev {
            Some(p) => self.slots[p].next = next,
            None => links.head = next,
        }
        match next {
            Some(n) => self.slots[n].prev = prev,
            None => links.tail = prev,
        }
        self.slots[idx].prev = None;
        self.slots[idx].next = None;
        links.len -= 1;
    }

    /// Detach a node and release its slot
    pub fn remove(&mut self, links: &mut Links, idx: usize) -> T {
        self.unlink(links, idx);
        self.free.push(idx);
        // Every linked slot holds an item; unlink only ever sees live indices.
        match self.slots[idx].item.take() {
            Some(item) => item,
            None => unreachable!("linked slab slot {} had no item", idx),
        }
    }

    /// Move a node to the back of its list
    pub fn move_to_back(&mut self, links: &mut Links, idx: usize) {
        if links.tail != Some(idx) {
            self.unlink(links, idx);
            self.link_back(links, idx);
        }
    }

    pub fn get(&self, idx: usize) -> Option<&T> {
        self.slots.get(idx).and_then(|s| s.item.as_ref())
    }

    pub fn get_mut(&mut self, idx: usize) -> Option<&mut T> {
        self.slots.get_mut(idx).and_then(|s| s.item.as_mut())
    }

    /// Indices of `links`, front to back
    pub fn indices(&self, links: &Links) -> Vec<usize> {
        let mut out = Vec::with_capacity(links.len);
        let mut cursor = links.head;
        while let Some(idx) = cursor {
            out.push(idx);
            cursor = self.slots[idx].next;
        }
        out
    }

    pub fn items(&self) -> impl Iterator<Item = &T> {
        self.slots.iter().filter_map(|s| s.item.as_ref())
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slab_list_order() {
        let mut slab = Slab::new();
        let mut links = Links::default();

        let a = slab.push_back(&mut links, "a");
        let b = slab.push_back(&mut links, "b");
        let c = slab.push_back(&mut links, "c");
        assert_eq!(slab.indices(&links), vec![a, b, c]);

        slab.move_to_back(&mut links, a);
        assert_eq!(slab.indices(&links), vec![b, c, a]);

        assert_eq!(slab.remove(&mut links, c), "c");
        assert_eq!(slab.indices(&links), vec![b, a]);
        assert_eq!(links.len, 2);
    }

    #[test]
    fn test_slab_reuses_slots() {
        let mut slab = Slab::new();
        let mut links = Links::default();

        let a = slab.push_back(&mut links, 1);
        slab.remove(&mut links, a);
        let b = slab.push_back(&mut links, 2);

        assert_eq!(a, b);
        assert_eq!(slab.get(b), Some(&2));
        assert!(links.head == Some(b) && links.tail == Some(b));
    }

    #[test]
    fn test_two_lists_share_slab() {
        let mut slab = Slab::new();
        let mut first = Links::default();
        let mut second = Links::default();

        let x = slab.push_back(&mut first, 'x');
        let y = slab.push_back(&mut second, 'y');
        slab.unlink(&mut first, x);
        slab.link_back(&mut second, x);

        assert!(first.is_empty());
        assert_eq!(slab.indices(&second), vec![y, x]);
    }
}
