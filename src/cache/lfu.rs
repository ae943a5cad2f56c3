//! Least-frequently-used container
//!
//! Tie-break rule: the victim is the entry with the lowest access frequency;
//! among entries sharing that frequency, the one least recently touched goes
//! first. Each frequency owns a recency list, and `min_freq` tracks the
//! lowest non-empty one, so lookups, inserts and evictions are all O(1).
//!
//! A new entry starts at frequency 1. `get` and an update through `put`
//! both count as one access.

use crate::cache::bounded::{BoundedCache, Insertion, Links, Slab};
use crate::cache::config::EvictionPolicy;
use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;

struct Node<K, V> {
    key: K,
    value: V,
    freq: u64,
}

pub struct LfuCache<K, V> {
    capacity: usize,
    index: HashMap<K, usize>,
    slab: Slab<Node<K, V>>,
    buckets: HashMap<u64, Links>,
    min_freq: u64,
}

impl<K, V> LfuCache<K, V>
where
    K: Eq + Hash + Clone,
{
    /// Create an empty cache; a zero capacity is raised to 1
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            index: HashMap::new(),
            slab: Slab::new(),
            buckets: HashMap::new(),
            min_freq: 0,
        }
    }

    /// Access frequency of a key
    pub fn frequency(&self, key: &K) -> Option<u64> {
        let idx = *self.index.get(key)?;
        self.slab.get(idx).map(|node| node.freq)
    }

    /// Move a node from its frequency list to the next one
    fn touch(&mut self, idx: usize) {
        let Some(freq) = self.slab.get(idx).map(|node| node.freq) else {
            return;
        };

        if let Some(links) = self.buckets.get_mut(&freq) {
            self.slab.unlink(links, idx);
            if links.is_empty() {
                self.buckets.remove(&freq);
                if self.min_freq == freq {
                    self.min_freq = freq + 1;
                }
            }
        }

        let next = freq + 1;
        if let Some(node) = self.slab.get_mut(idx) {
            node.freq = next;
        }
        let links = self.buckets.entry(next).or_default();
        self.slab.link_back(links, idx);
    }

    fn detach(&mut self, idx: usize) -> Option<Node<K, V>> {
        let freq = self.slab.get(idx)?.freq;
        let links = self.buckets.get_mut(&freq)?;
        let node = self.slab.remove(links, idx);
        if links.is_empty() {
            self.buckets.remove(&freq);
            if self.min_freq == freq {
                self.recompute_min_freq();
            }
        }
        self.index.remove(&node.key);
        Some(node)
    }

    fn recompute_min_freq(&mut self) {
        self.min_freq = self.buckets.keys().copied().min().unwrap_or(0);
    }

    fn evict_one(&mut self) -> Option<(K, V)> {
        let idx = self.buckets.get(&self.min_freq)?.head?;
        self.detach(idx).map(|node| (node.key, node.value))
    }
}

impl<K, V> BoundedCache<K, V> for LfuCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync,
    V: Send + Sync,
{
    fn put(&mut self, key: K, value: V) -> Insertion<K, V> {
        if let Some(&idx) = self.index.get(&key) {
            self.touch(idx);
            let replaced = self
                .slab
                .get_mut(idx)
                .map(|node| std::mem::replace(&mut node.value, value));
            return Insertion {
                replaced,
                evicted: None,
            };
        }

        let evicted = if self.index.len() >= self.capacity {
            self.evict_one()
        } else {
            None
        };

        let links = self.buckets.entry(1).or_default();
        let idx = self.slab.push_back(
            links,
            Node {
                key: key.clone(),
                value,
                freq: 1,
            },
        );
        self.index.insert(key, idx);
        self.min_freq = 1;

        Insertion {
            replaced: None,
            evicted,
        }
    }

    fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        let idx = *self.index.get(key)?;
        self.touch(idx);
        self.slab.get_mut(idx).map(|node| &mut node.value)
    }

    fn peek(&self, key: &K) -> Option<&V> {
        let idx = *self.index.get(key)?;
        self.slab.get(idx).map(|node| &node.value)
    }

    fn remove(&mut self, key: &K) -> Option<V> {
        let idx = *self.index.get(key)?;
        self.detach(idx).map(|node| node.value)
    }

    fn pop_victim(&mut self) -> Option<(K, V)> {
        self.evict_one()
    }

    fn clear(&mut self) {
        self.index.clear();
        self.slab.clear();
        self.buckets.clear();
        self.min_freq = 0;
    }

    fn keys(&self) -> Vec<K> {
        let ordered: BTreeMap<u64, &Links> =
            self.buckets.iter().map(|(freq, links)| (*freq, links)).collect();

        ordered
            .values()
            .flat_map(|links| self.slab.indices(links))
            .filter_map(|idx| self.slab.get(idx).map(|node| node.key.clone()))
            .collect()
    }

    fn iter(&self) -> Box<dyn Iterator<Item = (&K, &V)> + '_> {
        Box::new(self.slab.items().map(|node| (&node.key, &node.value)))
    }

    fn len(&self) -> usize {
        self.index.len()
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn set_capacity(&mut self, capacity: usize) -> Vec<(K, V)> {
        self.capacity = capacity.max(1);
        let mut evicted = Vec::new();
        while self.index.len() > self.capacity {
            match self.evict_one() {
                Some(entry) => evicted.push(entry),
                None => break,
            }
        }
        evicted
    }

    fn policy(&self) -> EvictionPolicy {
        EvictionPolicy::Lfu
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lowest_frequency_evicted() {
        let mut cache = LfuCache::new(2);
        cache.put("a", 1);
        cache.put("b", 2);
        for _ in 0..3 {
            cache.get(&"a");
        }
        cache.get(&"b");

        let outcome = cache.put("c", 3);
        assert_eq!(outcome.evicted, Some(("b", 2)));
        assert_eq!(cache.peek(&"a"), Some(&1));
        assert_eq!(cache.peek(&"c"), Some(&3));
        assert_eq!(cache.frequency(&"a"), Some(4));
        assert_eq!(cache.frequency(&"c"), Some(1));
    }

    #[test]
    fn test_equal_frequency_falls_back_to_recency() {
        let mut cache = LfuCache::new(3);
        cache.put("a", 1);
        cache.put("b", 2);
        cache.put("c", 3);
        cache.get(&"b");
        cache.get(&"a");
        cache.get(&"c");

        // All at frequency 2; "b" was touched first.
        assert_eq!(cache.put("d", 4).evicted, Some(("b", 2)));
    }

    #[test]
    fn test_new_entry_is_next_victim() {
        let mut cache = LfuCache::new(2);
        cache.put("hot", 1);
        cache.get(&"hot");
        cache.put("cold", 2);

        assert_eq!(cache.put("new", 3).evicted, Some(("cold", 2)));
        assert_eq!(cache.put("newer", 4).evicted, Some(("new", 3)));
        assert!(cache.contains(&"hot"));
    }

    #[test]
    fn test_update_counts_as_access() {
        let mut cache = LfuCache::new(2);
        cache.put("a", 1);
        cache.put("b", 2);

        let outcome = cache.put("a", 11);
        assert_eq!(outcome.replaced, Some(1));
        assert_eq!(cache.frequency(&"a"), Some(2));
        assert_eq!(cache.put("c", 3).evicted, Some(("b", 2)));
    }

    #[test]
    fn test_remove_recomputes_min_frequency() {
        let mut cache = LfuCache::new(3);
        cache.put("a", 1);
        cache.put("b", 2);
        cache.get(&"b");
        cache.get(&"b");
        cache.put("c", 3);
        cache.get(&"c");

        assert_eq!(cache.remove(&"a"), Some(1));
        // Remaining: c at 2, b at 3.
        assert_eq!(cache.pop_victim(), Some(("c", 3)));
        assert_eq!(cache.pop_victim(), Some(("b", 2)));
        assert_eq!(cache.pop_victim(), None);
    }

    #[test]
    fn test_keys_in_eviction_order() {
        let mut cache = LfuCache::new(4);
        cache.put(1, ());
        cache.put(2, ());
        cache.put(3, ());
        cache.get(&1);
        cache.get(&1);
        cache.get(&3);

        assert_eq!(cache.keys(), vec![2, 3, 1]);
        assert_eq!(
            cache.drain().into_iter().map(|(k, _)| k).collect::<Vec<_>>(),
            vec![2, 3, 1]
        );
        assert!(cache.is_empty());
    }

    #[test]
    fn test_shrink_and_clear() {
        let mut cache = LfuCache::new(4);
        for i in 0..4 {
            cache.put(i, i);
        }
        cache.get(&0);
        cache.get(&3);

        let evicted = cache.set_capacity(2);
        assert_eq!(evicted, vec![(1, 1), (2, 2)]);
        assert_eq!(cache.len(), 2);

        cache.clear();
        assert!(cache.is_empty());
        cache.put(9, 9);
        assert_eq!(cache.get(&9), Some(&9));
    }

    #[test]
    fn test_capacity_never_exceeded() {
        let mut cache = LfuCache::new(5);
        for i in 0..200u32 {
            cache.put(i % 23, i);
            if i % 4 == 0 {
                cache.get(&(i % 7));
            }
            if i % 11 == 0 {
                cache.remove(&(i % 23));
            }
            assert!(cache.len() <= cache.capacity());
        }
    }
}
