//! Least-recently-used container
//!
//! Entries live in one recency list: front is the least recently touched
//! (next victim), back the most recent. Both `get` and `put` move an entry
//! to the back, so among entries never re-touched the oldest insertion goes
//! first.

use crate::cache::bounded::{BoundedCache, Insertion, Links, Slab};
use crate::cache::config::EvictionPolicy;
use std::collections::HashMap;
use std::hash::Hash;

pub struct LruCache<K, V> {
    capacity: usize,
    index: HashMap<K, usize>,
    slab: Slab<(K, V)>,
    order: Links,
}

impl<K, V> LruCache<K, V>
where
    K: Eq + Hash + Clone,
{
    /// Create an empty cache; a zero capacity is raised to 1
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            index: HashMap::new(),
            slab: Slab::new(),
            order: Links::default(),
        }
    }

    fn evict_front(&mut self) -> Option<(K, V)> {
        let idx = self.order.head?;
        let (key, value) = self.slab.remove(&mut self.order, idx);
        self.index.remove(&key);
        Some((key, value))
    }
}

impl<K, V> BoundedCache<K, V> for LruCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync,
    V: Send + Sync,
{
    fn put(&mut self, key: K, value: V) -> Insertion<K, V> {
        if let Some(&idx) = self.index.get(&key) {
            self.slab.move_to_back(&mut self.order, idx);
            let replaced = self
                .slab
                .get_mut(idx)
                .map(|slot| std::mem::replace(&mut slot.1, value));
            return Insertion {
                replaced,
                evicted: None,
            };
        }

        let evicted = if self.index.len() >= self.capacity {
            self.evict_front()
        } else {
            None
        };

        let idx = self.slab.push_back(&mut self.order, (key.clone(), value));
        self.index.insert(key, idx);

        Insertion {
            replaced: None,
            evicted,
        }
    }

    fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        let idx = *self.index.get(key)?;
        self.slab.move_to_back(&mut self.order, idx);
        self.slab.get_mut(idx).map(|slot| &mut slot.1)
    }

    fn peek(&self, key: &K) -> Option<&V> {
        let idx = *self.index.get(key)?;
        self.slab.get(idx).map(|slot| &slot.1)
    }

    fn remove(&mut self, key: &K) -> Option<V> {
        let idx = self.index.remove(key)?;
        let (_, value) = self.slab.remove(&mut self.order, idx);
        Some(value)
    }

    fn pop_victim(&mut self) -> Option<(K, V)> {
        self.evict_front()
    }

    fn clear(&mut self) {
        self.index.clear();
        self.slab.clear();
        self.order = Links::default();
    }

    fn keys(&self) -> Vec<K> {
        self.slab
            .indices(&self.order)
            .into_iter()
            .filter_map(|idx| self.slab.get(idx).map(|slot| slot.0.clone()))
            .collect()
    }

    fn iter(&self) -> Box<dyn Iterator<Item = (&K, &V)> + '_> {
        Box::new(self.slab.items().map(|(k, v)| (k, v)))
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
            match self.evict_front() {
                Some(entry) => evicted.push(entry),
                None => break,
            }
        }
        evicted
    }

    fn policy(&self) -> EvictionPolicy {
        EvictionPolicy::Lru
    }
}
