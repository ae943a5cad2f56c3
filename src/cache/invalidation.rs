//! Cache invalidation: reasons, events and the dependency graph
//!
//! Dependencies are directed edges `main -> dependent`. Invalidating `main`
//! with cascade also removes every entry reachable from it. The graph may
//! contain cycles; traversal keeps a visited set and touches each entry at
//! most once.

use crate::cache::types::{CacheKey, CacheType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;

/// Reason for cache invalidation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InvalidationReason {
    /// Entry expired based on TTL
    Expired,

    /// Explicit invalidation by key, pattern or clear
    Manual,

    /// Reached through the dependency graph from `source`
    Dependency { source: CacheRef },

    /// Evicted because the advisory size budget was exceeded
    SizeLimit,

    /// Evicted by the container's capacity policy, or by a lowered `max_entries`
    Capacity,

    /// The refresh-ahead loader reported the value gone
    SourceRemoved,
}

impl fmt::Display for InvalidationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvalidationReason::Expired => write!(f, "TTL expired"),
            InvalidationReason::Manual => write!(f, "manual invalidation"),
            InvalidationReason::Dependency { source } => {
                write!(f, "dependency of {}", source)
            }
            InvalidationReason::SizeLimit => write!(f, "cache size limit reached"),
            InvalidationReason::Capacity => write!(f, "capacity eviction"),
            InvalidationReason::SourceRemoved => write!(f, "source removed"),
        }
    }
}

/// Event for cache invalidation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvalidationEvent {
    /// Reason for invalidation
    pub reason: InvalidationReason,

    /// Cache type the keys belong to
    pub cache_type: CacheType,

    /// When the invalidation occurred
    pub timestamp: DateTime<Utc>,

    /// Keys that were invalidated
    pub keys: Vec<CacheKey>,

    /// Additional context
    pub context: Option<String>,
}

impl InvalidationEvent {
    /// Create a new invalidation event
    pub fn new(reason: InvalidationReason, cache_type: CacheType, keys: Vec<CacheKey>) -> Self {
        Self {
            reason,
            cache_type,
            timestamp: Utc::now(),
            keys,
            context: None,
        }
    }

    /// Add context to the event
    pub fn with_context(mut self, context: String) -> Self {
        self.context = Some(context);
        self
    }
}

/// A key qualified by its cache type
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheRef {
    pub cache_type: CacheType,
    pub key: CacheKey,
}

impl CacheRef {
    pub fn new(cache_type: CacheType, key: impl Into<CacheKey>) -> Self {
        Self {
            cache_type,
            key: key.into(),
        }
    }
}

impl fmt::Display for CacheRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.cache_type, self.key)
    }
}

/// Adjacency map from an entry to the entries derived from it
#[derive(Debug, Default, Clone)]
pub struct DependencyGraph {
    edges: HashMap<CacheRef, HashSet<CacheRef>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `dependent` as derived from `main`; returns false if already known
    pub fn add(&mut self, main: CacheRef, dependent: CacheRef) -> bool {
        if main == dependent {
            return false;
        }
        self.edges.entry(main).or_default().insert(dependent)
    }

    /// Drop one edge; returns whether it existed
    pub fn remove(&mut self, main: &CacheRef, dependent: &CacheRef) -> bool {
        let Some(set) = self.edges.get_mut(main) else {
            return false;
        };
        let removed = set.remove(dependent);
        if set.is_empty() {
            self.edges.remove(main);
        }
        removed
    }

    /// Every entry reachable from any root, breadth-first, roots excluded
    pub fn transitive<'a, I>(&self, roots: I) -> Vec<CacheRef>
    where
        I: IntoIterator<Item = &'a CacheRef>,
    {
        self.cascade(roots)
            .into_iter()
            .map(|(_, target)| target)
            .collect()
    }

    /// Like [`transitive`](Self::transitive), paired with the root each entry was reached from
    ///
    /// An entry reachable from several roots is reported once, under the
    /// first root whose traversal gets to it.
    pub fn cascade<'a, I>(&self, roots: I) -> Vec<(CacheRef, CacheRef)>
    where
        I: IntoIterator<Item = &'a CacheRef>,
    {
        let mut visited: HashSet<&CacheRef> = HashSet::new();
        let mut queue: VecDeque<(&CacheRef, &CacheRef)> = VecDeque::new();

        for root in roots {
            if visited.insert(root) {
                queue.push_back((root, root));
            }
        }

        let mut out = Vec::new();
        while let Some((root, current)) = queue.pop_front() {
            let Some(dependents) = self.edges.get(current) else {
                continue;
            };
            for dependent in dependents {
                if visited.insert(dependent) {
                    out.push((root.clone(), dependent.clone()));
                    queue.push_back((root, dependent));
                }
            }
        }
        out
    }

    pub fn edge_count(&self) -> usize {
        self.edges.values().map(HashSet::len).sum()
    }

    pub fn clear(&mut self) {
        self.edges.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(key: &str) -> CacheRef {
        CacheRef::new(CacheType::Nodes, key)
    }

    fn layout(key: &str) -> CacheRef {
        CacheRef::new(CacheType::Layouts, key)
    }

    #[test]
    fn test_invalidation_reason_display() {
        assert_eq!(InvalidationReason::Expired.to_string(), "TTL expired");
        assert_eq!(InvalidationReason::Capacity.to_string(), "capacity eviction");

        let reason = InvalidationReason::Dependency {
            source: node("n1"),
        };
        assert_eq!(reason.to_string(), "dependency of nodes:n1");
    }

    #[test]
    fn test_invalidation_event() {
        let event = InvalidationEvent::new(
            InvalidationReason::Manual,
            CacheType::Queries,
            vec!["key1".to_string(), "key2".to_string()],
        )
        .with_context("test context".to_string());

        assert_eq!(event.keys.len(), 2);
        assert_eq!(event.context, Some("test context".to_string()));
        assert!(matches!(event.reason, InvalidationReason::Manual));
    }

    #[test]
    fn test_add_and_remove_edges() {
        let mut graph = DependencyGraph::new();
        assert!(graph.add(node("n1"), layout("l1")));
        assert!(!graph.add(node("n1"), layout("l1")));
        assert!(!graph.add(node("n1"), node("n1")));
        assert_eq!(graph.edge_count(), 1);

        assert!(graph.remove(&node("n1"), &layout("l1")));
        assert!(!graph.remove(&node("n1"), &layout("l1")));
        assert_eq!(graph.edge_count(), 0);
    }

    #[test]
    fn test_transitive_closure() {
        let mut graph = DependencyGraph::new();
        graph.add(node("n1"), layout("l1"));
        graph.add(layout("l1"), CacheRef::new(CacheType::Clusters, "c1"));
        graph.add(node("n2"), layout("l2"));

        let reached = graph.transitive([&node("n1")]);
        assert_eq!(
            reached,
            vec![layout("l1"), CacheRef::new(CacheType::Clusters, "c1")]
        );
    }

    #[test]
    fn test_cycles_terminate() {
        let mut graph = DependencyGraph::new();
        graph.add(node("a"), node("b"));
        graph.add(node("b"), node("c"));
        graph.add(node("c"), node("a"));

        let mut reached = graph.transitive([&node("a")]);
        reached.sort();
        assert_eq!(reached, vec![node("b"), node("c")]);
    }

    #[test]
    fn test_multiple_roots_share_visited_set() {
        let mut graph = DependencyGraph::new();
        graph.add(node("a"), layout("shared"));
        graph.add(node("b"), layout("shared"));
        graph.add(node("a"), node("b"));

        let roots = [node("a"), node("b")];
        let reached = graph.transitive(roots.iter());
        assert_eq!(reached, vec![layout("shared")]);
    }

    #[test]
    fn test_cascade_reports_root() {
        let mut graph = DependencyGraph::new();
        graph.add(node("n1"), layout("l1"));
        graph.add(layout("l1"), CacheRef::new(CacheType::Clusters, "c1"));
        graph.add(node("n2"), layout("l2"));

        let roots = [node("n1"), node("n2")];
        let mut reached = graph.cascade(roots.iter());
        reached.sort();
        assert_eq!(
            reached,
            vec![
                (node("n1"), layout("l1")),
                (node("n1"), CacheRef::new(CacheType::Clusters, "c1")),
                (node("n2"), layout("l2")),
            ]
        );
    }
}
