//! Core type definitions for the cache system

use crate::error::CacheError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Cache key type
pub type CacheKey = String;

/// Cache value type - opaque encoded blob, see [`crate::cache::codec`]
pub type CacheValue = Vec<u8>;

/// The knowledge-graph object families that get their own cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheType {
    Nodes,
    Relationships,
    Patterns,
    Queries,
    Layouts,
    Clusters,
}

impl CacheType {
    /// All known cache types, in a stable order
    pub const ALL: [CacheType; 6] = [
        CacheType::Nodes,
        CacheType::Relationships,
        CacheType::Patterns,
        CacheType::Queries,
        CacheType::Layouts,
        CacheType::Clusters,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CacheType::Nodes => "nodes",
            CacheType::Relationships => "relationships",
            CacheType::Patterns => "patterns",
            CacheType::Queries => "queries",
            CacheType::Layouts => "layouts",
            CacheType::Clusters => "clusters",
        }
    }
}

impl fmt::Display for CacheType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for CacheType {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CacheType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| CacheError::UnknownCacheType(s.to_string()))
    }
}

/// Statistics and metrics for cache performance monitoring
///
/// Counters only grow until [`reset`](CacheStats::reset). `entries` and
/// `size_bytes` are gauges filled in when a snapshot is taken.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct CacheStats {
    /// Total number of cache hits (L1 + L2)
    pub hits: u64,

    /// Hits served from the in-process tier
    pub l1_hits: u64,

    /// Hits served from the remote tier
    pub l2_hits: u64,

    /// Total number of cache misses
    pub misses: u64,

    /// Number of values written into L1
    pub sets: u64,

    /// Entries removed by `delete` or a refresher reporting the source gone
    pub deletes: u64,

    /// Entries removed by `invalidate`, its cascade, or `clear`
    pub invalidations: u64,

    /// Number of evictions due to capacity limits
    pub evictions_capacity: u64,

    /// Number of evictions due to TTL expiration
    pub evictions_ttl: u64,

    /// Number of entries currently in cache
    pub entries: usize,

    /// Estimated size of cached data in bytes
    pub size_bytes: usize,

    /// Accumulated lookup latency in microseconds
    pub total_access_time_us: u64,
}

impl CacheStats {
    /// Fraction of lookups served from cache, 0 when nothing was observed
    pub fn hit_ratio(&self) -> f64 {
        let total = self.lookups();
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// Calculate cache hit rate as a percentage
    pub fn hit_rate(&self) -> f64 {
        self.hit_ratio() * 100.0
    }

    /// Number of observed lookups
    pub fn lookups(&self) -> u64 {
        self.hits + self.misses
    }

    /// Calculate total evictions
    pub fn evictions(&self) -> u64 {
        self.evictions_capacity + self.evictions_ttl
    }

    /// Mean lookup latency in milliseconds
    pub fn avg_access_time_ms(&self) -> f64 {
        let total = self.lookups();
        if total == 0 {
            0.0
        } else {
            self.total_access_time_us as f64 / total as f64 / 1000.0
        }
    }

    pub(crate) fn record_access(&mut self, elapsed: Duration) {
        self.total_access_time_us = self
            .total_access_time_us
            .saturating_add(elapsed.as_micros() as u64);
    }

    /// Add another snapshot's counters and gauges into this one
    pub fn merge(&mut self, other: &CacheStats) {
        self.hits += other.hits;
        self.l1_hits += other.l1_hits;
        self.l2_hits += other.l2_hits;
        self.misses += other.misses;
        self.sets += other.sets;
        self.deletes += other.deletes;
        self.invalidations += other.invalidations;
        self.evictions_capacity += other.evictions_capacity;
        self.evictions_ttl += other.evictions_ttl;
        self.entries += other.entries;
        self.size_bytes += other.size_bytes;
        self.total_access_time_us += other.total_access_time_us;
    }

    /// Zero every counter
    pub fn reset(&mut self) {
        *self = CacheStats::default();
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CacheStats {{ hits: {}, misses: {}, hit_rate: {:.2}%, sets: {}, deletes: {}, \
             invalidations: {}, entries: {}, size: {} bytes, evictions: {}, \
             avg_access: {:.3}ms }}",
            self.hits,
            self.misses,
            self.hit_rate(),
            self.sets,
            self.deletes,
            self.invalidations,
            self.entries,
            self.size_bytes,
            self.evictions(),
            self.avg_access_time_ms()
        )
    }
}

/// Immutable statistics snapshot for one or all cache types
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StatsReport {
    pub by_type: BTreeMap<CacheType, CacheStats>,
    pub overall: CacheStats,
}

impl StatsReport {
    pub(crate) fn from_types(by_type: BTreeMap<CacheType, CacheStats>) -> Self {
        let mut overall = CacheStats::default();
        for stats in by_type.values() {
            overall.merge(stats);
        }
        Self { by_type, overall }
    }

    pub fn get(&self, cache_type: CacheType) -> Option<&CacheStats> {
        self.by_type.get(&cache_type)
    }
}
