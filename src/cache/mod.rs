//! # Graph Caching Layer
//!
//! Multi-tier caching and eviction for knowledge-graph objects (nodes,
//! relationships, patterns, query results, layouts, clusters).
//!
//! ## Features
//!
//! - **Tiered Lookup**: in-process L1, shared remote L2, caller-supplied loader as L3
//! - **Bounded Containers**: O(1) LRU and LFU eviction with a hard entry limit per type
//! - **TTL Expiration**: lazy on read plus a background sweep
//! - **Dependency Invalidation**: glob patterns and transitive, cycle-safe cascades
//! - **Write Policies**: write-through, batched write-behind, refresh-ahead
//! - **Runtime Tuning**: validated config updates, `optimize` and `health` reports
//! - **Memoization**: async functions cached by a canonical hash of their arguments
//!
//! ## Example
//!
//! ```rust
//! use ouroboros_cache::cache::{CacheType, GraphCachingService, ServiceConfig};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let service = GraphCachingService::new(ServiceConfig::default())?;
//!
//! service.set(CacheType::Nodes, "person:1", "Ada Lovelace").await?;
//!
//! let name: Option<String> = service.get(CacheType::Nodes, "person:1").await?;
//! assert_eq!(name.as_deref(), Some("Ada Lovelace"));
//!
//! let removed = service.invalidate(CacheType::Nodes, Some("person:*"), true).await;
//! assert_eq!(removed, 1);
//! # Ok(())
//! # }
//! ```

pub mod bounded;
pub mod codec;
pub mod config;
pub mod entry;
pub mod invalidation;
pub mod lfu;
pub mod lru;
pub mod maintenance;
pub mod memoize;
pub mod optimize;
pub mod remote;
pub mod service;
pub mod types;
pub mod warmup;

pub use bounded::{BoundedCache, Insertion};
pub use codec::Codec;
pub use config::{
    CacheConfig, CacheConfigBuilder, ConfigUpdate, EvictionPolicy, HealthThresholds,
    InvalidationStrategy, OptimizerBounds, SerializationFormat, ServiceConfig, WriteBehindConfig,
    WritePolicy,
};
pub use entry::CacheEntry;
pub use invalidation::{CacheRef, DependencyGraph, InvalidationEvent, InvalidationReason};
pub use lfu::LfuCache;
pub use lru::LruCache;
pub use maintenance::Refresher;
pub use memoize::{memo_key, Memoized};
pub use optimize::{
    ConfigChange, HealthReport, HealthStatus, OptimizationReport, OptimizationStrategy,
};
pub use remote::{InMemoryRemote, RemoteOps, RemoteStore};
pub use service::GraphCachingService;
pub use types::{CacheKey, CacheStats, CacheType, CacheValue, StatsReport};
pub use warmup::{WarmUpFailure, WarmUpReport, WarmUpSource};
