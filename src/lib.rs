//! # Ouroboros Graph Cache (ouroboros-cache)
//!
//! Multi-tier caching and eviction engine that sits between request handlers
//! and the knowledge-graph store.
//!
//! ## Features
//!
//! - One bounded L1 cache per object family, LRU or LFU
//! - Optional shared L2 behind a short timeout; a failing L2 never fails a read
//! - Loader fall-through with loader errors passed back untouched
//! - TTL expiry, glob invalidation and cycle-safe dependency cascades
//! - Write-through, write-behind and refresh-ahead propagation
//! - Supervised background maintenance with graceful shutdown
//! - Runtime config updates validated before they apply
//!
//! ## Tiered Lookup
//!
//! ```no_run
//! use ouroboros_cache::{
//!     CacheError, CacheType, GraphCachingService, InMemoryRemote, ServiceConfig,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let service = Arc::new(
//!         GraphCachingService::new(ServiceConfig::from_env()?)?
//!             .with_remote(Arc::new(InMemoryRemote::new())),
//!     );
//!     service.start().await;
//!
//!     let degree: u32 = service
//!         .get_or_load(CacheType::Nodes, "degree:person:1", || async {
//!             // Query the graph store here
//!             Ok::<_, CacheError>(42)
//!         })
//!         .await?;
//!     println!("degree = {}", degree);
//!
//!     service.stop().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Memoization
//!
//! ```no_run
//! use ouroboros_cache::{CacheError, CacheType, GraphCachingService, ServiceConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let service = Arc::new(GraphCachingService::new(ServiceConfig::default())?);
//!
//!     let shortest_path = service.memoize(
//!         CacheType::Queries,
//!         "shortest_path",
//!         |(from, to): (String, String)| async move { Ok::<_, CacheError>(vec![from, to]) },
//!     );
//!
//!     let path = shortest_path.call(("a".to_string(), "b".to_string())).await?;
//!     println!("{:?}", path);
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod error;

// Re-export main types for convenience
pub use cache::{
    CacheConfig, CacheConfigBuilder, CacheEntry, CacheKey, CacheRef, CacheStats, CacheType,
    CacheValue, ConfigUpdate, EvictionPolicy, GraphCachingService, HealthReport, HealthStatus,
    InMemoryRemote, InvalidationReason, InvalidationStrategy, Memoized, OptimizationReport,
    OptimizationStrategy, Refresher, RemoteStore, ServiceConfig, StatsReport, WarmUpReport,
    WarmUpSource, WritePolicy,
};
pub use error::{CacheError, Result};
