//! Integration tests for the graph cache
//!
//! These tests verify the complete cache functionality including:
//! - Tiered lookup and loader fall-through
//! - TTL expiration and the background sweep
//! - LRU / LFU eviction through the service
//! - Glob, cascading and strategy-driven invalidation
//! - Remote tier degradation, write-through and write-behind
//! - Refresh-ahead, warm-up, optimize and health
//! - Concurrent access

use ouroboros_cache::cache::{
    CacheConfig, CacheRef, CacheType, ConfigUpdate, EvictionPolicy,
    GraphCachingService, HealthStatus, InMemoryRemote, InvalidationStrategy,
    OptimizationStrategy, OptimizerBounds, Refresher, ServiceConfig, WarmUpSource,
    WriteBehindConfig,
};
use ouroboros_cache::CacheError;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn config(max_entries: usize, policy: EvictionPolicy) -> CacheConfig {
    CacheConfig::builder()
        .max_entries(max_entries)
        .eviction_policy(policy)
        .default_ttl(Duration::from_secs(60))
        .ttl_jitter(0.0)
        .build()
}

fn service(config: CacheConfig) -> Arc<GraphCachingService> {
    Arc::new(GraphCachingService::new(ServiceConfig::default().with_all_types(config)).unwrap())
}

fn service_with_remote(settings: ServiceConfig) -> (Arc<GraphCachingService>, Arc<InMemoryRemote>) {
    let remote = Arc::new(InMemoryRemote::new());
    let service = Arc::new(
        GraphCachingService::new(settings)
            .unwrap()
            .with_remote(remote.clone()),
    );
    (service, remote)
}

#[tokio::test]
async fn test_get_is_idempotent() {
    let cache = service(config(100, EvictionPolicy::Lru));
    cache
        .set(CacheType::Nodes, "person:1", &vec!["Person", "Engineer"])
        .await
        .unwrap();

    let first: Option<Vec<String>> = cache.get(CacheType::Nodes, "person:1").await.unwrap();
    let second: Option<Vec<String>> = cache.get(CacheType::Nodes, "person:1").await.unwrap();

    assert!(first.is_some());
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_capacity_invariant() {
    for policy in [EvictionPolicy::Lru, EvictionPolicy::Lfu] {
        let cache = service(config(10, policy));

        for i in 0..500u32 {
            let key = format!("k{}", (i * 7) % 53);
            cache.set(CacheType::Relationships, &key, &i).await.unwrap();
            if i % 3 == 0 {
                let _: Option<u32> = cache
                    .get(CacheType::Relationships, &format!("k{}", i % 11))
                    .await
                    .unwrap();
            }
            assert!(cache.len(CacheType::Relationships).await <= 10);
        }

        let stats = cache.cache_stats(CacheType::Relationships).await;
        assert_eq!(stats.entries, 10);
        assert!(stats.evictions_capacity > 0);
    }
}

#[tokio::test]
async fn test_ttl_expiration() {
    let cache = service(config(100, EvictionPolicy::Lru));
    cache
        .set_with_ttl(CacheType::Nodes, "k", "v", Some(Duration::from_secs(1)))
        .await
        .unwrap();

    let value: Option<String> = cache.get(CacheType::Nodes, "k").await.unwrap();
    assert_eq!(value.as_deref(), Some("v"));

    tokio::time::sleep(Duration::from_millis(1500)).await;

    let value: Option<String> = cache.get(CacheType::Nodes, "k").await.unwrap();
    assert!(value.is_none());
}

#[tokio::test]
async fn test_lru_eviction() {
    let cache = service(config(2, EvictionPolicy::Lru));
    let t = CacheType::Nodes;

    cache.set(t, "a", &1).await.unwrap();
    cache.set(t, "b", &2).await.unwrap();
    let _: Option<i32> = cache.get(t, "a").await.unwrap();
    cache.set(t, "c", &3).await.unwrap();

    assert_eq!(cache.get::<i32>(t, "b").await.unwrap(), None);
    assert_eq!(cache.get::<i32>(t, "a").await.unwrap(), Some(1));
    assert_eq!(cache.get::<i32>(t, "c").await.unwrap(), Some(3));
}

#[tokio::test]
async fn test_lfu_eviction() {
    let cache = service(config(2, EvictionPolicy::Lfu));
    let t = CacheType::Patterns;

    cache.set(t, "a", &1).await.unwrap();
    cache.set(t, "b", &2).await.unwrap();
    for _ in 0..3 {
        let _: Option<i32> = cache.get(t, "a").await.unwrap();
    }
    let _: Option<i32> = cache.get(t, "b").await.unwrap();
    cache.set(t, "c", &3).await.unwrap();

    assert!(!cache.contains(t, "b").await);
    assert_eq!(cache.get::<i32>(t, "a").await.unwrap(), Some(1));
    assert_eq!(cache.get::<i32>(t, "c").await.unwrap(), Some(3));
}

#[tokio::test]
async fn test_cascading_invalidation() {
    let cache = service(config(100, EvictionPolicy::Lru));
    let main = CacheRef::new(CacheType::Nodes, "node:1");
    let dep = CacheRef::new(CacheType::Layouts, "layout:1");

    cache.add_dependency(main.clone(), dep.clone()).await;
    cache.set(CacheType::Nodes, "node:1", "n").await.unwrap();
    cache.set(CacheType::Layouts, "layout:1", "l").await.unwrap();

    let removed = cache
        .invalidate(CacheType::Nodes, Some("node:1"), true)
        .await;

    assert_eq!(removed, 2);
    assert!(!cache.contains(CacheType::Nodes, "node:1").await);
    assert!(!cache.contains(CacheType::Layouts, "layout:1").await);

    let nodes = cache.cache_stats(CacheType::Nodes).await;
    let layouts = cache.cache_stats(CacheType::Layouts).await;
    assert_eq!((nodes.invalidations, nodes.deletes), (1, 0));
    assert_eq!((layouts.invalidations, layouts.deletes), (1, 0));
    assert_eq!(cache.get_stats(None).await.overall.invalidations, 2);
}

#[tokio::test]
async fn test_invalidation_without_cascade_keeps_dependents() {
    let cache = service(config(100, EvictionPolicy::Lru));
    cache
        .add_dependency(
            CacheRef::new(CacheType::Nodes, "node:1"),
            CacheRef::new(CacheType::Layouts, "layout:1"),
        )
        .await;
    cache.set(CacheType::Nodes, "node:1", "n").await.unwrap();
    cache.set(CacheType::Layouts, "layout:1", "l").await.unwrap();

    assert_eq!(cache.invalidate(CacheType::Nodes, Some("node:1"), false).await, 1);
    assert!(cache.contains(CacheType::Layouts, "layout:1").await);
}

#[tokio::test]
async fn test_dependency_cycle_terminates() {
    let cache = service(config(100, EvictionPolicy::Lru));
    let t = CacheType::Clusters;
    for (from, to) in [("a", "b"), ("b", "c"), ("c", "a")] {
        cache
            .add_dependency(CacheRef::new(t, from), CacheRef::new(t, to))
            .await;
        cache.set(t, from, &0u8).await.unwrap();
    }

    let reached = cache.dependents_of(&CacheRef::new(t, "a")).await;
    assert_eq!(reached.len(), 2);

    assert_eq!(cache.invalidate(t, Some("a"), true).await, 3);
    assert_eq!(cache.len(t).await, 0);
}

#[tokio::test]
async fn test_cascade_strategy_invalidates_on_write() {
    let cache = service(config(100, EvictionPolicy::Lru));
    cache
        .set_config(
            CacheType::Nodes,
            ConfigUpdate {
                invalidation_strategy: Some(InvalidationStrategy::Cascade),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    cache
        .add_dependency(
            CacheRef::new(CacheType::Nodes, "node:7"),
            CacheRef::new(CacheType::Layouts, "layout:7"),
        )
        .await;

    cache.set(CacheType::Layouts, "layout:7", "old").await.unwrap();
    cache.set(CacheType::Nodes, "node:7", "updated").await.unwrap();

    assert!(cache.contains(CacheType::Nodes, "node:7").await);
    assert!(!cache.contains(CacheType::Layouts, "layout:7").await);
}

#[tokio::test]
async fn test_memoize_calls_once() {
    let cache = service(config(100, EvictionPolicy::Lru));
    let counter = Arc::new(AtomicUsize::new(0));

    let calls = counter.clone();
    let double = cache.memoize(CacheType::Queries, "double", move |x: i64| {
        let calls = calls.clone();
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, CacheError>(x * 2)
        }
    });

    assert_eq!(double.call(5).await.unwrap(), 10);
    assert_eq!(double.call(5).await.unwrap(), 10);
    assert_eq!(counter.load(Ordering::SeqCst), 1);

    assert_eq!(double.call(6).await.unwrap(), 12);
    assert_eq!(counter.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_memoize_with_ttl() {
    let cache = service(config(100, EvictionPolicy::Lru));
    let counter = Arc::new(AtomicUsize::new(0));

    let calls = counter.clone();
    let lookup = cache
        .memoize(CacheType::Queries, "lookup", move |name: String| {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, CacheError>(name.len())
            }
        })
        .with_ttl(Duration::from_millis(50));

    assert_eq!(lookup.call("graph".to_string()).await.unwrap(), 5);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(lookup.call("graph".to_string()).await.unwrap(), 5);
    assert_eq!(counter.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_hit_ratio() {
    let cache = service(config(100, EvictionPolicy::Lru));
    cache.set(CacheType::Nodes, "k", &1u8).await.unwrap();

    for _ in 0..3 {
        let _: Option<u8> = cache.get(CacheType::Nodes, "k").await.unwrap();
    }
    let _: Option<u8> = cache.get(CacheType::Nodes, "missing").await.unwrap();

    let stats = cache.cache_stats(CacheType::Nodes).await;
    assert!((stats.hit_ratio() - 0.75).abs() < 1e-9);

    let report = cache.get_stats(None).await;
    assert!((report.overall.hit_ratio() - 0.75).abs() < 1e-9);
    assert_eq!(report.by_type.len(), CacheType::ALL.len());

    cache.reset_stats(Some(CacheType::Nodes)).await;
    let stats = cache.cache_stats(CacheType::Nodes).await;
    assert_eq!(stats.lookups(), 0);
    assert_eq!(stats.entries, 1);
}

#[derive(Debug)]
enum OriginError {
    NotFound(String),
    Cache(CacheError),
}

impl From<CacheError> for OriginError {
    fn from(e: CacheError) -> Self {
        OriginError::Cache(e)
    }
}

#[tokio::test]
async fn test_loader_errors_pass_through() {
    let cache = service(config(100, EvictionPolicy::Lru));

    let result: Result<String, OriginError> = cache
        .get_or_load(CacheType::Nodes, "node:404", || async {
            Err(OriginError::NotFound("node:404".to_string()))
        })
        .await;

    match result {
        Err(OriginError::NotFound(id)) => assert_eq!(id, "node:404"),
        other => panic!("unexpected result: {:?}", other),
    }
    assert_eq!(cache.len(CacheType::Nodes).await, 0);
}

#[tokio::test]
async fn test_loader_populates_cache() {
    let cache = service(config(100, EvictionPolicy::Lru));
    let loads = Arc::new(AtomicUsize::new(0));

    for _ in 0..3 {
        let loads = loads.clone();
        let value: u64 = cache
            .get_or_load(CacheType::Queries, "count(*)", || async move {
                loads.fetch_add(1, Ordering::SeqCst);
                Ok::<_, CacheError>(1234)
            })
            .await
            .unwrap();
        assert_eq!(value, 1234);
    }

    assert_eq!(loads.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_remote_tier_shared_between_services() {
    let remote = Arc::new(InMemoryRemote::new());
    let writer = GraphCachingService::new(ServiceConfig::default())
        .unwrap()
        .with_remote(remote.clone());
    let reader = GraphCachingService::new(ServiceConfig::default())
        .unwrap()
        .with_remote(remote.clone());

    // Nodes are write-through by default.
    writer.set(CacheType::Nodes, "n1", "shared").await.unwrap();
    assert!(remote.contains("ouroboros:nodes:n1").await);

    let value: Option<String> = reader.get(CacheType::Nodes, "n1").await.unwrap();
    assert_eq!(value.as_deref(), Some("shared"));
    let value: Option<String> = reader.get(CacheType::Nodes, "n1").await.unwrap();
    assert_eq!(value.as_deref(), Some("shared"));

    let stats = reader.cache_stats(CacheType::Nodes).await;
    assert_eq!(stats.l2_hits, 1);
    assert_eq!(stats.l1_hits, 1);

    writer.invalidate(CacheType::Nodes, Some("n1"), false).await;
    assert!(!remote.contains("ouroboros:nodes:n1").await);
}

#[tokio::test]
async fn test_remote_outage_falls_back_to_loader() {
    let (cache, remote) = service_with_remote(ServiceConfig::default());
    remote.set_available(false);

    cache.set(CacheType::Nodes, "n1", "still cached").await.unwrap();
    let value: Option<String> = cache.get(CacheType::Nodes, "n1").await.unwrap();
    assert_eq!(value.as_deref(), Some("still cached"));

    let loaded: String = cache
        .get_or_load(CacheType::Nodes, "n2", || async {
            Ok::<_, CacheError>("from origin".to_string())
        })
        .await
        .unwrap();
    assert_eq!(loaded, "from origin");
}

#[tokio::test]
async fn test_slow_remote_does_not_block_reads() {
    let settings = ServiceConfig {
        remote_timeout: Duration::from_millis(20),
        ..Default::default()
    };
    let (cache, remote) = service_with_remote(settings);
    remote.set_latency(Duration::from_millis(500));

    let started = std::time::Instant::now();
    let value: Option<String> = cache.get(CacheType::Nodes, "absent").await.unwrap();
    assert!(value.is_none());
    assert!(started.elapsed() < Duration::from_millis(300));
}

#[tokio::test]
async fn test_remote_key_prefix() {
    let settings = ServiceConfig {
        remote_key_prefix: "kg".to_string(),
        ..Default::default()
    };
    let (cache, remote) = service_with_remote(settings);

    cache.set(CacheType::Relationships, "r1", &1u8).await.unwrap();
    assert!(remote.contains("kg:relationships:r1").await);
}

#[tokio::test]
async fn test_write_behind_flushed_on_stop() {
    let settings = ServiceConfig {
        write_behind: WriteBehindConfig {
            batch_size: 1000,
            flush_interval: Duration::from_secs(3600),
        },
        ..Default::default()
    };
    let (cache, remote) = service_with_remote(settings);
    assert!(cache.start().await);
    assert!(!cache.start().await);

    // Queries are write-behind by default.
    for i in 0..5 {
        cache
            .set(CacheType::Queries, &format!("q{}", i), &i)
            .await
            .unwrap();
    }

    cache.stop().await;
    assert!(!cache.is_running());
    for i in 0..5 {
        assert!(remote.contains(&format!("ouroboros:queries:q{}", i)).await);
    }
}

#[tokio::test]
async fn test_write_behind_without_workers() {
    let (cache, remote) = service_with_remote(ServiceConfig::default());
    cache.set(CacheType::Queries, "q", "v").await.unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(remote.contains("ouroboros:queries:q").await);
}

#[tokio::test]
async fn test_invalidated_write_behind_is_not_flushed() {
    let settings = ServiceConfig {
        write_behind: WriteBehindConfig {
            batch_size: 1000,
            flush_interval: Duration::from_secs(3600),
        },
        ..Default::default()
    };
    let (cache, remote) = service_with_remote(settings);
    assert!(cache.start().await);

    cache.set(CacheType::Queries, "q", "stale").await.unwrap();
    cache.set(CacheType::Queries, "kept", "fresh").await.unwrap();
    assert_eq!(cache.invalidate(CacheType::Queries, Some("q"), true).await, 1);
    cache.stop().await;

    assert!(!remote.contains("ouroboros:queries:q").await);
    assert!(remote.contains("ouroboros:queries:kept").await);
    let value: Option<String> = cache.get(CacheType::Queries, "q").await.unwrap();
    assert_eq!(value, None);
}

#[tokio::test]
async fn test_deleted_write_behind_without_workers_stays_deleted() {
    let (cache, remote) = service_with_remote(ServiceConfig::default());
    cache.set(CacheType::Queries, "q", "stale").await.unwrap();
    assert!(cache.delete(CacheType::Queries, "q").await);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!remote.contains("ouroboros:queries:q").await);
    let value: Option<String> = cache.get(CacheType::Queries, "q").await.unwrap();
    assert_eq!(value, None);
}

#[tokio::test]
async fn test_invalidate_during_remote_read_is_not_undone() {
    let remote = Arc::new(InMemoryRemote::new());
    let settings = ServiceConfig {
        remote_timeout: Duration::from_millis(500),
        ..Default::default()
    };
    let writer = GraphCachingService::new(settings.clone())
        .unwrap()
        .with_remote(remote.clone());
    let reader = Arc::new(
        GraphCachingService::new(settings)
            .unwrap()
            .with_remote(remote.clone()),
    );

    // Nodes are write-through by default.
    writer.set(CacheType::Nodes, "n", "old").await.unwrap();
    remote.set_latency(Duration::from_millis(50));

    let read = {
        let reader = reader.clone();
        tokio::spawn(async move { reader.get::<String>(CacheType::Nodes, "n").await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    reader.invalidate(CacheType::Nodes, Some("n"), true).await;
    read.await.unwrap().unwrap();

    assert!(!reader.contains(CacheType::Nodes, "n").await);
    remote.set_latency(Duration::ZERO);
    assert!(!remote.contains("ouroboros:nodes:n").await);
    let value: Option<String> = reader.get(CacheType::Nodes, "n").await.unwrap();
    assert_eq!(value, None);
}

#[tokio::test]
async fn test_refresh_ahead() {
    // Patterns are refresh-ahead with a 300s window by default.
    let cache = Arc::new(GraphCachingService::new(ServiceConfig::default()).unwrap());
    let t = CacheType::Patterns;

    cache
        .set_refresher(
            t,
            Refresher::new(|key: String| async move {
                if key == "p1" {
                    Ok(Some("fresh".to_string()))
                } else {
                    Ok(None)
                }
            }),
        )
        .await;

    let soon = Some(Duration::from_secs(10));
    cache.set_with_ttl(t, "p1", "stale", soon).await.unwrap();
    cache.set_with_ttl(t, "p2", "stale", soon).await.unwrap();
    cache.set_with_ttl(t, "p3", "forever", None).await.unwrap();

    assert_eq!(cache.refresh_ahead().await, 1);

    let p1: Option<String> = cache.get(t, "p1").await.unwrap();
    assert_eq!(p1.as_deref(), Some("fresh"));
    assert!(!cache.contains(t, "p2").await);
    assert!(cache.contains(t, "p3").await);
}

#[tokio::test]
async fn test_background_cleanup() {
    let settings = ServiceConfig {
        cleanup_interval: Duration::from_millis(50),
        ..Default::default()
    };
    let cache = Arc::new(GraphCachingService::new(settings).unwrap());
    cache.start().await;

    cache
        .set_with_ttl(CacheType::Nodes, "short", "v", Some(Duration::from_millis(30)))
        .await
        .unwrap();
    cache.set(CacheType::Nodes, "long", "v").await.unwrap();

    tokio::time::sleep(Duration::from_millis(250)).await;

    assert_eq!(cache.len(CacheType::Nodes).await, 1);
    assert_eq!(cache.cache_stats(CacheType::Nodes).await.evictions_ttl, 1);

    cache.stop().await;
}

#[tokio::test]
async fn test_size_budget_is_soft() {
    let cfg = CacheConfig::builder()
        .max_entries(1000)
        .max_size_bytes(4096)
        .build();
    let cache = service(cfg);

    for i in 0..50 {
        cache
            .set(CacheType::Layouts, &format!("layout:{}", i), &"x".repeat(200))
            .await
            .unwrap();
    }
    assert_eq!(cache.len(CacheType::Layouts).await, 50);

    let events = cache.enforce_size_budget().await;
    assert_eq!(events.len(), 1);

    let stats = cache.cache_stats(CacheType::Layouts).await;
    assert!(stats.size_bytes <= 4096);
    assert!(stats.entries < 50);
    assert_eq!(stats.evictions_capacity as usize, 50 - stats.entries);
}

#[tokio::test]
async fn test_bulk_operations() {
    let cache = service(config(100, EvictionPolicy::Lru));
    let t = CacheType::Nodes;

    let written = cache
        .bulk_set(t, vec![("a", 1u32), ("b", 2), ("c", 3)])
        .await;
    assert_eq!(written.len(), 3);
    assert!(written.values().all(|r| r.is_ok()));

    cache.set(t, "text", "not a number").await.unwrap();

    let read = cache.bulk_get::<u32, _>(t, ["a", "text", "zzz"]).await;
    assert_eq!(read["a"].as_ref().unwrap(), &Some(1));
    assert!(matches!(read["text"], Err(CacheError::Serialization(_))));
    assert_eq!(read["zzz"].as_ref().unwrap(), &None);

    let deleted = cache.bulk_delete(t, ["a", "b", "zzz"]).await;
    assert!(deleted["a"] && deleted["b"]);
    assert!(!deleted["zzz"]);
    assert_eq!(cache.len(t).await, 2);
}

#[tokio::test]
async fn test_clear() {
    let cache = service(config(100, EvictionPolicy::Lru));
    cache.set(CacheType::Nodes, "a", &1).await.unwrap();
    cache.set(CacheType::Layouts, "b", &2).await.unwrap();
    cache.set(CacheType::Layouts, "c", &3).await.unwrap();

    assert_eq!(cache.clear(Some(CacheType::Layouts)).await, 2);
    assert_eq!(cache.clear(None).await, 1);
    assert_eq!(cache.get_stats(None).await.overall.entries, 0);
}

#[tokio::test]
async fn test_warm_up_report() {
    let cache = service(config(100, EvictionPolicy::Lru));
    let sources = vec![
        WarmUpSource::new(CacheType::Nodes, "hubs", || async {
            Ok((0..10).map(|i| (format!("hub:{}", i), i)).collect::<Vec<_>>())
        }),
        WarmUpSource::new(CacheType::Clusters, "broken", || async {
            Err::<Vec<(String, u8)>, _>(anyhow::anyhow!("timeout"))
        }),
    ];

    let report = cache.warm_up(&sources).await;
    assert_eq!(report.total_loaded(), 10);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].source, "broken");
    assert_eq!(cache.len(CacheType::Nodes).await, 10);
}

#[tokio::test]
async fn test_optimize_and_health() {
    let settings = ServiceConfig {
        optimizer: OptimizerBounds {
            min_entries: 5,
            max_entries: 1000,
        },
        ..Default::default()
    }
    .with_all_types(config(10, EvictionPolicy::Lru));
    let cache = Arc::new(GraphCachingService::new(settings).unwrap());

    assert_eq!(cache.health().await.status, HealthStatus::Healthy);

    // Every lookup misses and every load overflows the cache.
    for i in 0..40u32 {
        let key = format!("q{}", i);
        let _: Option<u32> = cache.get(CacheType::Queries, &key).await.unwrap();
        cache.set(CacheType::Queries, &key, &i).await.unwrap();
    }

    let health = cache.health().await;
    assert_eq!(health.status, HealthStatus::Warning);
    assert!(health.issues.iter().any(|i| i.starts_with("queries")));

    let report = cache.optimize(OptimizationStrategy::Adaptive).await;
    assert!(report
        .changes
        .iter()
        .all(|c| c.cache_type == CacheType::Queries));
    assert!(report
        .changes
        .iter()
        .any(|c| c.field == "max_entries" && c.old == "10" && c.new == "15"));

    let tuned = cache.get_config(CacheType::Queries).await;
    assert_eq!(tuned.max_entries, 15);
    assert_eq!(tuned.eviction_policy, EvictionPolicy::Lfu);
    assert_eq!(cache.get_config(CacheType::Nodes).await.max_entries, 10);
}

#[tokio::test]
async fn test_config_rejection() {
    let cache = service(config(10, EvictionPolicy::Lru));
    let before = cache.get_config(CacheType::Nodes).await;

    let result = cache
        .set_config_fields(CacheType::Nodes, [("eviction_policy", "random")])
        .await;
    assert!(matches!(result, Err(CacheError::Configuration(_))));

    let result = cache
        .set_config_fields(CacheType::Nodes, [("invalidation_strategy", "sometimes")])
        .await;
    assert!(matches!(result, Err(CacheError::Configuration(_))));

    assert_eq!(cache.get_config(CacheType::Nodes).await, before);

    let broken = ServiceConfig::default().with_type(
        CacheType::Nodes,
        CacheConfig {
            max_entries: 0,
            ..Default::default()
        },
    );
    assert!(GraphCachingService::new(broken).is_err());
}

#[tokio::test]
async fn test_concurrent_access() {
    let cache = service(config(50, EvictionPolicy::Lfu));

    let mut handles = Vec::new();
    for worker in 0..16u32 {
        let cache = cache.clone();
        handles.push(tokio::spawn(async move {
            for i in 0..200u32 {
                let key = format!("n{}", (worker * 31 + i) % 120);
                cache.set(CacheType::Nodes, &key, &i).await.unwrap();
                let _: Option<u32> = cache.get(CacheType::Nodes, &key).await.unwrap();
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let stats = cache.cache_stats(CacheType::Nodes).await;
    assert!(stats.entries <= 50);
    assert_eq!(stats.sets, 16 * 200);
    assert_eq!(stats.lookups(), 16 * 200);
}
