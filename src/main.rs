use anyhow::Result;
use clap::{Parser, Subcommand};
use rand::Rng;
use std::sync::Arc;
use std::time::Instant;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ouroboros_cache::cache::optimize::OptimizationStrategy;
use ouroboros_cache::{
    CacheError, CacheRef, CacheType, GraphCachingService, InMemoryRemote, ServiceConfig,
};

#[derive(Parser)]
#[command(name = "ouroboros-cache")]
#[command(about = "Multi-tier cache for the Ouroboros knowledge graph", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a synthetic graph workload and report stats and health
    Demo {
        /// Number of lookups to perform
        #[arg(short, long, default_value = "5000")]
        operations: usize,

        /// Distinct node keys in the workload
        #[arg(short, long, default_value = "2000")]
        keys: usize,

        /// Take the remote tier down halfway through
        #[arg(long)]
        l2_outage: bool,

        /// Optimization strategy to run afterwards (adaptive, memory, performance)
        #[arg(long, default_value = "adaptive")]
        optimize: OptimizationStrategy,
    },

    /// Print the effective configuration as JSON
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "ouroboros_cache=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = ServiceConfig::from_env()?;

    match cli.command {
        Commands::Demo {
            operations,
            keys,
            l2_outage,
            optimize,
        } => run_demo(config, operations, keys.max(1), l2_outage, optimize).await?,

        Commands::Config => {
            let service = GraphCachingService::new(config)?;
            println!(
                "{}",
                serde_json::to_string_pretty(&service.service_config().await)?
            );
        }
    }

    Ok(())
}

async fn run_demo(
    config: ServiceConfig,
    operations: usize,
    keys: usize,
    l2_outage: bool,
    strategy: OptimizationStrategy,
) -> Result<()> {
    let remote = Arc::new(InMemoryRemote::new());
    let service = Arc::new(GraphCachingService::new(config)?.with_remote(remote.clone()));
    service.start().await;

    // Layouts are derived from the nodes they place.
    for i in 0..keys.min(50) {
        service
            .add_dependency(
                CacheRef::new(CacheType::Nodes, format!("node:{}", i)),
                CacheRef::new(CacheType::Layouts, format!("layout:{}", i)),
            )
            .await;
        service
            .set(CacheType::Layouts, &format!("layout:{}", i), &vec![(i, i * 2)])
            .await?;
    }

    let started = Instant::now();
    let mut rng = rand::thread_rng();
    let mut origin_loads = 0usize;

    for op in 0..operations {
        if l2_outage && op == operations / 2 {
            println!("-- remote tier down --");
            remote.set_available(false);
        }

        // Skewed access: most lookups hit a small hot set.
        let id = if rng.gen_bool(0.8) {
            rng.gen_range(0..(keys / 10).max(1))
        } else {
            rng.gen_range(0..keys)
        };
        let key = format!("node:{}", id);

        let _labels: Vec<String> = service
            .get_or_load(CacheType::Nodes, &key, || {
                origin_loads += 1;
                async move { Ok::<_, CacheError>(vec!["Person".to_string(), format!("id-{}", id)]) }
            })
            .await?;
    }

    let elapsed = started.elapsed();
    let events = service
        .invalidate_with_events(CacheType::Nodes, Some("node:1?"), true)
        .await;
    for event in &events {
        println!(
            "invalidated {} {} entries: {}",
            event.keys.len(),
            event.cache_type,
            event.reason
        );
    }
    let cascaded: usize = events.iter().map(|event| event.keys.len()).sum();

    service.stop().await;

    let report = service.get_stats(None).await;
    println!(
        "{} lookups in {:?}, {} origin loads, {} entries removed by cascade",
        operations, elapsed, origin_loads, cascaded
    );
    for (cache_type, stats) in &report.by_type {
        if stats.lookups() > 0 || stats.entries > 0 {
            println!("  {:<14} {}", cache_type, stats);
        }
    }
    println!("  {:<14} {}", "overall", report.overall);
    println!("  remote ops: {:?}", remote.ops());

    let optimization = service.optimize(strategy).await;
    if optimization.is_empty() {
        println!("optimize({}): no changes", strategy);
    }
    for change in &optimization.changes {
        println!(
            "optimize({}): {}.{} {} -> {} ({})",
            strategy, change.cache_type, change.field, change.old, change.new, change.reason
        );
    }

    let health = service.health().await;
    println!("health: {:?}", health.status);
    for issue in &health.issues {
        println!("  - {}", issue);
    }

    Ok(())
}
