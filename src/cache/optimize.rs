//! Runtime tuning and health reporting from cache statistics

use crate::cache::config::{
    string_enum, CacheConfig, ConfigUpdate, EvictionPolicy, HealthThresholds, OptimizerBounds,
};
use crate::cache::service::GraphCachingService;
use crate::cache::types::{CacheStats, CacheType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// What `optimize` tunes for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizationStrategy {
    /// Grow thrashing caches, shrink idle ones, prefer LFU under churn
    #[default]
    Adaptive,
    /// Bring types back under their size budget
    Memory,
    /// Raise hit ratio and cut access latency
    Performance,
}

string_enum!(OptimizationStrategy, "optimization strategy", {
    Adaptive => "adaptive",
    Memory => "memory",
    Performance => "performance",
});

/// One config field changed by `optimize`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigChange {
    pub cache_type: CacheType,
    pub field: String,
    pub old: String,
    pub new: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationReport {
    pub strategy: OptimizationStrategy,
    pub timestamp: DateTime<Utc>,
    pub changes: Vec<ConfigChange>,
}

impl OptimizationReport {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Warning,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub issues: Vec<String>,
    pub checked_at: DateTime<Utc>,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }
}

/// Stats and config of one type, taken under a single read lock
struct Observation {
    cache_type: CacheType,
    stats: CacheStats,
    config: CacheConfig,
    memory_usage: f64,
}

/// Proposed update plus the change log that explains it
#[derive(Default)]
struct Plan {
    update: ConfigUpdate,
    changes: Vec<ConfigChange>,
}

impl Plan {
    fn note(
        &mut self,
        cache_type: CacheType,
        field: &str,
        old: String,
        new: String,
        reason: String,
    ) {
        self.changes.push(ConfigChange {
            cache_type,
            field: field.to_string(),
            old,
            new,
            reason,
        });
    }

    fn resize(&mut self, obs: &Observation, max_entries: usize, reason: String) {
        if max_entries == obs.config.max_entries {
            return;
        }
        self.update.max_entries = Some(max_entries);
        self.note(
            obs.cache_type,
            "max_entries",
            obs.config.max_entries.to_string(),
            max_entries.to_string(),
            reason,
        );
    }
}

fn clamp(entries: usize, bounds: &OptimizerBounds) -> usize {
    entries.clamp(bounds.min_entries, bounds.max_entries)
}

fn plan_for(
    strategy: OptimizationStrategy,
    obs: &Observation,
    health: &HealthThresholds,
    bounds: &OptimizerBounds,
) -> Plan {
    let mut plan = Plan::default();
    let stats = &obs.stats;
    let config = &obs.config;
    let observed = stats.lookups() >= health.min_observations;
    let hit_ratio = stats.hit_ratio();
    let full = stats.entries * 10 >= config.max_entries * 9;

    match strategy {
        OptimizationStrategy::Adaptive => {
            if observed && hit_ratio < health.min_hit_ratio && full {
                let grown = clamp(config.max_entries + config.max_entries / 2, bounds);
                plan.resize(
                    obs,
                    grown,
                    format!(
                        "hit ratio {:.2} below {:.2} with cache full",
                        hit_ratio, health.min_hit_ratio
                    ),
                );

                if config.eviction_policy == EvictionPolicy::Lru
                    && stats.evictions_capacity > stats.lookups() / 4
                {
                    plan.update.eviction_policy = Some(EvictionPolicy::Lfu);
                    plan.note(
                        obs.cache_type,
                        "eviction_policy",
                        config.eviction_policy.to_string(),
                        EvictionPolicy::Lfu.to_string(),
                        format!(
                            "{} capacity evictions over {} lookups",
                            stats.evictions_capacity,
                            stats.lookups()
                        ),
                    );
                }
            } else if observed && hit_ratio > 0.9 && stats.entries * 4 < config.max_entries {
                let shrunk = clamp(stats.entries * 2, bounds);
                if shrunk < config.max_entries {
                    plan.resize(
                        obs,
                        shrunk,
                        format!(
                            "hit ratio {:.2} using {} of {} slots",
                            hit_ratio, stats.entries, config.max_entries
                        ),
                    );
                }
            }
        }
        OptimizationStrategy::Memory => {
            if obs.memory_usage > health.max_memory_usage {
                let shrunk = clamp(config.max_entries - config.max_entries / 4, bounds);
                plan.resize(
                    obs,
                    shrunk,
                    format!(
                        "memory usage {:.0}% above {:.0}%",
                        obs.memory_usage * 100.0,
                        health.max_memory_usage * 100.0
                    ),
                );

                if !config.compression_enabled {
                    plan.update.compression_enabled = Some(true);
                    plan.note(
                        obs.cache_type,
                        "compression_enabled",
                        "false".to_string(),
                        "true".to_string(),
                        "reduce memory footprint".to_string(),
                    );
                }
            }
        }
        OptimizationStrategy::Performance => {
            if observed && hit_ratio < health.min_hit_ratio && stats.evictions_capacity > 0 {
                let grown = clamp(config.max_entries * 2, bounds);
                plan.resize(
                    obs,
                    grown,
                    format!(
                        "hit ratio {:.2} with {} capacity evictions",
                        hit_ratio, stats.evictions_capacity
                    ),
                );
            }

            if observed
                && config.compression_enabled
                && stats.avg_access_time_ms() > health.max_avg_access_time_ms
            {
                plan.update.compression_enabled = Some(false);
                plan.note(
                    obs.cache_type,
                    "compression_enabled",
                    "true".to_string(),
                    "false".to_string(),
                    format!(
                        "average access {:.2}ms above {:.2}ms",
                        stats.avg_access_time_ms(),
                        health.max_avg_access_time_ms
                    ),
                );
            }
        }
    }

    plan
}

impl GraphCachingService {
    async fn observe(&self, cache_type: CacheType) -> Observation {
        let state = self.state(cache_type).read().await;
        Observation {
            cache_type,
            stats: state.snapshot(),
            config: state.config.clone(),
            memory_usage: state.memory_usage(),
        }
    }

    /// Tune per-type configs from their statistics
    ///
    /// Each type's changes are applied as one config swap; callers of other
    /// types are never blocked.
    pub async fn optimize(&self, strategy: OptimizationStrategy) -> OptimizationReport {
        let mut changes = Vec::new();

        for cache_type in CacheType::ALL {
            let obs = self.observe(cache_type).await;
            let plan = plan_for(
                strategy,
                &obs,
                &self.settings.health,
                &self.settings.optimizer,
            );
            if plan.update.is_empty() {
                continue;
            }

            match self.set_config(cache_type, plan.update).await {
                Ok(_) => {
                    for change in &plan.changes {
                        info!(
                            "optimize({}): {}.{} {} -> {} ({})",
                            strategy,
                            cache_type,
                            change.field,
                            change.old,
                            change.new,
                            change.reason
                        );
                    }
                    changes.extend(plan.changes);
                }
                Err(e) => warn!("optimize({}) skipped {}: {}", strategy, cache_type, e),
            }
        }

        OptimizationReport {
            strategy,
            timestamp: Utc::now(),
            changes,
        }
    }

    /// Judge every type against the health thresholds
    pub async fn health(&self) -> HealthReport {
        let thresholds = &self.settings.health;
        let mut issues = Vec::new();

        for cache_type in CacheType::ALL {
            let obs = self.observe(cache_type).await;
            let stats = &obs.stats;

            if stats.lookups() >= thresholds.min_observations {
                if stats.hit_ratio() < thresholds.min_hit_ratio {
                    issues.push(format!(
                        "{}: hit ratio {:.2} below {:.2}",
                        cache_type,
                        stats.hit_ratio(),
                        thresholds.min_hit_ratio
                    ));
                }
                if stats.avg_access_time_ms() > thresholds.max_avg_access_time_ms {
                    issues.push(format!(
                        "{}: average access time {:.2}ms above {:.2}ms",
                        cache_type,
                        stats.avg_access_time_ms(),
                        thresholds.max_avg_access_time_ms
                    ));
                }
            }

            if obs.memory_usage > thresholds.max_memory_usage {
                issues.push(format!(
                    "{}: memory usage {:.0}% above {:.0}%",
                    cache_type,
                    obs.memory_usage * 100.0,
                    thresholds.max_memory_usage * 100.0
                ));
            }
        }

        let status = if issues.is_empty() {
            HealthStatus::Healthy
        } else {
            HealthStatus::Warning
        };

        HealthReport {
            status,
            issues,
            checked_at: Utc::now(),
        }
    }
}
