//! Configuration for the cache system

use crate::cache::types::CacheType;
use crate::error::{CacheError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Environment variable prefix for [`ServiceConfig::from_env`]
pub const ENV_PREFIX: &str = "OUROBOROS_CACHE";

/// Which bounded container backs a cache type's L1 tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvictionPolicy {
    /// Least recently used
    Lru,
    /// Least frequently used, LRU among equal frequencies
    Lfu,
}

/// When writes reach the remote tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WritePolicy {
    /// L1 and L2 are written before `set` returns
    WriteThrough,
    /// L2 write is queued and flushed in batches
    WriteBehind,
    /// Like write-behind, and entries close to expiry are re-fetched ahead of time
    RefreshAhead,
}

/// How entries of a cache type leave the cache besides capacity pressure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidationStrategy {
    /// Default TTL applies to every write
    Ttl,
    /// No default TTL; entries live until evicted or invalidated
    Manual,
    /// Default TTL applies, and every write also invalidates registered dependents
    Cascade,
}

/// Encoding of cached values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SerializationFormat {
    Json,
    Bincode,
}

macro_rules! string_enum {
    ($ty:ident, $field:literal, { $($variant:ident => $name:literal),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($ty::$variant => $name,)+
                }
            }
        }

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.pad(self.as_str())
            }
        }

        impl std::str::FromStr for $ty {
            type Err = $crate::error::CacheError;

            fn from_str(s: &str) -> $crate::error::Result<Self> {
                let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
                match normalized.as_str() {
                    $($name => Ok($ty::$variant),)+
                    _ => Err($crate::error::CacheError::Configuration(format!(
                        "invalid {} `{}` (expected one of: {})",
                        $field,
                        s,
                        [$($name),+].join(", ")
                    ))),
                }
            }
        }
    };
}
pub(crate) use string_enum;

string_enum!(EvictionPolicy, "eviction_policy", { Lru => "lru", Lfu => "lfu" });
string_enum!(WritePolicy, "write_policy", {
    WriteThrough => "write_through",
    WriteBehind => "write_behind",
    RefreshAhead => "refresh_ahead",
});
string_enum!(InvalidationStrategy, "invalidation_strategy", {
    Ttl => "ttl",
    Manual => "manual",
    Cascade => "cascade",
});
string_enum!(SerializationFormat, "serialization_format", { Json => "json", Bincode => "bincode" });

/// Configuration for a single cache type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Hard bound on the number of L1 entries
    pub max_entries: usize,

    /// Advisory bound on the L1 size estimate, enforced by the cleanup sweep
    pub max_size_bytes: usize,

    /// TTL applied when a write does not name one; `None` disables expiry
    pub default_ttl: Option<Duration>,

    /// TTL jitter factor (0.0 - 1.0), applied to default TTLs only
    /// Spreads expiry of entries written together
    pub ttl_jitter: f64,

    pub eviction_policy: EvictionPolicy,

    pub write_policy: WritePolicy,

    pub invalidation_strategy: InvalidationStrategy,

    /// Refresh-ahead window: entries with less remaining TTL are re-fetched
    pub refresh_interval: Duration,

    /// Compress encoded values above `compression_threshold_bytes`
    pub compression_enabled: bool,

    pub compression_threshold_bytes: usize,

    pub serialization_format: SerializationFormat,

    /// Enable metrics collection
    pub enable_metrics: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            // 100 MB default
            max_size_bytes: 100 * 1024 * 1024,
            default_ttl: Some(Duration::from_secs(3600)),
            ttl_jitter: 0.1,
            eviction_policy: EvictionPolicy::Lru,
            write_policy: WritePolicy::WriteThrough,
            invalidation_strategy: InvalidationStrategy::Ttl,
            refresh_interval: Duration::from_secs(60),
            compression_enabled: true,
            compression_threshold_bytes: 4096,
            serialization_format: SerializationFormat::Json,
            enable_metrics: true,
        }
    }
}

impl CacheConfig {
    /// Create a new builder for cache configuration
    pub fn builder() -> CacheConfigBuilder {
        CacheConfigBuilder::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.max_entries == 0 {
            return Err(CacheError::Configuration(
                "max_entries must be greater than 0".to_string(),
            ));
        }

        if self.max_size_bytes == 0 {
            return Err(CacheError::Configuration(
                "max_size_bytes must be greater than 0".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.ttl_jitter) {
            return Err(CacheError::Configuration(
                "ttl_jitter must be between 0.0 and 1.0".to_string(),
            ));
        }

        if self.default_ttl == Some(Duration::ZERO) {
            return Err(CacheError::Configuration(
                "default_ttl must be positive (omit it to disable expiry)".to_string(),
            ));
        }

        if self.write_policy == WritePolicy::RefreshAhead && self.refresh_interval.is_zero() {
            return Err(CacheError::Configuration(
                "refresh_interval must be positive for refresh_ahead".to_string(),
            ));
        }

        Ok(())
    }

    /// TTL a write without an explicit TTL receives, jitter applied
    pub fn effective_default_ttl(&self) -> Option<Duration> {
        if self.invalidation_strategy == InvalidationStrategy::Manual {
            return None;
        }
        self.default_ttl.map(|ttl| self.ttl_with_jitter(ttl))
    }

    /// Calculate actual TTL with jitter applied
    pub fn ttl_with_jitter(&self, base: Duration) -> Duration {
        if self.ttl_jitter == 0.0 {
            return base;
        }

        let base_secs = base.as_secs_f64();
        let jitter_range = base_secs * self.ttl_jitter;
        let jitter = (rand::random::<f64>() * 2.0 - 1.0) * jitter_range;
        let final_secs = (base_secs + jitter).max(1.0);

        Duration::try_from_secs_f64(final_secs).unwrap_or(base)
    }

    /// Default configuration for a cache type
    pub fn for_type(cache_type: CacheType) -> Self {
        match cache_type {
            CacheType::Nodes => Self {
                max_entries: 10_000,
                max_size_bytes: 100 * 1024 * 1024,
                ..Default::default()
            },
            CacheType::Relationships => Self {
                max_entries: 20_000,
                max_size_bytes: 100 * 1024 * 1024,
                ..Default::default()
            },
            CacheType::Patterns => Self {
                max_entries: 1_000,
                max_size_bytes: 50 * 1024 * 1024,
                default_ttl: Some(Duration::from_secs(7200)),
                eviction_policy: EvictionPolicy::Lfu,
                write_policy: WritePolicy::RefreshAhead,
                refresh_interval: Duration::from_secs(300),
                ..Default::default()
            },
            CacheType::Queries => Self {
                max_entries: 5_000,
                max_size_bytes: 200 * 1024 * 1024,
                default_ttl: Some(Duration::from_secs(300)),
                ttl_jitter: 0.15,
                write_policy: WritePolicy::WriteBehind,
                ..Default::default()
            },
            CacheType::Layouts => Self {
                max_entries: 500,
                max_size_bytes: 200 * 1024 * 1024,
                default_ttl: Some(Duration::from_secs(1800)),
                eviction_policy: EvictionPolicy::Lfu,
                write_policy: WritePolicy::WriteBehind,
                compression_threshold_bytes: 1024,
                ..Default::default()
            },
            CacheType::Clusters => Self {
                max_entries: 200,
                max_size_bytes: 50 * 1024 * 1024,
                default_ttl: Some(Duration::from_secs(7200)),
                eviction_policy: EvictionPolicy::Lfu,
                ..Default::default()
            },
        }
    }
}

/// Builder for cache configuration with validation
#[derive(Debug, Default)]
pub struct CacheConfigBuilder {
    base: Option<CacheConfig>,
    max_entries: Option<usize>,
    max_size_bytes: Option<usize>,
    default_ttl: Option<Option<Duration>>,
    ttl_jitter: Option<f64>,
    eviction_policy: Option<EvictionPolicy>,
    write_policy: Option<WritePolicy>,
    invalidation_strategy: Option<InvalidationStrategy>,
    refresh_interval: Option<Duration>,
    compression_enabled: Option<bool>,
    compression_threshold_bytes: Option<usize>,
    serialization_format: Option<SerializationFormat>,
    enable_metrics: Option<bool>,
}

impl CacheConfigBuilder {
    /// Start from a cache type's defaults instead of the generic ones
    pub fn for_type(mut self, cache_type: CacheType) -> Self {
        self.base = Some(CacheConfig::for_type(cache_type));
        self
    }

    /// Set maximum number of cache entries
    pub fn max_entries(mut self, max: usize) -> Self {
        self.max_entries = Some(max);
        self
    }

    /// Set advisory cache size in bytes
    pub fn max_size_bytes(mut self, size: usize) -> Self {
        self.max_size_bytes = Some(size);
        self
    }

    /// Set advisory cache size in megabytes, saturating at `usize::MAX` bytes
    pub fn max_size_mb(self, mb: usize) -> Self {
        self.max_size_bytes(mb.saturating_mul(1024 * 1024))
    }

    /// Set default TTL for cache entries
    pub fn default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = Some(Some(ttl));
        self
    }

    /// Entries written without an explicit TTL never expire
    pub fn no_default_ttl(mut self) -> Self {
        self.default_ttl = Some(None);
        self
    }

    /// Set TTL jitter factor (0.0 - 1.0)
    pub fn ttl_jitter(mut self, jitter: f64) -> Self {
        self.ttl_jitter = Some(jitter);
        self
    }

    pub fn eviction_policy(mut self, policy: EvictionPolicy) -> Self {
        self.eviction_policy = Some(policy);
        self
    }

    pub fn write_policy(mut self, policy: WritePolicy) -> Self {
        self.write_policy = Some(policy);
        self
    }

    pub fn invalidation_strategy(mut self, strategy: InvalidationStrategy) -> Self {
        self.invalidation_strategy = Some(strategy);
        self
    }

    pub fn refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = Some(interval);
        self
    }

    /// Enable compression above the given encoded size
    pub fn compression(mut self, enabled: bool, threshold_bytes: usize) -> Self {
        self.compression_enabled = Some(enabled);
        self.compression_threshold_bytes = Some(threshold_bytes);
        self
    }

    pub fn serialization_format(mut self, format: SerializationFormat) -> Self {
        self.serialization_format = Some(format);
        self
    }

    /// Enable or disable metrics collection
    pub fn enable_metrics(mut self, enable: bool) -> Self {
        self.enable_metrics = Some(enable);
        self
    }

    /// Build the cache configuration
    pub fn build(self) -> CacheConfig {
        let defaults = self.base.unwrap_or_default();

        CacheConfig {
            max_entries: self.max_entries.unwrap_or(defaults.max_entries),
            max_size_bytes: self.max_size_bytes.unwrap_or(defaults.max_size_bytes),
            default_ttl: self.default_ttl.unwrap_or(defaults.default_ttl),
            ttl_jitter: self.ttl_jitter.unwrap_or(defaults.ttl_jitter),
            eviction_policy: self.eviction_policy.unwrap_or(defaults.eviction_policy),
            write_policy: self.write_policy.unwrap_or(defaults.write_policy),
            invalidation_strategy: self
                .invalidation_strategy
                .unwrap_or(defaults.invalidation_strategy),
            refresh_interval: self.refresh_interval.unwrap_or(defaults.refresh_interval),
            compression_enabled: self
                .compression_enabled
                .unwrap_or(defaults.compression_enabled),
            compression_threshold_bytes: self
                .compression_threshold_bytes
                .unwrap_or(defaults.compression_threshold_bytes),
            serialization_format: self
                .serialization_format
                .unwrap_or(defaults.serialization_format),
            enable_metrics: self.enable_metrics.unwrap_or(defaults.enable_metrics),
        }
    }

    /// Build and validate
    pub fn try_build(self) -> Result<CacheConfig> {
        let config = self.build();
        config.validate()?;
        Ok(config)
    }
}

/// Partial runtime update of a [`CacheConfig`]
///
/// Applied atomically: the merged config is validated before anything is
/// swapped, so a rejected update leaves the previous config in place.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigUpdate {
    pub max_entries: Option<usize>,
    pub max_size_bytes: Option<usize>,
    /// `Some(None)` clears the default TTL
    pub default_ttl: Option<Option<Duration>>,
    pub ttl_jitter: Option<f64>,
    pub eviction_policy: Option<EvictionPolicy>,
    pub write_policy: Option<WritePolicy>,
    pub invalidation_strategy: Option<InvalidationStrategy>,
    pub refresh_interval: Option<Duration>,
    pub compression_enabled: Option<bool>,
    pub compression_threshold_bytes: Option<usize>,
    pub serialization_format: Option<SerializationFormat>,
    pub enable_metrics: Option<bool>,
}

impl ConfigUpdate {
    /// Parse an update from string fields, the shape HTTP and CLI callers have
    ///
    /// Durations are given in seconds (`default_ttl`, `refresh_interval`);
    /// `default_ttl` accepts `none` to disable expiry, `max_size_mb` is
    /// accepted alongside `max_size_bytes`.
    pub fn from_fields<'a, I>(fields: I) -> Result<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut update = ConfigUpdate::default();

        for (name, raw) in fields {
            let value = raw.trim();
            match name {
                "max_entries" => update.max_entries = Some(parse_field(name, value)?),
                "max_size_bytes" => update.max_size_bytes = Some(parse_field(name, value)?),
                "max_size_mb" => {
                    let mb: usize = parse_field(name, value)?;
                    update.max_size_bytes = Some(mb_to_bytes(name, mb)?);
                }
                "default_ttl" => {
                    update.default_ttl = Some(if value.eq_ignore_ascii_case("none") {
                        None
                    } else {
                        Some(parse_secs(name, value)?)
                    })
                }
                "ttl_jitter" => update.ttl_jitter = Some(parse_field(name, value)?),
                "eviction_policy" | "strategy" => update.eviction_policy = Some(value.parse()?),
                "write_policy" => update.write_policy = Some(value.parse()?),
                "invalidation_strategy" => update.invalidation_strategy = Some(value.parse()?),
                "refresh_interval" => update.refresh_interval = Some(parse_secs(name, value)?),
                "compression_enabled" => {
                    update.compression_enabled = Some(parse_field(name, value)?)
                }
                "compression_threshold_bytes" => {
                    update.compression_threshold_bytes = Some(parse_field(name, value)?)
                }
                "serialization_format" => update.serialization_format = Some(value.parse()?),
                "enable_metrics" => update.enable_metrics = Some(parse_field(name, value)?),
                other => {
                    return Err(CacheError::Configuration(format!(
                        "unknown config field `{}`",
                        other
                    )))
                }
            }
        }

        Ok(update)
    }

    /// Whether the update changes nothing
    pub fn is_empty(&self) -> bool {
        *self == ConfigUpdate::default()
    }

    /// Produce the merged config, validated; `base` is left untouched
    pub fn apply_to(&self, base: &CacheConfig) -> Result<CacheConfig> {
        let mut config = base.clone();

        if let Some(v) = self.max_entries {
            config.max_entries = v;
        }
        if let Some(v) = self.max_size_bytes {
            config.max_size_bytes = v;
        }
        if let Some(v) = self.default_ttl {
            config.default_ttl = v;
        }
        if let Some(v) = self.ttl_jitter {
            config.ttl_jitter = v;
        }
        if let Some(v) = self.eviction_policy {
            config.eviction_policy = v;
        }
        if let Some(v) = self.write_policy {
            config.write_policy = v;
        }
        if let Some(v) = self.invalidation_strategy {
            config.invalidation_strategy = v;
        }
        if let Some(v) = self.refresh_interval {
            config.refresh_interval = v;
        }
        if let Some(v) = self.compression_enabled {
            config.compression_enabled = v;
        }
        if let Some(v) = self.compression_threshold_bytes {
            config.compression_threshold_bytes = v;
        }
        if let Some(v) = self.serialization_format {
            config.serialization_format = v;
        }
        if let Some(v) = self.enable_metrics {
            config.enable_metrics = v;
        }

        config.validate()?;
        Ok(config)
    }
}

fn parse_field<T>(name: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    value.parse().map_err(|e: T::Err| {
        CacheError::Configuration(format!("invalid value `{}` for {}: {}", value, name, e))
    })
}

fn parse_secs(name: &str, value: &str) -> Result<Duration> {
    let secs: f64 = parse_field(name, value)?;
    if !secs.is_finite() || secs < 0.0 {
        return Err(CacheError::Configuration(format!(
            "{} must be a non-negative number of seconds",
            name
        )));
    }
    Duration::try_from_secs_f64(secs).map_err(|e| {
        CacheError::Configuration(format!("invalid value `{}` for {}: {}", value, name, e))
    })
}

fn mb_to_bytes(name: &str, mb: usize) -> Result<usize> {
    mb.checked_mul(1024 * 1024).ok_or_else(|| {
        CacheError::Configuration(format!("{} of {} overflows a byte count", name, mb))
    })
}

/// Thresholds that turn statistics into health warnings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthThresholds {
    /// Warn when a type's hit ratio drops below this
    pub min_hit_ratio: f64,
    /// Warn when size estimate / max_size_bytes exceeds this
    pub max_memory_usage: f64,
    /// Warn when mean lookup latency exceeds this
    pub max_avg_access_time_ms: f64,
    /// Hit ratio and latency are only judged after this many lookups
    pub min_observations: u64,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            min_hit_ratio: 0.5,
            max_memory_usage: 0.9,
            max_avg_access_time_ms: 100.0,
            min_observations: 20,
        }
    }
}

/// Bounds the optimizer keeps `max_entries` within
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizerBounds {
    pub min_entries: usize,
    pub max_entries: usize,
}

impl Default for OptimizerBounds {
    fn default() -> Self {
        Self {
            min_entries: 100,
            max_entries: 1_000_000,
        }
    }
}

/// Write-behind batching
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteBehindConfig {
    /// Flush once this many writes are queued
    pub batch_size: usize,
    /// Flush at least this often
    pub flush_interval: Duration,
}

impl Default for WriteBehindConfig {
    fn default() -> Self {
        Self {
            batch_size: 64,
            flush_interval: Duration::from_millis(250),
        }
    }
}

/// Service-wide configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// One config per cache type
    pub types: BTreeMap<CacheType, CacheConfig>,

    /// Interval of the background expiry sweep
    pub cleanup_interval: Duration,

    /// Deadline for every remote tier call
    pub remote_timeout: Duration,

    /// Namespace prepended to remote keys
    pub remote_key_prefix: String,

    pub write_behind: WriteBehindConfig,

    pub health: HealthThresholds,

    pub optimizer: OptimizerBounds,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            types: CacheType::ALL
                .iter()
                .map(|t| (*t, CacheConfig::for_type(*t)))
                .collect(),
            cleanup_interval: Duration::from_secs(60),
            remote_timeout: Duration::from_millis(100),
            remote_key_prefix: "ouroboros".to_string(),
            write_behind: WriteBehindConfig::default(),
            health: HealthThresholds::default(),
            optimizer: OptimizerBounds::default(),
        }
    }
}

impl ServiceConfig {
    /// Replace the config of one type
    pub fn with_type(mut self, cache_type: CacheType, config: CacheConfig) -> Self {
        self.types.insert(cache_type, config);
        self
    }

    /// Apply the same config to every type
    pub fn with_all_types(mut self, config: CacheConfig) -> Self {
        for t in CacheType::ALL {
            self.types.insert(t, config.clone());
        }
        self
    }

    pub fn config_for(&self, cache_type: CacheType) -> CacheConfig {
        self.types
            .get(&cache_type)
            .cloned()
            .unwrap_or_else(|| CacheConfig::for_type(cache_type))
    }

    pub fn validate(&self) -> Result<()> {
        for (cache_type, config) in &self.types {
            config.validate().map_err(|e| {
                CacheError::Configuration(format!("{}: {}", cache_type, e))
            })?;
        }

        if self.cleanup_interval.is_zero() {
            return Err(CacheError::Configuration(
                "cleanup_interval must be positive".to_string(),
            ));
        }
        if self.remote_timeout.is_zero() {
            return Err(CacheError::Configuration(
                "remote_timeout must be positive".to_string(),
            ));
        }
        if self.write_behind.batch_size == 0 {
            return Err(CacheError::Configuration(
                "write_behind.batch_size must be greater than 0".to_string(),
            ));
        }
        let bounds = &self.optimizer;
        if bounds.min_entries == 0 || bounds.min_entries > bounds.max_entries {
            return Err(CacheError::Configuration(
                "optimizer bounds must satisfy 0 < min_entries <= max_entries".to_string(),
            ));
        }

        Ok(())
    }

    /// Load configuration from the environment (and `.env` if present)
    ///
    /// # Environment Variables
    /// - `OUROBOROS_CACHE_CLEANUP_INTERVAL_SECS` (default: 60)
    /// - `OUROBOROS_CACHE_REMOTE_TIMEOUT_MS` (default: 100)
    /// - `OUROBOROS_CACHE_KEY_PREFIX` (default: ouroboros)
    /// - `OUROBOROS_CACHE_WRITE_BEHIND_BATCH_SIZE` (default: 64)
    /// - `OUROBOROS_CACHE_WRITE_BEHIND_FLUSH_MS` (default: 250)
    /// - `OUROBOROS_CACHE_<TYPE>_MAX_ENTRIES`, `_MAX_SIZE_MB`, `_TTL_SECS`,
    ///   `_EVICTION`, `_WRITE_POLICY`, `_INVALIDATION` per cache type
    ///
    /// Malformed values are rejected rather than replaced by defaults.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let mut config = ServiceConfig::default();

        if let Some(secs) = env_value::<u64>("CLEANUP_INTERVAL_SECS")? {
            config.cleanup_interval = Duration::from_secs(secs);
        }
        if let Some(ms) = env_value::<u64>("REMOTE_TIMEOUT_MS")? {
            config.remote_timeout = Duration::from_millis(ms);
        }
        if let Some(prefix) = env_value::<String>("KEY_PREFIX")? {
            config.remote_key_prefix = prefix;
        }
        if let Some(size) = env_value::<usize>("WRITE_BEHIND_BATCH_SIZE")? {
            config.write_behind.batch_size = size;
        }
        if let Some(ms) = env_value::<u64>("WRITE_BEHIND_FLUSH_MS")? {
            config.write_behind.flush_interval = Duration::from_millis(ms);
        }

        for cache_type in CacheType::ALL {
            let scope = cache_type.as_str().to_ascii_uppercase();
            let mut fields: Vec<(&str, String)> = Vec::new();

            for (suffix, field) in [
                ("MAX_ENTRIES", "max_entries"),
                ("MAX_SIZE_MB", "max_size_mb"),
                ("TTL_SECS", "default_ttl"),
                ("EVICTION", "eviction_policy"),
                ("WRITE_POLICY", "write_policy"),
                ("INVALIDATION", "invalidation_strategy"),
            ] {
                if let Some(value) = env_value::<String>(&format!("{}_{}", scope, suffix))? {
                    fields.push((field, value));
                }
            }

            if fields.is_empty() {
                continue;
            }

            let update =
                ConfigUpdate::from_fields(fields.iter().map(|(f, v)| (*f, v.as_str())))?;
            let merged = update.apply_to(&config.config_for(cache_type))?;
            config.types.insert(cache_type, merged);
        }

        config.validate()?;
        Ok(config)
    }
}

fn env_value<T>(suffix: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    let name = format!("{}_{}", ENV_PREFIX, suffix);
    match std::env::var(&name) {
        Ok(raw) => parse_field(&name, raw.trim()).map(Some),
        Err(_) => Ok(None),
    }
}
