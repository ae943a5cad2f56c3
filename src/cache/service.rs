//! Multi-tier cache orchestrator
//!
//! Lookups go L1 (in-process bounded container) -> L2 (shared remote tier)
//! -> caller-supplied loader. Each cache type owns its own lock; no
//! operation holds two type locks at once, and no lock is held across an L2
//! call or a loader call.
//!
//! Every invalidation or delete bumps its type's epoch. A read that went to
//! L2 or the loader only fills L1 if the epoch is unchanged when it returns.

use crate::cache::bounded::{self, BoundedCache};
use crate::cache::codec::{self, Codec};
use crate::cache::config::{
    CacheConfig, ConfigUpdate, InvalidationStrategy, ServiceConfig, WritePolicy,
};
use crate::cache::entry::CacheEntry;
use crate::cache::invalidation::{
    CacheRef, DependencyGraph, InvalidationEvent, InvalidationReason,
};
use crate::cache::maintenance::{PendingWrite, Refresher, Workers, WriteLedger};
use crate::cache::remote::{RemoteStore, RemoteTier};
use crate::cache::types::{CacheKey, CacheStats, CacheType, CacheValue, StatsReport};
use crate::cache::warmup::WarmUpSource;
use crate::error::{CacheError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{debug, error, info, warn};

/// TTL requested by a write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TtlSpec {
    /// The type's default TTL, jitter applied
    Default,
    /// Exactly this TTL; `None` never expires
    Explicit(Option<Duration>),
}

impl TtlSpec {
    fn resolve(self, config: &CacheConfig) -> Option<Duration> {
        match self {
            TtlSpec::Default => config.effective_default_ttl(),
            TtlSpec::Explicit(ttl) => ttl,
        }
    }
}

/// L1 container, config and counters of one cache type
pub(crate) struct TypeState {
    pub cache_type: CacheType,
    pub config: CacheConfig,
    pub codec: Codec,
    pub store: Box<dyn BoundedCache<CacheKey, CacheEntry>>,
    pub stats: CacheStats,
    /// Sum of `size_bytes` over resident entries
    pub size_bytes: usize,
    /// Bumped by every invalidation or delete of this type
    pub epoch: u64,
}

impl TypeState {
    fn new(cache_type: CacheType, config: CacheConfig) -> Self {
        Self {
            cache_type,
            codec: Codec::from_config(&config),
            store: bounded::with_policy(config.eviction_policy, config.max_entries),
            config,
            stats: CacheStats::default(),
            size_bytes: 0,
            epoch: 0,
        }
    }

    /// Insert under the eviction policy, accounting size and evictions
    pub fn insert(&mut self, entry: CacheEntry) -> Result<()> {
        self.size_bytes += entry.size_bytes;
        let outcome = self.store.put(entry.key.clone(), entry);

        if let Some(old) = outcome.replaced {
            self.size_bytes = self.size_bytes.saturating_sub(old.size_bytes);
        }
        if let Some((victim, old)) = outcome.evicted {
            self.size_bytes = self.size_bytes.saturating_sub(old.size_bytes);
            self.stats.evictions_capacity += 1;
            debug!(
                "Evicted {} from {} cache: {} ({} policy)",
                victim,
                self.cache_type,
                InvalidationReason::Capacity,
                self.store.policy()
            );
        }

        self.verify_capacity()
    }

    pub fn take(&mut self, key: &str) -> Option<CacheEntry> {
        let entry = self.store.remove(&key.to_string())?;
        self.size_bytes = self.size_bytes.saturating_sub(entry.size_bytes);
        Some(entry)
    }

    /// Remove the policy's next victim
    pub fn pop_victim(&mut self) -> Option<CacheEntry> {
        let (_, entry) = self.store.pop_victim()?;
        self.size_bytes = self.size_bytes.saturating_sub(entry.size_bytes);
        Some(entry)
    }

    fn verify_capacity(&self) -> Result<()> {
        let len = self.store.len();
        if len > self.config.max_entries {
            error!(
                "{} cache holds {} entries, limit is {}",
                self.cache_type, len, self.config.max_entries
            );
            return Err(CacheError::CapacityViolation {
                cache_type: self.cache_type.to_string(),
                len,
                max_entries: self.config.max_entries,
            });
        }
        Ok(())
    }

    fn record_hit(&mut self, from_remote: bool, elapsed: Duration) {
        self.stats.hits += 1;
        if from_remote {
            self.stats.l2_hits += 1;
        } else {
            self.stats.l1_hits += 1;
        }
        if self.config.enable_metrics {
            self.stats.record_access(elapsed);
        }
    }

    fn record_miss(&mut self, elapsed: Duration) {
        self.stats.misses += 1;
        if self.config.enable_metrics {
            self.stats.record_access(elapsed);
        }
    }

    /// Counters plus current gauges
    pub fn snapshot(&self) -> CacheStats {
        let mut stats = self.stats.clone();
        stats.entries = self.store.len();
        stats.size_bytes = self.size_bytes;
        stats
    }

    /// Size estimate as a fraction of the advisory budget
    pub fn memory_usage(&self) -> f64 {
        self.size_bytes as f64 / self.config.max_size_bytes.max(1) as f64
    }

    /// Swap in a validated config, rebuilding the container if the policy changed
    fn reconfigure(&mut self, config: CacheConfig) -> Vec<CacheKey> {
        let mut evicted = Vec::new();

        if config.eviction_policy != self.store.policy() {
            let mut fresh = bounded::with_policy(config.eviction_policy, config.max_entries);
            for (key, entry) in self.store.drain() {
                if let Some((victim, old)) = fresh.put(key, entry).evicted {
                    self.size_bytes = self.size_bytes.saturating_sub(old.size_bytes);
                    evicted.push(victim);
                }
            }
            self.store = fresh;
        } else if config.max_entries != self.store.capacity() {
            for (victim, old) in self.store.set_capacity(config.max_entries) {
                self.size_bytes = self.size_bytes.saturating_sub(old.size_bytes);
                evicted.push(victim);
            }
        }

        self.stats.evictions_capacity += evicted.len() as u64;
        self.codec = Codec::from_config(&config);
        self.config = config;
        evicted
    }
}

/// Keys of `store` matched by a glob; an unparseable pattern is a literal key
fn matching_keys(store: &dyn BoundedCache<CacheKey, CacheEntry>, pattern: &str) -> Vec<CacheKey> {
    match glob::Pattern::new(pattern) {
        Ok(glob) => store
            .iter()
            .filter(|(key, _)| glob.matches(key))
            .map(|(key, _)| key.clone())
            .collect(),
        Err(_) => {
            let key = pattern.to_string();
            if store.contains(&key) {
                vec![key]
            } else {
                Vec::new()
            }
        }
    }
}

fn is_literal(pattern: &str) -> bool {
    glob::Pattern::new(pattern).is_err()
        || !pattern.contains(|c: char| matches!(c, '*' | '?' | '['))
}

/// Multi-tier cache for knowledge-graph objects
///
/// Construct one instance at process start and share it behind an `Arc`.
/// Background maintenance is opt-in through
/// [`start`](GraphCachingService::start).
pub struct GraphCachingService {
    pub(crate) settings: ServiceConfig,
    /// Indexed by `CacheType as usize`
    caches: Vec<RwLock<TypeState>>,
    dependencies: RwLock<DependencyGraph>,
    pub(crate) remote: Option<RemoteTier>,
    pub(crate) refreshers: RwLock<HashMap<CacheType, Refresher>>,
    pub(crate) warm_up_sources: RwLock<Vec<WarmUpSource>>,
    pub(crate) workers: Mutex<Option<Workers>>,
    pub(crate) write_tx: mpsc::UnboundedSender<PendingWrite>,
    pub(crate) write_rx: Mutex<Option<mpsc::UnboundedReceiver<PendingWrite>>>,
    pub(crate) ledger: Arc<WriteLedger>,
    pub(crate) running: AtomicBool,
}

impl GraphCachingService {
    /// Create an L1-only service
    pub fn new(config: ServiceConfig) -> Result<Self> {
        config.validate()?;
        info!(
            "Initializing graph cache: {} types, cleanup every {:?}",
            CacheType::ALL.len(),
            config.cleanup_interval
        );

        let caches = CacheType::ALL
            .iter()
            .map(|t| RwLock::new(TypeState::new(*t, config.config_for(*t))))
            .collect();
        let (write_tx, write_rx) = mpsc::unbounded_channel();

        Ok(Self {
            settings: config,
            caches,
            dependencies: RwLock::new(DependencyGraph::new()),
            remote: None,
            refreshers: RwLock::new(HashMap::new()),
            warm_up_sources: RwLock::new(Vec::new()),
            workers: Mutex::new(None),
            write_tx,
            write_rx: Mutex::new(Some(write_rx)),
            ledger: Arc::new(WriteLedger::default()),
            running: AtomicBool::new(false),
        })
    }

    /// Attach a shared L2 tier
    pub fn with_remote(mut self, remote: Arc<dyn RemoteStore>) -> Self {
        info!(
            "Attaching remote tier (timeout {:?}, prefix `{}`)",
            self.settings.remote_timeout, self.settings.remote_key_prefix
        );
        self.remote = Some(RemoteTier::new(
            remote,
            self.settings.remote_timeout,
            self.settings.remote_key_prefix.clone(),
        ));
        self
    }

    pub fn has_remote(&self) -> bool {
        self.remote.is_some()
    }

    pub(crate) fn state(&self, cache_type: CacheType) -> &RwLock<TypeState> {
        &self.caches[cache_type as usize]
    }

    // ---------------------------------------------------------------------
    // Reads
    // ---------------------------------------------------------------------

    /// Look up a value through L1 and L2
    ///
    /// An expired L1 entry is removed and the lookup falls through to L2.
    /// L2 failures count as misses. A blob that does not decode as `T` is
    /// reported as a serialization error.
    pub async fn get<T: DeserializeOwned>(
        &self,
        cache_type: CacheType,
        key: &str,
    ) -> Result<Option<T>> {
        match self.lookup(cache_type, key).await {
            (Some(blob), _) => codec::decode(&blob).map(Some),
            (None, _) => Ok(None),
        }
    }

    /// Look up a value, invoking `loader` on a total miss and caching its result
    ///
    /// Loader errors are returned untouched. If the type is invalidated while
    /// the loader runs, the result is returned but not cached.
    pub async fn get_or_load<T, F, Fut, E>(
        &self,
        cache_type: CacheType,
        key: &str,
        loader: F,
    ) -> std::result::Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: From<CacheError>,
    {
        self.load_through(cache_type, key, TtlSpec::Default, loader)
            .await
    }

    pub(crate) async fn load_through<T, F, Fut, E>(
        &self,
        cache_type: CacheType,
        key: &str,
        ttl: TtlSpec,
        loader: F,
    ) -> std::result::Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: From<CacheError>,
    {
        let (blob, epoch) = self.lookup(cache_type, key).await;
        if let Some(blob) = blob {
            return Ok(codec::decode(&blob)?);
        }

        debug!("Loading {}:{} from origin", cache_type, key);
        let value = loader().await?;
        self.write_since(cache_type, key, &value, ttl, Some(epoch))
            .await?;
        Ok(value)
    }

    /// Raw blob lookup shared by every read path
    ///
    /// Also returns the type's epoch as seen before any L2 call.
    async fn lookup(&self, cache_type: CacheType, key: &str) -> (Option<CacheValue>, u64) {
        let started = Instant::now();
        let owned_key = key.to_string();

        let epoch = {
            let mut state = self.state(cache_type).write().await;
            let expired = state.store.peek(&owned_key).map(|entry| entry.is_expired());

            match expired {
                Some(false) => {
                    let value = state.store.get_mut(&owned_key).map(|entry| {
                        entry.mark_accessed();
                        entry.value.clone()
                    });
                    if let Some(value) = value {
                        state.record_hit(false, started.elapsed());
                        debug!("L1 hit: {}:{}", cache_type, key);
                        return (Some(value), state.epoch);
                    }
                }
                Some(true) => {
                    state.take(key);
                    state.stats.evictions_ttl += 1;
                    debug!("L1 entry expired: {}:{}", cache_type, key);
                }
                None => {}
            }
            state.epoch
        };

        if let Some(remote) = &self.remote {
            if let Some(blob) = remote.get(cache_type, key).await {
                let mut state = self.state(cache_type).write().await;
                if state.epoch == epoch {
                    let ttl = state.config.effective_default_ttl();
                    if let Err(e) = state.insert(CacheEntry::new(owned_key, blob.clone(), ttl)) {
                        warn!("Failed to repopulate L1 from L2: {}", e);
                    }
                } else {
                    debug!("{}:{} invalidated during L2 fetch, not repopulating", cache_type, key);
                }
                state.record_hit(true, started.elapsed());
                debug!("L2 hit: {}:{}", cache_type, key);
                return (Some(blob), epoch);
            }
        }

        let mut state = self.state(cache_type).write().await;
        state.record_miss(started.elapsed());
        debug!("Cache miss: {}:{}", cache_type, key);
        (None, epoch)
    }

    /// Whether a live entry is resident in L1; does not touch recency or stats
    pub async fn contains(&self, cache_type: CacheType, key: &str) -> bool {
        let state = self.state(cache_type).read().await;
        state
            .store
            .peek(&key.to_string())
            .map_or(false, |entry| !entry.is_expired())
    }

    /// Number of L1 entries of a type
    pub async fn len(&self, cache_type: CacheType) -> usize {
        self.state(cache_type).read().await.store.len()
    }

    // ---------------------------------------------------------------------
    // Writes
    // ---------------------------------------------------------------------

    /// Store a value under the type's default TTL
    pub async fn set<T: Serialize + ?Sized>(
        &self,
        cache_type: CacheType,
        key: &str,
        value: &T,
    ) -> Result<()> {
        self.write(cache_type, key, value, TtlSpec::Default).await
    }

    /// Store a value with an explicit TTL; `None` never expires
    pub async fn set_with_ttl<T: Serialize + ?Sized>(
        &self,
        cache_type: CacheType,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<()> {
        self.write(cache_type, key, value, TtlSpec::Explicit(ttl))
            .await
    }

    async fn write<T: Serialize + ?Sized>(
        &self,
        cache_type: CacheType,
        key: &str,
        value: &T,
        ttl: TtlSpec,
    ) -> Result<()> {
        self.write_since(cache_type, key, value, ttl, None)
            .await
            .map(|_| ())
    }

    async fn write_since<T: Serialize + ?Sized>(
        &self,
        cache_type: CacheType,
        key: &str,
        value: &T,
        ttl: TtlSpec,
        since: Option<u64>,
    ) -> Result<bool> {
        let codec = self.state(cache_type).read().await.codec;
        let blob = codec.encode(value)?;
        self.store_encoded_since(cache_type, key, blob, ttl, since)
            .await
    }

    /// Insert an encoded blob into L1 and propagate it per the write policy
    pub(crate) async fn store_encoded(
        &self,
        cache_type: CacheType,
        key: &str,
        blob: CacheValue,
        ttl: TtlSpec,
    ) -> Result<()> {
        self.store_encoded_since(cache_type, key, blob, ttl, None)
            .await
            .map(|_| ())
    }

    /// [`store_encoded`](Self::store_encoded), dropped if the type's epoch has moved past `since`
    ///
    /// Returns whether the blob was stored.
    pub(crate) async fn store_encoded_since(
        &self,
        cache_type: CacheType,
        key: &str,
        blob: CacheValue,
        ttl: TtlSpec,
        since: Option<u64>,
    ) -> Result<bool> {
        let mirror = self.remote.as_ref().map(|_| blob.clone());

        let (queued, strategy, ttl) = {
            let mut state = self.state(cache_type).write().await;
            if since.map_or(false, |epoch| epoch != state.epoch) {
                debug!("{}:{} invalidated while loading, not cached", cache_type, key);
                return Ok(false);
            }

            let ttl = ttl.resolve(&state.config);
            state.insert(CacheEntry::new(key.to_string(), blob, ttl))?;
            state.stats.sets += 1;

            if state.size_bytes > state.config.max_size_bytes {
                warn!(
                    "{} cache over its size budget: {} > {} bytes",
                    cache_type, state.size_bytes, state.config.max_size_bytes
                );
            }

            // Recorded under the type lock, so a later invalidation cancels it.
            let queued = match state.config.write_policy {
                WritePolicy::WriteBehind | WritePolicy::RefreshAhead if self.remote.is_some() => {
                    Some(self.ledger.record(cache_type, key).await)
                }
                _ => None,
            };

            (queued, state.config.invalidation_strategy, ttl)
        };
        debug!("Cache set: {}:{} (ttl {:?})", cache_type, key, ttl);

        if let (Some(remote), Some(value)) = (&self.remote, mirror) {
            match queued {
                Some(seq) => self.enqueue_write(PendingWrite {
                    cache_type,
                    key: key.to_string(),
                    value,
                    ttl,
                    seq,
                }),
                None => {
                    remote.set(cache_type, key, value, ttl).await;
                }
            }
        }

        if strategy == InvalidationStrategy::Cascade {
            let events = self
                .invalidate_refs(&[CacheRef::new(cache_type, key)])
                .await;
            let removed: usize = events.iter().map(|event| event.keys.len()).sum();
            if removed > 0 {
                debug!(
                    "Write to {}:{} invalidated {} dependents",
                    cache_type, key, removed
                );
            }
        }

        Ok(true)
    }

    // ---------------------------------------------------------------------
    // Invalidation
    // ---------------------------------------------------------------------

    /// Remove entries of a type and return how many were removed
    ///
    /// `pattern` is a glob over keys (`None` matches every key); a pattern
    /// that does not parse is taken as a literal key. With `cascade`, every
    /// entry registered as dependent on a matched key is removed as well,
    /// transitively.
    pub async fn invalidate(
        &self,
        cache_type: CacheType,
        pattern: Option<&str>,
        cascade: bool,
    ) -> usize {
        self.invalidate_with_events(cache_type, pattern, cascade)
            .await
            .iter()
            .map(|event| event.keys.len())
            .sum()
    }

    /// [`invalidate`](Self::invalidate), reporting what was removed and why
    ///
    /// Matched keys come back as one `Manual` event. Cascade removals are
    /// grouped per type and root as `Dependency` events. Queued L2 writes of
    /// every removed key are cancelled.
    pub async fn invalidate_with_events(
        &self,
        cache_type: CacheType,
        pattern: Option<&str>,
        cascade: bool,
    ) -> Vec<InvalidationEvent> {
        let removed = {
            let mut state = self.state(cache_type).write().await;
            state.epoch += 1;
            let keys = match pattern {
                Some(pattern) => matching_keys(state.store.as_ref(), pattern),
                None => state.store.keys(),
            };

            let removed: Vec<CacheKey> = keys
                .into_iter()
                .filter(|key| state.take(key).is_some())
                .collect();
            state.stats.invalidations += removed.len() as u64;
            removed
        };

        let mut roots = removed.clone();
        if let Some(pattern) = pattern.filter(|p| is_literal(p)) {
            if !roots.iter().any(|k| k == pattern) {
                roots.push(pattern.to_string());
            }
        }

        if let Some(remote) = &self.remote {
            self.ledger.cancel_matching(cache_type, pattern).await;
            remote.delete_many(cache_type, &roots).await;
        }

        let mut events = Vec::new();
        if !removed.is_empty() {
            events.push(
                InvalidationEvent::new(InvalidationReason::Manual, cache_type, removed)
                    .with_context(format!("pattern {}", pattern.unwrap_or("*"))),
            );
        }
        if cascade {
            let refs: Vec<CacheRef> = roots
                .into_iter()
                .map(|key| CacheRef::new(cache_type, key))
                .collect();
            events.extend(self.invalidate_refs(&refs).await);
        }

        info!(
            "Invalidated {} entries from {} cache (pattern: {}, cascade: {})",
            events.iter().map(|event| event.keys.len()).sum::<usize>(),
            cache_type,
            pattern.unwrap_or("*"),
            cascade
        );
        events
    }

    /// Remove everything reachable from `roots` in the dependency graph
    async fn invalidate_refs(&self, roots: &[CacheRef]) -> Vec<InvalidationEvent> {
        let reached = {
            let graph = self.dependencies.read().await;
            graph.cascade(roots.iter())
        };

        let mut by_type: BTreeMap<CacheType, Vec<(CacheRef, CacheKey)>> = BTreeMap::new();
        for (source, target) in reached {
            by_type
                .entry(target.cache_type)
                .or_default()
                .push((source, target.key));
        }

        let mut events = Vec::new();
        for (cache_type, targets) in by_type {
            let keys: Vec<CacheKey> = targets.iter().map(|(_, key)| key.clone()).collect();
            let mut by_source: BTreeMap<CacheRef, Vec<CacheKey>> = BTreeMap::new();
            {
                let mut state = self.state(cache_type).write().await;
                state.epoch += 1;
                for (source, key) in targets {
                    if state.take(&key).is_some() {
                        by_source.entry(source).or_default().push(key);
                    }
                }
                let removed: usize = by_source.values().map(Vec::len).sum();
                state.stats.invalidations += removed as u64;
            }
            if let Some(remote) = &self.remote {
                self.ledger.cancel(cache_type, &keys).await;
                remote.delete_many(cache_type, &keys).await;
            }

            for (source, keys) in by_source {
                debug!(
                    "Cascade from {} removed {} {} entries",
                    source,
                    keys.len(),
                    cache_type
                );
                events.push(InvalidationEvent::new(
                    InvalidationReason::Dependency { source },
                    cache_type,
                    keys,
                ));
            }
        }
        events
    }

    /// Remove one key from both tiers without cascading
    pub async fn delete(&self, cache_type: CacheType, key: &str) -> bool {
        let removed = {
            let mut state = self.state(cache_type).write().await;
            state.epoch += 1;
            let removed = state.take(key).is_some();
            if removed {
                state.stats.deletes += 1;
            }
            removed
        };
        if let Some(remote) = &self.remote {
            self.ledger.cancel(cache_type, &[key.to_string()]).await;
            remote.delete(cache_type, key).await;
        }
        removed
    }

    /// Empty one type, or every type
    pub async fn clear(&self, cache_type: Option<CacheType>) -> usize {
        let types = match cache_type {
            Some(t) => vec![t],
            None => CacheType::ALL.to_vec(),
        };

        let mut cleared = 0;
        for t in types {
            cleared += self.invalidate(t, None, false).await;
        }
        info!("Cleared {} entries", cleared);
        cleared
    }

    // ---------------------------------------------------------------------
    // Bulk operations
    // ---------------------------------------------------------------------

    /// Look up many keys; each key succeeds or fails on its own
    pub async fn bulk_get<T, I>(
        &self,
        cache_type: CacheType,
        keys: I,
    ) -> HashMap<CacheKey, Result<Option<T>>>
    where
        T: DeserializeOwned,
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let mut results = HashMap::new();
        for key in keys {
            let key = key.as_ref();
            let result = self.get::<T>(cache_type, key).await;
            results.insert(key.to_string(), result);
        }
        results
    }

    /// Store many values; each key succeeds or fails on its own
    pub async fn bulk_set<K, T, I>(
        &self,
        cache_type: CacheType,
        items: I,
    ) -> HashMap<CacheKey, Result<()>>
    where
        K: Into<CacheKey>,
        T: Serialize,
        I: IntoIterator<Item = (K, T)>,
    {
        let mut results = HashMap::new();
        for (key, value) in items {
            let key: CacheKey = key.into();
            let result = self.set(cache_type, &key, &value).await;
            if let Err(e) = &result {
                warn!("bulk_set {}:{} failed: {}", cache_type, key, e);
            }
            results.insert(key, result);
        }
        results
    }

    /// Delete many keys; maps each key to whether it was resident in L1
    pub async fn bulk_delete<I>(&self, cache_type: CacheType, keys: I) -> HashMap<CacheKey, bool>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let mut results = HashMap::new();
        for key in keys {
            let key = key.as_ref();
            let removed = self.delete(cache_type, key).await;
            results.insert(key.to_string(), removed);
        }
        results
    }

    // ---------------------------------------------------------------------
    // Dependencies
    // ---------------------------------------------------------------------

    /// Register `dependent` as derived from `main`
    pub async fn add_dependency(&self, main: CacheRef, dependent: CacheRef) -> bool {
        debug!("Dependency {} -> {}", main, dependent);
        self.dependencies.write().await.add(main, dependent)
    }

    pub async fn remove_dependency(&self, main: &CacheRef, dependent: &CacheRef) -> bool {
        self.dependencies.write().await.remove(main, dependent)
    }

    /// Everything a cascading invalidation of `main` would reach
    pub async fn dependents_of(&self, main: &CacheRef) -> Vec<CacheRef> {
        self.dependencies.read().await.transitive([main])
    }

    pub async fn clear_dependencies(&self) {
        self.dependencies.write().await.clear();
    }

    // ---------------------------------------------------------------------
    // Stats and config
    // ---------------------------------------------------------------------

    /// Snapshot of one type, or of all types plus the overall aggregate
    pub async fn get_stats(&self, cache_type: Option<CacheType>) -> StatsReport {
        let types = match cache_type {
            Some(t) => vec![t],
            None => CacheType::ALL.to_vec(),
        };

        let mut by_type = BTreeMap::new();
        for t in types {
            let state = self.state(t).read().await;
            by_type.insert(t, state.snapshot());
        }
        StatsReport::from_types(by_type)
    }

    pub async fn cache_stats(&self, cache_type: CacheType) -> CacheStats {
        self.state(cache_type).read().await.snapshot()
    }

    /// Zero the counters of one type, or of every type
    pub async fn reset_stats(&self, cache_type: Option<CacheType>) {
        let types = match cache_type {
            Some(t) => vec![t],
            None => CacheType::ALL.to_vec(),
        };
        for t in types {
            self.state(t).write().await.stats.reset();
        }
        info!("Reset cache statistics");
    }

    pub async fn get_config(&self, cache_type: CacheType) -> CacheConfig {
        self.state(cache_type).read().await.config.clone()
    }

    /// Apply a partial config update
    ///
    /// The merged config is validated before anything changes; a rejected
    /// update leaves the type untouched. Entries evicted by a smaller
    /// capacity count as capacity evictions.
    pub async fn set_config(
        &self,
        cache_type: CacheType,
        update: ConfigUpdate,
    ) -> Result<CacheConfig> {
        let mut state = self.state(cache_type).write().await;
        let config = update.apply_to(&state.config)?;

        let evicted = state.reconfigure(config.clone());
        info!(
            "Reconfigured {} cache: {} entries max, {} / {} / {} ({} evicted)",
            cache_type,
            config.max_entries,
            config.eviction_policy,
            config.write_policy,
            config.invalidation_strategy,
            evicted.len()
        );
        Ok(config)
    }

    /// [`set_config`](Self::set_config) from string fields
    pub async fn set_config_fields<'a, I>(
        &self,
        cache_type: CacheType,
        fields: I,
    ) -> Result<CacheConfig>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let update = ConfigUpdate::from_fields(fields)?;
        self.set_config(cache_type, update).await
    }

    /// Effective service configuration, current per-type configs included
    pub async fn service_config(&self) -> ServiceConfig {
        let mut config = self.settings.clone();
        for t in CacheType::ALL {
            config.types.insert(t, self.get_config(t).await);
        }
        config
    }
}
