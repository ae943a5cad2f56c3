//! Background maintenance
//!
//! Two supervised tasks run between [`GraphCachingService::start`] and
//! [`GraphCachingService::stop`]:
//!
//! - the maintenance loop reaps expired entries, enforces the advisory size
//!   budget and refreshes entries of `refresh_ahead` types close to expiry;
//! - the write-behind flusher drains queued L2 writes in batches.
//!
//! The maintenance loop holds only a `Weak` reference, so dropping the last
//! `Arc` to the service ends it. Shutdown is signalled through a watch
//! channel; `stop` waits for both tasks and flushes every queued write.
//!
//! Queued writes are tracked in a write ledger. Deleting or invalidating a
//! key cancels its queued write, so a flush never puts back a value that was
//! removed after it was queued.

use crate::cache::codec::Codec;
use crate::cache::config::{WriteBehindConfig, WritePolicy};
use crate::cache::invalidation::{InvalidationEvent, InvalidationReason};
use crate::cache::remote::RemoteTier;
use crate::cache::service::{GraphCachingService, TtlSpec};
use crate::cache::types::{CacheKey, CacheType, CacheValue};
use futures::future::BoxFuture;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// An L2 write deferred by the write-behind policy
#[derive(Debug, Clone)]
pub(crate) struct PendingWrite {
    pub cache_type: CacheType,
    pub key: CacheKey,
    pub value: CacheValue,
    pub ttl: Option<Duration>,
    /// Ledger sequence assigned when the write was queued
    pub seq: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Queued(u64),
    /// Deleted after the write was queued; the value must not stay in L2
    Cancelled(u64),
}

/// Latest queued-write sequence per key
///
/// A queued write lands only while its sequence is still the one recorded
/// for its key; a newer write supersedes it. Deleting a key cancels its
/// slot: a write not yet sent is dropped, and one already in flight is
/// followed by an L2 delete. The ledger is never locked across an L2 call.
#[derive(Default)]
pub(crate) struct WriteLedger {
    next: AtomicU64,
    slots: Mutex<HashMap<(CacheType, CacheKey), Slot>>,
}

impl WriteLedger {
    /// Record a new queued write for `key` and return its sequence
    pub async fn record(&self, cache_type: CacheType, key: &str) -> u64 {
        let seq = self.next.fetch_add(1, Ordering::Relaxed) + 1;
        self.slots
            .lock()
            .await
            .insert((cache_type, key.to_string()), Slot::Queued(seq));
        seq
    }

    /// Cancel queued writes of the given keys
    pub async fn cancel(&self, cache_type: CacheType, keys: &[CacheKey]) -> usize {
        let mut slots = self.slots.lock().await;
        let mut count = 0;
        for key in keys {
            if let Some(slot) = slots.get_mut(&(cache_type, key.clone())) {
                count += usize::from(slot.cancel());
            }
        }
        cancelled(cache_type, count)
    }

    /// Cancel queued writes whose key matches a glob; `None` cancels the whole type
    pub async fn cancel_matching(&self, cache_type: CacheType, pattern: Option<&str>) -> usize {
        let glob = pattern.and_then(|p| glob::Pattern::new(p).ok());
        let mut slots = self.slots.lock().await;
        let mut count = 0;
        for ((t, key), slot) in slots.iter_mut() {
            let matched = match (pattern, &glob) {
                (None, _) => true,
                (Some(_), Some(glob)) => glob.matches(key),
                (Some(literal), None) => key == literal,
            };
            if *t == cache_type && matched {
                count += usize::from(slot.cancel());
            }
        }
        cancelled(cache_type, count)
    }

    /// Keep the writes of a batch that are still current
    async fn current(&self, writes: Vec<PendingWrite>) -> Vec<PendingWrite> {
        let mut slots = self.slots.lock().await;
        writes
            .into_iter()
            .filter(|write| {
                let slot_key = (write.cache_type, write.key.clone());
                match slots.get(&slot_key).copied() {
                    Some(Slot::Queued(seq)) => seq == write.seq,
                    Some(Slot::Cancelled(seq)) if seq == write.seq => {
                        slots.remove(&slot_key);
                        false
                    }
                    _ => false,
                }
            })
            .collect()
    }

    /// Release a sent write's slot; true if it was cancelled while in flight
    async fn settle(&self, cache_type: CacheType, key: &str, seq: u64) -> bool {
        let mut slots = self.slots.lock().await;
        let slot_key = (cache_type, key.to_string());
        match slots.get(&slot_key).copied() {
            Some(Slot::Queued(s)) if s == seq => {
                slots.remove(&slot_key);
                false
            }
            Some(Slot::Cancelled(s)) if s == seq => {
                slots.remove(&slot_key);
                true
            }
            _ => false,
        }
    }

    /// Send the still-current writes of a batch to L2; returns how many landed
    pub async fn land(&self, remote: &RemoteTier, writes: Vec<PendingWrite>) -> usize {
        let total = writes.len();
        let current = self.current(writes).await;
        if current.len() < total {
            debug!("Skipped {} superseded or cancelled writes", total - current.len());
        }

        futures::future::join_all(current.into_iter().map(|write| async move {
            let PendingWrite {
                cache_type,
                key,
                value,
                ttl,
                seq,
            } = write;
            let landed = remote.set(cache_type, &key, value, ttl).await;
            if self.settle(cache_type, &key, seq).await {
                debug!("{}:{} deleted while its write was in flight", cache_type, key);
                remote.delete(cache_type, &key).await;
                return false;
            }
            landed
        }))
        .await
        .into_iter()
        .filter(|ok| *ok)
        .count()
    }
}

impl Slot {
    /// Returns whether a queued write was cancelled
    fn cancel(&mut self) -> bool {
        match *self {
            Slot::Queued(seq) => {
                *self = Slot::Cancelled(seq);
                true
            }
            Slot::Cancelled(_) => false,
        }
    }
}

fn cancelled(cache_type: CacheType, count: usize) -> usize {
    if count > 0 {
        debug!("Cancelled {} queued {} writes", count, cache_type);
    }
    count
}

type RefreshFn =
    dyn Fn(CacheKey, Codec) -> BoxFuture<'static, anyhow::Result<Option<CacheValue>>> + Send + Sync;

/// Re-fetches a value from the origin for refresh-ahead
///
/// Returning `Ok(None)` means the value no longer exists; the key is then
/// invalidated. Errors are logged and the current entry is left alone.
#[derive(Clone)]
pub struct Refresher {
    fetch: Arc<RefreshFn>,
}

impl Refresher {
    pub fn new<T, F, Fut>(fetch: F) -> Self
    where
        T: Serialize + Send + 'static,
        F: Fn(CacheKey) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Option<T>>> + Send + 'static,
    {
        Self {
            fetch: Arc::new(
                move |key: CacheKey,
                      codec: Codec|
                      -> BoxFuture<'static, anyhow::Result<Option<CacheValue>>> {
                    let pending = fetch(key);
                    Box::pin(async move {
                        let encoded = match pending.await? {
                            Some(value) => Some(codec.encode(&value)?),
                            None => None,
                        };
                        Ok::<_, anyhow::Error>(encoded)
                    })
                },
            ),
        }
    }

    async fn fetch(&self, key: CacheKey, codec: Codec) -> anyhow::Result<Option<CacheValue>> {
        (self.fetch)(key, codec).await
    }
}

/// Handles of the running background tasks
pub(crate) struct Workers {
    shutdown: watch::Sender<bool>,
    maintenance: JoinHandle<()>,
    flusher: Option<JoinHandle<mpsc::UnboundedReceiver<PendingWrite>>>,
}

impl GraphCachingService {
    /// Spawn the maintenance loop and, with a remote tier, the write-behind flusher
    ///
    /// Returns `false` if the workers were already running.
    pub async fn start(self: &Arc<Self>) -> bool {
        let mut workers = self.workers.lock().await;
        if workers.is_some() {
            warn!("Cache workers already running");
            return false;
        }

        let (shutdown, shutdown_rx) = watch::channel(false);

        let maintenance = tokio::spawn(maintenance_task(
            Arc::downgrade(self),
            self.settings.cleanup_interval,
            shutdown_rx.clone(),
        ));

        let mut flusher = None;
        if let Some(remote) = self.remote.clone() {
            if let Some(queue) = self.write_rx.lock().await.take() {
                flusher = Some(tokio::spawn(write_behind_task(
                    remote,
                    self.ledger.clone(),
                    queue,
                    self.settings.write_behind.clone(),
                    shutdown_rx,
                )));
            }
        }

        self.running.store(true, Ordering::SeqCst);
        *workers = Some(Workers {
            shutdown,
            maintenance,
            flusher,
        });

        info!(
            "Cache workers started (cleanup every {:?}, write-behind {})",
            self.settings.cleanup_interval,
            if self.remote.is_some() { "on" } else { "off" }
        );
        true
    }

    /// Signal shutdown and wait for the workers; queued writes are flushed first
    pub async fn stop(&self) {
        let Some(workers) = self.workers.lock().await.take() else {
            return;
        };

        self.running.store(false, Ordering::SeqCst);
        let _ = workers.shutdown.send(true);

        if let Err(e) = workers.maintenance.await {
            error!("Maintenance task ended abnormally: {}", e);
        }
        if let Some(flusher) = workers.flusher {
            match flusher.await {
                Ok(queue) => *self.write_rx.lock().await = Some(queue),
                Err(e) => error!("Write-behind task ended abnormally: {}", e),
            }
        }

        info!("Cache workers stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Register the origin fetch used to refresh entries of a type
    pub async fn set_refresher(&self, cache_type: CacheType, refresher: Refresher) {
        self.refreshers.write().await.insert(cache_type, refresher);
        debug!("Refresher registered for {}", cache_type);
    }

    /// Hand a recorded write to the flusher, or to a detached task when it is not running
    pub(crate) fn enqueue_write(&self, write: PendingWrite) {
        if self.is_running() {
            match self.write_tx.send(write) {
                Ok(()) => return,
                Err(mpsc::error::SendError(write)) => self.spawn_write(write),
            }
        } else {
            self.spawn_write(write);
        }
    }

    fn spawn_write(&self, write: PendingWrite) {
        let Some(remote) = self.remote.clone() else {
            return;
        };
        let ledger = self.ledger.clone();
        tokio::spawn(async move {
            ledger.land(&remote, vec![write]).await;
        });
    }

    /// One maintenance pass: expiry, size budget, refresh-ahead
    pub async fn run_maintenance(&self) -> Vec<InvalidationEvent> {
        let mut events = self.cleanup_expired().await;
        events.extend(self.enforce_size_budget().await);
        let refreshed = self.refresh_ahead().await;
        if refreshed > 0 {
            debug!("Refreshed {} entries ahead of expiry", refreshed);
        }
        events
    }

    /// Remove every expired L1 entry
    pub async fn cleanup_expired(&self) -> Vec<InvalidationEvent> {
        let mut events = Vec::new();

        for cache_type in CacheType::ALL {
            let mut state = self.state(cache_type).write().await;
            let expired: Vec<CacheKey> = state
                .store
                .iter()
                .filter(|(_, entry)| entry.is_expired())
                .map(|(key, _)| key.clone())
                .collect();

            if expired.is_empty() {
                continue;
            }

            for key in &expired {
                state.take(key);
            }
            state.stats.evictions_ttl += expired.len() as u64;

            debug!("Cleaned up {} expired {} entries", expired.len(), cache_type);
            events.push(
                InvalidationEvent::new(InvalidationReason::Expired, cache_type, expired.clone())
                    .with_context(format!("Cleaned up {} expired entries", expired.len())),
            );
        }

        events
    }

    /// Evict policy victims while a type's size estimate exceeds its budget
    pub async fn enforce_size_budget(&self) -> Vec<InvalidationEvent> {
        let mut events = Vec::new();

        for cache_type in CacheType::ALL {
            let mut state = self.state(cache_type).write().await;
            let budget = state.config.max_size_bytes;
            if state.size_bytes <= budget {
                continue;
            }

            let before = state.size_bytes;
            let mut evicted = Vec::new();
            while state.size_bytes > budget {
                match state.pop_victim() {
                    Some(entry) => evicted.push(entry.key),
                    None => break,
                }
            }
            state.stats.evictions_capacity += evicted.len() as u64;

            warn!(
                "{} cache was {} bytes over budget; evicted {} entries",
                cache_type,
                before - budget,
                evicted.len()
            );
            events.push(InvalidationEvent::new(
                InvalidationReason::SizeLimit,
                cache_type,
                evicted,
            ));
        }

        events
    }

    /// Re-fetch entries of `refresh_ahead` types whose remaining TTL is inside the refresh window
    ///
    /// Returns how many entries were rewritten.
    pub async fn refresh_ahead(&self) -> usize {
        let refreshers = self.refreshers.read().await.clone();
        let mut refreshed = 0;

        for (cache_type, refresher) in refreshers {
            let (codec, due) = {
                let state = self.state(cache_type).read().await;
                if state.config.write_policy != WritePolicy::RefreshAhead {
                    continue;
                }
                let window = state.config.refresh_interval;
                let due: Vec<(CacheKey, Option<Duration>)> = state
                    .store
                    .iter()
                    .filter(|(_, entry)| {
                        matches!(entry.time_until_expiration(), Some(left) if left < window)
                    })
                    .map(|(key, entry)| (key.clone(), entry.ttl))
                    .collect();
                (state.codec, due)
            };

            for (key, ttl) in due {
                let epoch = self.state(cache_type).read().await.epoch;
                match refresher.fetch(key.clone(), codec).await {
                    Ok(Some(blob)) => {
                        let ttl = TtlSpec::Explicit(ttl);
                        match self
                            .store_encoded_since(cache_type, &key, blob, ttl, Some(epoch))
                            .await
                        {
                            Ok(true) => refreshed += 1,
                            Ok(false) => {
                                debug!("{}:{} invalidated during refresh", cache_type, key)
                            }
                            Err(e) => warn!("Refresh of {}:{} failed: {}", cache_type, key, e),
                        }
                    }
                    Ok(None) => {
                        debug!(
                            "{}:{} gone at origin ({})",
                            cache_type,
                            key,
                            InvalidationReason::SourceRemoved
                        );
                        self.delete(cache_type, &key).await;
                    }
                    Err(e) => warn!("Refresh of {}:{} failed: {}", cache_type, key, e),
                }
            }
        }

        refreshed
    }
}

async fn maintenance_task(
    service: Weak<GraphCachingService>,
    period: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    debug!("Maintenance task shutting down");
                    break;
                }
            }

            _ = ticker.tick() => {
                let Some(service) = service.upgrade() else {
                    debug!("Cache dropped, maintenance task exiting");
                    break;
                };
                let events = service.run_maintenance().await;
                if !events.is_empty() {
                    debug!("Maintenance: {} events", events.len());
                }
            }
        }
    }
}

async fn write_behind_task(
    remote: RemoteTier,
    ledger: Arc<WriteLedger>,
    mut queue: mpsc::UnboundedReceiver<PendingWrite>,
    settings: WriteBehindConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) -> mpsc::UnboundedReceiver<PendingWrite> {
    let mut ticker = interval(settings.flush_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut batch = Vec::with_capacity(settings.batch_size);

    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }

            write = queue.recv() => match write {
                Some(write) => {
                    batch.push(write);
                    if batch.len() >= settings.batch_size {
                        flush(&remote, &ledger, &mut batch).await;
                    }
                }
                None => break,
            },

            _ = ticker.tick() => {
                if !batch.is_empty() {
                    flush(&remote, &ledger, &mut batch).await;
                }
            }
        }
    }

    while let Ok(write) = queue.try_recv() {
        batch.push(write);
    }
    flush(&remote, &ledger, &mut batch).await;
    debug!("Write-behind task drained");

    queue
}

async fn flush(remote: &RemoteTier, ledger: &WriteLedger, batch: &mut Vec<PendingWrite>) {
    if batch.is_empty() {
        return;
    }

    let writes = std::mem::take(batch);
    let total = writes.len();
    let landed = ledger.land(remote, writes).await;

    debug!("Flushed {}/{} write-behind entries", landed, total);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::remote::{InMemoryRemote, RemoteStore};

    fn tier(remote: Arc<InMemoryRemote>) -> RemoteTier {
        RemoteTier::new(remote, Duration::from_millis(500), "t")
    }

    fn write(key: &str, value: &[u8], seq: u64) -> PendingWrite {
        PendingWrite {
            cache_type: CacheType::Queries,
            key: key.to_string(),
            value: value.to_vec(),
            ttl: None,
            seq,
        }
    }

    #[tokio::test]
    async fn test_cancelled_write_is_dropped() {
        let remote = Arc::new(InMemoryRemote::new());
        let ledger = WriteLedger::default();

        let seq = ledger.record(CacheType::Queries, "q").await;
        assert_eq!(ledger.cancel(CacheType::Queries, &["q".to_string()]).await, 1);

        assert_eq!(ledger.land(&tier(remote.clone()), vec![write("q", b"v", seq)]).await, 0);
        assert!(!remote.contains("t:queries:q").await);
        assert!(ledger.slots.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_superseded_write_is_skipped() {
        let remote = Arc::new(InMemoryRemote::new());
        let ledger = WriteLedger::default();

        let old = ledger.record(CacheType::Queries, "q").await;
        let new = ledger.record(CacheType::Queries, "q").await;
        let batch = vec![write("q", b"old", old), write("q", b"new", new)];

        assert_eq!(ledger.land(&tier(remote.clone()), batch).await, 1);
        assert_eq!(remote.get("t:queries:q").await.unwrap(), Some(b"new".to_vec()));
        assert_eq!(remote.ops().sets, 1);
    }

    #[tokio::test]
    async fn test_cancel_matching_scopes_to_type() {
        let ledger = WriteLedger::default();
        for key in ["user:1", "user:2", "team:1"] {
            ledger.record(CacheType::Nodes, key).await;
        }
        ledger.record(CacheType::Layouts, "user:1").await;

        assert_eq!(ledger.cancel_matching(CacheType::Nodes, Some("user:*")).await, 2);
        assert_eq!(ledger.cancel_matching(CacheType::Nodes, None).await, 1);
        assert_eq!(ledger.cancel_matching(CacheType::Layouts, Some("user:1")).await, 1);
    }

    #[tokio::test]
    async fn test_write_cancelled_in_flight_is_undone() {
        let remote = Arc::new(InMemoryRemote::new());
        remote.set_latency(Duration::from_millis(50));
        let ledger = Arc::new(WriteLedger::default());

        let seq = ledger.record(CacheType::Queries, "q").await;
        let flushing = {
            let ledger = ledger.clone();
            let tier = tier(remote.clone());
            tokio::spawn(async move { ledger.land(&tier, vec![write("q", b"v", seq)]).await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        ledger.cancel(CacheType::Queries, &["q".to_string()]).await;

        assert_eq!(flushing.await.unwrap(), 0);
        assert!(!remote.contains("t:queries:q").await);
        assert_eq!(remote.ops().deletes, 1);
    }
}
