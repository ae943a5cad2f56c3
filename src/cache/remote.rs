//! Shared remote (L2) tier
//!
//! The service talks to L2 through [`RemoteStore`]. Every call is bounded by
//! the service's `remote_timeout`; a failed or slow call is logged and
//! reported to the caller as a miss, never as an error.

use crate::cache::types::{CacheKey, CacheType};
use crate::error::{CacheError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Key-value client for the shared cache tier
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Fetch a value; `Ok(None)` when the key is absent
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Store a value with an optional expiry
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()>;

    /// Delete a key; returns whether it existed
    async fn delete(&self, key: &str) -> Result<bool>;
}

/// Counters kept by [`InMemoryRemote`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemoteOps {
    pub gets: u64,
    pub sets: u64,
    pub deletes: u64,
}

/// Process-local [`RemoteStore`] with failure and latency injection
///
/// Stands in for a shared cache server in tests and the demo binary.
#[derive(Default)]
pub struct InMemoryRemote {
    data: RwLock<HashMap<String, (Vec<u8>, Option<Instant>)>>,
    unavailable: AtomicBool,
    latency_ms: AtomicU64,
    gets: AtomicU64,
    sets: AtomicU64,
    deletes: AtomicU64,
}

impl InMemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an outage: every call fails while unavailable
    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }

    /// Delay every call by this much
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn ops(&self) -> RemoteOps {
        RemoteOps {
            gets: self.gets.load(Ordering::Relaxed),
            sets: self.sets.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
        }
    }

    /// Whether a live (unexpired) value is stored under the full remote key
    pub async fn contains(&self, key: &str) -> bool {
        let data = self.data.read().await;
        matches!(data.get(key), Some((_, expiry)) if !is_past(*expiry))
    }

    pub async fn len(&self) -> usize {
        let data = self.data.read().await;
        data.values().filter(|(_, expiry)| !is_past(*expiry)).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn simulate(&self) -> Result<()> {
        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CacheError::RemoteTier("connection refused".to_string()));
        }
        Ok(())
    }
}

fn is_past(expiry: Option<Instant>) -> bool {
    expiry.map_or(false, |at| Instant::now() >= at)
}

#[async_trait]
impl RemoteStore for InMemoryRemote {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.gets.fetch_add(1, Ordering::Relaxed);
        self.simulate().await?;

        {
            let data = self.data.read().await;
            match data.get(key) {
                Some((value, expiry)) if !is_past(*expiry) => return Ok(Some(value.clone())),
                None => return Ok(None),
                Some(_) => {}
            }
        }

        let mut data = self.data.write().await;
        if matches!(data.get(key), Some((_, expiry)) if is_past(*expiry)) {
            data.remove(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()> {
        self.sets.fetch_add(1, Ordering::Relaxed);
        self.simulate().await?;

        let expiry = ttl.map(|ttl| Instant::now() + ttl);
        let mut data = self.data.write().await;
        data.retain(|_, (_, expiry)| !is_past(*expiry));
        data.insert(key.to_string(), (value, expiry));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        self.deletes.fetch_add(1, Ordering::Relaxed);
        self.simulate().await?;

        let mut data = self.data.write().await;
        Ok(data.remove(key).is_some())
    }
}

/// A [`RemoteStore`] bound to the service's timeout and key namespace
#[derive(Clone)]
pub(crate) struct RemoteTier {
    store: Arc<dyn RemoteStore>,
    timeout: Duration,
    prefix: String,
}

impl RemoteTier {
    pub fn new(store: Arc<dyn RemoteStore>, timeout: Duration, prefix: impl Into<String>) -> Self {
        Self {
            store,
            timeout,
            prefix: prefix.into(),
        }
    }

    /// Remote key layout: `{prefix}:{cache_type}:{key}`
    pub fn remote_key(&self, cache_type: CacheType, key: &str) -> String {
        format!("{}:{}:{}", self.prefix, cache_type, key)
    }

    async fn bounded<T, F>(&self, op: &str, remote_key: &str, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(CacheError::RemoteTimeout {
                timeout_ms: self.timeout.as_millis() as u64,
                context: format!("{} {}", op, remote_key),
            }),
        }
    }

    /// Fetch from L2; failures degrade to a miss
    pub async fn get(&self, cache_type: CacheType, key: &str) -> Option<Vec<u8>> {
        let remote_key = self.remote_key(cache_type, key);
        match self
            .bounded("get", &remote_key, self.store.get(&remote_key))
            .await
        {
            Ok(value) => value,
            Err(e) => {
                warn!("L2 get failed, treating as miss: {}", e);
                None
            }
        }
    }

    /// Store in L2; returns whether the write landed
    pub async fn set(
        &self,
        cache_type: CacheType,
        key: &str,
        value: Vec<u8>,
        ttl: Option<Duration>,
    ) -> bool {
        let remote_key = self.remote_key(cache_type, key);
        match self
            .bounded("set", &remote_key, self.store.set(&remote_key, value, ttl))
            .await
        {
            Ok(()) => true,
            Err(e) => {
                warn!("L2 set failed: {}", e);
                false
            }
        }
    }

    /// Delete from L2; returns whether the call succeeded
    pub async fn delete(&self, cache_type: CacheType, key: &str) -> bool {
        let remote_key = self.remote_key(cache_type, key);
        match self
            .bounded("delete", &remote_key, self.store.delete(&remote_key))
            .await
        {
            Ok(_) => true,
            Err(e) => {
                warn!("L2 delete failed: {}", e);
                false
            }
        }
    }

    /// Delete many keys concurrently; returns how many calls succeeded
    pub async fn delete_many(&self, cache_type: CacheType, keys: &[CacheKey]) -> usize {
        if keys.is_empty() {
            return 0;
        }
        let results =
            futures::future::join_all(keys.iter().map(|key| self.delete(cache_type, key))).await;
        let ok = results.into_iter().filter(|ok| *ok).count();
        debug!("L2 delete of {} {} keys: {} ok", keys.len(), cache_type, ok);
        ok
    }
}
