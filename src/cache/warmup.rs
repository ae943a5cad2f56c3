//! Eager population of L1 from bulk origin loaders
//!
//! Warm-up is meant for process start: it awaits every source in turn and
//! returns only when all are done. A failing source is logged and reported;
//! it never stops the others.

use crate::cache::codec::Codec;
use crate::cache::service::{GraphCachingService, TtlSpec};
use crate::cache::types::{CacheKey, CacheType, CacheValue};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

type Encoded = anyhow::Result<Vec<(CacheKey, CacheValue)>>;

type LoadFn = dyn Fn(Codec) -> BoxFuture<'static, Encoded> + Send + Sync;

/// A named bulk loader for one cache type
#[derive(Clone)]
pub struct WarmUpSource {
    pub cache_type: CacheType,
    pub name: String,
    load: Arc<LoadFn>,
}

impl fmt::Debug for WarmUpSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WarmUpSource")
            .field("cache_type", &self.cache_type)
            .field("name", &self.name)
            .finish()
    }
}

impl WarmUpSource {
    /// Wrap a loader returning `(key, value)` pairs
    pub fn new<T, F, Fut>(cache_type: CacheType, name: impl Into<String>, load: F) -> Self
    where
        T: Serialize + Send + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Vec<(CacheKey, T)>>> + Send + 'static,
    {
        Self {
            cache_type,
            name: name.into(),
            load: Arc::new(
                move |codec: Codec| -> BoxFuture<'static, Encoded> {
                    let pending = load();
                    Box::pin(async move {
                        let items = pending.await?;
                        let mut encoded = Vec::with_capacity(items.len());
                        for (key, value) in items {
                            encoded.push((key, codec.encode(&value)?));
                        }
                        Ok::<_, anyhow::Error>(encoded)
                    })
                },
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarmUpFailure {
    pub source: String,
    pub cache_type: CacheType,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WarmUpReport {
    /// Entries written per type
    pub loaded: BTreeMap<CacheType, usize>,
    pub failures: Vec<WarmUpFailure>,
    pub duration: Duration,
}

impl WarmUpReport {
    pub fn total_loaded(&self) -> usize {
        self.loaded.values().sum()
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

impl GraphCachingService {
    /// Populate L1 from the given sources
    pub async fn warm_up(&self, sources: &[WarmUpSource]) -> WarmUpReport {
        let started = Instant::now();
        let mut report = WarmUpReport::default();

        info!("Warming cache from {} sources", sources.len());

        for source in sources {
            let codec = self.state(source.cache_type).read().await.codec;

            let items = match (source.load)(codec).await {
                Ok(items) => items,
                Err(e) => {
                    warn!("Warm-up source `{}` failed: {:#}", source.name, e);
                    report.failures.push(WarmUpFailure {
                        source: source.name.clone(),
                        cache_type: source.cache_type,
                        error: format!("{:#}", e),
                    });
                    continue;
                }
            };

            let mut loaded = 0;
            for (key, blob) in items {
                match self
                    .store_encoded(source.cache_type, &key, blob, TtlSpec::Default)
                    .await
                {
                    Ok(()) => loaded += 1,
                    Err(e) => {
                        warn!("Warm-up of {}:{} failed: {}", source.cache_type, key, e);
                        report.failures.push(WarmUpFailure {
                            source: source.name.clone(),
                            cache_type: source.cache_type,
                            error: format!("{}: {}", key, e),
                        });
                    }
                }
            }

            *report.loaded.entry(source.cache_type).or_default() += loaded;
            info!(
                "Warm-up source `{}` loaded {} {} entries",
                source.name, loaded, source.cache_type
            );
        }

        report.duration = started.elapsed();
        info!(
            "Warm-up finished: {} entries, {} failures in {:?}",
            report.total_loaded(),
            report.failures.len(),
            report.duration
        );
        report
    }

    /// Keep a source for [`warm_up_registered`](Self::warm_up_registered)
    pub async fn register_warm_up_source(&self, source: WarmUpSource) {
        self.warm_up_sources.write().await.push(source);
    }

    /// Run every registered source
    pub async fn warm_up_registered(&self) -> WarmUpReport {
        let sources = self.warm_up_sources.read().await.clone();
        self.warm_up(&sources).await
    }
}
