//! Memoization of async functions through the cache
//!
//! The cache key of a call is
//!
//! ```text
//! memo:{name}:{hex(sha256(canonical_json(args)))}
//! ```
//!
//! where `canonical_json` serializes the arguments through
//! `serde_json::Value`, whose maps keep keys sorted. Argument-equal inputs
//! therefore share a key regardless of map insertion order.

use crate::cache::service::{GraphCachingService, TtlSpec};
use crate::cache::types::{CacheKey, CacheType};
use crate::error::{CacheError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Derive the cache key of a memoized call
pub fn memo_key<A: Serialize + ?Sized>(name: &str, args: &A) -> Result<CacheKey> {
    let canonical = serde_json::to_string(&serde_json::to_value(args)?)?;
    let digest = Sha256::digest(canonical.as_bytes());
    Ok(format!("memo:{}:{}", name, hex::encode(digest)))
}

/// An async function whose results are cached by argument
pub struct Memoized<F> {
    service: Arc<GraphCachingService>,
    cache_type: CacheType,
    name: String,
    ttl: TtlSpec,
    func: F,
}

impl GraphCachingService {
    /// Wrap `func` so repeated calls with equal arguments hit the cache
    ///
    /// `name` identifies the function in the key; two wrappers sharing a
    /// name and cache type share results.
    pub fn memoize<F>(
        self: &Arc<Self>,
        cache_type: CacheType,
        name: impl Into<String>,
        func: F,
    ) -> Memoized<F> {
        Memoized {
            service: Arc::clone(self),
            cache_type,
            name: name.into(),
            ttl: TtlSpec::Default,
            func,
        }
    }
}

impl<F> Memoized<F> {
    /// Cache results for exactly `ttl` instead of the type's default
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = TtlSpec::Explicit(Some(ttl));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn key_for<A: Serialize + ?Sized>(&self, args: &A) -> Result<CacheKey> {
        memo_key(&self.name, args)
    }

    /// Call through the cache
    ///
    /// Errors of the wrapped function are returned untouched and nothing is
    /// cached for that call.
    pub async fn call<A, T, E, Fut>(&self, args: A) -> std::result::Result<T, E>
    where
        F: Fn(A) -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        A: Serialize,
        T: Serialize + DeserializeOwned,
        E: From<CacheError>,
    {
        let key = self.key_for(&args)?;
        self.service
            .load_through(self.cache_type, &key, self.ttl, || (self.func)(args))
            .await
    }

    /// Drop the cached result for these arguments
    pub async fn forget<A: Serialize + ?Sized>(&self, args: &A) -> Result<bool> {
        let key = self.key_for(args)?;
        Ok(self.service.delete(self.cache_type, &key).await)
    }
}
