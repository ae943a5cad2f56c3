//! Cache entry management with TTL support

use crate::cache::types::{CacheKey, CacheValue};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Fixed per-entry bookkeeping overhead added to size estimates
const ENTRY_OVERHEAD_BYTES: usize = std::mem::size_of::<CacheEntry>();

/// A cache entry with TTL and metadata
///
/// `ttl == None` means the entry never expires by time; capacity eviction
/// and invalidation still apply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// The cache key
    pub key: CacheKey,

    /// The encoded value
    pub value: CacheValue,

    /// When the entry was created
    pub created_at: DateTime<Utc>,

    /// Last access time, never earlier than `created_at`
    pub last_accessed: DateTime<Utc>,

    /// Number of times this entry has been read
    pub access_count: u64,

    /// Time-to-live measured from `created_at`
    pub ttl: Option<Duration>,

    /// Estimated size of the entry in bytes
    pub size_bytes: usize,

    /// Free-form metadata
    pub metadata: HashMap<String, String>,
}

impl CacheEntry {
    /// Create a new cache entry
    pub fn new(key: CacheKey, value: CacheValue, ttl: Option<Duration>) -> Self {
        let now = Utc::now();
        let size_bytes = key.len() + value.len() + ENTRY_OVERHEAD_BYTES;

        Self {
            key,
            value,
            created_at: now,
            last_accessed: now,
            access_count: 0,
            ttl,
            size_bytes,
            metadata: HashMap::new(),
        }
    }

    /// Attach a metadata field
    pub fn with_metadata(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        let value = value.into();
        self.size_bytes += name.len() + value.len();
        self.metadata.insert(name, value);
        self
    }

    /// When the entry expires; `None` without a TTL or past the representable range
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        let ttl = chrono::Duration::from_std(self.ttl?).ok()?;
        self.created_at.checked_add_signed(ttl)
    }

    /// Check if the entry has expired
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub(crate) fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at() {
            Some(expires_at) => now > expires_at,
            None => false,
        }
    }

    /// Get time until expiration; `None` if expired or without TTL
    pub fn time_until_expiration(&self) -> Option<Duration> {
        let expires_at = self.expires_at()?;
        let now = Utc::now();
        if now > expires_at {
            None
        } else {
            (expires_at - now).to_std().ok()
        }
    }

    /// Mark the entry as accessed (updates access time and count)
    pub fn mark_accessed(&mut self) {
        let now = Utc::now();
        self.last_accessed = now.max(self.created_at);
        self.access_count += 1;
    }

    /// Get the age of the entry
    pub fn age(&self) -> Duration {
        (Utc::now() - self.created_at)
            .to_std()
            .unwrap_or(Duration::from_secs(0))
    }

    /// Get time since last access
    pub fn time_since_access(&self) -> Duration {
        (Utc::now() - self.last_accessed)
            .to_std()
            .unwrap_or(Duration::from_secs(0))
    }
}
