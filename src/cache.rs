use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::debug;

use crate::limits::MAX_CACHE_ENTRIES;
use crate::model::{Availability, CacheKey};

/// Default entry lifetime.
pub const DEFAULT_TTL: Duration = Duration::from_secs(4 * 60 * 60);

/// Source of "now" for expiry checks.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Settable clock for tests and simulations. Millisecond resolution.
#[derive(Debug)]
pub struct ManualClock {
    now_ms: AtomicI64,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now_ms: AtomicI64::new(start.timestamp_millis()),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.now_ms
            .fetch_add(by.as_millis() as i64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.now_ms.load(Ordering::SeqCst)).unwrap_or_default()
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    computed_at: DateTime<Utc>,
    value: Arc<Availability>,
}

/// Time-boxed memo of computed days. Expiry is lazy: checked on lookup only.
pub struct AvailabilityCache {
    entries: DashMap<CacheKey, CacheEntry>,
    ttl: chrono::Duration,
    clock: Arc<dyn Clock>,
}

impl AvailabilityCache {
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            ttl: chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX),
            clock,
        }
    }

    pub fn get(&self, key: &CacheKey) -> Option<Arc<Availability>> {
        let now = self.clock.now();
        if let Some(entry) = self.entries.get(key)
            && !self.is_expired(&entry, now)
        {
            return Some(entry.value.clone());
        }
        // Guard above is released; removal cannot deadlock on the shard.
        if self
            .entries
            .remove_if(key, |_, entry| self.is_expired(entry, now))
            .is_some()
        {
            debug!("cache entry expired: {} restricted={}", key.date, key.include_restricted);
            metrics::gauge!(crate::observability::CACHE_ENTRIES).set(self.entries.len() as f64);
        }
        None
    }

    pub fn put(&self, key: CacheKey, value: Arc<Availability>) {
        let now = self.clock.now();
        if !self.entries.contains_key(&key) && self.entries.len() >= MAX_CACHE_ENTRIES {
            self.make_room(now);
        }
        self.entries.insert(
            key,
            CacheEntry {
                computed_at: now,
                value,
            },
        );
        metrics::gauge!(crate::observability::CACHE_ENTRIES).set(self.entries.len() as f64);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn is_expired(&self, entry: &CacheEntry, now: DateTime<Utc>) -> bool {
        entry
            .computed_at
            .checked_add_signed(self.ttl)
            .is_some_and(|deadline| deadline < now)
    }

    /// Drop expired entries; if still full, evict the oldest one.
    fn make_room(&self, now: DateTime<Utc>) {
        self.entries.retain(|_, entry| !self.is_expired(entry, now));
        if self.entries.len() < MAX_CACHE_ENTRIES {
            return;
        }
        let oldest = self
            .entries
            .iter()
            .min_by_key(|e| e.value().computed_at)
            .map(|e| *e.key());
        if let Some(key) = oldest {
            self.entries.remove(&key);
            debug!("cache full, evicted {}", key.date);
        }
    }
}
