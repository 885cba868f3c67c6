mod availability;
mod error;

pub use availability::compute_availability;
pub use error::EngineError;

use std::sync::Arc;

use chrono::NaiveDate;
use chrono_tz::Tz;
use tracing::{debug, info, warn};

use crate::cache::AvailabilityCache;
use crate::catalog::RoomPolicy;
use crate::fetcher::EventFetcher;
use crate::model::*;

/// Request-level entry point: cache, upstream fetch, computation.
pub struct Engine {
    policy: Arc<RoomPolicy>,
    fetcher: Arc<dyn EventFetcher>,
    cache: AvailabilityCache,
}

impl Engine {
    pub fn new(
        policy: Arc<RoomPolicy>,
        fetcher: Arc<dyn EventFetcher>,
        cache: AvailabilityCache,
    ) -> Self {
        Self {
            policy,
            fetcher,
            cache,
        }
    }

    pub fn policy(&self) -> &RoomPolicy {
        &self.policy
    }

    pub fn tz(&self) -> Tz {
        self.policy.tz
    }

    pub fn cache(&self) -> &AvailabilityCache {
        &self.cache
    }

    /// Free intervals of every eligible room on `date`.
    ///
    /// Served from the cache while fresh. Concurrent misses on the same day may
    /// each fetch; the last one to finish wins the cache slot. Failures are not
    /// cached.
    pub async fn free_rooms(
        &self,
        date: NaiveDate,
        include_restricted: bool,
    ) -> Result<Arc<Availability>, EngineError> {
        let key = CacheKey::new(date, include_restricted);
        if let Some(hit) = self.cache.get(&key) {
            metrics::counter!(crate::observability::CACHE_HITS_TOTAL).increment(1);
            debug!("cache hit for {date} restricted={include_restricted}");
            return Ok(hit);
        }
        metrics::counter!(crate::observability::CACHE_MISSES_TOTAL).increment(1);

        let fetch_start = std::time::Instant::now();
        let occupancy = match self.fetcher.fetch_events(date).await {
            Ok(records) => records,
            Err(e) => {
                metrics::counter!(crate::observability::UPSTREAM_FAILURES_TOTAL).increment(1);
                warn!("upstream fetch for {date} failed: {e}");
                return Err(e.into());
            }
        };
        metrics::histogram!(crate::observability::UPSTREAM_FETCH_DURATION_SECONDS)
            .record(fetch_start.elapsed().as_secs_f64());
        metrics::histogram!(crate::observability::UPSTREAM_EVENTS).record(occupancy.len() as f64);

        let availability = Arc::new(compute_availability(
            date,
            &occupancy,
            &self.policy,
            include_restricted,
        ));
        info!(
            "computed availability for {date}: {} records, {} rooms, restricted={include_restricted}",
            occupancy.len(),
            availability.len()
        );

        self.cache.put(key, availability.clone());
        Ok(availability)
    }
}
