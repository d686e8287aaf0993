use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::repository::CacheStore;
use wayfare_shared::AppResult;

/// Keyed namespaces with their default time-to-live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheNamespace {
    VendorFlightSearch,
    VendorAirports,
    Destination,
    Weather,
    ExchangeRates,
    Ugc,
    Hotels,
    Stats,
    Recommendations,
    Seasonal,
    PriceComparison,
    UserAlerts,
    UserTracking,
    HttpResponse,
    RateLimit,
}

impl CacheNamespace {
    pub fn prefix(&self) -> &'static str {
        match self {
            CacheNamespace::VendorFlightSearch => "vendor:flights",
            CacheNamespace::VendorAirports => "vendor:airports",
            CacheNamespace::Destination => "destination",
            CacheNamespace::Weather => "weather",
            CacheNamespace::ExchangeRates => "fx",
            CacheNamespace::Ugc => "ugc",
            CacheNamespace::Hotels => "hotels",
            CacheNamespace::Stats => "stats",
            CacheNamespace::Recommendations => "recommendations",
            CacheNamespace::Seasonal => "seasonal",
            CacheNamespace::PriceComparison => "prices:compare",
            CacheNamespace::UserAlerts => "alerts:user",
            CacheNamespace::UserTracking => "tracking:user",
            CacheNamespace::HttpResponse => "http_cache",
            CacheNamespace::RateLimit => "rate_limit",
        }
    }

    pub fn ttl(&self) -> Duration {
        const MINUTE: u64 = 60;
        const HOUR: u64 = 60 * MINUTE;
        let secs = match self {
            CacheNamespace::VendorFlightSearch => 15 * MINUTE,
            CacheNamespace::VendorAirports => 24 * HOUR,
            CacheNamespace::Destination => 6 * HOUR,
            CacheNamespace::Weather => 2 * HOUR,
            CacheNamespace::ExchangeRates => HOUR,
            CacheNamespace::Ugc => 30 * MINUTE,
            CacheNamespace::Hotels => 4 * HOUR,
            CacheNamespace::Stats => 5 * MINUTE,
            CacheNamespace::Recommendations => HOUR,
            CacheNamespace::Seasonal => 24 * HOUR,
            CacheNamespace::PriceComparison => 15 * MINUTE,
            CacheNamespace::UserAlerts => 10 * MINUTE,
            CacheNamespace::UserTracking => 10 * MINUTE,
            CacheNamespace::HttpResponse => 5 * MINUTE,
            CacheNamespace::RateLimit => MINUTE,
        };
        Duration::from_secs(secs)
    }

    pub fn key(&self, suffix: &str) -> String {
        format!("{}:{}", self.prefix(), suffix)
    }

    /// Recommendation keys embed the hour so entries roll over on the hour.
    pub fn hourly_key(&self, suffix: &str, now: DateTime<Utc>) -> String {
        format!("{}:{}:{}", self.prefix(), suffix, now.format("%Y%m%d%H"))
    }
}

/// Outcome of one fixed-window rate-limit hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub count: i64,
    pub limit: i64,
    pub remaining: i64,
}

/// JSON read-through/write-through over any [`CacheStore`].
#[derive(Clone)]
pub struct TypedCache {
    store: Arc<dyn CacheStore>,
}

impl TypedCache {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    /// A miss, an unreadable entry, or a cache failure all return `None`;
    /// the caller falls back to its source of truth.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.store.get(key).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!(key, error = %e, "discarding undecodable cache entry");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(key, error = %e, "cache read failed");
                None
            }
        }
    }

    pub async fn set_json<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) -> AppResult<()> {
        let raw = serde_json::to_string(value)?;
        self.store.set(key, &raw, ttl).await
    }

    /// Write, logging rather than failing; used after the source of truth is already updated.
    pub async fn put_json<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        if let Err(e) = self.set_json(key, value, ttl).await {
            warn!(key, error = %e, "cache write failed");
        }
    }

    pub async fn invalidate(&self, key: &str) {
        if let Err(e) = self.store.delete(key).await {
            warn!(key, error = %e, "cache invalidation failed");
        }
    }

    /// Fixed-window counter: the first hit in a window arms the expiry.
    /// A counter whose expiry cannot be armed is dropped, so it never
    /// outlives its window.
    pub async fn hit_rate_limit(&self, key: &str, limit: i64, window: Duration) -> AppResult<RateLimitDecision> {
        let count = self.store.increment(key).await?;
        if count == 1 {
            if let Err(first) = self.store.set_expiration(key, window).await {
                warn!(key, error = %first, "rate limit expiry failed, retrying");
                if let Err(e) = self.store.set_expiration(key, window).await {
                    if let Err(cleanup) = self.store.delete(key).await {
                        warn!(key, error = %cleanup, "could not drop unexpiring rate limit counter");
                    }
                    return Err(e);
                }
            }
        }
        Ok(RateLimitDecision {
            allowed: count <= limit,
            count,
            limit,
            remaining: (limit - count).max(0),
        })
    }
}
