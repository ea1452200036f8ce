use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, warn};

use ro_core::clock::Clock;
use ro_core::types::{RateLimitInfo, RateLimitRecord};

use crate::store::{KvStore, StoreError};

/// Prefix of every quota key in the store.
pub const KEY_PREFIX: &str = "ratelimit:";

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaConfig {
    /// Successful requests allowed per identity per window.
    pub limit: u32,
    /// Fixed window length, measured from the first counted request.
    pub window: Duration,
}

impl QuotaConfig {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self { limit, window }
    }

    /// Allow `limit` requests per day.
    pub fn per_day(limit: u32) -> Self {
        Self::new(limit, Duration::from_secs(24 * 60 * 60))
    }
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self::per_day(20)
    }
}

// ---------------------------------------------------------------------------
// QuotaLimiter
// ---------------------------------------------------------------------------

/// Distributed fixed-window quota counter.
///
/// One [`RateLimitRecord`] per client identity lives in the [`KvStore`] under
/// `ratelimit:<identity>` and expires when its window resets.
///
/// The limiter **fails open**: if the store is unreachable or returns garbage,
/// both [`check`](Self::check) and [`increment`](Self::increment) log the error
/// and report the request as allowed. Availability of the query path wins over
/// strict quota enforcement.
///
/// `check` and `increment` are separate round trips. Two concurrent requests
/// from the same identity can both pass `check` before either increments, so a
/// window may briefly overrun its limit.
pub struct QuotaLimiter {
    store: Arc<dyn KvStore>,
    clock: Arc<dyn Clock>,
    config: QuotaConfig,
}

impl QuotaLimiter {
    pub fn new(store: Arc<dyn KvStore>, clock: Arc<dyn Clock>, config: QuotaConfig) -> Self {
        Self {
            store,
            clock,
            config,
        }
    }

    pub fn config(&self) -> QuotaConfig {
        self.config
    }

    pub fn limit(&self) -> u32 {
        self.config.limit
    }

    fn key(identity: &str) -> String {
        format!("{KEY_PREFIX}{identity}")
    }

    fn window_secs(&self) -> i64 {
        i64::try_from(self.config.window.as_secs()).unwrap_or(i64::MAX)
    }

    fn fresh_reset_at(&self) -> i64 {
        self.clock.now_epoch_secs().saturating_add(self.window_secs())
    }

    async fn load(&self, key: &str) -> Result<Option<RateLimitRecord>, StoreError> {
        match self.store.get(key).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Read-only quota view for `identity`. Never writes to the store.
    pub async fn check(&self, identity: &str) -> RateLimitInfo {
        let key = Self::key(identity);
        match self.load(&key).await {
            Ok(None) => RateLimitInfo {
                allowed: true,
                remaining: self.config.limit,
                limit: self.config.limit,
                reset_at: self.fresh_reset_at(),
            },
            Ok(Some(record)) => {
                let allowed = record.count < self.config.limit;
                if !allowed {
                    warn!(identity, count = record.count, "quota exhausted");
                }
                RateLimitInfo {
                    allowed,
                    remaining: self.config.limit.saturating_sub(record.count),
                    limit: self.config.limit,
                    reset_at: record.reset_at,
                }
            }
            Err(err) => {
                error!(identity, store = self.store.name(), error = %err, "quota check failed, allowing request");
                RateLimitInfo {
                    allowed: true,
                    remaining: self.config.limit,
                    limit: self.config.limit,
                    reset_at: self.fresh_reset_at(),
                }
            }
        }
    }

    /// Count one successful request against `identity`'s window.
    ///
    /// Unlike [`check`](Self::check), the returned `allowed` is
    /// `count <= limit`, so the request that consumes the last unit still
    /// reports `allowed: true`.
    pub async fn increment(&self, identity: &str) -> RateLimitInfo {
        match self.try_increment(identity).await {
            Ok(info) => info,
            Err(err) => {
                error!(identity, store = self.store.name(), error = %err, "quota increment failed, allowing request");
                RateLimitInfo {
                    allowed: true,
                    remaining: self.config.limit.saturating_sub(1),
                    limit: self.config.limit,
                    reset_at: self.fresh_reset_at(),
                }
            }
        }
    }

    async fn try_increment(&self, identity: &str) -> Result<RateLimitInfo, StoreError> {
        let key = Self::key(identity);
        let now = self.clock.now_epoch_secs();

        let record = match self.load(&key).await? {
            Some(existing) => RateLimitRecord {
                count: existing.count.saturating_add(1),
                reset_at: existing.reset_at,
            },
            None => RateLimitRecord {
                count: 1,
                reset_at: self.fresh_reset_at(),
            },
        };

        let ttl = record.reset_at - now;
        if ttl > 0 {
            let payload = serde_json::to_string(&record)?;
            self.store
                .set_ex(&key, &payload, Duration::from_secs(ttl.unsigned_abs()))
                .await?;
        } else {
            debug!(identity, "quota window already elapsed, not persisting");
        }

        Ok(RateLimitInfo {
            allowed: record.count <= self.config.limit,
            remaining: self.config.limit.saturating_sub(record.count),
            limit: self.config.limit,
            reset_at: record.reset_at,
        })
    }
}
