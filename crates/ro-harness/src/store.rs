//! Key/value store abstraction shared by the rate limiter and the
//! distributed repository-context cache.
//!
//! Production deployments talk to Redis through [`RedisStore`]. When no Redis
//! URL is configured (local development) and in tests, [`MemoryStore`] provides
//! the same semantics in-process, with expiry driven by an injected
//! [`Clock`].

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use redis::aio::ConnectionManager;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use ro_core::clock::{Clock, SystemClock};

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// Errors raised by a [`KvStore`] backend.
///
/// Callers in this workspace treat every variant as "store unavailable": the
/// rate limiter fails open and the context cache reports a miss.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backend could not be reached or rejected the command.
    #[error("store backend error: {0}")]
    Backend(String),

    /// A stored value could not be encoded or decoded.
    #[error("store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        StoreError::Backend(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Minimal string key/value surface: `GET`, `SET`, `SETEX`, `EXISTS`.
#[async_trait::async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Store `value` with an expiry of `ttl` (whole seconds, at least one).
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    async fn exists(&self, key: &str) -> Result<bool>;

    /// Short backend name for logs.
    fn name(&self) -> &str;
}

fn ttl_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

// ---------------------------------------------------------------------------
// Redis
// ---------------------------------------------------------------------------

/// Default upper bound on one Redis round trip.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(2);

/// Redis-backed store.
///
/// The connection is opened lazily on first use and then shared through a
/// [`ConnectionManager`], which reconnects on its own after transient
/// failures. An unreachable server therefore surfaces as a [`StoreError`] on
/// each call instead of failing startup.
///
/// Every call, including the first connect, is bounded by the command
/// timeout. A server that accepts connections but never replies yields
/// [`StoreError::Backend`] once the timeout elapses.
pub struct RedisStore {
    client: redis::Client,
    conn: OnceCell<ConnectionManager>,
    command_timeout: Duration,
}

impl RedisStore {
    /// Validate `url` and build a store. No connection is opened yet.
    pub fn new(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)?;
        Ok(Self {
            client,
            conn: OnceCell::new(),
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
        })
    }

    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    pub fn command_timeout(&self) -> Duration {
        self.command_timeout
    }

    async fn connection(&self) -> Result<ConnectionManager> {
        let manager = self
            .conn
            .get_or_try_init(|| async {
                let manager = ConnectionManager::new(self.client.clone()).await?;
                info!("connected to redis");
                Ok::<_, StoreError>(manager)
            })
            .await?;
        Ok(manager.clone())
    }

    /// Run one command against the shared connection within the timeout.
    async fn query<T: redis::FromRedisValue + Send>(&self, cmd: redis::Cmd) -> Result<T> {
        let round_trip = async {
            let mut conn = self.connection().await?;
            let value: T = cmd.query_async(&mut conn).await?;
            Ok::<_, StoreError>(value)
        };
        match tokio::time::timeout(self.command_timeout, round_trip).await {
            Ok(result) => result,
            Err(_elapsed) => {
                debug!(timeout_ms = self.command_timeout.as_millis() as u64, "redis command timed out");
                Err(StoreError::Backend(format!(
                    "redis did not respond within {:?}",
                    self.command_timeout
                )))
            }
        }
    }
}

#[async_trait::async_trait]
impl KvStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut cmd = redis::cmd("GET");
        cmd.arg(key);
        self.query(cmd).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        self.query(cmd).await
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut cmd = redis::cmd("SETEX");
        cmd.arg(key).arg(ttl_secs(ttl)).arg(value);
        self.query(cmd).await
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let mut cmd = redis::cmd("EXISTS");
        cmd.arg(key);
        let count: i64 = self.query(cmd).await?;
        Ok(count > 0)
    }

    fn name(&self) -> &str {
        "redis"
    }
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct StoredValue {
    value: String,
    expires_at: Option<DateTime<Utc>>,
}

/// Process-local store with lazy expiry.
pub struct MemoryStore {
    entries: DashMap<String, StoredValue>,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
        }
    }

    fn live(&self, key: &str) -> Option<String> {
        let now = self.clock.now();
        let expired = match self.entries.get(key) {
            None => return None,
            Some(entry) => match entry.expires_at {
                Some(at) if at <= now => true,
                _ => return Some(entry.value.clone()),
            },
        };
        if expired {
            debug!(key, "memory store entry expired");
            self.entries.remove(key);
        }
        None
    }

    /// Remaining time to live of `key`, if it exists and has an expiry.
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = self.clock.now();
        self.entries
            .get(key)
            .and_then(|entry| entry.expires_at)
            .and_then(|at| (at - now).to_std().ok())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.live(key))
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries.insert(
            key.to_owned(),
            StoredValue {
                value: value.to_owned(),
                expires_at: None,
            },
        );
        Ok(())
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let secs = i64::try_from(ttl_secs(ttl)).unwrap_or(i64::MAX);
        let expires_at = self.clock.now() + chrono::Duration::seconds(secs);
        self.entries.insert(
            key.to_owned(),
            StoredValue {
                value: value.to_owned(),
                expires_at: Some(expires_at),
            },
        );
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.live(key).is_some())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
