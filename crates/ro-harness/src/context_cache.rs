use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use ro_core::types::RepoContext;

use crate::store::{KvStore, Result};

/// Prefix of every precomputed-context key in the store.
pub const KEY_PREFIX: &str = "repo-context:";

/// Distributed tier of the repository cache: one precomputed
/// [`RepoContext`] blob per `owner/repo`, written with an expiry.
pub struct RepoContextCache {
    store: Arc<dyn KvStore>,
    ttl: Duration,
}

impl RepoContextCache {
    pub fn new(store: Arc<dyn KvStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    pub fn key(owner: &str, repo: &str) -> String {
        format!("{KEY_PREFIX}{owner}/{repo}")
    }

    pub async fn has(&self, owner: &str, repo: &str) -> Result<bool> {
        self.store.exists(&Self::key(owner, repo)).await
    }

    /// Fetch the blob. A value that no longer deserializes is reported as a
    /// miss so a fresh collection can replace it.
    pub async fn get(&self, owner: &str, repo: &str) -> Result<Option<RepoContext>> {
        let key = Self::key(owner, repo);
        let Some(raw) = self.store.get(&key).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(ctx) => Ok(Some(ctx)),
            Err(err) => {
                warn!(key = %key, error = %err, "discarding undecodable repo context");
                Ok(None)
            }
        }
    }

    pub async fn put(&self, owner: &str, repo: &str, ctx: &RepoContext) -> Result<()> {
        let payload = serde_json::to_string(ctx)?;
        self.store
            .set_ex(&Self::key(owner, repo), &payload, self.ttl)
            .await
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}
