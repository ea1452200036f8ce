use std::sync::Arc;
use std::time::Instant;

use ro_harness::context_cache::RepoContextCache;
use ro_harness::rate_limiter::QuotaLimiter;
use ro_integrations::github::collector::ContextCollector;

use crate::orchestrator::QueryOrchestrator;

/// Shared application state for all HTTP handlers.
pub struct ApiState {
    pub orchestrator: Arc<QueryOrchestrator>,
    /// Backend name of the key/value store, reported by `/api/status`.
    pub store_backend: String,
    pub start_time: Instant,
}

impl ApiState {
    pub fn new(orchestrator: Arc<QueryOrchestrator>, store_backend: impl Into<String>) -> Self {
        Self {
            orchestrator,
            store_backend: store_backend.into(),
            start_time: Instant::now(),
        }
    }

    pub fn limiter(&self) -> &QuotaLimiter {
        self.orchestrator.limiter()
    }

    pub fn collector(&self) -> &ContextCollector {
        self.orchestrator.collector()
    }

    pub fn context_cache(&self) -> &RepoContextCache {
        self.orchestrator.context_cache()
    }
}
