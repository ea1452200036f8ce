use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use ro_bridge::http_api::{api_router, ApiState};
use ro_bridge::orchestrator::QueryOrchestrator;
use ro_core::clock::{Clock, SystemClock};
use ro_core::config::{Config, CredentialProvider};
use ro_harness::context_cache::RepoContextCache;
use ro_harness::rate_limiter::{QuotaConfig, QuotaLimiter};
use ro_harness::shutdown::ShutdownSignal;
use ro_harness::store::{KvStore, MemoryStore, RedisStore};
use ro_integrations::github::client::GitHubClient;
use ro_integrations::github::collector::{CollectorLimits, ContextCollector};
use ro_integrations::github::fetcher::{FetchSettings, SourceTreeFetcher};
use ro_integrations::github::source::RepoSource;
use ro_integrations::types::GitHubConfig;
use ro_intelligence::fallback::FallbackClient;

/// The repo-oracle HTTP daemon.
///
/// Owns the shared API state and a [`ShutdownSignal`]; `run` serves until
/// the signal is triggered (e.g. via ctrl-c).
pub struct Daemon {
    config: Config,
    api_state: Arc<ApiState>,
    shutdown: ShutdownSignal,
}

impl Daemon {
    /// Build every collaborator from config and environment credentials.
    pub fn new(config: Config) -> Result<Self> {
        let store = build_store(&config)?;

        let token = CredentialProvider::github_token(&config).with_context(|| {
            format!("{} is not set; a GitHub token is required", config.github.token_env)
        })?;
        let github = GitHubClient::new(
            GitHubConfig::new(Some(token)).with_base_url(&config.github.api_base_url),
        )
        .context("failed to build GitHub client")?;

        let ai = FallbackClient::from_config(&config);
        Ok(Self::from_parts(config, store, Arc::new(github), ai))
    }

    /// Assemble a daemon from prebuilt collaborators.
    pub fn from_parts(
        config: Config,
        store: Arc<dyn KvStore>,
        source: Arc<dyn RepoSource>,
        ai: FallbackClient,
    ) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let fetch = FetchSettings::from_config(&config.github);
        let fetcher = SourceTreeFetcher::new(source, fetch, clock.clone());
        let collector = ContextCollector::new(
            fetcher,
            CollectorLimits::from_config(&config.context, fetch.batch_size),
            clock.clone(),
        );
        let limiter = QuotaLimiter::new(
            store.clone(),
            clock,
            QuotaConfig::new(config.rate_limit.limit, config.rate_limit.window()),
        );
        let context_cache = RepoContextCache::new(store.clone(), config.store.context_ttl());

        let orchestrator = QueryOrchestrator::new(
            Arc::new(limiter),
            Arc::new(collector),
            Arc::new(context_cache),
            Arc::new(ai),
            config.query.timeout(),
        );
        let api_state = Arc::new(ApiState::new(Arc::new(orchestrator), store.name()));

        Self {
            config,
            api_state,
            shutdown: ShutdownSignal::new(),
        }
    }

    /// Returns a handle that can be used to trigger shutdown from another task.
    pub fn shutdown_handle(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    /// Send the shutdown signal.
    pub fn shutdown(&self) {
        self.shutdown.trigger();
    }

    pub fn api_state(&self) -> &Arc<ApiState> {
        &self.api_state
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Bind `daemon.host:daemon.port` and serve until shutdown.
    pub async fn run(&self) -> Result<()> {
        let bind_addr = format!("{}:{}", self.config.daemon.host, self.config.daemon.port);
        let listener = TcpListener::bind(&bind_addr)
            .await
            .with_context(|| format!("failed to bind {bind_addr}"))?;
        self.run_with_listener(listener).await
    }

    /// Serve on a pre-bound listener until shutdown. In-flight requests are
    /// allowed to finish.
    pub async fn run_with_listener(&self, listener: TcpListener) -> Result<()> {
        let bind_addr = listener.local_addr()?;
        let router = api_router(self.api_state.clone());
        let shutdown = self.shutdown.clone();

        info!(
            %bind_addr,
            credentials = ?CredentialProvider::available(&self.config),
            "API server listening"
        );
        axum::serve(listener, router)
            .with_graceful_shutdown(async move { shutdown.wait().await })
            .await
            .map_err(|e| {
                error!(error = %e, "API server error");
                anyhow::Error::from(e)
            })?;

        info!("API server stopped");
        Ok(())
    }
}

/// Redis when a URL is configured, otherwise an in-process store.
fn build_store(config: &Config) -> Result<Arc<dyn KvStore>> {
    match CredentialProvider::redis_url(config) {
        Some(url) => {
            let store = RedisStore::new(&url)
                .context("invalid Redis URL")?
                .with_command_timeout(config.store.command_timeout());
            info!(timeout_ms = config.store.command_timeout_ms, "using Redis store");
            Ok(Arc::new(store))
        }
        None => {
            warn!(
                env = %config.store.redis_url_env,
                "no Redis URL configured; quota and repository context are process-local"
            );
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}
