//! End-to-end handling of a repository question: quota gate, context
//! assembly, generation under a deadline, quota charge.

use std::sync::Arc;
use std::time::Duration;

use chrono::DateTime;
use serde::Deserialize;
use tokio::time::{timeout_at, Instant};
use tracing::{info, instrument, warn};

use ro_core::types::{ConversationMessage, RateLimitInfo};
use ro_harness::context_cache::RepoContextCache;
use ro_harness::rate_limiter::QuotaLimiter;
use ro_integrations::github::collector::ContextCollector;
use ro_intelligence::fallback::FallbackClient;
use ro_intelligence::prompt::{self, Prompt};

pub const TIMEOUT_MESSAGE: &str =
    "Request timed out. Please try with a smaller repository or specific file query.";

/// Body of `POST /api/query`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    #[serde(rename = "username")]
    pub owner: String,
    pub repo: String,
    pub query: String,
    #[serde(default)]
    pub file_path: Option<String>,
    #[serde(default)]
    pub fetch_only_current_file: bool,
    #[serde(default)]
    pub history: Vec<ConversationMessage>,
}

impl QueryRequest {
    /// Path of the single file to answer from, when the request asks for it.
    pub fn single_file(&self) -> Option<&str> {
        match &self.file_path {
            Some(path) if self.fetch_only_current_file && !path.is_empty() => Some(path),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryOutcome {
    Answered {
        response: String,
        rate_limit: RateLimitInfo,
    },
    RateLimited {
        message: String,
        rate_limit: RateLimitInfo,
    },
    TimedOut {
        message: String,
    },
    Failed {
        message: String,
    },
}

impl QueryOutcome {
    fn failed(message: impl std::fmt::Display) -> Self {
        QueryOutcome::Failed {
            message: format!("Failed to process request: {message}"),
        }
    }
}

/// Where the prompt context came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextSource {
    SingleFile,
    Stored,
    OnDemand,
    Generic,
}

pub struct QueryOrchestrator {
    limiter: Arc<QuotaLimiter>,
    collector: Arc<ContextCollector>,
    context_cache: Arc<RepoContextCache>,
    ai: Arc<FallbackClient>,
    timeout: Duration,
}

impl QueryOrchestrator {
    pub fn new(
        limiter: Arc<QuotaLimiter>,
        collector: Arc<ContextCollector>,
        context_cache: Arc<RepoContextCache>,
        ai: Arc<FallbackClient>,
        timeout: Duration,
    ) -> Self {
        Self {
            limiter,
            collector,
            context_cache,
            ai,
            timeout,
        }
    }

    pub fn limiter(&self) -> &Arc<QuotaLimiter> {
        &self.limiter
    }

    pub fn collector(&self) -> &Arc<ContextCollector> {
        &self.collector
    }

    pub fn context_cache(&self) -> &Arc<RepoContextCache> {
        &self.context_cache
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn has_secondary_provider(&self) -> bool {
        self.ai.has_secondary()
    }

    /// Handle a raw request body. The body is only decoded once the quota
    /// gate has passed.
    pub async fn handle_raw(&self, identity: &str, body: &[u8]) -> QueryOutcome {
        self.run(identity, || serde_json::from_slice::<QueryRequest>(body))
            .await
    }

    pub async fn handle(&self, identity: &str, request: QueryRequest) -> QueryOutcome {
        self.run(identity, || Ok::<_, std::convert::Infallible>(request))
            .await
    }

    #[instrument(skip(self, decode))]
    async fn run<E, F>(&self, identity: &str, decode: F) -> QueryOutcome
    where
        E: std::fmt::Display,
        F: FnOnce() -> Result<QueryRequest, E>,
    {
        let deadline = Instant::now() + self.timeout;

        let quota = self.limiter.check(identity).await;
        if !quota.allowed {
            return QueryOutcome::RateLimited {
                message: quota_message(&quota),
                rate_limit: quota,
            };
        }

        let request = match decode() {
            Ok(request) => request,
            Err(err) => return QueryOutcome::failed(err),
        };

        let (prompt, source) = match self.assemble(&request).await {
            Ok(assembled) => assembled,
            Err(outcome) => return outcome,
        };
        info!(
            repo = %format!("{}/{}", request.owner, request.repo),
            source = ?source,
            files = prompt.stats.files,
            total_chars = prompt.stats.total_chars,
            "context prepared"
        );

        match timeout_at(deadline, self.ai.generate_with_fallback(&prompt.text)).await {
            Err(_) => {
                warn!(identity, timeout_secs = self.timeout.as_secs(), "query timed out");
                QueryOutcome::TimedOut {
                    message: TIMEOUT_MESSAGE.to_string(),
                }
            }
            Ok(Err(err)) => {
                warn!(identity, error = %err, "generation failed");
                QueryOutcome::failed(err)
            }
            Ok(Ok(response)) => {
                let rate_limit = self.limiter.increment(identity).await;
                info!(identity, remaining = rate_limit.remaining, "query answered");
                QueryOutcome::Answered {
                    response,
                    rate_limit,
                }
            }
        }
    }

    async fn assemble(&self, request: &QueryRequest) -> Result<(Prompt, ContextSource), QueryOutcome> {
        let (owner, repo) = (request.owner.as_str(), request.repo.as_str());

        if let Some(path) = request.single_file() {
            let content = self
                .collector
                .fetcher()
                .fetch_file_content(path, owner, repo)
                .await
                .map_err(QueryOutcome::failed)?;
            return Ok((
                prompt::file_prompt(&request.query, path, &content),
                ContextSource::SingleFile,
            ));
        }

        let stored = match self.context_cache.has(owner, repo).await {
            Ok(true) => true,
            Ok(false) => {
                self.spawn_population(owner, repo);
                false
            }
            Err(err) => {
                warn!(owner, repo, error = %err, "context cache unavailable");
                self.spawn_population(owner, repo);
                false
            }
        };

        if stored {
            match self.context_cache.get(owner, repo).await {
                Ok(Some(ctx)) => {
                    let prompt = prompt::repo_prompt(&request.query, &request.history, &ctx.to_prompt_context());
                    return Ok((prompt, ContextSource::Stored));
                }
                Ok(None) => {}
                Err(err) => warn!(owner, repo, error = %err, "context cache read failed"),
            }
        }

        match self.collector.collect(owner, repo).await {
            Ok(ctx) => {
                let prompt = prompt::repo_prompt(&request.query, &request.history, &ctx.to_prompt_context());
                Ok((prompt, ContextSource::OnDemand))
            }
            Err(err) => {
                warn!(owner, repo, error = %err, "repository data unavailable, using generic prompt");
                Ok((
                    prompt::generic_prompt(&request.query, owner, repo),
                    ContextSource::Generic,
                ))
            }
        }
    }

    /// Fill the distributed tier in the background. Nothing awaits the task
    /// and its failure is only logged.
    fn spawn_population(&self, owner: &str, repo: &str) {
        let collector = self.collector.clone();
        let cache = self.context_cache.clone();
        let (owner, repo) = (owner.to_owned(), repo.to_owned());
        tokio::spawn(async move {
            match collector.populate(&cache, &owner, &repo, false).await {
                Ok(_) => info!(owner, repo, "background context population finished"),
                Err(err) => warn!(owner, repo, error = %err, "background context population failed"),
            }
        });
    }
}

pub fn quota_message(info: &RateLimitInfo) -> String {
    let reset = DateTime::from_timestamp(info.reset_at, 0)
        .map(|t| t.format("%H:%M:%S UTC").to_string())
        .unwrap_or_else(|| info.reset_at.to_string());
    format!(
        "Daily limit of {} AI requests reached. Resets at {reset}.",
        info.limit
    )
}
