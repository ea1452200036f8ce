//! End-to-end query scenarios over in-memory collaborators: quota
//! accounting, context tiers, provider fallback and the query deadline.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ro_bridge::orchestrator::{QueryOrchestrator, QueryOutcome, QueryRequest, TIMEOUT_MESSAGE};
use ro_core::clock::SystemClock;
use ro_core::types::{ConversationMessage, RepoContext};
use ro_harness::context_cache::RepoContextCache;
use ro_harness::rate_limiter::{QuotaConfig, QuotaLimiter};
use ro_harness::store::{KvStore, MemoryStore, StoreError};
use ro_integrations::github::collector::{CollectorLimits, ContextCollector};
use ro_integrations::github::fetcher::{FetchSettings, SourceTreeFetcher};
use ro_integrations::github::mock::MockRepoSource;
use ro_integrations::types::ContentEntry;
use ro_intelligence::fallback::FallbackClient;
use ro_intelligence::llm::{LlmConfig, LlmError, LlmProvider, MockProvider};

// ===========================================================================
// Helpers
// ===========================================================================

/// MemoryStore that counts reads of repository-context keys.
#[derive(Default)]
struct CountingStore {
    inner: MemoryStore,
    context_reads: AtomicUsize,
}

impl CountingStore {
    fn context_reads(&self) -> usize {
        self.context_reads.load(Ordering::SeqCst)
    }

    fn note(&self, key: &str) {
        if key.starts_with("repo-context:") {
            self.context_reads.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[async_trait::async_trait]
impl KvStore for CountingStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.note(key);
        self.inner.get(key).await
    }
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.inner.set(key, value).await
    }
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        self.inner.set_ex(key, value, ttl).await
    }
    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        self.note(key);
        self.inner.exists(key).await
    }
    fn name(&self) -> &str {
        "counting"
    }
}

struct FailingStore;

#[async_trait::async_trait]
impl KvStore for FailingStore {
    async fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
        Err(StoreError::Backend("connection refused".into()))
    }
    async fn set(&self, _key: &str, _value: &str) -> Result<(), StoreError> {
        Err(StoreError::Backend("connection refused".into()))
    }
    async fn set_ex(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<(), StoreError> {
        Err(StoreError::Backend("connection refused".into()))
    }
    async fn exists(&self, _key: &str) -> Result<bool, StoreError> {
        Err(StoreError::Backend("connection refused".into()))
    }
    fn name(&self) -> &str {
        "failing"
    }
}

fn sample_source() -> MockRepoSource {
    MockRepoSource::new()
        .with_repo("octo", "repo")
        .with_dir(
            "octo",
            "repo",
            "",
            vec![
                ContentEntry::file("README.md", "README.md"),
                ContentEntry::directory("src", "src"),
            ],
        )
        .with_dir("octo", "repo", "src", vec![ContentEntry::file("lib.rs", "src/lib.rs")])
        .with_file("octo", "repo", "README.md", "# Hello")
        .with_file("octo", "repo", "src/lib.rs", "pub fn answer() -> u32 { 42 }")
}

struct Harness {
    orchestrator: QueryOrchestrator,
    source: Arc<MockRepoSource>,
    primary: Arc<MockProvider>,
}

fn harness_with(
    source: MockRepoSource,
    store: Arc<dyn KvStore>,
    primary: MockProvider,
    secondary: Option<MockProvider>,
) -> Harness {
    let clock = Arc::new(SystemClock);
    let source = Arc::new(source);
    let primary = Arc::new(primary);
    let fetcher = SourceTreeFetcher::new(source.clone(), FetchSettings::default(), clock.clone());
    let collector = ContextCollector::new(fetcher, CollectorLimits::default(), clock.clone());
    let ai = FallbackClient::new(
        primary.clone() as Arc<dyn LlmProvider>,
        secondary.map(|s| Arc::new(s) as Arc<dyn LlmProvider>),
        LlmConfig::default(),
    );
    let orchestrator = QueryOrchestrator::new(
        Arc::new(QuotaLimiter::new(store.clone(), clock, QuotaConfig::per_day(20))),
        Arc::new(collector),
        Arc::new(RepoContextCache::new(store, Duration::from_secs(6 * 3600))),
        Arc::new(ai),
        Duration::from_secs(120),
    );
    Harness {
        orchestrator,
        source,
        primary,
    }
}

fn harness(primary: MockProvider) -> Harness {
    harness_with(sample_source(), Arc::new(MemoryStore::new()), primary, None)
}

fn repo_query(query: &str) -> QueryRequest {
    QueryRequest {
        owner: "octo".into(),
        repo: "repo".into(),
        query: query.into(),
        file_path: None,
        fetch_only_current_file: false,
        history: vec![],
    }
}

fn file_query(path: &str) -> QueryRequest {
    QueryRequest {
        file_path: Some(path.into()),
        fetch_only_current_file: true,
        ..repo_query("explain this file")
    }
}

fn last_prompt(provider: &MockProvider) -> String {
    let requests = provider.captured_requests();
    requests.last().unwrap().0.clone()
}

// ===========================================================================
// Quota
// ===========================================================================

#[tokio::test]
async fn twenty_answers_then_quota_denial() {
    let h = harness(MockProvider::new());

    for expected in (0..20u32).rev() {
        match h.orchestrator.handle("1.2.3.4", file_query("README.md")).await {
            QueryOutcome::Answered { rate_limit, .. } => {
                assert!(rate_limit.allowed);
                assert_eq!(rate_limit.remaining, expected);
            }
            other => panic!("expected an answer, got {other:?}"),
        }
    }

    match h.orchestrator.handle("1.2.3.4", file_query("README.md")).await {
        QueryOutcome::RateLimited {
            message,
            rate_limit,
        } => {
            assert!(message.starts_with("Daily limit of 20 AI requests reached. Resets at "));
            assert!(!rate_limit.allowed);
            assert_eq!(rate_limit.remaining, 0);
        }
        other => panic!("expected quota denial, got {other:?}"),
    }
    assert_eq!(h.primary.call_count(), 20);

    // Another identity is unaffected.
    assert!(matches!(
        h.orchestrator.handle("5.6.7.8", file_query("README.md")).await,
        QueryOutcome::Answered { .. }
    ));
}

#[tokio::test]
async fn denied_request_body_is_never_decoded() {
    let h = harness(MockProvider::new());
    for _ in 0..20 {
        h.orchestrator.handle("1.2.3.4", file_query("README.md")).await;
    }
    let outcome = h.orchestrator.handle_raw("1.2.3.4", b"{not json").await;
    assert!(matches!(outcome, QueryOutcome::RateLimited { .. }));

    let outcome = h.orchestrator.handle_raw("9.9.9.9", b"{not json").await;
    assert!(matches!(outcome, QueryOutcome::Failed { .. }));
}

#[tokio::test]
async fn store_outage_fails_open() {
    let h = harness_with(sample_source(), Arc::new(FailingStore), MockProvider::new(), None);

    for _ in 0..25 {
        match h.orchestrator.handle("1.2.3.4", file_query("README.md")).await {
            QueryOutcome::Answered { rate_limit, .. } => {
                assert!(rate_limit.allowed);
                assert_eq!(rate_limit.remaining, 19);
            }
            other => panic!("expected an answer, got {other:?}"),
        }
    }
}

// ===========================================================================
// Context tiers
// ===========================================================================

#[tokio::test]
async fn single_file_mode_touches_only_that_file() {
    let store = Arc::new(CountingStore::default());
    let h = harness_with(sample_source(), store.clone(), MockProvider::new(), None);

    let outcome = h.orchestrator.handle("1.2.3.4", file_query("README.md")).await;
    assert!(matches!(outcome, QueryOutcome::Answered { .. }));

    assert_eq!(h.source.count("contents:"), 1);
    assert_eq!(h.source.contents_calls_for("octo", "repo", "README.md"), 1);
    assert_eq!(h.source.count("repo:"), 0);
    assert_eq!(store.context_reads(), 0);

    let prompt = last_prompt(&h.primary);
    assert!(prompt.starts_with("USER QUERY: explain this file"));
    assert!(prompt.contains("FILE: README.md\n\n# Hello"));
}

#[tokio::test]
async fn single_file_failure_fails_request() {
    let h = harness(MockProvider::new());
    match h.orchestrator.handle("1.2.3.4", file_query("missing.md")).await {
        QueryOutcome::Failed { message } => {
            assert!(message.starts_with("Failed to process request:"));
            assert!(message.contains("missing.md"));
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert_eq!(h.primary.call_count(), 0);
}

#[tokio::test]
async fn stored_context_is_preferred() {
    let store = Arc::new(MemoryStore::new());
    let h = harness_with(sample_source(), store.clone(), MockProvider::new(), None);
    let stored = RepoContext {
        tree: "Directory structure:\n└── repo/\n    └── STORED.md".into(),
        content: "stored content".into(),
        summary: None,
        collected_at: 0,
    };
    h.orchestrator
        .context_cache()
        .put("octo", "repo", &stored)
        .await
        .unwrap();

    let mut request = repo_query("what is stored?");
    request.history = vec![
        ConversationMessage::new("user", "earlier question"),
        ConversationMessage::new("assistant", "earlier answer"),
    ];
    let outcome = h.orchestrator.handle("1.2.3.4", request).await;
    assert!(matches!(outcome, QueryOutcome::Answered { .. }));

    let prompt = last_prompt(&h.primary);
    assert!(prompt.contains("STORED.md"));
    assert!(prompt.contains("user: earlier question\nassistant: earlier answer"));
    assert_eq!(h.source.count("repo:"), 0);
}

#[tokio::test]
async fn missing_context_collects_on_demand_and_populates_in_background() {
    let h = harness(MockProvider::new());

    let outcome = h.orchestrator.handle("1.2.3.4", repo_query("overview?")).await;
    assert!(matches!(outcome, QueryOutcome::Answered { .. }));

    let prompt = last_prompt(&h.primary);
    assert!(prompt.contains("Directory structure:"));
    assert!(prompt.contains("pub fn answer()"));

    // Metadata fetched once despite the concurrent background collection.
    assert_eq!(h.source.count("repo:"), 1);

    let cache = h.orchestrator.context_cache();
    for _ in 0..100 {
        if cache.has("octo", "repo").await.unwrap() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let stored = cache.get("octo", "repo").await.unwrap().unwrap();
    assert!(stored.content.contains("FILE: src/lib.rs"));
    // The on-demand and background collections share file reads.
    assert_eq!(h.source.contents_calls_for("octo", "repo", "src/lib.rs"), 1);
}

#[tokio::test]
async fn unknown_repository_uses_generic_prompt() {
    let h = harness(MockProvider::new());
    let mut request = repo_query("anything?");
    request.repo = "missing".into();

    let outcome = h.orchestrator.handle("1.2.3.4", request).await;
    assert!(matches!(outcome, QueryOutcome::Answered { .. }));
    let prompt = last_prompt(&h.primary);
    assert!(prompt.contains("Repository: octo/missing"));
    assert!(prompt.contains("USER QUERY: anything?"));
}

// ===========================================================================
// Providers and deadline
// ===========================================================================

#[tokio::test]
async fn secondary_answers_when_primary_fails() {
    let h = harness_with(
        sample_source(),
        Arc::new(MemoryStore::new()),
        MockProvider::new().with_error(LlmError::RateLimited {
            retry_after_secs: None,
        }),
        Some(MockProvider::new().with_text("secondary says hi")),
    );

    match h.orchestrator.handle("1.2.3.4", file_query("README.md")).await {
        QueryOutcome::Answered { response, .. } => assert_eq!(response, "secondary says hi"),
        other => panic!("expected an answer, got {other:?}"),
    }
}

#[tokio::test]
async fn both_providers_failing_is_not_charged() {
    let h = harness_with(
        sample_source(),
        Arc::new(MemoryStore::new()),
        MockProvider::new().with_error(LlmError::Timeout),
        Some(MockProvider::new().with_error(LlmError::ParseError("empty".into()))),
    );

    match h.orchestrator.handle("1.2.3.4", file_query("README.md")).await {
        QueryOutcome::Failed { message } => assert_eq!(
            message,
            "Failed to process request: Both API keys failed. Primary: request timed out, Secondary: parse error: empty"
        ),
        other => panic!("expected failure, got {other:?}"),
    }
    let quota = h.orchestrator.limiter().check("1.2.3.4").await;
    assert_eq!(quota.remaining, 20);
}

#[tokio::test(start_paused = true)]
async fn slow_generation_times_out_without_charge() {
    let h = harness(MockProvider::new().with_delay(Duration::from_secs(300)));

    let started = tokio::time::Instant::now();
    match h.orchestrator.handle("1.2.3.4", file_query("README.md")).await {
        QueryOutcome::TimedOut { message } => assert_eq!(message, TIMEOUT_MESSAGE),
        other => panic!("expected timeout, got {other:?}"),
    }
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(120));
    assert!(elapsed < Duration::from_secs(300));

    let quota = h.orchestrator.limiter().check("1.2.3.4").await;
    assert_eq!(quota.remaining, 20);
}
