use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use base64::Engine;

use crate::github::client::{GitHubError, Result};
use crate::github::source::RepoSource;
use crate::types::{ContentEntry, ContentResponse, FileBlob, RepoMetadata};

/// In-memory [`RepoSource`] for tests.
///
/// Repositories, directory listings and files are registered up front. Every
/// call is recorded so tests can assert how many upstream requests were made.
/// Unknown repositories and paths answer with [`GitHubError::NotFound`].
#[derive(Default)]
pub struct MockRepoSource {
    repos: Mutex<HashMap<String, RepoMetadata>>,
    contents: Mutex<HashMap<String, ContentResponse>>,
    failures: Mutex<HashMap<String, VecDeque<GitHubError>>>,
    auth_failure: Mutex<Option<GitHubError>>,
    delays: Mutex<HashMap<String, Duration>>,
    calls: Arc<Mutex<Vec<String>>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

/// Counts one contents call as in flight until dropped.
struct InFlight<'a> {
    current: &'a AtomicUsize,
}

impl<'a> InFlight<'a> {
    fn enter(current: &'a AtomicUsize, high_water: &AtomicUsize) -> Self {
        let now = current.fetch_add(1, Ordering::SeqCst) + 1;
        high_water.fetch_max(now, Ordering::SeqCst);
        Self { current }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MockRepoSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register repository metadata for `owner/repo`.
    pub fn with_repo(self, owner: &str, repo: &str) -> Self {
        self.repos.lock().unwrap().insert(
            format!("{owner}/{repo}"),
            RepoMetadata {
                name: repo.to_string(),
                owner: owner.to_string(),
                description: Some(format!("{repo} test repository")),
                stars: 42,
                forks: 7,
                language: Some("Rust".to_string()),
            },
        );
        self
    }

    pub fn with_dir(self, owner: &str, repo: &str, path: &str, entries: Vec<ContentEntry>) -> Self {
        self.contents
            .lock()
            .unwrap()
            .insert(Self::key(owner, repo, path), ContentResponse::Directory(entries));
        self
    }

    /// Register a text file; it is served base64-encoded like GitHub does.
    pub fn with_file(self, owner: &str, repo: &str, path: &str, text: &str) -> Self {
        let encoded = base64::engine::general_purpose::STANDARD.encode(text.as_bytes());
        self.contents.lock().unwrap().insert(
            Self::key(owner, repo, path),
            ContentResponse::File(FileBlob::base64(path, encoded)),
        );
        self
    }

    /// Queue an error for the next call on `owner/repo` (metadata) or
    /// `owner/repo/path` (contents). Queued errors are consumed in order.
    pub fn with_failure(self, key: &str, error: GitHubError) -> Self {
        self.failures
            .lock()
            .unwrap()
            .entry(key.to_string())
            .or_default()
            .push_back(error);
        self
    }

    /// Make credential validation fail.
    pub fn with_auth_failure(self, error: GitHubError) -> Self {
        *self.auth_failure.lock().unwrap() = Some(error);
        self
    }

    /// Delay answers for `key` (same key scheme as [`with_failure`](Self::with_failure)).
    pub fn with_delay(self, key: &str, delay: Duration) -> Self {
        self.delays.lock().unwrap().insert(key.to_string(), delay);
        self
    }

    /// Every recorded call, e.g. `validate`, `repo:o/r`, `contents:o/r/src`.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }

    /// Number of contents calls made for exactly `owner/repo/path`.
    pub fn contents_calls_for(&self, owner: &str, repo: &str, path: &str) -> usize {
        let wanted = format!("contents:{}", Self::key(owner, repo, path));
        self.calls().iter().filter(|c| **c == wanted).count()
    }

    /// Highest number of contents calls observed in flight at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn key(owner: &str, repo: &str, path: &str) -> String {
        format!("{owner}/{repo}/{path}")
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn take_failure(&self, key: &str) -> Option<GitHubError> {
        self.failures
            .lock()
            .unwrap()
            .get_mut(key)
            .and_then(|queue| queue.pop_front())
    }

    async fn pause(&self, key: &str) {
        let delay = self.delays.lock().unwrap().get(key).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait::async_trait]
impl RepoSource for MockRepoSource {
    async fn validate_credentials(&self) -> Result<()> {
        self.record("validate".to_string());
        match self.auth_failure.lock().unwrap().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn repository(&self, owner: &str, repo: &str) -> Result<RepoMetadata> {
        let key = format!("{owner}/{repo}");
        self.record(format!("repo:{key}"));
        self.pause(&key).await;
        if let Some(err) = self.take_failure(&key) {
            return Err(err);
        }
        self.repos
            .lock()
            .unwrap()
            .get(&key)
            .cloned()
            .ok_or(GitHubError::NotFound { path: key })
    }

    async fn contents(&self, owner: &str, repo: &str, path: &str) -> Result<ContentResponse> {
        let key = Self::key(owner, repo, path);
        self.record(format!("contents:{key}"));
        let _guard = InFlight::enter(&self.in_flight, &self.max_in_flight);
        self.pause(&key).await;
        if let Some(err) = self.take_failure(&key) {
            return Err(err);
        }
        self.contents
            .lock()
            .unwrap()
            .get(&key)
            .cloned()
            .ok_or(GitHubError::NotFound {
                path: path.to_string(),
            })
    }
}
