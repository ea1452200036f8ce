//! Depth- and concurrency-bounded retrieval of repository trees and files.

use std::sync::Arc;

use base64::Engine;
use futures_util::future::{join_all, BoxFuture, FutureExt};
use tokio::sync::OnceCell;
use tracing::{debug, info, instrument};

use ro_core::cache::FetchCache;
use ro_core::clock::Clock;
use ro_core::config::GitHubSettings;
use ro_core::types::{FileNode, RepoSummary};
use ro_harness::retry::RetryPolicy;

use crate::github::client::{GitHubError, Result};
use crate::github::source::RepoSource;
use crate::types::{ContentResponse, EntryKind, FileBlob};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchSettings {
    /// Listings fetched at this depth are not expanded further.
    pub max_depth: u32,
    /// Child directories fetched together before awaiting the batch.
    pub batch_size: usize,
    pub cache_ttl: std::time::Duration,
    pub retry: RetryPolicy,
}

impl FetchSettings {
    pub fn from_config(config: &GitHubSettings) -> Self {
        Self {
            max_depth: config.max_depth,
            batch_size: config.batch_size.max(1),
            cache_ttl: config.cache_ttl(),
            retry: RetryPolicy::new(config.retry_attempts, config.retry_initial_delay()),
        }
    }
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self::from_config(&GitHubSettings::default())
    }
}

struct Inner {
    source: Arc<dyn RepoSource>,
    settings: FetchSettings,
    repos: FetchCache<Result<RepoSummary>>,
    listings: FetchCache<Result<Vec<FileNode>>>,
    files: FetchCache<Result<String>>,
    validated: OnceCell<()>,
}

/// Fetches repository summaries, directory trees and file contents.
///
/// Summaries are cached per `owner/repo` and listings per `owner/repo/path`
/// at a given depth, and decoded files per `owner/repo/path`,
/// each with single-flight deduplication and the configured TTL. Failures are
/// cached too and replayed until their entry expires.
///
/// Cloning is cheap; clones share caches and the credential check.
#[derive(Clone)]
pub struct SourceTreeFetcher {
    inner: Arc<Inner>,
}

impl SourceTreeFetcher {
    pub fn new(source: Arc<dyn RepoSource>, settings: FetchSettings, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(Inner {
                source,
                settings,
                repos: FetchCache::new(settings.cache_ttl, clock.clone()),
                listings: FetchCache::new(settings.cache_ttl, clock.clone()),
                files: FetchCache::new(settings.cache_ttl, clock),
                validated: OnceCell::new(),
            }),
        }
    }

    pub fn settings(&self) -> FetchSettings {
        self.inner.settings
    }

    /// Validate credentials once; a failure is not remembered.
    async fn ensure_credentials(&self) -> Result<()> {
        self.inner
            .validated
            .get_or_try_init(|| self.inner.source.validate_credentials())
            .await
            .map(|_| ())
    }

    /// Repository metadata plus its file tree.
    #[instrument(skip(self))]
    pub async fn fetch_repo_data(&self, owner: &str, repo: &str) -> Result<RepoSummary> {
        self.ensure_credentials().await?;

        let key = format!("{owner}/{repo}");
        let this = self.clone();
        let (owner, repo) = (owner.to_owned(), repo.to_owned());
        self.inner
            .repos
            .get_or_fetch(&key, move || async move { this.load_repo(&owner, &repo).await })
            .await
    }

    async fn load_repo(&self, owner: &str, repo: &str) -> Result<RepoSummary> {
        let source = &self.inner.source;
        let meta = self
            .inner
            .settings
            .retry
            .run("fetch_repo_data", || source.repository(owner, repo))
            .await?;
        let files = self.fetch_directory_contents(owner, repo, "", 0).await?;

        info!(owner, repo, top_level = files.len(), "repository tree fetched");
        Ok(RepoSummary {
            name: meta.name,
            owner: meta.owner,
            description: meta.description,
            stars: meta.stars,
            forks: meta.forks,
            language: meta.language,
            files,
        })
    }

    /// Listing of `path` with subdirectories expanded until `max_depth`.
    ///
    /// `depth` is the depth of `path` itself. It is part of the cache key, so
    /// a listing cut off at one depth is never served for a shallower call.
    pub fn fetch_directory_contents(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        depth: u32,
    ) -> BoxFuture<'static, Result<Vec<FileNode>>> {
        let this = self.clone();
        let key = format!("{owner}/{repo}/{path}@{depth}");
        let (owner, repo, path) = (owner.to_owned(), repo.to_owned(), path.to_owned());
        async move {
            let loader = this.clone();
            this.inner
                .listings
                .get_or_fetch(&key, move || async move {
                    loader.load_directory(&owner, &repo, &path, depth).await
                })
                .await
        }
        .boxed()
    }

    async fn load_directory(&self, owner: &str, repo: &str, path: &str, depth: u32) -> Result<Vec<FileNode>> {
        let source = &self.inner.source;
        let listing = self
            .inner
            .settings
            .retry
            .run("fetch_directory_contents", || source.contents(owner, repo, path))
            .await
            .map_err(|err| with_path_context(err, path))?;

        let entries = match listing {
            ContentResponse::Directory(entries) => entries,
            ContentResponse::File(_) => {
                return Err(GitHubError::unknown(path, "expected a directory listing, got a file"));
            }
        };

        let mut nodes: Vec<FileNode> = entries
            .into_iter()
            .map(|entry| match entry.kind {
                EntryKind::Directory => FileNode::directory(entry.name, entry.path),
                EntryKind::File => FileNode::file(entry.name, entry.path),
            })
            .collect();

        if depth >= self.inner.settings.max_depth {
            return Ok(nodes);
        }

        let dir_paths: Vec<String> = nodes
            .iter()
            .filter(|n| n.is_directory())
            .map(|n| n.path.clone())
            .collect();
        debug!(path, depth, subdirs = dir_paths.len(), "expanding directory");

        // Batches resolve as a whole; results land in directory slots in
        // listing order, skipping file entries.
        let mut slots = nodes.iter_mut().filter(|n| n.is_directory());
        for batch in dir_paths.chunks(self.inner.settings.batch_size) {
            let listings = join_all(
                batch
                    .iter()
                    .map(|child| self.fetch_directory_contents(owner, repo, child, depth + 1)),
            )
            .await;
            for (listing, slot) in listings.into_iter().zip(slots.by_ref()) {
                slot.children = Some(listing?);
            }
        }

        Ok(nodes)
    }

    /// Decoded text of a single file.
    ///
    /// Concurrent reads of the same file share one upstream call; the result
    /// is cached like listings are.
    #[instrument(skip(self))]
    pub async fn fetch_file_content(&self, path: &str, owner: &str, repo: &str) -> Result<String> {
        self.ensure_credentials().await?;

        let key = format!("{owner}/{repo}/{path}");
        let this = self.clone();
        let (owner, repo, path) = (owner.to_owned(), repo.to_owned(), path.to_owned());
        self.inner
            .files
            .get_or_fetch(&key, move || async move { this.load_file(&path, &owner, &repo).await })
            .await
    }

    async fn load_file(&self, path: &str, owner: &str, repo: &str) -> Result<String> {
        let source = &self.inner.source;
        let response = self
            .inner
            .settings
            .retry
            .run("fetch_file_content", || source.contents(owner, repo, path))
            .await
            .map_err(|err| with_path_context(err, path))?;

        match response {
            ContentResponse::Directory(_) => Err(GitHubError::NotAFile {
                path: path.to_string(),
            }),
            ContentResponse::File(blob) => decode_blob(blob, path),
        }
    }

}

fn with_path_context(err: GitHubError, path: &str) -> GitHubError {
    match err {
        GitHubError::Unknown { path: inner, message } if inner != path => GitHubError::Unknown {
            path: path.to_string(),
            message: format!("{inner}: {message}"),
        },
        other => other,
    }
}

/// Decode the contents API transport encoding.
pub(crate) fn decode_blob(blob: FileBlob, path: &str) -> Result<String> {
    if blob.kind != "file" {
        return Err(GitHubError::unknown(
            path,
            format!("invalid file data received from GitHub (type {})", blob.kind),
        ));
    }
    let Some(content) = blob.content else {
        return Err(GitHubError::unknown(path, "invalid file data received from GitHub"));
    };

    match blob.encoding.as_deref() {
        Some("base64") => {
            let compact: String = content.chars().filter(|c| !c.is_ascii_whitespace()).collect();
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(compact.as_bytes())
                .map_err(|e| GitHubError::unknown(path, format!("invalid base64 content: {e}")))?;
            Ok(String::from_utf8_lossy(&bytes).into_owned())
        }
        None | Some("utf-8") | Some("utf8") => Ok(content),
        Some(other) => Err(GitHubError::unknown(
            path,
            format!("file content unavailable (encoding: {other})"),
        )),
    }
}
