use crate::github::client::Result;
use crate::types::{ContentResponse, RepoMetadata};

/// Read access to a remote repository host.
///
/// [`GitHubClient`](crate::github::client::GitHubClient) is the production
/// implementation; tests substitute in-memory fakes.
#[async_trait::async_trait]
pub trait RepoSource: Send + Sync {
    /// Confirm the configured credentials are accepted.
    async fn validate_credentials(&self) -> Result<()>;

    async fn repository(&self, owner: &str, repo: &str) -> Result<RepoMetadata>;

    /// List a directory or read a single file. `path` is relative to the
    /// repository root; the empty string is the root itself.
    async fn contents(&self, owner: &str, repo: &str, path: &str) -> Result<ContentResponse>;
}
