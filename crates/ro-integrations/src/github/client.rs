use octocrab::Octocrab;
use reqwest::header::{ACCEPT, USER_AGENT};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use ro_harness::retry::Retryable;

use crate::github::source::RepoSource;
use crate::types::{ContentEntry, ContentResponse, EntryKind, FileBlob, GitHubConfig, RepoMetadata};

/// Closed set of upstream failures.
///
/// Every GitHub failure is classified into one of these variants at the
/// client boundary, so callers branch on the variant and never on message
/// text. Payloads are plain strings so the error can be cloned out of shared
/// single-flight futures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GitHubError {
    #[error("Repository or path not found: {path}. Please check the username, repository name and path.")]
    NotFound { path: String },

    #[error("GitHub API authentication failed: {message}. Please check your GitHub token.")]
    Auth { message: String },

    #[error("GitHub API rate limit exceeded: {message}. Please try again later.")]
    RateLimited { message: String },

    #[error("Requested path is a directory, not a file: {path}")]
    NotAFile { path: String },

    #[error("Failed to fetch {path}: {message}")]
    Unknown { path: String, message: String },

    #[error("missing GitHub token; set GITHUB_TOKEN or pass it in GitHubConfig")]
    MissingToken,
}

impl GitHubError {
    pub fn unknown(path: impl Into<String>, message: impl Into<String>) -> Self {
        GitHubError::Unknown {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl Retryable for GitHubError {
    fn is_retryable(&self) -> bool {
        matches!(self, GitHubError::RateLimited { .. })
    }
}

pub type Result<T> = std::result::Result<T, GitHubError>;

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

fn looks_like_html(body: &str) -> bool {
    let head: String = body.trim_start().chars().take(15).collect::<String>().to_ascii_lowercase();
    head.starts_with("<!doctype") || head.starts_with("<html")
}

/// Map an HTTP outcome to an error, or `None` for a usable JSON success.
///
/// An HTML body is treated as an auth/rate-limit symptom even when the status
/// claims success; GitHub and intermediaries serve login or abuse pages that
/// way.
pub(crate) fn classify_response(
    status: u16,
    ratelimit_remaining: Option<&str>,
    body: &str,
    path: &str,
) -> Option<GitHubError> {
    let exhausted = ratelimit_remaining.map(str::trim) == Some("0");
    let mentions_rate_limit = body.to_ascii_lowercase().contains("rate limit");

    if status == 429 || (status == 403 && (exhausted || mentions_rate_limit)) {
        return Some(GitHubError::RateLimited {
            message: format!("HTTP {status} for {path}"),
        });
    }
    if looks_like_html(body) {
        return Some(GitHubError::Auth {
            message: format!("received an HTML page instead of JSON for {path} (HTTP {status})"),
        });
    }
    match status {
        200..=299 => None,
        401 | 403 => Some(GitHubError::Auth {
            message: format!("HTTP {status} for {path}"),
        }),
        404 => Some(GitHubError::NotFound {
            path: path.to_string(),
        }),
        _ => {
            let snippet: String = body.chars().take(200).collect();
            Some(GitHubError::unknown(path, format!("HTTP {status}: {snippet}")))
        }
    }
}

fn from_octocrab(err: octocrab::Error, path: &str) -> GitHubError {
    match &err {
        octocrab::Error::GitHub { source, .. } => {
            classify_response(source.status_code.as_u16(), None, &source.message, path)
                .unwrap_or_else(|| GitHubError::unknown(path, source.message.clone()))
        }
        _ => GitHubError::unknown(path, err.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Wire format of the contents endpoint
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RawEntry {
    name: String,
    path: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    encoding: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawContents {
    Listing(Vec<RawEntry>),
    Single(RawEntry),
}

pub(crate) fn parse_contents(body: &str, path: &str) -> Result<ContentResponse> {
    let raw: RawContents = serde_json::from_str(body)
        .map_err(|e| GitHubError::unknown(path, format!("unexpected contents payload: {e}")))?;
    Ok(match raw {
        RawContents::Listing(entries) => ContentResponse::Directory(
            entries
                .into_iter()
                .map(|e| ContentEntry {
                    kind: if e.kind == "dir" {
                        EntryKind::Directory
                    } else {
                        EntryKind::File
                    },
                    name: e.name,
                    path: e.path,
                })
                .collect(),
        ),
        RawContents::Single(e) => ContentResponse::File(FileBlob {
            path: e.path,
            kind: e.kind,
            content: e.content,
            encoding: e.encoding,
        }),
    })
}

fn contents_url(base: &str, owner: &str, repo: &str, path: &str) -> String {
    let encoded: Vec<String> = path
        .split('/')
        .filter(|segment| !segment.is_empty())
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect();
    let mut url = format!(
        "{}/repos/{}/{}/contents",
        base,
        urlencoding::encode(owner),
        urlencoding::encode(repo)
    );
    if !encoded.is_empty() {
        url.push('/');
        url.push_str(&encoded.join("/"));
    }
    url
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// GitHub REST client.
///
/// Authentication checks and repository metadata go through `octocrab`. The
/// contents endpoint is read as a raw body with `reqwest` so the response can
/// be inspected before it is parsed.
#[derive(Debug, Clone)]
pub struct GitHubClient {
    pub(crate) octocrab: Octocrab,
    http: reqwest::Client,
    token: String,
    api_base_url: String,
}

impl GitHubClient {
    /// Create a new `GitHubClient` from an explicit [`GitHubConfig`].
    pub fn new(config: GitHubConfig) -> Result<Self> {
        let token = config
            .token
            .filter(|t| !t.trim().is_empty())
            .ok_or(GitHubError::MissingToken)?;
        let api_base_url = config.api_base_url.trim_end_matches('/').to_string();

        let octocrab = Octocrab::builder()
            .base_uri(api_base_url.as_str())
            .map_err(|e| GitHubError::unknown("client", e.to_string()))?
            .personal_token(token.clone())
            .build()
            .map_err(|e| GitHubError::unknown("client", e.to_string()))?;

        Ok(Self {
            octocrab,
            http: reqwest::Client::new(),
            token,
            api_base_url,
        })
    }

    /// Create a new `GitHubClient` by reading `GITHUB_TOKEN` from the environment.
    pub fn new_from_env() -> Result<Self> {
        let token = std::env::var("GITHUB_TOKEN").ok();
        Self::new(GitHubConfig::new(token))
    }

    /// Returns a reference to the inner `Octocrab` instance.
    pub fn inner(&self) -> &Octocrab {
        &self.octocrab
    }

    pub fn api_base_url(&self) -> &str {
        &self.api_base_url
    }
}

#[async_trait::async_trait]
impl RepoSource for GitHubClient {
    async fn validate_credentials(&self) -> Result<()> {
        match self.octocrab.current().user().await {
            Ok(user) => {
                debug!(login = %user.login, "GitHub token validated");
                Ok(())
            }
            Err(err) => match from_octocrab(err, "user") {
                limited @ GitHubError::RateLimited { .. } => Err(limited),
                other => Err(GitHubError::Auth {
                    message: other.to_string(),
                }),
            },
        }
    }

    async fn repository(&self, owner: &str, repo: &str) -> Result<RepoMetadata> {
        let full_name = format!("{owner}/{repo}");
        let found = self
            .octocrab
            .repos(owner, repo)
            .get()
            .await
            .map_err(|e| from_octocrab(e, &full_name))?;

        Ok(RepoMetadata {
            name: found.name,
            owner: found
                .owner
                .map(|o| o.login)
                .unwrap_or_else(|| owner.to_string()),
            description: found.description,
            stars: found.stargazers_count.unwrap_or(0),
            forks: found.forks_count.unwrap_or(0),
            language: found
                .language
                .and_then(|v| v.as_str().map(str::to_owned)),
        })
    }

    async fn contents(&self, owner: &str, repo: &str, path: &str) -> Result<ContentResponse> {
        let url = contents_url(&self.api_base_url, owner, repo, path);
        let resp = self
            .http
            .get(&url)
            .bearer_auth(&self.token)
            .header(ACCEPT, "application/vnd.github+json")
            .header(USER_AGENT, "repo-oracle")
            .header("X-GitHub-Api-Version", "2022-11-28")
            .send()
            .await
            .map_err(|e| GitHubError::unknown(path, e.to_string()))?;

        let status = resp.status().as_u16();
        let remaining = resp
            .headers()
            .get("x-ratelimit-remaining")
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let body = resp
            .text()
            .await
            .map_err(|e| GitHubError::unknown(path, e.to_string()))?;

        if let Some(err) = classify_response(status, remaining.as_deref(), &body, path) {
            return Err(err);
        }
        parse_contents(&body, path)
    }
}
