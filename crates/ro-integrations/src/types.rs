use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubConfig {
    pub token: Option<String>,
    /// REST API root, e.g. `https://api.github.com`.
    pub api_base_url: String,
}

impl GitHubConfig {
    pub fn new(token: Option<String>) -> Self {
        Self {
            token,
            api_base_url: "https://api.github.com".to_string(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }
}

/// Repository metadata as reported by `GET /repos/{owner}/{repo}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoMetadata {
    pub name: String,
    pub owner: String,
    pub description: Option<String>,
    pub stars: u32,
    pub forks: u32,
    pub language: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    File,
    Directory,
}

/// One item of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentEntry {
    pub name: String,
    pub path: String,
    pub kind: EntryKind,
}

impl ContentEntry {
    pub fn file(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            kind: EntryKind::File,
        }
    }

    pub fn directory(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            kind: EntryKind::Directory,
        }
    }
}

/// A single non-directory item returned by the contents endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileBlob {
    pub path: String,
    /// `file`, `symlink` or `submodule`.
    pub kind: String,
    pub content: Option<String>,
    pub encoding: Option<String>,
}

impl FileBlob {
    /// A regular file carrying base64 content, as GitHub returns it.
    pub fn base64(path: impl Into<String>, encoded: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: "file".to_string(),
            content: Some(encoded.into()),
            encoding: Some("base64".to_string()),
        }
    }
}

/// What a contents path resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentResponse {
    Directory(Vec<ContentEntry>),
    File(FileBlob),
}
