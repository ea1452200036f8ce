//! Builds the whole-repository `{tree, content}` context blob.

use std::sync::Arc;

use futures_util::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use ro_core::clock::Clock;
use ro_core::config::ContextConfig;
use ro_core::types::{FileNode, RepoContext, RepoSummary};
use ro_harness::context_cache::RepoContextCache;

use crate::github::client::Result;
use crate::github::fetcher::SourceTreeFetcher;

const SEPARATOR: &str = "================================================";

const BINARY_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "bmp", "ico", "webp", "tiff", "psd", "pdf", "zip", "gz", "tgz",
    "tar", "bz2", "xz", "7z", "rar", "jar", "war", "class", "exe", "dll", "so", "dylib", "a", "o",
    "bin", "wasm", "woff", "woff2", "ttf", "otf", "eot", "mp3", "mp4", "mov", "avi", "wav", "ogg",
    "flac", "webm", "pyc", "db", "sqlite",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectorLimits {
    pub max_files: usize,
    pub max_file_chars: usize,
    pub max_total_chars: usize,
    pub exclude_dirs: Vec<String>,
    /// File contents fetched concurrently.
    pub concurrency: usize,
}

impl CollectorLimits {
    pub fn from_config(config: &ContextConfig, concurrency: usize) -> Self {
        Self {
            max_files: config.max_files,
            max_file_chars: config.max_file_chars,
            max_total_chars: config.max_total_chars,
            exclude_dirs: config.exclude_dirs.clone(),
            concurrency: concurrency.max(1),
        }
    }
}

impl Default for CollectorLimits {
    fn default() -> Self {
        Self::from_config(&ContextConfig::default(), 5)
    }
}

pub struct ContextCollector {
    fetcher: SourceTreeFetcher,
    limits: CollectorLimits,
    clock: Arc<dyn Clock>,
}

impl ContextCollector {
    pub fn new(fetcher: SourceTreeFetcher, limits: CollectorLimits, clock: Arc<dyn Clock>) -> Self {
        Self {
            fetcher,
            limits,
            clock,
        }
    }

    pub fn fetcher(&self) -> &SourceTreeFetcher {
        &self.fetcher
    }

    /// Fetch the tree and a bounded selection of file contents.
    ///
    /// Individual file failures are logged and skipped; only a failure to
    /// fetch the repository itself is returned.
    pub async fn collect(&self, owner: &str, repo: &str) -> Result<RepoContext> {
        let summary = self.fetcher.fetch_repo_data(owner, repo).await?;
        let tree = render_tree(&summary.name, &summary.files);
        let selected = select_files(&summary.files, &self.limits);

        let fetcher = self.fetcher.clone();
        let (owner_key, repo_key) = (owner.to_owned(), repo.to_owned());
        let fetched: Vec<(String, Result<String>)> = stream::iter(selected)
            .map(move |path| {
                let fetcher = fetcher.clone();
                let (owner, repo) = (owner_key.clone(), repo_key.clone());
                async move {
                    let result = fetcher.fetch_file_content(&path, &owner, &repo).await;
                    (path, result)
                }
            })
            .buffered(self.limits.concurrency)
            .collect()
            .await;

        let mut content = String::new();
        let mut total_chars = 0usize;
        let mut included = 0usize;
        for (path, result) in fetched {
            let text = match result {
                Ok(text) => text,
                Err(err) => {
                    warn!(owner, repo, path = %path, error = %err, "skipping file");
                    continue;
                }
            };
            let chars = text.chars().count();
            if chars > self.limits.max_file_chars {
                debug!(path = %path, chars, "skipping oversized file");
                continue;
            }
            let section = format_file_section(&path, &text);
            let section_chars = section.chars().count();
            if total_chars + section_chars > self.limits.max_total_chars {
                debug!(path = %path, total_chars, "content budget reached");
                break;
            }
            total_chars += section_chars;
            included += 1;
            content.push_str(&section);
        }

        info!(owner, repo, files = included, total_chars, "repository context collected");
        Ok(RepoContext {
            tree,
            content,
            summary: Some(summary_line(&summary)),
            collected_at: self.clock.now_epoch_secs(),
        })
    }

    /// Return the stored context for `owner/repo`, collecting and storing a
    /// fresh one when absent or when `force` is set.
    ///
    /// Store failures never fail the call: a failed read counts as a miss and
    /// a failed write is logged.
    pub async fn populate(
        &self,
        cache: &RepoContextCache,
        owner: &str,
        repo: &str,
        force: bool,
    ) -> Result<RepoContext> {
        if !force {
            match cache.get(owner, repo).await {
                Ok(Some(ctx)) => {
                    debug!(owner, repo, "repository context already stored");
                    return Ok(ctx);
                }
                Ok(None) => {}
                Err(err) => warn!(owner, repo, error = %err, "context cache read failed"),
            }
        }

        let ctx = self.collect(owner, repo).await?;
        if let Err(err) = cache.put(owner, repo, &ctx).await {
            warn!(owner, repo, error = %err, "context cache write failed");
        }
        Ok(ctx)
    }
}

/// One-paragraph description of the repository.
pub fn summary_line(summary: &RepoSummary) -> String {
    let mut out = format!("Repository: {}/{}", summary.owner, summary.name);
    if let Some(description) = &summary.description {
        out.push_str(&format!("\nDescription: {description}"));
    }
    out.push_str(&format!("\nStars: {} | Forks: {}", summary.stars, summary.forks));
    if let Some(language) = &summary.language {
        out.push_str(&format!(" | Language: {language}"));
    }
    out
}

pub fn format_file_section(path: &str, text: &str) -> String {
    format!("{SEPARATOR}\nFILE: {path}\n{SEPARATOR}\n{text}\n\n")
}

/// Render a box-drawing directory tree rooted at `root`.
pub fn render_tree(root: &str, nodes: &[FileNode]) -> String {
    let mut out = String::from("Directory structure:\n");
    out.push_str(&format!("└── {root}/\n"));
    render_children(nodes, "    ", &mut out);
    out.trim_end().to_string()
}

fn render_children(nodes: &[FileNode], prefix: &str, out: &mut String) {
    for (i, node) in nodes.iter().enumerate() {
        let last = i + 1 == nodes.len();
        let connector = if last { "└── " } else { "├── " };
        let suffix = if node.is_directory() { "/" } else { "" };
        out.push_str(&format!("{prefix}{connector}{}{suffix}\n", node.name));
        if let Some(children) = &node.children {
            let extension = if last { "    " } else { "│   " };
            render_children(children, &format!("{prefix}{extension}"), out);
        }
    }
}

fn is_binary(name: &str) -> bool {
    name.rsplit_once('.')
        .map(|(_, ext)| BINARY_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// File paths worth sending, in tree order, honouring exclusions and
/// `max_files`.
pub fn select_files(nodes: &[FileNode], limits: &CollectorLimits) -> Vec<String> {
    let mut out = Vec::new();
    collect_paths(nodes, limits, &mut out);
    out
}

fn collect_paths(nodes: &[FileNode], limits: &CollectorLimits, out: &mut Vec<String>) {
    for node in nodes {
        if out.len() >= limits.max_files {
            return;
        }
        if node.is_directory() {
            if limits.exclude_dirs.iter().any(|d| d == &node.name) {
                continue;
            }
            if let Some(children) = &node.children {
                collect_paths(children, limits, out);
            }
        } else if !is_binary(&node.name) {
            out.push(node.path.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tree() -> Vec<FileNode> {
        vec![
            FileNode::directory("src", "src").with_children(vec![
                FileNode::file("main.rs", "src/main.rs"),
                FileNode::file("lib.rs", "src/lib.rs"),
            ]),
            FileNode::directory("tests", "tests")
                .with_children(vec![FileNode::file("it.rs", "tests/it.rs")]),
            FileNode::file("logo.PNG", "logo.PNG"),
            FileNode::file("README.md", "README.md"),
        ]
    }

    #[test]
    fn renders_tree_with_connectors() {
        let tree = render_tree("repo", &sample_tree());
        let expected = [
            "Directory structure:",
            "└── repo/",
            "    ├── src/",
            "    │   ├── main.rs",
            "    │   └── lib.rs",
            "    ├── tests/",
            "    │   └── it.rs",
            "    ├── logo.PNG",
            "    └── README.md",
        ]
        .join("\n");
        assert_eq!(tree, expected);
    }

    #[test]
    fn selection_skips_excluded_dirs_and_binaries() {
        let picked = select_files(&sample_tree(), &CollectorLimits::default());
        assert_eq!(picked, vec!["src/main.rs", "src/lib.rs", "README.md"]);
    }

    #[test]
    fn selection_honours_max_files() {
        let limits = CollectorLimits {
            max_files: 2,
            ..CollectorLimits::default()
        };
        let picked = select_files(&sample_tree(), &limits);
        assert_eq!(picked, vec!["src/main.rs", "src/lib.rs"]);
    }

    #[test]
    fn file_section_format() {
        let section = format_file_section("a.rs", "fn a() {}");
        assert!(section.starts_with("================================================\nFILE: a.rs\n"));
        assert!(section.ends_with("fn a() {}\n\n"));
    }

    #[test]
    fn summary_line_lists_metadata() {
        let summary = RepoSummary {
            name: "repo".into(),
            owner: "octo".into(),
            description: Some("demo".into()),
            stars: 3,
            forks: 1,
            language: Some("Rust".into()),
            files: vec![],
        };
        assert_eq!(
            summary_line(&summary),
            "Repository: octo/repo\nDescription: demo\nStars: 3 | Forks: 1 | Language: Rust"
        );
    }
}
