use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// FileNode
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    File,
    Directory,
}

/// One entry of a repository tree.
///
/// Only [`NodeKind::Directory`] nodes carry `children`. Child order matches the
/// order of the listing returned by the hosting API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileNode {
    pub name: String,
    pub path: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<FileNode>>,
}

impl FileNode {
    pub fn file(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            kind: NodeKind::File,
            content: None,
            children: None,
        }
    }

    pub fn directory(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            kind: NodeKind::Directory,
            content: None,
            children: None,
        }
    }

    pub fn is_directory(&self) -> bool {
        self.kind == NodeKind::Directory
    }

    /// Attach children. Ignored for file nodes.
    pub fn with_children(mut self, children: Vec<FileNode>) -> Self {
        if self.is_directory() {
            self.children = Some(children);
        }
        self
    }

    /// Depth-first iterator over this node and all of its descendants.
    pub fn walk(&self) -> Vec<&FileNode> {
        let mut out = vec![self];
        if let Some(children) = &self.children {
            for child in children {
                out.extend(child.walk());
            }
        }
        out
    }
}

// ---------------------------------------------------------------------------
// RepoSummary
// ---------------------------------------------------------------------------

/// Repository metadata plus its (depth-bounded) file tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepoSummary {
    pub name: String,
    pub owner: String,
    pub description: Option<String>,
    pub stars: u32,
    pub forks: u32,
    pub language: Option<String>,
    pub files: Vec<FileNode>,
}

// ---------------------------------------------------------------------------
// Rate limiting
// ---------------------------------------------------------------------------

/// Persisted quota counter for one client identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitRecord {
    pub count: u32,
    /// Epoch seconds at which the window resets.
    pub reset_at: i64,
}

/// Quota view returned to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitInfo {
    pub allowed: bool,
    pub remaining: u32,
    pub limit: u32,
    pub reset_at: i64,
}

// ---------------------------------------------------------------------------
// Conversation / prompt context
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: String,
    pub content: String,
}

impl ConversationMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextStats {
    /// Approximated by the number of lines in the rendered tree.
    pub files: usize,
    pub total_chars: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptContext {
    pub tree: String,
    pub content: String,
    pub stats: ContextStats,
}

impl PromptContext {
    pub fn new(tree: impl Into<String>, content: impl Into<String>) -> Self {
        let tree = tree.into();
        let content = content.into();
        let stats = ContextStats {
            files: tree.lines().count(),
            total_chars: content.chars().count(),
        };
        Self {
            tree,
            content,
            stats,
        }
    }
}

/// Precomputed whole-repository context stored in the distributed cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepoContext {
    pub tree: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Epoch seconds.
    pub collected_at: i64,
}

impl RepoContext {
    pub fn to_prompt_context(&self) -> PromptContext {
        PromptContext::new(self.tree.clone(), self.content.clone())
    }
}
