//! Prompt construction for the three context tiers.

use ro_core::types::{ContextStats, ConversationMessage, PromptContext};

/// A finished prompt plus the statistics logged for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub text: String,
    pub stats: ContextStats,
}

fn query_header(query: &str) -> String {
    format!("USER QUERY: {query}\n\n")
}

/// Prompt scoped to one file's content.
pub fn file_prompt(query: &str, path: &str, content: &str) -> Prompt {
    let text = format!(
        "{}You are a helpful assistant that can answer questions about the given code file.\n\n\
         FILE: {path}\n\n\
         {content}\n\n\
         Provide a detailed, technical response that directly addresses the user's query about this specific file.",
        query_header(query)
    );
    Prompt {
        text,
        stats: ContextStats {
            files: 1,
            total_chars: content.chars().count(),
        },
    }
}

/// Prompt carrying the whole-repository tree and content plus prior turns.
pub fn repo_prompt(query: &str, history: &[ConversationMessage], context: &PromptContext) -> Prompt {
    let mut text = query_header(query);
    text.push_str(
        "You are an expert software engineer helping a user understand a GitHub repository. \
         Answer using the directory structure and file contents below. \
         Reference specific files when relevant.\n\n",
    );
    text.push_str(&context.tree);
    text.push_str("\n\nFILE CONTENTS:\n\n");
    text.push_str(&context.content);

    if !history.is_empty() {
        text.push_str("\nCONVERSATION HISTORY:\n");
        for msg in history {
            text.push_str(&format!("{}: {}\n", msg.role, msg.content));
        }
    }

    text.push_str(&format!("\nCURRENT QUESTION: {query}\n"));
    Prompt {
        text,
        stats: context.stats,
    }
}

/// Context-free prompt used when no repository data could be assembled.
pub fn generic_prompt(query: &str, owner: &str, repo: &str) -> Prompt {
    let text = format!(
        "You are a knowledgeable AI assistant with deep understanding of software development and GitHub repositories.\n\n\
         Repository: {owner}/{repo}\n\n\
         {}Provide an insightful, technical response that directly addresses the user's query about this repository.",
        query_header(query)
    );
    Prompt {
        text,
        stats: ContextStats::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_prompt_leads_with_query() {
        let p = file_prompt("what does it do?", "src/main.rs", "fn main() {}");
        assert!(p.text.starts_with("USER QUERY: what does it do?\n\n"));
        assert!(p.text.contains("FILE: src/main.rs\n\nfn main() {}"));
        assert_eq!(p.stats, ContextStats { files: 1, total_chars: 12 });
    }

    #[test]
    fn repo_prompt_renders_history_in_order() {
        let ctx = PromptContext::new("Directory structure:\n└── r/", "body");
        let history = vec![
            ConversationMessage::new("user", "first"),
            ConversationMessage::new("assistant", "second"),
        ];
        let p = repo_prompt("q", &history, &ctx);
        let first = p.text.find("user: first").unwrap();
        let second = p.text.find("assistant: second").unwrap();
        assert!(first < second);
        assert!(p.text.contains("Directory structure:"));
        assert_eq!(p.stats, ContextStats { files: 2, total_chars: 4 });
    }

    #[test]
    fn repo_prompt_without_history_has_no_history_block() {
        let ctx = PromptContext::new("t", "c");
        let p = repo_prompt("q", &[], &ctx);
        assert!(!p.text.contains("CONVERSATION HISTORY"));
    }

    #[test]
    fn generic_prompt_names_repository() {
        let p = generic_prompt("why?", "octo", "cat");
        assert!(p.text.contains("Repository: octo/cat"));
        assert!(p.text.contains("USER QUERY: why?"));
        assert_eq!(p.stats, ContextStats::default());
    }
}
