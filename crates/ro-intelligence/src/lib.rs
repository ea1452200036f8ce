pub mod fallback;
pub mod llm;
pub mod prompt;

// Re-export canonical LLM types for convenience.
pub use fallback::{FallbackClient, FallbackError};
pub use llm::{
    GeminiProvider, LlmConfig, LlmError, LlmProvider, LlmResponse, MockProvider as LlmMockProvider,
};
pub use prompt::{file_prompt, generic_prompt, repo_prompt, Prompt};
