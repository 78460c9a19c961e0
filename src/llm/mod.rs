//! LLM provider interface, Ollama-style HTTP implementation, and prompt assembly

pub mod ollama;
pub mod prompt;
pub mod provider;

pub use ollama::OllamaProvider;
pub use provider::{GenerateOptions, LlmError, LlmProvider};
