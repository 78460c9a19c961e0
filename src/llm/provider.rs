//! LLM provider contract
//!
//! The pipeline body never branches on provider identity; everything it
//! needs is `generate_json`. Concrete implementations are injected at
//! construction time.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum LlmError {
    /// Transport or authorization failure; worth retrying with backoff
    #[error("provider unavailable: {0}")]
    Unavailable(String),

    /// The response did not contain a parseable JSON object
    #[error("response was not valid JSON: {0}")]
    Parse(String),

    /// Empty or content-policy-blocked response; not retryable
    #[error("empty or refused response: {0}")]
    Refusal(String),
}

#[derive(Clone, Debug)]
pub struct GenerateOptions {
    pub timeout_ms: u64,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Ask the provider for structured JSON output when it supports it
    pub json_format: bool,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            max_tokens: 4096,
            temperature: 0.1,
            json_format: true,
        }
    }
}

/// Text-completion provider returning parsed JSON.
///
/// Implementations must be safe to call from concurrent request tasks
/// and must abort the outgoing request when the calling future is
/// dropped (cancellation leaves no orphan requests).
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Send a prompt and return the parsed JSON object from the response.
    async fn generate_json(&self, prompt: &str, options: &GenerateOptions)
        -> Result<Value, LlmError>;

    /// Cheap liveness probe; defaults to optimistic
    async fn health_check(&self) -> bool {
        true
    }
}
