/// Pipeline configuration
///
/// All knobs the inference pipeline exposes, grouped by stage. Every
/// section has sensible defaults so `PipelineConfig::default()` yields a
/// working development setup.
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct PipelineConfig {
    /// GAT ranker configuration
    pub ranker: RankerConfig,

    /// LLM provider configuration
    pub llm: LlmConfig,

    /// Prompt assembly configuration
    pub prompt: PromptConfig,

    /// Conversation context configuration
    pub context: ContextConfig,

    /// Whole-pipeline limits
    pub limits: LimitsConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RankerConfig {
    /// Path to the persisted GAT state dict (JSON). None disables the ranker.
    pub weights_path: Option<String>,

    /// Number of top-scored nodes to keep before fallback augmentation
    pub top_k: usize,

    /// Advisory wall-clock bound for a single forward pass (milliseconds)
    pub forward_timeout_ms: u64,
}

impl Default for RankerConfig {
    fn default() -> Self {
        Self {
            weights_path: None,
            top_k: 25,
            forward_timeout_ms: 5_000,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Base URL of the LLM endpoint
    pub base_url: String,

    /// Model name
    pub model: String,

    /// Per-call timeout (milliseconds)
    pub timeout_ms: u64,

    /// Maximum tokens to generate
    pub max_tokens: u32,

    /// Sampling temperature (low for deterministic JSON)
    pub temperature: f32,

    /// Transport retries on LLM unavailability
    pub max_retries: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            model: "llama3.2".to_string(),
            timeout_ms: 30_000,
            max_tokens: 4096,
            temperature: 0.1,
            max_retries: 2,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PromptConfig {
    /// Columns per table in the compact (unpruned) schema rendering
    pub max_columns_per_table: usize,

    /// Maximum RAG examples to include
    pub max_rag_examples: usize,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            max_columns_per_table: 8,
            max_rag_examples: 3,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Turns retained per conversation
    pub max_turns: usize,

    /// Turns rendered into the prompt context block
    pub prompt_turns: usize,

    /// Conversation TTL (seconds)
    pub ttl_seconds: u64,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_turns: 5,
            prompt_turns: 2,
            ttl_seconds: 3_600,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Whole-pipeline timeout (milliseconds)
    pub pipeline_timeout_ms: u64,

    /// Confidence below which the pipeline asks for clarification
    pub clarification_threshold: f64,

    /// Schema cache TTL (seconds)
    pub schema_cache_ttl_seconds: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            pipeline_timeout_ms: 60_000,
            clarification_threshold: 0.5,
            schema_cache_ttl_seconds: 3_600,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_sane() {
        let config = PipelineConfig::default();
        assert_eq!(config.ranker.top_k, 25);
        assert_eq!(config.llm.timeout_ms, 30_000);
        assert_eq!(config.limits.pipeline_timeout_ms, 60_000);
        assert!(config.ranker.weights_path.is_none());
    }

    #[test]
    fn config_roundtrips_through_json() {
        let config = PipelineConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: PipelineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.llm.model, config.llm.model);
        assert_eq!(back.context.max_turns, config.context.max_turns);
    }
}
