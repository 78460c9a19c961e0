/// Unified error type for the NL2SQL pipeline
/// Provides structured error handling with stable kinds for each failure mode
use thiserror::Error;

use crate::ir::validator::ValidationError;

#[derive(Error, Debug, Clone)]
pub enum PipelineError {
    /// No schema is registered for the requested database
    #[error("No schema available for database '{database_id}'")]
    SchemaMissing { database_id: String },

    /// LLM transport or authorization failure (after retries)
    #[error("LLM provider unavailable: {message}")]
    LlmUnavailable { message: String },

    /// LLM returned a response that could not be parsed as JSON (after retry)
    #[error("LLM response was not valid JSON: {message}")]
    LlmParseError { message: String },

    /// LLM returned an empty or policy-blocked response
    #[error("LLM refused to answer: {message}")]
    LlmRefusal { message: String },

    /// The IR failed validation even after the correction round
    #[error("Generated query structure is invalid: {}", format_diagnostics(.diagnostics))]
    IrInvalid { diagnostics: Vec<ValidationError> },

    /// Compilation failed on a validated IR: indicates a bug
    #[error("Internal compiler error: {message}")]
    CompilerError {
        message: String,
        /// Full IR serialized for debugging
        ir_json: String,
    },

    /// Whole-pipeline wall-clock bound exceeded
    #[error("Pipeline timed out after {elapsed_ms}ms")]
    PipelineTimeout { elapsed_ms: u64 },

    /// Internal errors: should never happen, indicates a bug
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl PipelineError {
    pub fn schema_missing(database_id: impl Into<String>) -> Self {
        Self::SchemaMissing {
            database_id: database_id.into(),
        }
    }

    pub fn llm_unavailable(message: impl Into<String>) -> Self {
        Self::LlmUnavailable {
            message: message.into(),
        }
    }

    pub fn llm_parse(message: impl Into<String>) -> Self {
        Self::LlmParseError {
            message: message.into(),
        }
    }

    pub fn llm_refusal(message: impl Into<String>) -> Self {
        Self::LlmRefusal {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Stable machine-readable kind, suitable for API clients
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SchemaMissing { .. } => "schema_missing",
            Self::LlmUnavailable { .. } => "llm_unavailable",
            Self::LlmParseError { .. } => "llm_parse_error",
            Self::LlmRefusal { .. } => "llm_refusal",
            Self::IrInvalid { .. } => "ir_invalid",
            Self::CompilerError { .. } => "compiler_error",
            Self::PipelineTimeout { .. } => "pipeline_timeout",
            Self::Internal { .. } => "internal",
        }
    }

    /// Message safe to show to end users (no internal paths or payloads)
    pub fn user_message(&self) -> String {
        match self {
            Self::SchemaMissing { database_id } => format!(
                "No schema has been ingested for '{}'. Please connect the database first.",
                database_id
            ),
            Self::LlmUnavailable { .. } => {
                "The language model is currently unreachable. Please try again shortly.".to_string()
            }
            Self::LlmParseError { .. } => {
                "The language model produced an unusable answer. Please rephrase your question."
                    .to_string()
            }
            Self::LlmRefusal { .. } => {
                "The language model declined to answer this question.".to_string()
            }
            Self::IrInvalid { diagnostics } => {
                let mut msg =
                    String::from("The question could not be translated into a valid query.");
                if let Some(first) = diagnostics.first() {
                    msg.push(' ');
                    msg.push_str(&first.message);
                }
                msg
            }
            Self::CompilerError { .. } | Self::Internal { .. } => {
                "An internal error occurred while building the query.".to_string()
            }
            Self::PipelineTimeout { .. } => {
                "The request took too long to process. Please try again.".to_string()
            }
        }
    }
}

impl From<anyhow::Error> for PipelineError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal {
            message: err.to_string(),
        }
    }
}

fn format_diagnostics(diagnostics: &[ValidationError]) -> String {
    if diagnostics.is_empty() {
        return "no diagnostics".to_string();
    }
    diagnostics
        .iter()
        .map(|d| format!("[{}] {} at {}", d.kind.as_str(), d.message, d.path))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result type alias for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;
