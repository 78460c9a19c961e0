//! Public pipeline request/response contract

use serde::{Deserialize, Serialize};

use crate::ir::compiler::Params;
use crate::ir::model::{Ambiguity, QueryIr};

#[derive(Clone, Debug, Deserialize)]
pub struct PipelineRequest {
    pub question: String,
    #[serde(default)]
    pub conversation_id: Option<String>,
    pub database_id: String,
    #[serde(default = "default_use_rag")]
    pub use_rag: bool,
}

fn default_use_rag() -> bool {
    true
}

impl PipelineRequest {
    pub fn new(question: impl Into<String>, database_id: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            conversation_id: None,
            database_id: database_id.into(),
            use_rag: true,
        }
    }

    pub fn with_conversation(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }

    pub fn without_rag(mut self) -> Self {
        self.use_rag = false;
        self
    }
}

/// Success or clarification response. A clarification response carries an
/// empty `sql` and non-empty `questions`.
#[derive(Clone, Debug, Serialize)]
pub struct PipelineResponse {
    pub original_question: String,
    pub resolved_question: String,
    pub sql: String,
    pub params: Params,
    /// Absent on clarification responses
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ir: Option<QueryIr>,
    pub confidence: f64,
    pub ambiguities: Vec<Ambiguity>,
    pub questions: Vec<String>,
    pub explanations: Vec<String>,
    pub suggested_fixes: Vec<String>,
    pub execution_time_ms: u64,
}

impl PipelineResponse {
    pub fn needs_clarification(&self) -> bool {
        self.sql.is_empty() && !self.questions.is_empty()
    }
}
