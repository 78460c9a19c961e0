//! Pipeline orchestrator
//!
//! Composes the stages in order: context resolve, GAT ranking (best
//! effort), fallback augmentation, prompt assembly, LLM call, sanitize,
//! validate (with one correction round), compile, analyze. Recoverable
//! failures are absorbed here; whatever surfaces carries a stable error
//! kind. No SQL is ever produced from an IR that failed validation.

use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::analysis::complexity::ComplexityAnalyzer;
use crate::analysis::corrector::SqlCorrector;
use crate::config::PipelineConfig;
use crate::context::{ContextResolver, ConversationStore, ConversationTurn};
use crate::embedding::HashingEncoder;
use crate::error::{PipelineError, PipelineResult};
use crate::ir::compiler::{Params, SqlCompiler};
use crate::ir::model::QueryIr;
use crate::ir::sanitizer::sanitize;
use crate::ir::validator::{IrValidator, ValidationError, ValidationErrorKind};
use crate::llm::prompt::{
    build_correction_prompt, build_ir_prompt, render_compact_schema, render_pruned_schema,
    JSON_RETRY_NUDGE,
};
use crate::llm::provider::{GenerateOptions, LlmError, LlmProvider};
use crate::pipeline::stores::{FeedbackStore, SchemaStore};
use crate::pipeline::types::{PipelineRequest, PipelineResponse};
use crate::ranker::fallback::IntelligentFallback;
use crate::ranker::service::SchemaRanker;
use crate::schema::converter::{CanonicalSchema, SchemaConverter};
use crate::schema::model::DatabaseSchema;

pub struct Nl2SqlPipeline {
    config: PipelineConfig,
    provider: Arc<dyn LlmProvider>,
    ranker: Arc<SchemaRanker>,
    schemas: Arc<SchemaStore>,
    conversations: Arc<ConversationStore>,
    feedback: Option<Arc<dyn FeedbackStore>>,
    conversation_locks: DashMap<String, Arc<Mutex<()>>>,
    compiler: SqlCompiler,
}

impl Nl2SqlPipeline {
    /// Build a pipeline with the default encoders. The GAT ranker loads
    /// from `config.ranker.weights_path`; a missing or invalid file
    /// leaves the pipeline running unpruned.
    pub fn new(config: PipelineConfig, provider: Arc<dyn LlmProvider>) -> Self {
        let node_encoder = Arc::new(HashingEncoder::new(384));
        let question_encoder = Arc::new(HashingEncoder::new(768));
        let ranker = SchemaRanker::new(&config.ranker, node_encoder, question_encoder);
        Self::with_ranker(config, provider, ranker)
    }

    /// Build a pipeline around an existing ranker (custom encoders or an
    /// already-loaded model).
    pub fn with_ranker(
        config: PipelineConfig,
        provider: Arc<dyn LlmProvider>,
        ranker: SchemaRanker,
    ) -> Self {
        let schemas = Arc::new(SchemaStore::new(config.limits.schema_cache_ttl_seconds));
        let conversations = Arc::new(ConversationStore::new(
            config.context.max_turns,
            config.context.ttl_seconds,
        ));
        Self {
            config,
            provider,
            ranker: Arc::new(ranker),
            schemas,
            conversations,
            feedback: None,
            conversation_locks: DashMap::new(),
            compiler: SqlCompiler::default(),
        }
    }

    pub fn with_feedback_store(mut self, store: Arc<dyn FeedbackStore>) -> Self {
        self.feedback = Some(store);
        self
    }

    /// Register the schema for a database id. Must happen before any
    /// request referencing that id.
    pub fn register_schema(&self, database_id: &str, schema: DatabaseSchema) -> Arc<DatabaseSchema> {
        self.schemas.register(database_id, schema)
    }

    pub fn clear_conversation(&self, conversation_id: &str) {
        self.conversations.clear(conversation_id);
    }

    /// Run the full pipeline for one request.
    pub async fn execute(&self, request: PipelineRequest) -> PipelineResult<PipelineResponse> {
        let started = Instant::now();
        let correlation_id = correlation_id(&request);
        let span = info_span!(
            "pipeline",
            correlation = %correlation_id,
            conversation = %request.conversation_id.as_deref().unwrap_or("-"),
        );

        let timeout = Duration::from_millis(self.config.limits.pipeline_timeout_ms);
        match tokio::time::timeout(timeout, self.execute_inner(&request, started).instrument(span))
            .await
        {
            Ok(result) => result,
            Err(_) => {
                let elapsed_ms = started.elapsed().as_millis() as u64;
                warn!(correlation = %correlation_id, elapsed_ms, "pipeline timed out");
                Err(PipelineError::PipelineTimeout { elapsed_ms })
            }
        }
    }

    async fn execute_inner(
        &self,
        request: &PipelineRequest,
        started: Instant,
    ) -> PipelineResult<PipelineResponse> {
        let schema = self
            .schemas
            .get(&request.database_id)
            .ok_or_else(|| PipelineError::schema_missing(&request.database_id))?;

        // Turns within one conversation are strictly ordered: the history
        // read and the final append happen under the same lock.
        let _guard = match &request.conversation_id {
            Some(id) => {
                let lock = {
                    let entry = self
                        .conversation_locks
                        .entry(id.clone())
                        .or_insert_with(|| Arc::new(Mutex::new(())));
                    Arc::clone(entry.value())
                };
                Some(lock.lock_owned().await)
            }
            None => None,
        };

        let history = request
            .conversation_id
            .as_deref()
            .map(|id| self.conversations.get(id))
            .unwrap_or_default();

        let resolved = ContextResolver::resolve(&request.question, &history);
        if resolved != request.question {
            debug!(resolved = %resolved, "question rewritten from context");
        }

        let canonical = SchemaConverter::to_canonical(&schema);

        let schema_text = match self.rank_nodes(&resolved, &canonical).await {
            Some(ranked) => {
                let augmented = IntelligentFallback::augment(&resolved, &canonical, ranked);
                debug!(nodes = augmented.len(), "schema pruned");
                render_pruned_schema(&schema, &augmented, self.config.prompt.max_columns_per_table)
            }
            None => {
                debug!("no ranker output; using compact full schema");
                render_compact_schema(&schema, self.config.prompt.max_columns_per_table)
            }
        };

        let rag_examples = if request.use_rag {
            self.feedback
                .as_ref()
                .map(|store| {
                    store.similar(&resolved, &schema.version, self.config.prompt.max_rag_examples)
                })
                .unwrap_or_default()
        } else {
            Vec::new()
        };

        let context_block =
            ContextResolver::build_context_block(&history, self.config.context.prompt_turns);

        let prompt = build_ir_prompt(&schema_text, &resolved, &rag_examples, &context_block);

        let raw = self.call_llm(&prompt).await?;
        let sanitized = sanitize(raw);

        let ir = match parse_and_validate(&schema, sanitized.clone()) {
            Ok(ir) => ir,
            Err(diagnostics) => {
                info!(
                    errors = diagnostics.len(),
                    "IR invalid; running correction round"
                );
                let previous = serde_json::to_string(&sanitized).unwrap_or_default();
                let correction = build_correction_prompt(&prompt, &previous, &diagnostics);
                let raw = self.call_llm(&correction).await?;
                let sanitized = sanitize(raw);
                match parse_and_validate(&schema, sanitized) {
                    Ok(ir) => ir,
                    Err(diagnostics) => {
                        return Err(PipelineError::IrInvalid { diagnostics });
                    }
                }
            }
        };

        // Clarification gate: low confidence or open questions mean we
        // return questions instead of SQL.
        if !ir.questions.is_empty() || ir.confidence < self.config.limits.clarification_threshold {
            let questions = clarification_questions(&ir);
            info!(count = questions.len(), "clarification required");
            return Ok(PipelineResponse {
                original_question: request.question.clone(),
                resolved_question: resolved,
                sql: String::new(),
                params: Params::default(),
                confidence: ir.confidence,
                ambiguities: ir.ambiguities.clone(),
                questions,
                explanations: Vec::new(),
                suggested_fixes: Vec::new(),
                execution_time_ms: started.elapsed().as_millis() as u64,
                ir: Some(ir),
            });
        }

        let (sql, params) = self.compiler.compile(&ir).map_err(|e| {
            PipelineError::CompilerError {
                message: e.to_string(),
                ir_json: serde_json::to_string(&ir).unwrap_or_default(),
            }
        })?;

        let metrics = ComplexityAnalyzer::analyze(&ir);
        let explanations: Vec<String> = metrics
            .warnings
            .iter()
            .map(|w| format!("Performance note: {}", w))
            .collect();
        let mut suggested_fixes = SqlCorrector::review(&sql, &ir, &schema);
        suggested_fixes.extend(ComplexityAnalyzer::suggest_optimizations(&metrics));

        if let Some(conversation_id) = &request.conversation_id {
            self.conversations.append(
                conversation_id,
                ConversationTurn {
                    question: request.question.clone(),
                    resolved_question: resolved.clone(),
                    sql: sql.clone(),
                    tables_used: ir.tables_used(),
                    created_at: SystemTime::now()
                        .duration_since(UNIX_EPOCH)
                        .map(|d| d.as_secs())
                        .unwrap_or(0),
                },
            );
        }

        info!(
            complexity = metrics.level.as_str(),
            confidence = ir.confidence,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "pipeline completed"
        );

        Ok(PipelineResponse {
            original_question: request.question.clone(),
            resolved_question: resolved,
            sql,
            params,
            confidence: ir.confidence,
            ambiguities: ir.ambiguities.clone(),
            questions: Vec::new(),
            explanations,
            suggested_fixes,
            execution_time_ms: started.elapsed().as_millis() as u64,
            ir: Some(ir),
        })
    }

    /// GAT scoring offloaded to the blocking pool under an advisory
    /// timeout. Any failure means "no pruning".
    async fn rank_nodes(
        &self,
        question: &str,
        canonical: &CanonicalSchema,
    ) -> Option<Vec<crate::ranker::service::RankedNode>> {
        if !self.ranker.is_enabled() {
            return None;
        }
        let ranker = Arc::clone(&self.ranker);
        let question = question.to_string();
        let canonical = canonical.clone();
        let task = tokio::task::spawn_blocking(move || ranker.score_nodes(&question, &canonical));

        let budget = Duration::from_millis(self.config.ranker.forward_timeout_ms);
        match tokio::time::timeout(budget, task).await {
            Ok(Ok(ranked)) => ranked,
            Ok(Err(e)) => {
                warn!(error = %e, "GAT scoring task failed; using full schema");
                None
            }
            Err(_) => {
                warn!("GAT forward pass exceeded its budget; using full schema");
                None
            }
        }
    }

    /// LLM call with the retry policy: exponential backoff for transport
    /// failures, one nudged retry for non-JSON output, no retry for
    /// refusals.
    async fn call_llm(&self, prompt: &str) -> PipelineResult<Value> {
        let options = GenerateOptions {
            timeout_ms: self.config.llm.timeout_ms,
            max_tokens: self.config.llm.max_tokens,
            temperature: self.config.llm.temperature,
            json_format: true,
        };

        let mut current_prompt = prompt.to_string();
        let mut transport_attempts = 0u32;
        let mut parse_retried = false;

        loop {
            match self.provider.generate_json(&current_prompt, &options).await {
                Ok(value) => return Ok(value),
                Err(LlmError::Unavailable(message)) => {
                    if transport_attempts >= self.config.llm.max_retries {
                        return Err(PipelineError::llm_unavailable(message));
                    }
                    let backoff = Duration::from_millis(200 * (1 << transport_attempts));
                    warn!(attempt = transport_attempts + 1, backoff_ms = backoff.as_millis() as u64, "LLM unavailable; retrying");
                    tokio::time::sleep(backoff).await;
                    transport_attempts += 1;
                }
                Err(LlmError::Parse(message)) => {
                    if parse_retried {
                        return Err(PipelineError::llm_parse(message));
                    }
                    warn!("LLM response was not JSON; retrying with nudge");
                    current_prompt = format!("{}{}", prompt, JSON_RETRY_NUDGE);
                    parse_retried = true;
                }
                Err(LlmError::Refusal(message)) => {
                    return Err(PipelineError::llm_refusal(message));
                }
            }
        }
    }
}

fn parse_and_validate(
    schema: &DatabaseSchema,
    sanitized: Value,
) -> Result<QueryIr, Vec<ValidationError>> {
    let ir: QueryIr = match serde_json::from_value(sanitized) {
        Ok(ir) => ir,
        Err(e) => {
            return Err(vec![ValidationError {
                kind: ValidationErrorKind::Malformed,
                message: format!("IR does not match the expected shape: {}", e),
                path: "$".to_string(),
            }]);
        }
    };
    let errors = IrValidator::new(schema).validate(&ir);
    if errors.is_empty() {
        Ok(ir)
    } else {
        Err(errors)
    }
}

fn clarification_questions(ir: &QueryIr) -> Vec<String> {
    let mut questions = ir.questions.clone();
    if questions.is_empty() {
        for amb in &ir.ambiguities {
            if amb.what.is_empty() {
                continue;
            }
            let mut q = format!("Could you clarify {}?", amb.what);
            if !amb.interpretations.is_empty() {
                q.push_str(&format!(" Possible readings: {}", amb.interpretations.join("; ")));
            }
            questions.push(q);
        }
    }
    if questions.is_empty() {
        questions.push(
            "The question was ambiguous. Could you rephrase it with the exact tables or values you mean?"
                .to_string(),
        );
    }
    questions
}

fn correlation_id(request: &PipelineRequest) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let digest = Sha256::digest(
        format!("{}:{}:{}", request.database_id, request.question, nanos).as_bytes(),
    );
    digest
        .iter()
        .take(4)
        .map(|b| format!("{:02x}", b))
        .collect()
}
