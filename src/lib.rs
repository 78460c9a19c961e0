//! # NL2SQL Pipeline
//!
//! Schema-aware natural-language-to-SQL inference pipeline. A question,
//! a relational schema, and optional conversation history go in; a
//! parameterized SQL query comes out.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use nl2sql_pipeline::{Nl2SqlPipeline, OllamaProvider, PipelineConfig, PipelineRequest};
//!
//! # async fn run(schema: nl2sql_pipeline::DatabaseSchema) -> anyhow::Result<()> {
//! let config = PipelineConfig::default();
//! let provider = Arc::new(OllamaProvider::new(&config.llm));
//! let pipeline = Nl2SqlPipeline::new(config, provider);
//!
//! pipeline.register_schema("shop", schema);
//!
//! let response = pipeline
//!     .execute(PipelineRequest::new("top 5 customers by total spent", "shop"))
//!     .await?;
//! println!("{}", response.sql);
//! # Ok(())
//! # }
//! ```
//!
//! ## Stages
//!
//! - **Schema ranking**: a graph attention network scores every table and
//!   column against the question; a structural fallback adds FK join
//!   paths and calculation columns the model may have missed.
//! - **IR generation**: the LLM emits a typed intermediate representation
//!   which is sanitized (drift absorbed), validated against the schema,
//!   and only then compiled.
//! - **Compilation**: deterministic SQL with every literal bound through
//!   a placeholder map.
//!
//! The ranker is optional: without trained weights the pipeline runs
//! unpruned against the full schema.

pub mod analysis;
pub mod config;
pub mod context;
pub mod embedding;
pub mod error;
pub mod ir;
pub mod llm;
pub mod pipeline;
pub mod ranker;
pub mod schema;

// Public API - main types users need
pub use config::PipelineConfig;
pub use error::{PipelineError, PipelineResult};
pub use ir::{QueryIr, SqlCompiler};
pub use llm::{LlmProvider, OllamaProvider};
pub use pipeline::{
    FeedbackStore, InMemoryFeedbackStore, Nl2SqlPipeline, PipelineRequest, PipelineResponse,
};
pub use ranker::{IntelligentFallback, SchemaRanker};
pub use schema::{CanonicalSchema, DatabaseSchema, SchemaConverter};
