//! Pipeline orchestration: stage composition, stores, public request/response

pub mod orchestrator;
pub mod stores;
pub mod types;

pub use orchestrator::Nl2SqlPipeline;
pub use stores::{FeedbackStore, InMemoryFeedbackStore, SchemaStore};
pub use types::{PipelineRequest, PipelineResponse};
