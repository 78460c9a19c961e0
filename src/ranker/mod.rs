//! GAT schema ranker and intelligent fallback

pub mod fallback;
pub mod gat;
pub mod service;
pub mod weights;

pub use fallback::IntelligentFallback;
pub use gat::GatModel;
pub use service::{RankedNode, SchemaRanker};
