//! Schema model, canonical conversion, and the in-memory schema graph

pub mod converter;
pub mod graph;
pub mod model;

pub use converter::{CanonicalSchema, ColumnClass, SchemaConverter};
pub use graph::{GraphNode, NodeKind, SchemaGraph};
pub use model::{ColumnDef, DatabaseSchema, ForeignKeyDef, Relationship, TableDef};
