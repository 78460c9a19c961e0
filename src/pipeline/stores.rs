//! Narrow store collaborators: schema registry/cache and the feedback
//! (RAG) store. The pipeline tolerates any of them being absent or empty.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use tracing::debug;

use crate::embedding::{cosine_similarity, SentenceEncoder};
use crate::schema::model::DatabaseSchema;

/// Schema registry keyed by database id, with a fingerprint-keyed TTL
/// cache in front of repeated lookups.
pub struct SchemaStore {
    by_database: DashMap<String, Arc<DatabaseSchema>>,
    by_fingerprint: DashMap<String, (u64, Arc<DatabaseSchema>)>,
    ttl_seconds: u64,
}

impl SchemaStore {
    pub fn new(ttl_seconds: u64) -> Self {
        Self {
            by_database: DashMap::new(),
            by_fingerprint: DashMap::new(),
            ttl_seconds,
        }
    }

    /// Register (or replace) the schema for a database id.
    pub fn register(&self, database_id: &str, schema: DatabaseSchema) -> Arc<DatabaseSchema> {
        let schema = Arc::new(schema);
        self.by_database
            .insert(database_id.to_string(), Arc::clone(&schema));
        self.by_fingerprint.insert(
            schema.version.clone(),
            (now_secs(), Arc::clone(&schema)),
        );
        schema
    }

    pub fn get(&self, database_id: &str) -> Option<Arc<DatabaseSchema>> {
        self.by_database.get(database_id).map(|e| Arc::clone(&e))
    }

    /// Fingerprint-keyed lookup; expired entries are evicted on access.
    pub fn get_by_fingerprint(&self, fingerprint: &str) -> Option<Arc<DatabaseSchema>> {
        if let Some(entry) = self.by_fingerprint.get(fingerprint) {
            let (stored_at, schema) = entry.value();
            if now_secs().saturating_sub(*stored_at) <= self.ttl_seconds {
                return Some(Arc::clone(schema));
            }
            drop(entry);
            self.by_fingerprint.remove(fingerprint);
        }
        None
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Feedback store: prior `(question, sql)` pairs retrieved by similarity
/// and scoped to a schema fingerprint.
pub trait FeedbackStore: Send + Sync {
    /// Up to `k` examples most similar to the question.
    fn similar(&self, question: &str, fingerprint: &str, k: usize) -> Vec<(String, String)>;

    /// Record a confirmed pair. Default is a no-op for read-only stores.
    fn record(&self, _question: &str, _fingerprint: &str, _sql: &str) {}
}

struct FeedbackEntry {
    question: String,
    sql: String,
    vector: Vec<f32>,
}

/// In-memory cosine-similarity feedback store. A persistent vector
/// database plugs in behind the same trait.
pub struct InMemoryFeedbackStore {
    encoder: Arc<dyn SentenceEncoder>,
    entries: DashMap<String, Vec<FeedbackEntry>>,
}

impl InMemoryFeedbackStore {
    pub fn new(encoder: Arc<dyn SentenceEncoder>) -> Self {
        Self {
            encoder,
            entries: DashMap::new(),
        }
    }
}

impl FeedbackStore for InMemoryFeedbackStore {
    fn similar(&self, question: &str, fingerprint: &str, k: usize) -> Vec<(String, String)> {
        let entries = match self.entries.get(fingerprint) {
            Some(entries) => entries,
            None => return Vec::new(),
        };
        let query = self.encoder.encode(question);

        let mut scored: Vec<(f32, &FeedbackEntry)> = entries
            .iter()
            .map(|e| (cosine_similarity(&query, &e.vector), e))
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        let out: Vec<(String, String)> = scored
            .into_iter()
            .take(k)
            .map(|(_, e)| (e.question.clone(), e.sql.clone()))
            .collect();
        debug!(found = out.len(), "feedback store lookup");
        out
    }

    fn record(&self, question: &str, fingerprint: &str, sql: &str) {
        let vector = self.encoder.encode(question);
        self.entries
            .entry(fingerprint.to_string())
            .or_default()
            .push(FeedbackEntry {
                question: question.to_string(),
                sql: sql.to_string(),
                vector,
            });
    }
}
