//! Schema node scoring service
//!
//! Wires the sentence encoders, the schema graph, and the GAT forward
//! pass together. The ranker is strictly best-effort: missing weights,
//! a shape mismatch, or an encoder failure all degrade to "no pruning"
//! rather than failing the pipeline.

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::RankerConfig;
use crate::embedding::SentenceEncoder;
use crate::ranker::gat::GatModel;
use crate::ranker::weights;
use crate::schema::converter::CanonicalSchema;
use crate::schema::graph::SchemaGraph;

/// One scored schema node
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct RankedNode {
    /// `"table:T"` or `"column:T.C"`
    pub node_id: String,
    pub score: f64,
    /// Set on fallback-augmented nodes; absent on model-scored nodes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

pub struct SchemaRanker {
    model: Option<GatModel>,
    node_encoder: Arc<dyn SentenceEncoder>,
    question_encoder: Arc<dyn SentenceEncoder>,
    top_k: usize,
}

impl SchemaRanker {
    /// Load the ranker from config. Weight problems disable the ranker
    /// with a warning; they never propagate as errors.
    pub fn new(
        config: &RankerConfig,
        node_encoder: Arc<dyn SentenceEncoder>,
        question_encoder: Arc<dyn SentenceEncoder>,
    ) -> Self {
        let model = match &config.weights_path {
            Some(path) => {
                match weights::load_state_dict(Path::new(path), node_encoder.dim()) {
                    Ok(model) => {
                        info!(
                            hidden = model.hidden_dim(),
                            question_dim = model.question_dim,
                            "GAT ranker loaded"
                        );
                        if model.question_dim != question_encoder.dim() {
                            warn!(
                                weights = model.question_dim,
                                encoder = question_encoder.dim(),
                                "question encoder width does not match trained weights; ranker disabled"
                            );
                            None
                        } else {
                            Some(model)
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "failed to load GAT weights; ranker disabled");
                        None
                    }
                }
            }
            None => {
                info!("no GAT weights configured; schema pruning disabled");
                None
            }
        };

        Self {
            model,
            node_encoder,
            question_encoder,
            top_k: config.top_k,
        }
    }

    /// Construct with an already-built model (tests, embedded weights).
    pub fn with_model(
        model: GatModel,
        node_encoder: Arc<dyn SentenceEncoder>,
        question_encoder: Arc<dyn SentenceEncoder>,
        top_k: usize,
    ) -> Self {
        Self {
            model: Some(model),
            node_encoder,
            question_encoder,
            top_k,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.model.is_some()
    }

    /// Score all schema nodes against the question and return the top-K
    /// by descending score (ties broken by node index). Returns `None`
    /// when the ranker is disabled, which the orchestrator treats as
    /// "use the full schema".
    pub fn score_nodes(&self, question: &str, canonical: &CanonicalSchema) -> Option<Vec<RankedNode>> {
        let model = self.model.as_ref()?;

        let graph = SchemaGraph::build(canonical);
        debug!(
            nodes = graph.node_count(),
            edges = graph.edges.len(),
            "scoring schema graph"
        );

        // Batch-encode node texts, then concatenate sparse + dense features
        let texts: Vec<&str> = graph.nodes.iter().map(|n| n.text.as_str()).collect();
        let embeddings = self.node_encoder.encode_batch(&texts);

        let mut features = Vec::with_capacity(graph.nodes.len());
        for (node, emb) in graph.nodes.iter().zip(&embeddings) {
            if emb.len() != self.node_encoder.dim() {
                warn!("node encoder returned wrong dimension; skipping pruning");
                return None;
            }
            let mut x = Vec::with_capacity(5 + emb.len());
            x.extend_from_slice(&node.features);
            x.extend_from_slice(emb);
            features.push(x);
        }

        let question_emb = self.question_encoder.encode(question);
        if question_emb.len() != model.question_dim {
            warn!("question encoder returned wrong dimension; skipping pruning");
            return None;
        }

        let scores = model.forward(&features, &graph.edges, &question_emb);

        // Descending score, ties by node index; global node is excluded
        let mut order: Vec<usize> = (0..scores.len()).collect();
        order.sort_by(|&a, &b| {
            scores[b]
                .partial_cmp(&scores[a])
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.cmp(&b))
        });

        let ranked: Vec<RankedNode> = order
            .into_iter()
            .filter(|&idx| graph.nodes[idx].node_id != "global")
            .take(self.top_k)
            .map(|idx| RankedNode {
                node_id: graph.nodes[idx].node_id.clone(),
                score: scores[idx] as f64,
                reason: None,
            })
            .collect();

        debug!(returned = ranked.len(), "GAT ranking complete");
        Some(ranked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashingEncoder;
    use crate::ranker::weights::test_support::small_state_dict;
    use crate::schema::converter::SchemaConverter;
    use crate::schema::model::fixtures::ecommerce_schema;

    fn test_ranker(top_k: usize) -> SchemaRanker {
        let node_encoder = Arc::new(HashingEncoder::new(16));
        let question_encoder = Arc::new(HashingEncoder::new(12));
        let dict = small_state_dict(8, 16, 12);
        let model = crate::ranker::weights::parse_state_dict(&dict, 16).unwrap();
        SchemaRanker::with_model(model, node_encoder, question_encoder, top_k)
    }

    #[test]
    fn scores_are_in_unit_interval() {
        let ranker = test_ranker(50);
        let canonical = SchemaConverter::to_canonical(&ecommerce_schema());
        let ranked = ranker.score_nodes("top customers by spend", &canonical).unwrap();
        assert!(!ranked.is_empty());
        for node in &ranked {
            assert!((0.0..=1.0).contains(&node.score));
        }
    }

    #[test]
    fn respects_top_k() {
        let ranker = test_ranker(5);
        let canonical = SchemaConverter::to_canonical(&ecommerce_schema());
        let ranked = ranker.score_nodes("orders", &canonical).unwrap();
        assert_eq!(ranked.len(), 5);
    }

    #[test]
    fn global_node_never_returned() {
        let ranker = test_ranker(100);
        let canonical = SchemaConverter::to_canonical(&ecommerce_schema());
        let ranked = ranker.score_nodes("anything", &canonical).unwrap();
        assert!(ranked.iter().all(|n| n.node_id != "global"));
    }

    #[test]
    fn ranking_is_sorted_descending() {
        let ranker = test_ranker(50);
        let canonical = SchemaConverter::to_canonical(&ecommerce_schema());
        let ranked = ranker
            .score_nodes("average product price per category", &canonical)
            .unwrap();
        for pair in ranked.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[test]
    fn disabled_ranker_returns_none() {
        let config = RankerConfig {
            weights_path: None,
            top_k: 25,
            forward_timeout_ms: 5000,
        };
        let ranker = SchemaRanker::new(
            &config,
            Arc::new(HashingEncoder::new(16)),
            Arc::new(HashingEncoder::new(12)),
        );
        assert!(!ranker.is_enabled());
        let canonical = SchemaConverter::to_canonical(&ecommerce_schema());
        assert!(ranker.score_nodes("anything", &canonical).is_none());
    }

    #[test]
    fn bad_weights_path_disables_ranker() {
        let config = RankerConfig {
            weights_path: Some("/definitely/not/here.json".to_string()),
            top_k: 25,
            forward_timeout_ms: 5000,
        };
        let ranker = SchemaRanker::new(
            &config,
            Arc::new(HashingEncoder::new(16)),
            Arc::new(HashingEncoder::new(12)),
        );
        assert!(!ranker.is_enabled());
    }
}
