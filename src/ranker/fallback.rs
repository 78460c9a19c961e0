//! Intelligent fallback - structural augmentation of the ranker's top-K
//!
//! The GAT scores nodes semantically; this pass adds nodes that are
//! structurally necessary for an executable query but easy for the model
//! to miss: FK join paths, the numeric/time columns a calculation needs,
//! and grouping dimensions. Fully automatic, no domain configuration.

use std::collections::{BTreeSet, HashMap};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::ranker::service::RankedNode;
use crate::schema::converter::{CanonicalSchema, ColumnClass};

static DURATION_MARKERS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(duration|length|stay|period|interval|days|hours|time)\b").unwrap()
});
static AGGREGATION_MARKERS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(average|avg|sum|total|count|mean|median|min|max)\b").unwrap()
});
static GROUPING_MARKERS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(per|by|each|group|categor)").unwrap());
static DIMENSION_NAMES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(name|title|type|category|label|department)").unwrap());

const SCORE_FK_CLOSURE: f64 = 0.88;
const SCORE_CALCULATION: f64 = 0.84;
const SCORE_DIMENSION: f64 = 0.82;
const SCORE_JOIN_KEY: f64 = 0.80;

pub struct IntelligentFallback;

impl IntelligentFallback {
    /// Augment the ranker's top-K with structurally necessary nodes.
    /// The result is always a superset of the input; original scores are
    /// retained and augmented nodes carry a reason tag.
    pub fn augment(
        question: &str,
        canonical: &CanonicalSchema,
        ranked: Vec<RankedNode>,
    ) -> Vec<RankedNode> {
        let mut set = NodeSet::new(ranked);
        let fks = resolve_foreign_keys(canonical);

        // Rule 1: FK closure over every table currently in the set
        let initial_tables: BTreeSet<String> = set.tables().collect();
        for table in &initial_tables {
            for fk in &fks {
                let peer = if &fk.child_table == table {
                    Some(&fk.parent_table)
                } else if &fk.parent_table == table {
                    Some(&fk.child_table)
                } else {
                    None
                };
                if let Some(peer) = peer {
                    set.add_table(peer, SCORE_FK_CLOSURE, "fk_closure");
                    set.add_column(&fk.child_table, &fk.child_column, SCORE_FK_CLOSURE, "fk_closure");
                    set.add_column(&fk.parent_table, &fk.parent_column, SCORE_FK_CLOSURE, "fk_closure");
                }
            }
        }

        // Rule 2: calculation columns driven by question markers
        let wants_duration = DURATION_MARKERS.is_match(question);
        let wants_aggregation = AGGREGATION_MARKERS.is_match(question);
        if wants_duration || wants_aggregation {
            let tables: BTreeSet<String> = set.tables().collect();
            for (c_idx, (t_idx, name)) in canonical.column_names_original.iter().enumerate() {
                if *t_idx < 0 {
                    continue;
                }
                let table = &canonical.table_names_original[*t_idx as usize];
                if !tables.contains(table) {
                    continue;
                }
                let class = canonical.column_types[c_idx];
                if wants_duration && class == ColumnClass::Time {
                    set.add_column(table, name, SCORE_CALCULATION, "calculation_column");
                }
                if wants_aggregation && class == ColumnClass::Number {
                    set.add_column(table, name, SCORE_CALCULATION, "calculation_column");
                }
            }
        }

        // Rule 3: grouping dimensions and join keys between in-set tables
        if GROUPING_MARKERS.is_match(question) {
            let tables: BTreeSet<String> = set.tables().collect();
            for table in &tables {
                if let Some(dim) = pick_dimension_column(canonical, table) {
                    set.add_column(table, &dim, SCORE_DIMENSION, "grouping_dimension");
                }
            }
        }
        let tables: BTreeSet<String> = set.tables().collect();
        for fk in &fks {
            if tables.contains(&fk.child_table) && tables.contains(&fk.parent_table) {
                set.add_column(&fk.child_table, &fk.child_column, SCORE_JOIN_KEY, "join_key");
                set.add_column(&fk.parent_table, &fk.parent_column, SCORE_JOIN_KEY, "join_key");
            }
        }

        set.into_ranked()
    }
}

/// Foreign key resolved to table/column names
struct NamedForeignKey {
    child_table: String,
    child_column: String,
    parent_table: String,
    parent_column: String,
}

fn resolve_foreign_keys(canonical: &CanonicalSchema) -> Vec<NamedForeignKey> {
    canonical
        .foreign_keys
        .iter()
        .filter_map(|(child, parent)| {
            let (ct, cc) = split_column(canonical, *child)?;
            let (pt, pc) = split_column(canonical, *parent)?;
            Some(NamedForeignKey {
                child_table: ct,
                child_column: cc,
                parent_table: pt,
                parent_column: pc,
            })
        })
        .collect()
}

fn split_column(canonical: &CanonicalSchema, idx: usize) -> Option<(String, String)> {
    let (t_idx, name) = canonical.column_names_original.get(idx)?;
    if *t_idx < 0 {
        return None;
    }
    Some((
        canonical.table_names_original[*t_idx as usize].clone(),
        name.clone(),
    ))
}

/// One textual "dimension" column per table: a name matching the usual
/// dimension words, else the first text column.
fn pick_dimension_column(canonical: &CanonicalSchema, table: &str) -> Option<String> {
    let t_idx = canonical
        .table_names_original
        .iter()
        .position(|t| t == table)? as i32;

    let mut first_text = None;
    for (c_idx, (t, name)) in canonical.column_names_original.iter().enumerate() {
        if *t != t_idx {
            continue;
        }
        if DIMENSION_NAMES.is_match(name) {
            return Some(name.clone());
        }
        if first_text.is_none() && canonical.column_types[c_idx] == ColumnClass::Text {
            first_text = Some(name.clone());
        }
    }
    first_text
}

/// Ordered node set that preserves original scores and insertion order
struct NodeSet {
    nodes: Vec<RankedNode>,
    index: HashMap<String, usize>,
}

impl NodeSet {
    fn new(ranked: Vec<RankedNode>) -> Self {
        let mut index = HashMap::new();
        for (i, node) in ranked.iter().enumerate() {
            index.insert(node.node_id.clone(), i);
        }
        Self { nodes: ranked, index }
    }

    fn tables(&self) -> impl Iterator<Item = String> + '_ {
        self.nodes.iter().filter_map(|n| {
            if let Some(t) = n.node_id.strip_prefix("table:") {
                Some(t.to_string())
            } else {
                n.node_id
                    .strip_prefix("column:")
                    .and_then(|rest| rest.split('.').next())
                    .map(|t| t.to_string())
            }
        })
    }

    fn add(&mut self, node_id: String, score: f64, reason: &str) {
        if self.index.contains_key(&node_id) {
            return;
        }
        self.index.insert(node_id.clone(), self.nodes.len());
        self.nodes.push(RankedNode {
            node_id,
            score,
            reason: Some(reason.to_string()),
        });
    }

    fn add_table(&mut self, table: &str, score: f64, reason: &str) {
        self.add(format!("table:{}", table), score, reason);
    }

    fn add_column(&mut self, table: &str, column: &str, score: f64, reason: &str) {
        self.add(format!("column:{}.{}", table, column), score, reason);
    }

    fn into_ranked(mut self) -> Vec<RankedNode> {
        self.nodes.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        self.nodes
    }
}
