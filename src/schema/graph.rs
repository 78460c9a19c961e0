//! In-memory schema graph derived from the canonical view
//!
//! Nodes: one global node (index 0), one node per table, one node per
//! column plus an implicit star column per table. Edges are stored
//! directed in both directions so the GAT can treat them as undirected.

use crate::schema::converter::{CanonicalSchema, ColumnClass};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeKind {
    Global,
    Table,
    Column,
}

#[derive(Clone, Debug)]
pub struct GraphNode {
    /// Stable identifier: `"global"`, `"table:T"`, or `"column:T.C"`
    pub node_id: String,
    pub kind: NodeKind,
    /// Text fed to the sentence encoder: `"global"`, `T`, or `"T.C (type)"`
    pub text: String,
    /// Sparse indicator `[is_global, is_table, is_column, is_pk, is_fk]`
    pub features: [f32; 5],
    pub col_type: Option<ColumnClass>,
}

pub struct SchemaGraph {
    pub nodes: Vec<GraphNode>,
    /// Directed `(src, dst)` pairs; every undirected edge appears twice
    pub edges: Vec<(usize, usize)>,
}

impl SchemaGraph {
    /// Build the graph for a canonical schema.
    pub fn build(canonical: &CanonicalSchema) -> Self {
        let mut nodes = Vec::new();
        let mut edges = Vec::new();

        nodes.push(GraphNode {
            node_id: "global".to_string(),
            kind: NodeKind::Global,
            text: "global".to_string(),
            features: [1.0, 0.0, 0.0, 0.0, 0.0],
            col_type: None,
        });
        let global_idx = 0;

        let pk_set: std::collections::HashSet<usize> =
            canonical.primary_keys.iter().copied().collect();
        let fk_children: std::collections::HashSet<usize> =
            canonical.foreign_keys.iter().map(|(c, _)| *c).collect();

        // Table nodes, bidirectionally linked to the global node
        let mut table_node_idx = Vec::with_capacity(canonical.table_names_original.len());
        for table in &canonical.table_names_original {
            let idx = nodes.len();
            table_node_idx.push(idx);
            nodes.push(GraphNode {
                node_id: format!("table:{}", table),
                kind: NodeKind::Table,
                text: table.clone(),
                features: [0.0, 1.0, 0.0, 0.0, 0.0],
                col_type: None,
            });
            edges.push((global_idx, idx));
            edges.push((idx, global_idx));
        }

        // Implicit star column per table
        for (t_idx, table) in canonical.table_names_original.iter().enumerate() {
            let idx = nodes.len();
            nodes.push(GraphNode {
                node_id: format!("column:{}.*", table),
                kind: NodeKind::Column,
                text: format!("{}.*", table),
                features: [0.0, 0.0, 1.0, 0.0, 0.0],
                col_type: None,
            });
            edges.push((table_node_idx[t_idx], idx));
            edges.push((idx, table_node_idx[t_idx]));
            edges.push((global_idx, idx));
            edges.push((idx, global_idx));
        }

        // Real column nodes, linked to their table and to the global node
        let mut col_node_idx = vec![None; canonical.column_names_original.len()];
        for (c_idx, (t_idx, name)) in canonical.column_names_original.iter().enumerate() {
            if *t_idx < 0 {
                continue;
            }
            let table = &canonical.table_names_original[*t_idx as usize];
            let col_type = canonical.column_types[c_idx];
            let is_pk = if pk_set.contains(&c_idx) { 1.0 } else { 0.0 };
            let is_fk = if fk_children.contains(&c_idx) { 1.0 } else { 0.0 };

            let idx = nodes.len();
            col_node_idx[c_idx] = Some(idx);
            nodes.push(GraphNode {
                node_id: format!("column:{}.{}", table, name),
                kind: NodeKind::Column,
                text: format!("{}.{} ({})", table, name, col_type.as_str()),
                features: [0.0, 0.0, 1.0, is_pk, is_fk],
                col_type: Some(col_type),
            });
            let t_node = table_node_idx[*t_idx as usize];
            edges.push((t_node, idx));
            edges.push((idx, t_node));
            edges.push((global_idx, idx));
            edges.push((idx, global_idx));
        }

        // Foreign-key edges between column nodes
        for (child, parent) in &canonical.foreign_keys {
            if let (Some(a), Some(b)) = (col_node_idx[*child], col_node_idx[*parent]) {
                edges.push((a, b));
                edges.push((b, a));
            }
        }

        Self { nodes, edges }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::converter::SchemaConverter;
    use crate::schema::model::fixtures::ecommerce_schema;

    #[test]
    fn graph_has_global_tables_and_columns() {
        let canonical = SchemaConverter::to_canonical(&ecommerce_schema());
        let graph = SchemaGraph::build(&canonical);

        // 1 global + 5 tables + 5 star columns + 24 real columns
        assert_eq!(graph.node_count(), 1 + 5 + 5 + 24);
        assert_eq!(graph.nodes[0].node_id, "global");
        assert!(graph
            .nodes
            .iter()
            .any(|n| n.node_id == "table:customers"));
        assert!(graph
            .nodes
            .iter()
            .any(|n| n.node_id == "column:orders.customer_id"));
        assert!(graph.nodes.iter().any(|n| n.node_id == "column:orders.*"));
    }

    #[test]
    fn edges_are_symmetric() {
        let canonical = SchemaConverter::to_canonical(&ecommerce_schema());
        let graph = SchemaGraph::build(&canonical);
        for (src, dst) in &graph.edges {
            assert!(
                graph.edges.contains(&(*dst, *src)),
                "edge ({}, {}) has no reverse",
                src,
                dst
            );
        }
    }

    #[test]
    fn fk_columns_carry_the_fk_flag() {
        let canonical = SchemaConverter::to_canonical(&ecommerce_schema());
        let graph = SchemaGraph::build(&canonical);
        let node = graph
            .nodes
            .iter()
            .find(|n| n.node_id == "column:orders.customer_id")
            .unwrap();
        assert_eq!(node.features[4], 1.0);

        let pk_node = graph
            .nodes
            .iter()
            .find(|n| n.node_id == "column:customers.customer_id")
            .unwrap();
        assert_eq!(pk_node.features[3], 1.0);
    }

    #[test]
    fn column_node_text_includes_type_class() {
        let canonical = SchemaConverter::to_canonical(&ecommerce_schema());
        let graph = SchemaGraph::build(&canonical);
        let node = graph
            .nodes
            .iter()
            .find(|n| n.node_id == "column:customers.total_spent")
            .unwrap();
        assert_eq!(node.text, "customers.total_spent (number)");
    }
}
