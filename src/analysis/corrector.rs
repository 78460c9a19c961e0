//! SQL corrector - post-compilation hint scan
//!
//! Scans the compiled SQL together with its IR for high-signal issues and
//! attaches hints. It never rewrites the SQL and never blocks a response;
//! by the time this runs the validator has already accepted the IR, so
//! everything here is advisory.

use std::collections::HashSet;

use crate::ir::model::{Expression, QueryIr};
use crate::schema::model::DatabaseSchema;

pub struct SqlCorrector;

impl SqlCorrector {
    /// Returns advisory hints for the caller's `suggested_fixes`.
    pub fn review(_sql: &str, ir: &QueryIr, schema: &DatabaseSchema) -> Vec<String> {
        let mut hints = Vec::new();

        if ir.limit.is_some() && ir.order_by.is_empty() {
            hints.push(
                "LIMIT without ORDER BY may return a different row set on each run; \
                 add an ORDER BY clause for deterministic results"
                    .to_string(),
            );
        }

        if !ir.joins.is_empty() {
            let ambiguous = ambiguous_unqualified_columns(ir, schema);
            if !ambiguous.is_empty() {
                hints.push(format!(
                    "unqualified column(s) {} exist in more than one joined table; \
                     qualify them with a table name",
                    ambiguous.join(", ")
                ));
            }
        }

        // Defense in depth behind the validator
        let has_aggregate = ir.has_aggregate_select();
        let has_plain_column = ir
            .select
            .iter()
            .any(|e| matches!(e, Expression::Column { .. }));
        if has_aggregate && has_plain_column && ir.group_by.is_empty() {
            hints.push(
                "aggregates are mixed with plain columns but no GROUP BY is present".to_string(),
            );
        }

        hints
    }
}

/// Unqualified SELECT columns whose name exists in two or more of the
/// tables this query joins.
fn ambiguous_unqualified_columns(ir: &QueryIr, schema: &DatabaseSchema) -> Vec<String> {
    let tables = ir.tables_used();

    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for expr in &ir.select {
        if let Expression::Column { value, .. } = expr {
            if value.contains('.') || value == "*" {
                continue;
            }
            let holders = tables
                .iter()
                .filter(|t| {
                    schema
                        .table(t)
                        .map(|def| def.has_column(value))
                        .unwrap_or(false)
                })
                .count();
            if holders > 1 && seen.insert(value.clone()) {
                out.push(format!("'{}'", value));
            }
        }
    }
    out
}
