//! Query complexity analyzer
//!
//! Classifies a validated IR by counting structural features. Weights and
//! thresholds: joins x2, aggregates +5, CTEs x5, subqueries +10, GROUP BY
//! size x1, HAVING +3; cumulative score below 10 is simple, below 25
//! moderate, below 50 complex, else very complex.

use serde::Serialize;

use crate::ir::model::{Operand, QueryIr};

#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ComplexityLevel {
    Simple,
    Moderate,
    Complex,
    VeryComplex,
}

impl ComplexityLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::Moderate => "moderate",
            Self::Complex => "complex",
            Self::VeryComplex => "very_complex",
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct ComplexityMetrics {
    pub score: u32,
    pub level: ComplexityLevel,
    pub num_tables: usize,
    pub num_joins: usize,
    pub num_ctes: usize,
    pub has_aggregates: bool,
    pub has_subqueries: bool,
    pub group_by_size: usize,
    pub has_having: bool,
    pub warnings: Vec<String>,
}

pub struct ComplexityAnalyzer;

impl ComplexityAnalyzer {
    pub fn analyze(ir: &QueryIr) -> ComplexityMetrics {
        let num_joins = ir.joins.len();
        let num_ctes = ir.ctes.len();
        let num_tables = ir.tables_used().len();
        let has_aggregates = ir.has_aggregate_select();
        let has_subqueries = ir.select.iter().any(|e| e.contains_subquery())
            || ir.where_clause.iter().any(|p| {
                p.left.contains_subquery()
                    || match &p.right {
                        Some(Operand::One(e)) => e.contains_subquery(),
                        Some(Operand::Many(es)) => es.iter().any(|e| e.contains_subquery()),
                        None => false,
                    }
            });
        let group_by_size = ir.group_by.len();
        let has_having = !ir.having.is_empty();

        let mut score = 0u32;
        score += num_joins as u32 * 2;
        if has_aggregates {
            score += 5;
        }
        score += num_ctes as u32 * 5;
        if has_subqueries {
            score += 10;
        }
        score += group_by_size as u32;
        if has_having {
            score += 3;
        }

        let level = match score {
            0..=9 => ComplexityLevel::Simple,
            10..=24 => ComplexityLevel::Moderate,
            25..=49 => ComplexityLevel::Complex,
            _ => ComplexityLevel::VeryComplex,
        };

        let mut warnings = Vec::new();
        if num_tables >= 4 {
            warnings.push(format!(
                "query touches {} tables; consider splitting it into smaller queries",
                num_tables
            ));
        }
        if num_ctes >= 2 {
            warnings.push(format!(
                "query uses {} CTEs; the optimizer may struggle with deep nesting",
                num_ctes
            ));
        }

        ComplexityMetrics {
            score,
            level,
            num_tables,
            num_joins,
            num_ctes,
            has_aggregates,
            has_subqueries,
            group_by_size,
            has_having,
            warnings,
        }
    }

    /// Optimization suggestions derived from the metrics; appended to the
    /// response's suggested fixes.
    pub fn suggest_optimizations(metrics: &ComplexityMetrics) -> Vec<String> {
        let mut suggestions = Vec::new();
        if metrics.num_tables > 2 {
            suggestions
                .push("Consider adding indexes on JOIN columns for better performance".to_string());
        }
        if metrics.has_aggregates && metrics.num_tables > 3 {
            suggestions.push(
                "For frequently run aggregations, consider creating a materialized view"
                    .to_string(),
            );
        }
        if metrics.level == ComplexityLevel::VeryComplex {
            suggestions
                .push("Consider breaking this query into smaller, simpler queries".to_string());
        }
        if metrics.num_ctes > 2 {
            suggestions
                .push("Review CTEs; some may be candidates for temporary tables".to_string());
        }
        suggestions
    }
}
