//! Prompt assembly
//!
//! Builds the single text prompt the LLM sees: a pruned (or compact)
//! schema rendering, optional RAG examples, optional conversation
//! context, the resolved question, and a strict description of the IR
//! JSON shape. Pure functions; identical inputs produce identical bytes.

use std::collections::HashSet;

use crate::ir::validator::ValidationError;
use crate::ranker::service::RankedNode;
use crate::schema::model::{DatabaseSchema, TableDef};

/// Render only the tables and columns surfaced by the ranker/fallback,
/// one `CREATE TABLE` line per table in schema order.
pub fn render_pruned_schema(
    schema: &DatabaseSchema,
    nodes: &[RankedNode],
    max_columns_per_table: usize,
) -> String {
    let mut tables_in_set: HashSet<&str> = HashSet::new();
    let mut columns_in_set: HashSet<(&str, &str)> = HashSet::new();
    let mut star_tables: HashSet<&str> = HashSet::new();

    for node in nodes {
        if let Some(table) = node.node_id.strip_prefix("table:") {
            tables_in_set.insert(table);
        } else if let Some(rest) = node.node_id.strip_prefix("column:") {
            if let Some((table, column)) = rest.split_once('.') {
                tables_in_set.insert(table);
                if column == "*" {
                    star_tables.insert(table);
                } else {
                    columns_in_set.insert((table, column));
                }
            }
        }
    }

    let mut lines = Vec::new();
    for table in &schema.tables {
        if !tables_in_set.contains(table.name.as_str()) {
            continue;
        }
        let selected: Vec<&str> = table
            .columns
            .iter()
            .filter(|c| columns_in_set.contains(&(table.name.as_str(), c.name.as_str())))
            .map(|c| c.name.as_str())
            .collect();

        let columns: Vec<String> = if star_tables.contains(table.name.as_str()) {
            table
                .columns
                .iter()
                .map(|c| format!("{} {}", c.name, c.sql_type.to_uppercase()))
                .collect()
        } else if selected.is_empty() {
            // Table surfaced without specific columns: show the structural core
            important_columns(schema, table, max_columns_per_table)
                .into_iter()
                .map(|c| format!("{} {}", c.name, c.sql_type.to_uppercase()))
                .collect()
        } else {
            table
                .columns
                .iter()
                .filter(|c| selected.contains(&c.name.as_str()))
                .map(|c| format!("{} {}", c.name, c.sql_type.to_uppercase()))
                .collect()
        };

        lines.push(format!("CREATE TABLE {} ({});", table.name, columns.join(", ")));
    }
    lines.join("\n")
}

/// Full-schema fallback when no ranker output is available: every table,
/// at most `max_columns_per_table` columns, PK/FK columns first.
pub fn render_compact_schema(schema: &DatabaseSchema, max_columns_per_table: usize) -> String {
    let mut lines = vec![format!("Database: {}", schema.database)];
    for table in &schema.tables {
        let shown = important_columns(schema, table, max_columns_per_table);
        let mut names: Vec<String> = shown.iter().map(|c| c.name.clone()).collect();
        let hidden = table.columns.len().saturating_sub(shown.len());
        if hidden > 0 {
            names.push(format!("... (+{} more)", hidden));
        }
        lines.push(format!("- {}: {}", table.name, names.join(", ")));
    }
    lines.join("\n")
}

/// Up to `max` columns of a table, primary-key and foreign-key columns
/// first, then the remaining columns in schema order.
fn important_columns<'a>(
    schema: &'a DatabaseSchema,
    table: &'a TableDef,
    max: usize,
) -> Vec<&'a crate::schema::model::ColumnDef> {
    let mut key_columns: HashSet<&str> = HashSet::new();
    for fk in &table.foreign_keys {
        for c in &fk.constrained_columns {
            key_columns.insert(c.as_str());
        }
    }
    for other in &schema.tables {
        for fk in &other.foreign_keys {
            if fk.referred_table == table.name {
                for c in &fk.referred_columns {
                    key_columns.insert(c.as_str());
                }
            }
        }
    }

    let mut out: Vec<&crate::schema::model::ColumnDef> = table
        .columns
        .iter()
        .filter(|c| c.primary_key || key_columns.contains(c.name.as_str()))
        .collect();
    for c in &table.columns {
        if out.len() >= max {
            break;
        }
        if !out.iter().any(|existing| existing.name == c.name) {
            out.push(c);
        }
    }
    out.truncate(max);
    out
}

/// Structural description of the IR JSON. Field names are literal; the
/// rules mirror exactly what the sanitizer and validator accept.
const IR_SHAPE: &str = r#"CRITICAL: Use EXACT field names as specified below.

JSON Structure:
{
  "select": [{"type": "column", "value": "table.column", "alias": "..."}],
  "from_table": "table_name",
  "joins": [{"type": "INNER", "table": "table_name", "on": [{"left": {"type": "column", "value": "..."}, "operator": "=", "right": {"type": "column", "value": "..."}}]}],
  "where": [{"left": {"type": "column", "value": "..."}, "operator": "=", "right": {"type": "literal", "value": ...}}],
  "group_by": ["table.column"],
  "having": [],
  "order_by": [{"column": "table.column", "direction": "ASC"}],
  "limit": 10,
  "ctes": [{"name": "cte_name", "query": {...}}],
  "confidence": 0.9,
  "ambiguities": [],
  "questions": []
}

Rules:
- select items MUST be objects with 'type' and 'value' fields, never bare strings
- expression types: column, literal, function, aggregate, window, subquery
- aggregates use type='aggregate' with 'function' and 'args', e.g. COUNT(*) is
  {"type": "aggregate", "function": "COUNT", "args": [{"type": "column", "value": "*"}]}
- joins MUST use 'type', 'table', 'on' (not 'join_type', 'target_table', 'condition')
- join type must be one of: INNER, LEFT, RIGHT, FULL, CROSS
- order_by MUST use 'column' and 'direction' (not 'field' or 'col'); direction is ASC or DESC
- if ORDER BY uses an aggregate like COUNT(*), that aggregate MUST also appear in select
- when aggregates are selected, every non-aggregate select column MUST appear in group_by
- ctes MUST use 'name' and 'query' (not 'cte_name' or 'cte_definition')
- operators: =, !=, <, <=, >, >=, IN, NOT IN, LIKE, NOT LIKE, BETWEEN, IS NULL, IS NOT NULL
- literal values go in 'right' as {"type": "literal", "value": ...}
- set 'confidence' between 0 and 1; list genuine ambiguities and clarification questions"#;

/// Assemble the full IR-generation prompt.
pub fn build_ir_prompt(
    schema_text: &str,
    question: &str,
    rag_examples: &[(String, String)],
    context_block: &str,
) -> String {
    let mut parts = vec![
        "You are an expert NL2SQL assistant. Convert the user's question into a JSON \
         Intermediate Representation (IR) of a SELECT query."
            .to_string(),
        String::new(),
        "Return ONLY valid JSON. Do not include explanations.".to_string(),
        String::new(),
        "Schema:".to_string(),
        schema_text.to_string(),
    ];

    if !rag_examples.is_empty() {
        parts.push(String::new());
        parts.push("Similar past queries (for reference):".to_string());
        for (i, (q, sql)) in rag_examples.iter().enumerate() {
            parts.push(format!("{}. Q: {}", i + 1, q));
            parts.push(format!("   SQL: {}", sql));
        }
    }

    if !context_block.is_empty() {
        parts.push(String::new());
        parts.push(context_block.to_string());
    }

    parts.push(String::new());
    parts.push("User Question:".to_string());
    parts.push(question.to_string());
    parts.push(String::new());
    parts.push(IR_SHAPE.to_string());

    parts.join("\n")
}

/// One-shot correction prompt carrying the validator diagnostics.
pub fn build_correction_prompt(
    base_prompt: &str,
    previous_ir_json: &str,
    diagnostics: &[ValidationError],
) -> String {
    let mut parts = vec![
        base_prompt.to_string(),
        String::new(),
        "Your previous answer was structurally invalid:".to_string(),
        previous_ir_json.to_string(),
        String::new(),
        "Problems found:".to_string(),
    ];
    for (i, d) in diagnostics.iter().enumerate() {
        parts.push(format!("{}. [{}] {} (at {})", i + 1, d.kind.as_str(), d.message, d.path));
    }
    parts.push(String::new());
    parts.push("Return a corrected JSON IR that fixes every problem above. Return ONLY valid JSON.".to_string());
    parts.join("\n")
}

/// Nudge appended when the provider returned something that was not JSON.
pub const JSON_RETRY_NUDGE: &str =
    "\n\nIMPORTANT: The previous response was not valid JSON. Return ONLY a single valid JSON object, with no prose and no markdown fences.";
