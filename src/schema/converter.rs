//! Schema Converter - input schema to the canonical (Spider-style) view
//!
//! The canonical view is the lingua franca between the converter and the
//! GAT ranker. Column indices assigned here are stable across conversion
//! and ranking.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::schema::model::DatabaseSchema;

/// Coarse column type class used by the ranker and the fallback rules
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ColumnClass {
    Number,
    Text,
    Time,
    Boolean,
    Others,
}

impl ColumnClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Number => "number",
            Self::Text => "text",
            Self::Time => "time",
            Self::Boolean => "boolean",
            Self::Others => "others",
        }
    }
}

/// Canonical schema view
///
/// `column_names_original[0]` is the sentinel `(-1, "*")`; all other
/// entries carry the index of their table in `table_names_original`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CanonicalSchema {
    pub db_id: String,
    pub table_names_original: Vec<String>,
    pub column_names_original: Vec<(i32, String)>,
    pub column_types: Vec<ColumnClass>,
    /// Indices into `column_names_original`
    pub primary_keys: Vec<usize>,
    /// `(child, parent)` pairs of indices into `column_names_original`
    pub foreign_keys: Vec<(usize, usize)>,
}

impl CanonicalSchema {
    /// Table name for a column index, if the column belongs to a table
    pub fn table_of_column(&self, col_idx: usize) -> Option<&str> {
        let (t_idx, _) = self.column_names_original.get(col_idx)?;
        if *t_idx < 0 {
            return None;
        }
        self.table_names_original
            .get(*t_idx as usize)
            .map(|s| s.as_str())
    }

    /// Qualified `table.column` name for a column index
    pub fn qualified_column(&self, col_idx: usize) -> Option<String> {
        let (_, name) = self.column_names_original.get(col_idx)?;
        let table = self.table_of_column(col_idx)?;
        Some(format!("{}.{}", table, name))
    }

    /// Find a column index by `(table, column)` name pair
    pub fn column_index(&self, table: &str, column: &str) -> Option<usize> {
        let t_idx = self
            .table_names_original
            .iter()
            .position(|t| t == table)? as i32;
        self.column_names_original
            .iter()
            .position(|(t, c)| *t == t_idx && c == column)
    }
}

pub struct SchemaConverter;

impl SchemaConverter {
    /// Convert the input schema to the canonical view.
    ///
    /// Pure and total over well-formed schemas: identical input produces
    /// identical output, ordering follows the insertion order of tables
    /// and columns. A foreign key referring to an unknown column is
    /// dropped with a warning.
    pub fn to_canonical(schema: &DatabaseSchema) -> CanonicalSchema {
        let mut table_names_original = Vec::with_capacity(schema.tables.len());
        let mut column_names_original = vec![(-1, "*".to_string())];
        let mut column_types = vec![ColumnClass::Text];
        let mut primary_keys = Vec::new();

        // (table_name, column_name) -> index into column_names_original
        let mut position = Vec::new();

        for (t_idx, table) in schema.tables.iter().enumerate() {
            table_names_original.push(table.name.clone());
            for col in &table.columns {
                let idx = column_names_original.len();
                position.push(((table.name.as_str(), col.name.as_str()), idx));
                column_names_original.push((t_idx as i32, col.name.clone()));
                column_types.push(classify_sql_type(&col.sql_type));
                if col.primary_key {
                    primary_keys.push(idx);
                }
            }
        }

        let lookup = |table: &str, column: &str| -> Option<usize> {
            position
                .iter()
                .find(|((t, c), _)| *t == table && *c == column)
                .map(|(_, idx)| *idx)
        };

        let mut foreign_keys = Vec::new();
        for table in &schema.tables {
            for fk in &table.foreign_keys {
                for (child_col, parent_col) in
                    fk.constrained_columns.iter().zip(fk.referred_columns.iter())
                {
                    match (
                        lookup(&table.name, child_col),
                        lookup(&fk.referred_table, parent_col),
                    ) {
                        (Some(child), Some(parent)) => foreign_keys.push((child, parent)),
                        _ => warn!(
                            table = %table.name,
                            column = %child_col,
                            referred_table = %fk.referred_table,
                            referred_column = %parent_col,
                            "dropping unresolvable foreign key"
                        ),
                    }
                }
            }
        }

        CanonicalSchema {
            db_id: schema.database.clone(),
            table_names_original,
            column_names_original,
            column_types,
            primary_keys,
            foreign_keys,
        }
    }
}

/// Classify a SQL type string into a coarse column class.
///
/// Size suffixes like `varchar(255)` are stripped before matching;
/// unrecognized types map to `others`.
pub fn classify_sql_type(sql_type: &str) -> ColumnClass {
    let base = sql_type
        .split('(')
        .next()
        .unwrap_or("")
        .trim()
        .to_lowercase();

    if base.starts_with("int")
        || base.starts_with("dec")
        || base.starts_with("num")
        || base == "float"
        || base == "double"
        || base == "real"
        || base == "bigint"
        || base == "smallint"
    {
        ColumnClass::Number
    } else if base.starts_with("date") || base.starts_with("time") || base == "year" {
        ColumnClass::Time
    } else if base.starts_with("bool") || base == "bit" {
        ColumnClass::Boolean
    } else if base == "varchar"
        || base == "char"
        || base == "text"
        || base == "enum"
        || base == "set"
        || base == "json"
        || base == "blob"
    {
        ColumnClass::Text
    } else {
        ColumnClass::Others
    }
}
