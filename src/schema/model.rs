//! Input schema model
//!
//! The structured schema handed over by the ingestion collaborator. Tables
//! and columns keep their insertion order; the `version` field is a
//! deterministic 16-char fingerprint over the canonical JSON form.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ColumnDef {
    pub name: String,
    /// SQL type string as reported by the source database (e.g. "varchar(255)")
    #[serde(rename = "type")]
    pub sql_type: String,
    #[serde(default = "default_true")]
    pub nullable: bool,
    #[serde(default)]
    pub primary_key: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ForeignKeyDef {
    pub constrained_columns: Vec<String>,
    pub referred_table: String,
    pub referred_columns: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TableDef {
    pub name: String,
    pub columns: Vec<ColumnDef>,
    #[serde(default)]
    pub foreign_keys: Vec<ForeignKeyDef>,
    #[serde(default)]
    pub indexes: Vec<String>,
}

impl TableDef {
    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }
}

/// Flattened foreign-key relationship
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Relationship {
    pub from_table: String,
    pub from_columns: Vec<String>,
    pub to_table: String,
    pub to_columns: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct DatabaseSchema {
    pub database: String,
    /// Tables in insertion order
    pub tables: Vec<TableDef>,
    /// Flattened `(from_table, from_columns, to_table, to_columns)` tuples
    #[serde(default)]
    pub relationships: Vec<Relationship>,
    /// 16-char fingerprint; excluded from its own hash
    #[serde(default)]
    pub version: String,
}

impl DatabaseSchema {
    /// Build a schema from tables, deriving relationships and the fingerprint.
    pub fn new(database: impl Into<String>, tables: Vec<TableDef>) -> Self {
        let relationships = flatten_relationships(&tables);
        let mut schema = Self {
            database: database.into(),
            tables,
            relationships,
            version: String::new(),
        };
        schema.version = schema.fingerprint();
        schema
    }

    pub fn table(&self, name: &str) -> Option<&TableDef> {
        self.tables.iter().find(|t| t.name == name)
    }

    pub fn has_table(&self, name: &str) -> bool {
        self.table(name).is_some()
    }

    /// First 16 hex chars of SHA-256 over the canonical (sorted-key) JSON,
    /// with `version` cleared so the fingerprint does not feed itself.
    pub fn fingerprint(&self) -> String {
        let mut unversioned = self.clone();
        unversioned.version = String::new();
        let value = serde_json::to_value(&unversioned)
            .expect("schema serialization is infallible");
        let canonical = canonical_json(&value);
        let digest = Sha256::digest(canonical.as_bytes());
        let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
        hex[..16].to_string()
    }
}

fn flatten_relationships(tables: &[TableDef]) -> Vec<Relationship> {
    let mut out = Vec::new();
    for table in tables {
        for fk in &table.foreign_keys {
            out.push(Relationship {
                from_table: table.name.clone(),
                from_columns: fk.constrained_columns.clone(),
                to_table: fk.referred_table.clone(),
                to_columns: fk.referred_columns.clone(),
            });
        }
    }
    out
}

/// Serialize a JSON value with object keys sorted at every level.
/// Two semantically equal schemas produce byte-identical output.
fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::to_string(key).expect("string serialization"));
                out.push(':');
                write_canonical(&map[*key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        other => {
            out.push_str(&serde_json::to_string(other).expect("scalar serialization"));
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    /// E-commerce reference schema used across the test suite
    pub fn ecommerce_schema() -> DatabaseSchema {
        fn col(name: &str, sql_type: &str) -> ColumnDef {
            ColumnDef {
                name: name.to_string(),
                sql_type: sql_type.to_string(),
                nullable: true,
                primary_key: false,
            }
        }
        fn pk(name: &str, sql_type: &str) -> ColumnDef {
            ColumnDef {
                primary_key: true,
                nullable: false,
                ..col(name, sql_type)
            }
        }
        fn fk(cols: &[&str], table: &str, referred: &[&str]) -> ForeignKeyDef {
            ForeignKeyDef {
                constrained_columns: cols.iter().map(|s| s.to_string()).collect(),
                referred_table: table.to_string(),
                referred_columns: referred.iter().map(|s| s.to_string()).collect(),
            }
        }

        DatabaseSchema::new(
            "ecommerce",
            vec![
                TableDef {
                    name: "customers".to_string(),
                    columns: vec![
                        pk("customer_id", "int"),
                        col("name", "varchar(100)"),
                        col("email", "varchar(255)"),
                        col("join_date", "date"),
                        col("country", "varchar(64)"),
                        col("total_spent", "decimal(10,2)"),
                    ],
                    foreign_keys: vec![],
                    indexes: vec![],
                },
                TableDef {
                    name: "categories".to_string(),
                    columns: vec![
                        pk("category_id", "int"),
                        col("category_name", "varchar(100)"),
                        col("description", "text"),
                    ],
                    foreign_keys: vec![],
                    indexes: vec![],
                },
                TableDef {
                    name: "products".to_string(),
                    columns: vec![
                        pk("product_id", "int"),
                        col("product_name", "varchar(200)"),
                        col("category_id", "int"),
                        col("price", "decimal(10,2)"),
                        col("stock_quantity", "int"),
                    ],
                    foreign_keys: vec![fk(&["category_id"], "categories", &["category_id"])],
                    indexes: vec![],
                },
                TableDef {
                    name: "orders".to_string(),
                    columns: vec![
                        pk("order_id", "int"),
                        col("customer_id", "int"),
                        col("order_date", "datetime"),
                        col("status", "varchar(32)"),
                        col("total_amount", "decimal(10,2)"),
                    ],
                    foreign_keys: vec![fk(&["customer_id"], "customers", &["customer_id"])],
                    indexes: vec![],
                },
                TableDef {
                    name: "order_items".to_string(),
                    columns: vec![
                        pk("order_item_id", "int"),
                        col("order_id", "int"),
                        col("product_id", "int"),
                        col("quantity", "int"),
                        col("unit_price", "decimal(10,2)"),
                    ],
                    foreign_keys: vec![
                        fk(&["order_id"], "orders", &["order_id"]),
                        fk(&["product_id"], "products", &["product_id"]),
                    ],
                    indexes: vec![],
                },
            ],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::ecommerce_schema;
    use super::*;

    #[test]
    fn fingerprint_is_16_hex_chars() {
        let schema = ecommerce_schema();
        assert_eq!(schema.version.len(), 16);
        assert!(schema.version.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn fingerprint_is_deterministic_across_reserialization() {
        let schema = ecommerce_schema();
        let json = serde_json::to_string(&schema).unwrap();
        let reparsed: DatabaseSchema = serde_json::from_str(&json).unwrap();
        assert_eq!(schema.fingerprint(), reparsed.fingerprint());
    }

    #[test]
    fn fingerprint_changes_when_schema_changes() {
        let schema = ecommerce_schema();
        let mut altered = schema.clone();
        altered.tables[0].columns.push(ColumnDef {
            name: "phone".to_string(),
            sql_type: "varchar(20)".to_string(),
            nullable: true,
            primary_key: false,
        });
        assert_ne!(schema.fingerprint(), altered.fingerprint());
    }

    #[test]
    fn fingerprint_ignores_stored_version() {
        let mut schema = ecommerce_schema();
        let original = schema.fingerprint();
        schema.version = "bogus".to_string();
        assert_eq!(schema.fingerprint(), original);
    }

    #[test]
    fn relationships_are_flattened_from_foreign_keys() {
        let schema = ecommerce_schema();
        assert_eq!(schema.relationships.len(), 4);
        let orders_rel = schema
            .relationships
            .iter()
            .find(|r| r.from_table == "orders")
            .unwrap();
        assert_eq!(orders_rel.to_table, "customers");
        assert_eq!(orders_rel.from_columns, vec!["customer_id"]);
    }
}
