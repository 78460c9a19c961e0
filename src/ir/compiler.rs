//! IR to SQL compiler
//!
//! Deterministic compilation of a validated IR into a parameterized SQL
//! string plus an ordered binding map. Every literal goes through the
//! binding map as a `:p_k` placeholder; the compiler never interpolates
//! values into the SQL text.

use serde::ser::SerializeMap;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::ir::model::{Expression, JoinType, Operand, Operator, OrderKey, Predicate, QueryIr};

#[derive(Error, Debug, Clone)]
pub enum CompileError {
    /// Should be unreachable on a validated IR
    #[error("cannot compile IR: {0}")]
    Unsupported(String),
}

/// Ordered placeholder bindings, `p_0`, `p_1`, … in encounter order
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Params {
    entries: Vec<(String, Value)>,
}

impl Params {
    fn bind(&mut self, value: Value) -> String {
        let name = format!("p_{}", self.entries.len());
        self.entries.push((name.clone(), value));
        format!(":{}", name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }
}

impl Serialize for Params {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, value) in &self.entries {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Identifier quoting per target dialect
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Dialect {
    /// Backtick quoting
    #[default]
    MySql,
    /// Double-quote quoting
    Ansi,
}

impl Dialect {
    fn quote_char(&self) -> char {
        match self {
            Self::MySql => '`',
            Self::Ansi => '"',
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SqlCompiler {
    dialect: Dialect,
}

impl SqlCompiler {
    pub fn new(dialect: Dialect) -> Self {
        Self { dialect }
    }

    /// Compile a validated IR. Same IR and dialect produce byte-identical
    /// SQL and placeholder ordering.
    pub fn compile(&self, ir: &QueryIr) -> Result<(String, Params), CompileError> {
        let mut params = Params::default();
        let sql = self.compile_query(ir, &mut params)?;
        Ok((sql, params))
    }

    fn compile_query(&self, ir: &QueryIr, params: &mut Params) -> Result<String, CompileError> {
        let mut parts: Vec<String> = Vec::new();

        if !ir.ctes.is_empty() {
            let mut cte_sqls = Vec::with_capacity(ir.ctes.len());
            for cte in &ir.ctes {
                let body = self.compile_query(&cte.query, params)?;
                cte_sqls.push(format!("{} AS ({})", cte.name, body));
            }
            parts.push(format!("WITH {}", cte_sqls.join(", ")));
        }

        let select_items: Vec<String> = ir
            .select
            .iter()
            .map(|e| self.render_expression(e, params, true))
            .collect::<Result<_, _>>()?;
        let distinct = if ir.distinct { "DISTINCT " } else { "" };
        parts.push(format!("SELECT {}{}", distinct, select_items.join(", ")));

        let mut from = format!("FROM {}", self.quote_ref(&ir.from_table));
        if let Some(alias) = &ir.from_alias {
            from.push_str(&format!(" AS {}", alias));
        }
        parts.push(from);

        for join in &ir.joins {
            let mut clause = format!(
                "{} JOIN {}",
                join.join_type.as_sql(),
                self.quote_ref(&join.table)
            );
            if let Some(alias) = &join.alias {
                clause.push_str(&format!(" AS {}", alias));
            }
            if join.join_type != JoinType::Cross {
                let on = self.render_predicates(&join.on, params)?;
                clause.push_str(&format!(" ON {}", on));
            }
            parts.push(clause);
        }

        if !ir.where_clause.is_empty() {
            parts.push(format!(
                "WHERE {}",
                self.render_predicates(&ir.where_clause, params)?
            ));
        }

        if !ir.group_by.is_empty() {
            let cols: Vec<String> = ir.group_by.iter().map(|c| self.quote_ref(c)).collect();
            parts.push(format!("GROUP BY {}", cols.join(", ")));
        }

        if !ir.having.is_empty() {
            parts.push(format!(
                "HAVING {}",
                self.render_predicates(&ir.having, params)?
            ));
        }

        if !ir.order_by.is_empty() {
            let keys: Vec<String> = ir
                .order_by
                .iter()
                .map(|ob| {
                    let key = match &ob.column {
                        OrderKey::Name(name) => self.render_order_name(name),
                        OrderKey::Expr(expr) => self.render_expression(expr, params, false)?,
                    };
                    Ok(format!("{} {}", key, ob.direction.as_sql()))
                })
                .collect::<Result<_, CompileError>>()?;
            parts.push(format!("ORDER BY {}", keys.join(", ")));
        }

        if let Some(limit) = ir.limit {
            parts.push(format!("LIMIT {}", limit));
            if let Some(offset) = ir.offset {
                parts.push(format!("OFFSET {}", offset));
            }
        }

        Ok(parts.join(" "))
    }

    fn render_expression(
        &self,
        expr: &Expression,
        params: &mut Params,
        with_alias: bool,
    ) -> Result<String, CompileError> {
        let (rendered, alias) = match expr {
            Expression::Column { value, alias } => (self.quote_ref(value), alias),
            Expression::Literal { value, alias } => (params.bind(value.clone()), alias),
            Expression::Function {
                function,
                args,
                alias,
            } => {
                let rendered_args: Vec<String> = args
                    .iter()
                    .map(|a| self.render_expression(a, params, false))
                    .collect::<Result<_, _>>()?;
                (format!("{}({})", function, rendered_args.join(", ")), alias)
            }
            Expression::Aggregate {
                function,
                args,
                distinct,
                alias,
            } => {
                let rendered_args: Vec<String> = args
                    .iter()
                    .map(|a| self.render_expression(a, params, false))
                    .collect::<Result<_, _>>()?;
                let prefix = if *distinct { "DISTINCT " } else { "" };
                (
                    format!("{}({}{})", function, prefix, rendered_args.join(", ")),
                    alias,
                )
            }
            Expression::Window {
                function,
                args,
                partition_by,
                order_by,
                alias,
            } => {
                let rendered_args: Vec<String> = args
                    .iter()
                    .map(|a| self.render_expression(a, params, false))
                    .collect::<Result<_, _>>()?;
                let mut over = Vec::new();
                if !partition_by.is_empty() {
                    let cols: Vec<String> =
                        partition_by.iter().map(|c| self.quote_ref(c)).collect();
                    over.push(format!("PARTITION BY {}", cols.join(", ")));
                }
                if !order_by.is_empty() {
                    let keys: Vec<String> = order_by
                        .iter()
                        .map(|ob| {
                            let key = match &ob.column {
                                OrderKey::Name(name) => self.render_order_name(name),
                                OrderKey::Expr(expr) => {
                                    self.render_expression(expr, params, false)?
                                }
                            };
                            Ok(format!("{} {}", key, ob.direction.as_sql()))
                        })
                        .collect::<Result<_, CompileError>>()?;
                    over.push(format!("ORDER BY {}", keys.join(", ")));
                }
                (
                    format!(
                        "{}({}) OVER ({})",
                        function,
                        rendered_args.join(", "),
                        over.join(" ")
                    ),
                    alias,
                )
            }
            Expression::Subquery { query, alias } => {
                let sub = self.compile_query(query, params)?;
                (format!("({})", sub), alias)
            }
        };

        if with_alias {
            if let Some(alias) = alias {
                return Ok(format!("{} AS {}", rendered, alias));
            }
        }
        Ok(rendered)
    }

    fn render_predicates(
        &self,
        preds: &[Predicate],
        params: &mut Params,
    ) -> Result<String, CompileError> {
        let parts: Vec<String> = preds
            .iter()
            .map(|p| self.render_predicate(p, params))
            .collect::<Result<_, _>>()?;
        Ok(parts.join(" AND "))
    }

    fn render_predicate(
        &self,
        pred: &Predicate,
        params: &mut Params,
    ) -> Result<String, CompileError> {
        let left = self.render_expression(&pred.left, params, false)?;

        match pred.operator {
            Operator::IsNull | Operator::IsNotNull => {
                Ok(format!("{} {}", left, pred.operator.as_sql()))
            }
            Operator::Between => match &pred.right {
                Some(Operand::Many(items)) if items.len() == 2 => {
                    let low = self.render_expression(&items[0], params, false)?;
                    let high = self.render_expression(&items[1], params, false)?;
                    Ok(format!("{} BETWEEN {} AND {}", left, low, high))
                }
                _ => Err(CompileError::Unsupported(
                    "BETWEEN without two bounds".to_string(),
                )),
            },
            Operator::In | Operator::NotIn => match &pred.right {
                Some(Operand::Many(items)) => {
                    let rendered: Vec<String> = items
                        .iter()
                        .map(|e| self.render_expression(e, params, false))
                        .collect::<Result<_, _>>()?;
                    Ok(format!(
                        "{} {} ({})",
                        left,
                        pred.operator.as_sql(),
                        rendered.join(", ")
                    ))
                }
                Some(Operand::One(expr)) if matches!(expr.as_ref(), Expression::Subquery { .. }) => {
                    let sub = self.render_expression(expr, params, false)?;
                    Ok(format!("{} {} {}", left, pred.operator.as_sql(), sub))
                }
                _ => Err(CompileError::Unsupported(
                    format!("{} without a list or subquery", pred.operator.as_sql()),
                )),
            },
            _ => match &pred.right {
                Some(Operand::One(expr)) => {
                    let right = self.render_expression(expr, params, false)?;
                    Ok(format!("{} {} {}", left, pred.operator.as_sql(), right))
                }
                _ => Err(CompileError::Unsupported(format!(
                    "{} requires a right-hand side",
                    pred.operator.as_sql()
                ))),
            },
        }
    }

    /// ORDER BY names: aggregate strings and positions render raw,
    /// anything else is a quoted column reference
    fn render_order_name(&self, name: &str) -> String {
        if name.contains('(') || name.trim().parse::<i64>().is_ok() {
            name.to_string()
        } else {
            self.quote_ref(name)
        }
    }

    /// Quote an identifier reference. `*` and `table.*` render unquoted.
    fn quote_ref(&self, reference: &str) -> String {
        if reference == "*" || reference.ends_with(".*") {
            return reference.to_string();
        }
        let q = self.dialect.quote_char();
        match reference.split_once('.') {
            Some((table, column)) => format!("{q}{table}{q}.{q}{column}{q}"),
            None => format!("{q}{reference}{q}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn compile(ir_json: serde_json::Value) -> (String, Params) {
        let ir: QueryIr = serde_json::from_value(ir_json).unwrap();
        SqlCompiler::default().compile(&ir).unwrap()
    }

    #[test]
    fn simple_top_k_query() {
        let (sql, params) = compile(json!({
            "select": [
                {"type": "column", "value": "customers.name"},
                {"type": "column", "value": "customers.total_spent"}
            ],
            "from_table": "customers",
            "order_by": [{"column": "customers.total_spent", "direction": "DESC"}],
            "limit": 5
        }));
        assert_eq!(
            sql,
            "SELECT `customers`.`name`, `customers`.`total_spent` FROM `customers` \
             ORDER BY `customers`.`total_spent` DESC LIMIT 5"
        );
        assert!(params.is_empty());
    }

    #[test]
    fn literals_become_placeholders_in_order() {
        let (sql, params) = compile(json!({
            "select": [{"type": "column", "value": "orders.order_id"}],
            "from_table": "orders",
            "where": [
                {
                    "left": {"type": "column", "value": "orders.status"},
                    "operator": "=",
                    "right": {"type": "literal", "value": "shipped"}
                },
                {
                    "left": {"type": "column", "value": "orders.total_amount"},
                    "operator": ">",
                    "right": {"type": "literal", "value": 100}
                }
            ]
        }));
        assert!(sql.contains("`orders`.`status` = :p_0"));
        assert!(sql.contains("`orders`.`total_amount` > :p_1"));
        assert!(!sql.contains("shipped"));
        assert!(!sql.contains("100"));
        assert_eq!(params.get("p_0"), Some(&json!("shipped")));
        assert_eq!(params.get("p_1"), Some(&json!(100)));
    }

    #[test]
    fn count_star_renders_unquoted() {
        let (sql, _) = compile(json!({
            "select": [{
                "type": "aggregate",
                "function": "COUNT",
                "args": [{"type": "column", "value": "*"}]
            }],
            "from_table": "orders"
        }));
        assert_eq!(sql, "SELECT COUNT(*) FROM `orders`");
    }

    #[test]
    fn distinct_aggregate() {
        let (sql, _) = compile(json!({
            "select": [{
                "type": "aggregate",
                "function": "COUNT",
                "args": [{"type": "column", "value": "customers.country"}],
                "distinct": true,
                "alias": "countries"
            }],
            "from_table": "customers"
        }));
        assert_eq!(
            sql,
            "SELECT COUNT(DISTINCT `customers`.`country`) AS countries FROM `customers`"
        );
    }

    #[test]
    fn join_and_group_by() {
        let (sql, _) = compile(json!({
            "select": [
                {"type": "column", "value": "customers.name"},
                {"type": "aggregate", "function": "SUM",
                 "args": [{"type": "column", "value": "orders.total_amount"}],
                 "alias": "total"}
            ],
            "from_table": "customers",
            "joins": [{
                "type": "INNER",
                "table": "orders",
                "on": [{
                    "left": {"type": "column", "value": "orders.customer_id"},
                    "operator": "=",
                    "right": {"type": "column", "value": "customers.customer_id"}
                }]
            }],
            "group_by": ["customers.name"]
        }));
        assert_eq!(
            sql,
            "SELECT `customers`.`name`, SUM(`orders`.`total_amount`) AS total \
             FROM `customers` \
             INNER JOIN `orders` ON `orders`.`customer_id` = `customers`.`customer_id` \
             GROUP BY `customers`.`name`"
        );
    }

    #[test]
    fn cross_join_has_no_on() {
        let (sql, _) = compile(json!({
            "select": [{"type": "column", "value": "a.x"}],
            "from_table": "a",
            "joins": [{"type": "CROSS", "table": "b"}]
        }));
        assert_eq!(sql, "SELECT `a`.`x` FROM `a` CROSS JOIN `b`");
    }

    #[test]
    fn ctes_render_in_order() {
        let (sql, params) = compile(json!({
            "ctes": [
                {
                    "name": "recent",
                    "query": {
                        "select": [{"type": "column", "value": "orders.order_id"}],
                        "from_table": "orders",
                        "where": [{
                            "left": {"type": "column", "value": "orders.status"},
                            "operator": "=",
                            "right": {"type": "literal", "value": "open"}
                        }]
                    }
                }
            ],
            "select": [{"type": "column", "value": "recent.order_id"}],
            "from_table": "recent"
        }));
        assert!(sql.starts_with(
            "WITH recent AS (SELECT `orders`.`order_id` FROM `orders` WHERE `orders`.`status` = :p_0)"
        ));
        assert_eq!(params.get("p_0"), Some(&json!("open")));
    }

    #[test]
    fn between_and_in_render_placeholders() {
        let (sql, params) = compile(json!({
            "select": [{"type": "column", "value": "orders.order_id"}],
            "from_table": "orders",
            "where": [
                {
                    "left": {"type": "column", "value": "orders.total_amount"},
                    "operator": "BETWEEN",
                    "right": [
                        {"type": "literal", "value": 10},
                        {"type": "literal", "value": 50}
                    ]
                },
                {
                    "left": {"type": "column", "value": "orders.status"},
                    "operator": "IN",
                    "right": [
                        {"type": "literal", "value": "open"},
                        {"type": "literal", "value": "pending"}
                    ]
                }
            ]
        }));
        assert!(sql.contains("BETWEEN :p_0 AND :p_1"));
        assert!(sql.contains("IN (:p_2, :p_3)"));
        assert_eq!(params.len(), 4);
    }

    #[test]
    fn is_null_renders_without_right() {
        let (sql, _) = compile(json!({
            "select": [{"type": "column", "value": "customers.name"}],
            "from_table": "customers",
            "where": [{
                "left": {"type": "column", "value": "customers.email"},
                "operator": "IS NULL"
            }]
        }));
        assert!(sql.ends_with("WHERE `customers`.`email` IS NULL"));
    }

    #[test]
    fn order_by_aggregate_expression_renders_unquoted() {
        let (sql, _) = compile(json!({
            "select": [
                {"type": "column", "value": "customers.country"},
                {"type": "aggregate", "function": "COUNT",
                 "args": [{"type": "column", "value": "*"}]}
            ],
            "from_table": "customers",
            "group_by": ["customers.country"],
            "order_by": [{
                "column": {"type": "aggregate", "function": "COUNT",
                           "args": [{"type": "column", "value": "*"}]},
                "direction": "DESC"
            }]
        }));
        assert!(sql.ends_with("ORDER BY COUNT(*) DESC"));
    }

    #[test]
    fn compilation_is_deterministic() {
        let ir_json = json!({
            "select": [
                {"type": "column", "value": "products.product_name"},
                {"type": "aggregate", "function": "AVG",
                 "args": [{"type": "column", "value": "products.price"}], "alias": "avg_price"}
            ],
            "from_table": "products",
            "where": [{
                "left": {"type": "column", "value": "products.stock_quantity"},
                "operator": ">",
                "right": {"type": "literal", "value": 0}
            }],
            "group_by": ["products.product_name"],
            "limit": 20
        });
        let ir: QueryIr = serde_json::from_value(ir_json).unwrap();
        let compiler = SqlCompiler::default();
        let (sql_a, params_a) = compiler.compile(&ir).unwrap();
        let (sql_b, params_b) = compiler.compile(&ir).unwrap();
        assert_eq!(sql_a, sql_b);
        assert_eq!(params_a, params_b);
    }

    #[test]
    fn ansi_dialect_uses_double_quotes() {
        let ir: QueryIr = serde_json::from_value(json!({
            "select": [{"type": "column", "value": "customers.name"}],
            "from_table": "customers"
        }))
        .unwrap();
        let (sql, _) = SqlCompiler::new(Dialect::Ansi).compile(&ir).unwrap();
        assert_eq!(sql, "SELECT \"customers\".\"name\" FROM \"customers\"");
    }

    #[test]
    fn params_serialize_in_encounter_order() {
        let (_, params) = compile(json!({
            "select": [{"type": "column", "value": "o.id"}],
            "from_table": "o",
            "where": [
                {"left": {"type": "column", "value": "o.a"}, "operator": "=",
                 "right": {"type": "literal", "value": 1}},
                {"left": {"type": "column", "value": "o.b"}, "operator": "=",
                 "right": {"type": "literal", "value": 2}}
            ]
        }));
        let serialized = serde_json::to_string(&params).unwrap();
        assert!(serialized.find("p_0").unwrap() < serialized.find("p_1").unwrap());
    }
}
