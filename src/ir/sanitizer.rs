//! IR sanitizer - deterministic cleanup of raw LLM JSON
//!
//! LLM output drifts: field names get synonyms, expressions collapse to
//! bare strings, operators change case. This pass rewrites known drift
//! variants into the canonical IR shape without changing meaning. It is
//! table-driven so new variants are added declaratively, best-effort
//! (ambiguous structures pass through for the validator to reject), and
//! idempotent: `sanitize(sanitize(x)) == sanitize(x)`.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Map, Value};

/// Key renames applied when the canonical key is absent
const CTE_RENAMES: &[(&str, &str)] = &[
    ("cte_name", "name"),
    ("cte_query", "query"),
    ("cte_definition", "query"),
    ("definition", "query"),
];

const JOIN_RENAMES: &[(&str, &str)] = &[
    ("join_type", "type"),
    ("target_table", "table"),
    ("join_table", "table"),
    ("condition", "on"),
    ("join_condition", "on"),
];

const ORDER_BY_RENAMES: &[(&str, &str)] = &[
    ("field", "column"),
    ("col", "column"),
    ("value", "column"),
];

const AGGREGATE_FUNCTIONS: &[&str] = &["COUNT", "SUM", "AVG", "MIN", "MAX"];

static AGGREGATE_CALL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(COUNT|SUM|AVG|MIN|MAX)\s*\(\s*(DISTINCT\s+)?([^)]*?)\s*\)\s*$").unwrap()
});

/// Normalize a raw LLM IR object into the canonical shape.
pub fn sanitize(mut value: Value) -> Value {
    if let Value::Object(ref mut obj) = value {
        sanitize_query(obj);
    }
    value
}

fn sanitize_query(obj: &mut Map<String, Value>) {
    if let Some(Value::Array(ctes)) = obj.get_mut("ctes") {
        for cte in ctes {
            if let Value::Object(cte_obj) = cte {
                rename_keys(cte_obj, CTE_RENAMES);
                if let Some(Value::Object(query)) = cte_obj.get_mut("query") {
                    sanitize_query(query);
                }
            }
        }
    }

    if let Some(Value::Array(select)) = obj.get_mut("select") {
        for item in select.iter_mut() {
            *item = sanitize_select_item(item.take());
        }
    }

    if let Some(Value::Array(joins)) = obj.get_mut("joins") {
        for join in joins {
            if let Value::Object(join_obj) = join {
                sanitize_join(join_obj);
            }
        }
    }

    for clause in ["where", "having"] {
        if let Some(Value::Array(preds)) = obj.get_mut(clause) {
            for pred in preds {
                if let Value::Object(pred_obj) = pred {
                    sanitize_predicate(pred_obj, false);
                }
            }
        }
    }

    if let Some(Value::Array(group_by)) = obj.get_mut("group_by") {
        for item in group_by.iter_mut() {
            // Expression objects collapse to their column value
            let replacement = item
                .get("value")
                .and_then(Value::as_str)
                .or_else(|| item.get("column").and_then(Value::as_str))
                .map(str::to_string);
            if let Some(col) = replacement {
                *item = Value::String(col);
            }
        }
    }

    if let Some(Value::Array(order_by)) = obj.get_mut("order_by") {
        for item in order_by {
            if let Value::Object(ob) = item {
                rename_keys(ob, ORDER_BY_RENAMES);
                let direction = match ob.get("direction").and_then(Value::as_str) {
                    Some(d) if d.eq_ignore_ascii_case("desc") => "DESC",
                    _ => "ASC",
                };
                ob.insert("direction".to_string(), Value::String(direction.to_string()));
            }
        }
    }

    for key in ["limit", "offset"] {
        let parsed = match obj.get(key) {
            Some(Value::String(s)) => Some(s.trim().parse::<i64>().ok()),
            _ => None,
        };
        match parsed {
            Some(Some(n)) => {
                obj.insert(key.to_string(), json!(n));
            }
            Some(None) => {
                obj.remove(key);
            }
            None => {}
        }
    }

    let confidence = match obj.get("confidence") {
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    if let Some(c) = confidence {
        obj.insert("confidence".to_string(), json!(c));
    }
}

/// SELECT items: bare strings become column or aggregate expressions;
/// objects get a `type` inferred when missing and their arguments wrapped.
fn sanitize_select_item(item: Value) -> Value {
    match item {
        Value::String(s) => parse_string_expression(&s),
        Value::Object(mut obj) => {
            if !obj.contains_key("type") {
                if obj.contains_key("function") || obj.contains_key("aggregation") {
                    obj.insert("type".to_string(), json!("aggregate"));
                } else if obj.contains_key("subquery") || obj.contains_key("query") {
                    obj.insert("type".to_string(), json!("subquery"));
                } else if obj.contains_key("partition_by") {
                    obj.insert("type".to_string(), json!("window"));
                } else if let Some(col) = obj.remove("column") {
                    obj.insert("type".to_string(), json!("column"));
                    obj.insert("value".to_string(), col);
                } else if obj.contains_key("value") {
                    obj.insert("type".to_string(), json!("column"));
                }
            }
            sanitize_expression(&mut obj);
            Value::Object(obj)
        }
        other => other,
    }
}

fn sanitize_expression(obj: &mut Map<String, Value>) {
    // `aggregation` is a common synonym for the function name
    if !obj.contains_key("function") {
        if let Some(f) = obj.remove("aggregation") {
            obj.insert("function".to_string(), f);
        }
    }

    let expr_type = obj
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    if expr_type == "aggregate" {
        let upper = obj
            .get("function")
            .and_then(Value::as_str)
            .map(str::to_uppercase);
        if let Some(upper) = upper {
            if AGGREGATE_FUNCTIONS.contains(&upper.as_str()) {
                obj.insert("function".to_string(), Value::String(upper));
            }
        }
    }

    if let Some(Value::Array(args)) = obj.get_mut("args") {
        for arg in args.iter_mut() {
            match arg {
                Value::String(s) => {
                    *arg = json!({"type": "column", "value": s});
                }
                Value::Object(inner) => sanitize_expression(inner),
                _ => {}
            }
        }
    }

    if expr_type == "subquery" {
        if let Some(Value::Object(query)) = obj.get_mut("query") {
            sanitize_query(query);
        } else if let Some(Value::Object(query)) = obj.get_mut("subquery") {
            sanitize_query(query);
        }
    }
}

fn sanitize_join(obj: &mut Map<String, Value>) {
    rename_keys(obj, JOIN_RENAMES);

    let raw_type = obj.get("type").and_then(Value::as_str).map(str::to_string);
    if let Some(raw) = raw_type {
        let up = raw.to_uppercase().replace(" JOIN", "").replace("JOIN", "");
        let up = up.trim();
        let normalized = if ["INNER", "LEFT", "RIGHT", "FULL", "CROSS"].contains(&up) {
            up.to_string()
        } else {
            "INNER".to_string()
        };
        obj.insert("type".to_string(), Value::String(normalized));
    }

    match obj.remove("on") {
        Some(Value::String(clause)) => {
            let restored = match parse_on_clause(&clause) {
                Some(pred) => Value::Array(vec![pred]),
                None => Value::String(clause),
            };
            obj.insert("on".to_string(), restored);
        }
        Some(single @ Value::Object(_)) => {
            obj.insert("on".to_string(), Value::Array(vec![single]));
        }
        Some(other) => {
            obj.insert("on".to_string(), other);
        }
        None => {}
    }

    if let Some(Value::Array(preds)) = obj.get_mut("on") {
        for pred in preds {
            if let Value::Object(pred_obj) = pred {
                sanitize_predicate(pred_obj, true);
            }
        }
    }
}

/// `in_join`: string right-hand sides are column refs in join conditions
/// but literal values in WHERE/HAVING.
fn sanitize_predicate(obj: &mut Map<String, Value>, in_join: bool) {
    let op = obj
        .get("operator")
        .and_then(Value::as_str)
        .map(|s| s.trim().to_uppercase());
    if let Some(mut up) = op {
        if up == "==" {
            up = "=".to_string();
        }
        obj.insert("operator".to_string(), Value::String(up));
    }

    let left_str = obj.get("left").and_then(Value::as_str).map(str::to_string);
    if let Some(left) = left_str {
        obj.insert("left".to_string(), json!({"type": "column", "value": left}));
    } else if let Some(Value::Object(left)) = obj.get_mut("left") {
        sanitize_expression(left);
    }

    match obj.remove("right") {
        Some(Value::String(s)) => {
            let wrapped = if in_join {
                json!({"type": "column", "value": s})
            } else {
                json!({"type": "literal", "value": s})
            };
            obj.insert("right".to_string(), wrapped);
        }
        Some(scalar @ Value::Number(_)) | Some(scalar @ Value::Bool(_)) => {
            obj.insert(
                "right".to_string(),
                json!({"type": "literal", "value": scalar}),
            );
        }
        Some(Value::Array(mut items)) => {
            for item in items.iter_mut() {
                match item {
                    Value::String(_) | Value::Number(_) | Value::Bool(_) => {
                        let scalar = item.take();
                        *item = json!({"type": "literal", "value": scalar});
                    }
                    Value::Object(inner) => sanitize_expression(inner),
                    _ => {}
                }
            }
            obj.insert("right".to_string(), Value::Array(items));
        }
        Some(mut expr @ Value::Object(_)) => {
            if let Value::Object(inner) = &mut expr {
                sanitize_expression(inner);
            }
            obj.insert("right".to_string(), expr);
        }
        Some(other) => {
            obj.insert("right".to_string(), other);
        }
        None => {}
    }
}

/// Parse a simple `"a.col = b.col"` ON clause into an equality predicate.
/// Operators are tried longest-first to avoid partial splits.
fn parse_on_clause(clause: &str) -> Option<Value> {
    for op in [">=", "<=", "!=", "=", ">", "<"] {
        if let Some((left, right)) = clause.split_once(op) {
            let left = left.trim();
            let right = right.trim();
            if left.is_empty() || right.is_empty() {
                continue;
            }
            return Some(json!({
                "left": {"type": "column", "value": left},
                "operator": op,
                "right": {"type": "column", "value": right}
            }));
        }
    }
    None
}

/// A bare SELECT string: `"COUNT(*)"` style calls become aggregates,
/// anything else is a column reference.
fn parse_string_expression(s: &str) -> Value {
    if let Some(caps) = AGGREGATE_CALL.captures(s) {
        let function = caps[1].to_uppercase();
        let distinct = caps.get(2).is_some();
        let arg = caps[3].trim();
        let args = if arg.is_empty() {
            vec![json!({"type": "column", "value": "*"})]
        } else {
            vec![json!({"type": "column", "value": arg})]
        };
        return json!({
            "type": "aggregate",
            "function": function,
            "args": args,
            "distinct": distinct
        });
    }
    json!({"type": "column", "value": s})
}

fn rename_keys(obj: &mut Map<String, Value>, renames: &[(&str, &str)]) {
    for (from, to) in renames {
        if !obj.contains_key(*to) {
            if let Some(v) = obj.remove(*from) {
                obj.insert(to.to_string(), v);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_string_becomes_column_expression() {
        let out = sanitize(json!({
            "select": ["customers.name"],
            "from_table": "customers"
        }));
        assert_eq!(
            out["select"][0],
            json!({"type": "column", "value": "customers.name"})
        );
    }

    #[test]
    fn count_star_string_becomes_aggregate() {
        let out = sanitize(json!({
            "select": ["COUNT(*)"],
            "from_table": "orders"
        }));
        assert_eq!(
            out["select"][0],
            json!({
                "type": "aggregate",
                "function": "COUNT",
                "args": [{"type": "column", "value": "*"}],
                "distinct": false
            })
        );
    }

    #[test]
    fn count_distinct_string_is_parsed() {
        let out = sanitize(json!({
            "select": ["COUNT(DISTINCT customers.country)"],
            "from_table": "customers"
        }));
        assert_eq!(out["select"][0]["distinct"], json!(true));
        assert_eq!(
            out["select"][0]["args"][0],
            json!({"type": "column", "value": "customers.country"})
        );
    }

    #[test]
    fn join_drift_keys_are_renamed() {
        let out = sanitize(json!({
            "select": ["o.id"],
            "from_table": "customers",
            "joins": [{
                "join_type": "left join",
                "target_table": "orders",
                "condition": "orders.customer_id = customers.customer_id"
            }]
        }));
        let join = &out["joins"][0];
        assert_eq!(join["type"], "LEFT");
        assert_eq!(join["table"], "orders");
        assert_eq!(join["on"][0]["operator"], "=");
        assert_eq!(
            join["on"][0]["left"],
            json!({"type": "column", "value": "orders.customer_id"})
        );
    }

    #[test]
    fn unknown_join_type_defaults_to_inner() {
        let out = sanitize(json!({
            "select": ["a.x"],
            "from_table": "a",
            "joins": [{"join_type": "sideways", "table": "b", "on": "a.id = b.id"}]
        }));
        assert_eq!(out["joins"][0]["type"], "INNER");
    }

    #[test]
    fn cte_drift_keys_are_renamed() {
        let out = sanitize(json!({
            "select": ["t.x"],
            "from_table": "t",
            "ctes": [{
                "cte_name": "t",
                "cte_definition": {
                    "select": ["COUNT(*)"],
                    "from_table": "orders"
                }
            }]
        }));
        let cte = &out["ctes"][0];
        assert_eq!(cte["name"], "t");
        // Inner query is sanitized too
        assert_eq!(cte["query"]["select"][0]["type"], "aggregate");
    }

    #[test]
    fn order_by_field_and_direction_normalized() {
        let out = sanitize(json!({
            "select": ["c.name"],
            "from_table": "c",
            "order_by": [{"field": "c.name", "direction": "desc"}, {"col": "c.id"}]
        }));
        assert_eq!(out["order_by"][0]["column"], "c.name");
        assert_eq!(out["order_by"][0]["direction"], "DESC");
        assert_eq!(out["order_by"][1]["column"], "c.id");
        assert_eq!(out["order_by"][1]["direction"], "ASC");
    }

    #[test]
    fn aggregate_string_args_are_wrapped() {
        let out = sanitize(json!({
            "select": [{"type": "aggregate", "function": "sum", "args": ["orders.total_amount"]}],
            "from_table": "orders"
        }));
        assert_eq!(out["select"][0]["function"], "SUM");
        assert_eq!(
            out["select"][0]["args"][0],
            json!({"type": "column", "value": "orders.total_amount"})
        );
    }

    #[test]
    fn numeric_limit_string_is_parsed_garbage_dropped() {
        let out = sanitize(json!({
            "select": ["c.name"],
            "from_table": "c",
            "limit": "10",
            "offset": "a few"
        }));
        assert_eq!(out["limit"], json!(10));
        assert!(out.get("offset").is_none());
    }

    #[test]
    fn where_operator_uppercased_and_scalar_right_wrapped() {
        let out = sanitize(json!({
            "select": ["c.name"],
            "from_table": "c",
            "where": [{
                "left": "c.country",
                "operator": "like",
                "right": "%DE%"
            }]
        }));
        let pred = &out["where"][0];
        assert_eq!(pred["operator"], "LIKE");
        assert_eq!(pred["left"], json!({"type": "column", "value": "c.country"}));
        assert_eq!(pred["right"], json!({"type": "literal", "value": "%DE%"}));
    }

    #[test]
    fn in_list_scalars_become_literals() {
        let out = sanitize(json!({
            "select": ["o.status"],
            "from_table": "o",
            "where": [{
                "left": "o.status",
                "operator": "in",
                "right": ["open", "pending"]
            }]
        }));
        assert_eq!(
            out["where"][0]["right"],
            json!([
                {"type": "literal", "value": "open"},
                {"type": "literal", "value": "pending"}
            ])
        );
    }

    #[test]
    fn select_object_without_type_is_inferred() {
        let out = sanitize(json!({
            "select": [
                {"column": "customers.name", "alias": "customer"},
                {"function": "COUNT", "args": ["*"]}
            ],
            "from_table": "customers"
        }));
        assert_eq!(out["select"][0]["type"], "column");
        assert_eq!(out["select"][0]["value"], "customers.name");
        assert_eq!(out["select"][0]["alias"], "customer");
        assert_eq!(out["select"][1]["type"], "aggregate");
    }

    #[test]
    fn sanitize_is_idempotent() {
        let raw = json!({
            "select": ["COUNT(*)", "customers.name", {"column": "c.x"}],
            "from_table": "customers",
            "joins": [{
                "join_type": "inner",
                "target_table": "orders",
                "condition": "orders.customer_id = customers.customer_id"
            }],
            "where": [{"left": "c.country", "operator": "=", "right": "DE"}],
            "order_by": [{"field": "name", "direction": "desc"}],
            "ctes": [{"cte_name": "x", "cte_definition": {"select": ["SUM(a.b)"], "from_table": "a"}}],
            "limit": "5"
        });
        let once = sanitize(raw);
        let twice = sanitize(once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn already_canonical_input_passes_through() {
        let canonical = json!({
            "select": [{"type": "column", "value": "customers.name"}],
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
            "limit": 5
        });
        assert_eq!(sanitize(canonical.clone()), canonical);
    }
}
