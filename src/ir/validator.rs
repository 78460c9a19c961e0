//! IR validator - rejects any IR that violates the structural invariants
//!
//! Checks run in a fixed order and accumulate diagnostics instead of
//! stopping at the first problem, so a correction round can fix several
//! issues at once. CTE names act as virtual tables and bypass schema
//! column checks.

use serde::{Deserialize, Serialize};

use crate::ir::model::{Expression, JoinType, Operand, Operator, OrderKey, Predicate, QueryIr};
use crate::schema::model::DatabaseSchema;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ValidationErrorKind {
    /// JSON did not deserialize into the IR shape
    Malformed,
    UnknownTable,
    UnknownColumn,
    AmbiguousColumn,
    GroupByMissing,
    OrderByInvalid,
    PredicateArity,
    WindowMisplaced,
    CteDuplicate,
    CteCycle,
    NegativeLimit,
    EmptySelect,
}

impl ValidationErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Malformed => "malformed",
            Self::UnknownTable => "unknown_table",
            Self::UnknownColumn => "unknown_column",
            Self::AmbiguousColumn => "ambiguous_column",
            Self::GroupByMissing => "group_by_missing",
            Self::OrderByInvalid => "order_by_invalid",
            Self::PredicateArity => "predicate_arity",
            Self::WindowMisplaced => "window_misplaced",
            Self::CteDuplicate => "cte_duplicate",
            Self::CteCycle => "cte_cycle",
            Self::NegativeLimit => "negative_limit",
            Self::EmptySelect => "empty_select",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ValidationError {
    pub kind: ValidationErrorKind,
    pub message: String,
    /// JSON-pointer-ish location, e.g. `select[1]` or `joins[0].on[0]`
    pub path: String,
}

impl ValidationError {
    fn new(kind: ValidationErrorKind, message: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            path: path.into(),
        }
    }
}

pub struct IrValidator<'a> {
    schema: &'a DatabaseSchema,
}

impl<'a> IrValidator<'a> {
    pub fn new(schema: &'a DatabaseSchema) -> Self {
        Self { schema }
    }

    /// Validate a query. Empty result means the IR satisfies every
    /// invariant and is safe to compile.
    pub fn validate(&self, ir: &QueryIr) -> Vec<ValidationError> {
        let cte_names: Vec<String> = ir.ctes.iter().map(|c| c.name.clone()).collect();
        let mut errors = Vec::new();

        // CTE name uniqueness and acyclicity: a CTE sees only earlier CTEs
        for (i, cte) in ir.ctes.iter().enumerate() {
            if ir.ctes[..i].iter().any(|prev| prev.name == cte.name) {
                errors.push(ValidationError::new(
                    ValidationErrorKind::CteDuplicate,
                    format!("CTE name '{}' is defined more than once", cte.name),
                    format!("ctes[{}].name", i),
                ));
            }
            let visible: Vec<String> = cte_names[..i].to_vec();
            self.validate_scoped(
                &cte.query,
                &visible,
                Some(cte_names.as_slice()),
                &format!("ctes[{}].query", i),
                &mut errors,
            );
        }

        self.validate_scoped(ir, &cte_names, None, "", &mut errors);
        errors
    }

    /// `visible_ctes`: CTE names usable as virtual tables in this scope.
    /// `all_ctes`: when validating a CTE body, the full set, so a
    /// forward/self reference is reported as a cycle rather than an
    /// unknown table.
    fn validate_scoped(
        &self,
        ir: &QueryIr,
        visible_ctes: &[String],
        all_ctes: Option<&[String]>,
        prefix: &str,
        errors: &mut Vec<ValidationError>,
    ) {
        let scope = Scope::new(self.schema, ir, visible_ctes);
        let at = |p: &str| join_path(prefix, p);

        if ir.select.is_empty() {
            errors.push(ValidationError::new(
                ValidationErrorKind::EmptySelect,
                "SELECT must contain at least one expression",
                at("select"),
            ));
        }

        // 1. Table name resolution
        if !scope.table_exists(&ir.from_table) {
            let (kind, message) = unknown_table_diag(&ir.from_table, visible_ctes, all_ctes);
            errors.push(ValidationError::new(kind, message, at("from_table")));
        }
        for (i, join) in ir.joins.iter().enumerate() {
            if !scope.table_exists(&join.table) {
                let (kind, message) = unknown_table_diag(&join.table, visible_ctes, all_ctes);
                errors.push(ValidationError::new(kind, message, at(&format!("joins[{}].table", i))));
            }
        }

        // 2. Column resolution over every expression position
        for (i, expr) in ir.select.iter().enumerate() {
            self.validate_expression(expr, &scope, visible_ctes, &at(&format!("select[{}]", i)), errors);
        }
        for (i, join) in ir.joins.iter().enumerate() {
            for (j, pred) in join.on.iter().enumerate() {
                self.validate_predicate(
                    pred,
                    &scope,
                    visible_ctes,
                    &at(&format!("joins[{}].on[{}]", i, j)),
                    errors,
                );
            }
        }
        for (i, pred) in ir.where_clause.iter().enumerate() {
            self.validate_predicate(pred, &scope, visible_ctes, &at(&format!("where[{}]", i)), errors);
        }
        for (i, col) in ir.group_by.iter().enumerate() {
            scope.resolve_column(col, &at(&format!("group_by[{}]", i)), errors);
        }
        for (i, pred) in ir.having.iter().enumerate() {
            self.validate_predicate(pred, &scope, visible_ctes, &at(&format!("having[{}]", i)), errors);
        }

        // 3. GROUP BY completeness under aggregation
        if ir.has_aggregate_select() {
            for (i, expr) in ir.select.iter().enumerate() {
                if expr.is_aggregate() {
                    continue;
                }
                let path = at(&format!("select[{}]", i));
                match expr {
                    Expression::Column { value, .. } => {
                        if value == "*" || value.ends_with(".*") {
                            errors.push(ValidationError::new(
                                ValidationErrorKind::GroupByMissing,
                                format!(
                                    "'{}' cannot be selected together with an aggregate; list the grouped columns explicitly",
                                    value
                                ),
                                path,
                            ));
                        } else if !ir.group_by.iter().any(|g| g == value) {
                            errors.push(ValidationError::new(
                                ValidationErrorKind::GroupByMissing,
                                format!(
                                    "non-aggregate column '{}' must appear in group_by when aggregates are selected",
                                    value
                                ),
                                path,
                            ));
                        }
                    }
                    other => {
                        let shown = other.alias().unwrap_or("expression");
                        errors.push(ValidationError::new(
                            ValidationErrorKind::GroupByMissing,
                            format!(
                                "non-aggregate select item '{}' must be a grouped column when aggregates are selected",
                                shown
                            ),
                            path,
                        ));
                    }
                }
            }
        }

        // 4. ORDER BY keys must tie back to the SELECT list
        for (i, ob) in ir.order_by.iter().enumerate() {
            let path = at(&format!("order_by[{}]", i));
            match &ob.column {
                OrderKey::Name(name) => {
                    if !order_name_is_valid(name, ir) {
                        errors.push(ValidationError::new(
                            ValidationErrorKind::OrderByInvalid,
                            format!(
                                "ORDER BY '{}' must reference a selected column, a select alias, a position, or an aggregate in SELECT",
                                name
                            ),
                            path.clone(),
                        ));
                    }
                }
                OrderKey::Expr(expr) => match expr.as_ref() {
                    Expression::Aggregate { .. } => {
                        if !ir.select.iter().any(|s| s.same_shape(expr)) {
                            errors.push(ValidationError::new(
                                ValidationErrorKind::OrderByInvalid,
                                "aggregate in ORDER BY must also appear in SELECT",
                                path.clone(),
                            ));
                        }
                    }
                    Expression::Column { value, .. } => {
                        let in_select = ir.select.iter().any(|s| match s {
                            Expression::Column { value: v, .. } => v == value,
                            _ => s.alias() == Some(value.as_str()),
                        });
                        if !in_select {
                            errors.push(ValidationError::new(
                                ValidationErrorKind::OrderByInvalid,
                                format!("ORDER BY column '{}' must appear in SELECT", value),
                                path.clone(),
                            ));
                        }
                    }
                    // Window functions are legal here; anything else is caught
                    // by expression validation below
                    _ => {}
                },
            }
            if let OrderKey::Expr(expr) = &ob.column {
                self.validate_expression(expr, &scope, visible_ctes, &path, errors);
            }
        }

        // 5. Predicate arity (joins, where, having)
        let arity_targets: Vec<(String, &Predicate)> = ir
            .joins
            .iter()
            .enumerate()
            .flat_map(|(i, j)| {
                j.on.iter()
                    .enumerate()
                    .map(move |(k, p)| (format!("joins[{}].on[{}]", i, k), p))
            })
            .chain(
                ir.where_clause
                    .iter()
                    .enumerate()
                    .map(|(i, p)| (format!("where[{}]", i), p)),
            )
            .chain(
                ir.having
                    .iter()
                    .enumerate()
                    .map(|(i, p)| (format!("having[{}]", i), p)),
            )
            .collect();
        for (path, pred) in arity_targets {
            check_arity(pred, &at(&path), errors);
        }

        // 6. Window functions only in SELECT and ORDER BY
        for (i, pred) in ir.where_clause.iter().enumerate() {
            if predicate_contains_window(pred) {
                errors.push(ValidationError::new(
                    ValidationErrorKind::WindowMisplaced,
                    "window functions are not allowed in WHERE",
                    at(&format!("where[{}]", i)),
                ));
            }
        }
        for (i, pred) in ir.having.iter().enumerate() {
            if predicate_contains_window(pred) {
                errors.push(ValidationError::new(
                    ValidationErrorKind::WindowMisplaced,
                    "window functions are not allowed in HAVING",
                    at(&format!("having[{}]", i)),
                ));
            }
        }
        for (i, join) in ir.joins.iter().enumerate() {
            if join.on.iter().any(predicate_contains_window) {
                errors.push(ValidationError::new(
                    ValidationErrorKind::WindowMisplaced,
                    "window functions are not allowed in JOIN conditions",
                    at(&format!("joins[{}].on", i)),
                ));
            }
        }

        // 8. Non-negativity
        if let Some(limit) = ir.limit {
            if limit < 0 {
                errors.push(ValidationError::new(
                    ValidationErrorKind::NegativeLimit,
                    format!("limit must be non-negative, got {}", limit),
                    at("limit"),
                ));
            }
        }
        if let Some(offset) = ir.offset {
            if offset < 0 {
                errors.push(ValidationError::new(
                    ValidationErrorKind::NegativeLimit,
                    format!("offset must be non-negative, got {}", offset),
                    at("offset"),
                ));
            }
        }

        // CROSS joins carry no ON clause
        for (i, join) in ir.joins.iter().enumerate() {
            if join.join_type == JoinType::Cross && !join.on.is_empty() {
                errors.push(ValidationError::new(
                    ValidationErrorKind::PredicateArity,
                    "CROSS JOIN must not have an ON clause",
                    at(&format!("joins[{}].on", i)),
                ));
            } else if join.join_type != JoinType::Cross && join.on.is_empty() {
                errors.push(ValidationError::new(
                    ValidationErrorKind::PredicateArity,
                    format!("{} JOIN requires an ON clause", join.join_type.as_sql()),
                    at(&format!("joins[{}].on", i)),
                ));
            }
        }
    }

    fn validate_expression(
        &self,
        expr: &Expression,
        scope: &Scope<'_>,
        visible_ctes: &[String],
        path: &str,
        errors: &mut Vec<ValidationError>,
    ) {
        match expr {
            Expression::Column { value, .. } => {
                scope.resolve_column(value, path, errors);
            }
            Expression::Literal { .. } => {}
            Expression::Function { args, .. } | Expression::Aggregate { args, .. } => {
                for (i, arg) in args.iter().enumerate() {
                    self.validate_expression(arg, scope, visible_ctes, &format!("{}.args[{}]", path, i), errors);
                }
            }
            Expression::Window {
                args, partition_by, ..
            } => {
                for (i, arg) in args.iter().enumerate() {
                    self.validate_expression(arg, scope, visible_ctes, &format!("{}.args[{}]", path, i), errors);
                }
                for (i, col) in partition_by.iter().enumerate() {
                    scope.resolve_column(col, &format!("{}.partition_by[{}]", path, i), errors);
                }
            }
            Expression::Subquery { query, .. } => {
                self.validate_scoped(query, visible_ctes, None, &format!("{}.query", path), errors);
            }
        }
    }

    fn validate_predicate(
        &self,
        pred: &Predicate,
        scope: &Scope<'_>,
        visible_ctes: &[String],
        path: &str,
        errors: &mut Vec<ValidationError>,
    ) {
        self.validate_expression(&pred.left, scope, visible_ctes, &format!("{}.left", path), errors);
        match &pred.right {
            Some(Operand::One(expr)) => {
                self.validate_expression(expr, scope, visible_ctes, &format!("{}.right", path), errors);
            }
            Some(Operand::Many(exprs)) => {
                for (i, expr) in exprs.iter().enumerate() {
                    self.validate_expression(
                        expr,
                        scope,
                        visible_ctes,
                        &format!("{}.right[{}]", path, i),
                        errors,
                    );
                }
            }
            None => {}
        }
    }
}

/// Name-resolution scope for one query level
struct Scope<'a> {
    schema: &'a DatabaseSchema,
    /// `(visible name, underlying real table if any)`; CTE-backed names
    /// carry `None` because their columns are unknown
    names: Vec<(String, Option<String>)>,
    has_ctes: bool,
}

impl<'a> Scope<'a> {
    fn new(schema: &'a DatabaseSchema, ir: &QueryIr, visible_ctes: &[String]) -> Self {
        let is_cte = |t: &str| visible_ctes.iter().any(|c| c == t);
        let mut names = Vec::new();

        let base = |table: &str| -> Option<String> {
            if is_cte(table) {
                None
            } else {
                Some(table.to_string())
            }
        };

        names.push((ir.from_table.clone(), base(&ir.from_table)));
        if let Some(alias) = &ir.from_alias {
            names.push((alias.clone(), base(&ir.from_table)));
        }
        for join in &ir.joins {
            names.push((join.table.clone(), base(&join.table)));
            if let Some(alias) = &join.alias {
                names.push((alias.clone(), base(&join.table)));
            }
        }
        Self {
            schema,
            names,
            has_ctes: !visible_ctes.is_empty(),
        }
    }

    fn table_exists(&self, name: &str) -> bool {
        self.schema.has_table(name)
            || self
                .names
                .iter()
                .any(|(n, real)| n == name && real.is_none())
    }

    fn lookup(&self, name: &str) -> Option<&(String, Option<String>)> {
        self.names.iter().find(|(n, _)| n == name)
    }

    fn resolve_column(&self, reference: &str, path: &str, errors: &mut Vec<ValidationError>) {
        if reference == "*" {
            return;
        }
        if let Some((table, column)) = reference.split_once('.') {
            match self.lookup(table) {
                None => {
                    errors.push(ValidationError::new(
                        ValidationErrorKind::UnknownTable,
                        format!("table '{}' is not part of this query", table),
                        path,
                    ));
                }
                Some((_, None)) => {
                    // CTE-backed: column set unknown, accept
                }
                Some((_, Some(real))) => {
                    if column == "*" {
                        return;
                    }
                    match self.schema.table(real) {
                        Some(t) if t.has_column(column) => {}
                        Some(_) => errors.push(ValidationError::new(
                            ValidationErrorKind::UnknownColumn,
                            format!("column '{}' does not exist in table '{}'", column, real),
                            path,
                        )),
                        None => errors.push(ValidationError::new(
                            ValidationErrorKind::UnknownTable,
                            format!("table '{}' does not exist", real),
                            path,
                        )),
                    }
                }
            }
        } else {
            // Unqualified: must be unambiguous among the real tables in
            // scope. A table and its alias count once.
            let mut holders: Vec<&str> = self
                .names
                .iter()
                .filter_map(|(_, real)| real.as_deref())
                .filter(|real| {
                    self.schema
                        .table(real)
                        .map(|t| t.has_column(reference))
                        .unwrap_or(false)
                })
                .collect();
            holders.sort_unstable();
            holders.dedup();
            match holders.len() {
                0 if self.has_ctes => {
                    // Could come from a CTE projection; cannot verify
                }
                0 => errors.push(ValidationError::new(
                    ValidationErrorKind::UnknownColumn,
                    format!("column '{}' not found in any table of this query", reference),
                    path,
                )),
                1 => {}
                _ => errors.push(ValidationError::new(
                    ValidationErrorKind::AmbiguousColumn,
                    format!(
                        "column '{}' is ambiguous across {:?}; qualify it with a table name",
                        reference, holders
                    ),
                    path,
                )),
            }
        }
    }
}

fn unknown_table_diag(
    table: &str,
    visible_ctes: &[String],
    all_ctes: Option<&[String]>,
) -> (ValidationErrorKind, String) {
    if let Some(all) = all_ctes {
        if all.iter().any(|c| c == table) && !visible_ctes.iter().any(|c| c == table) {
            return (
                ValidationErrorKind::CteCycle,
                format!(
                    "CTE '{}' may only reference CTEs defined before it (no recursion)",
                    table
                ),
            );
        }
    }
    (
        ValidationErrorKind::UnknownTable,
        format!("table '{}' does not exist", table),
    )
}

fn order_name_is_valid(name: &str, ir: &QueryIr) -> bool {
    // Positional reference
    if let Ok(pos) = name.trim().parse::<i64>() {
        return pos >= 1 && (pos as usize) <= ir.select.len();
    }
    // Aggregate spelled as a string, e.g. "COUNT(*)"
    if name.contains('(') {
        let wanted = name.replace(' ', "").to_uppercase();
        return ir.select.iter().any(|s| {
            render_aggregate(s)
                .map(|r| r.replace(' ', "").to_uppercase() == wanted)
                .unwrap_or(false)
        });
    }
    // Selected column or alias
    ir.select.iter().any(|s| {
        s.alias() == Some(name)
            || matches!(s, Expression::Column { value, .. } if value == name)
    })
}

/// Text rendering used only to match ORDER BY strings against SELECT
fn render_aggregate(expr: &Expression) -> Option<String> {
    if let Expression::Aggregate {
        function,
        args,
        distinct,
        ..
    } = expr
    {
        let rendered_args: Vec<String> = args
            .iter()
            .map(|a| match a {
                Expression::Column { value, .. } => value.clone(),
                other => format!("{:?}", other),
            })
            .collect();
        let prefix = if *distinct { "DISTINCT " } else { "" };
        Some(format!(
            "{}({}{})",
            function.to_uppercase(),
            prefix,
            rendered_args.join(", ")
        ))
    } else {
        None
    }
}

fn check_arity(pred: &Predicate, path: &str, errors: &mut Vec<ValidationError>) {
    match pred.operator {
        Operator::IsNull | Operator::IsNotNull => {
            if pred.right.is_some() {
                errors.push(ValidationError::new(
                    ValidationErrorKind::PredicateArity,
                    format!("{} takes no right-hand side", pred.operator.as_sql()),
                    path,
                ));
            }
        }
        Operator::Between => match &pred.right {
            Some(Operand::Many(items))
                if items.len() == 2
                    && items
                        .iter()
                        .all(|e| matches!(e, Expression::Literal { .. })) => {}
            _ => errors.push(ValidationError::new(
                ValidationErrorKind::PredicateArity,
                "BETWEEN requires exactly two literal bounds",
                path,
            )),
        },
        Operator::In | Operator::NotIn => match &pred.right {
            Some(Operand::Many(items)) if !items.is_empty() => {}
            Some(Operand::One(expr)) if matches!(expr.as_ref(), Expression::Subquery { .. }) => {}
            _ => errors.push(ValidationError::new(
                ValidationErrorKind::PredicateArity,
                format!(
                    "{} requires a non-empty list or a subquery",
                    pred.operator.as_sql()
                ),
                path,
            )),
        },
        _ => match &pred.right {
            Some(Operand::One(_)) => {}
            _ => errors.push(ValidationError::new(
                ValidationErrorKind::PredicateArity,
                format!("{} requires a single right-hand side", pred.operator.as_sql()),
                path,
            )),
        },
    }
}

fn predicate_contains_window(pred: &Predicate) -> bool {
    if pred.left.contains_window() {
        return true;
    }
    match &pred.right {
        Some(Operand::One(expr)) => expr.contains_window(),
        Some(Operand::Many(exprs)) => exprs.iter().any(|e| e.contains_window()),
        None => false,
    }
}

fn join_path(prefix: &str, path: &str) -> String {
    if prefix.is_empty() {
        path.to_string()
    } else {
        format!("{}.{}", prefix, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::model::{Cte, OrderBy, OrderDirection};
    use crate::schema::model::fixtures::ecommerce_schema;
    use serde_json::json;

    fn base_ir() -> QueryIr {
        serde_json::from_value(json!({
            "select": [{"type": "column", "value": "customers.name"}],
            "from_table": "customers"
        }))
        .unwrap()
    }

    fn kinds(errors: &[ValidationError]) -> Vec<ValidationErrorKind> {
        errors.iter().map(|e| e.kind).collect()
    }

    #[test]
    fn valid_simple_query_passes() {
        let schema = ecommerce_schema();
        let errors = IrValidator::new(&schema).validate(&base_ir());
        assert!(errors.is_empty(), "{:?}", errors);
    }

    #[test]
    fn unknown_from_table_rejected() {
        let schema = ecommerce_schema();
        let mut ir = base_ir();
        ir.from_table = "invoices".to_string();
        let errors = IrValidator::new(&schema).validate(&ir);
        assert!(kinds(&errors).contains(&ValidationErrorKind::UnknownTable));
        assert_eq!(errors[0].path, "from_table");
    }

    #[test]
    fn unknown_column_rejected_with_path() {
        let schema = ecommerce_schema();
        let mut ir = base_ir();
        ir.select = vec![Expression::column("customers.age")];
        let errors = IrValidator::new(&schema).validate(&ir);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, ValidationErrorKind::UnknownColumn);
        assert_eq!(errors[0].path, "select[0]");
    }

    #[test]
    fn ambiguous_unqualified_column_rejected() {
        let schema = ecommerce_schema();
        let ir: QueryIr = serde_json::from_value(json!({
            "select": [{"type": "column", "value": "customer_id"}],
            "from_table": "customers",
            "joins": [{
                "type": "INNER",
                "table": "orders",
                "on": [{
                    "left": {"type": "column", "value": "orders.customer_id"},
                    "operator": "=",
                    "right": {"type": "column", "value": "customers.customer_id"}
                }]
            }]
        }))
        .unwrap();
        let errors = IrValidator::new(&schema).validate(&ir);
        assert!(kinds(&errors).contains(&ValidationErrorKind::AmbiguousColumn));
    }

    #[test]
    fn aggregate_without_group_by_rejected() {
        let schema = ecommerce_schema();
        let mut ir = base_ir();
        ir.select = vec![
            Expression::column("customers.country"),
            Expression::count_star(),
        ];
        let errors = IrValidator::new(&schema).validate(&ir);
        assert!(kinds(&errors).contains(&ValidationErrorKind::GroupByMissing));

        ir.group_by = vec!["customers.country".to_string()];
        let errors = IrValidator::new(&schema).validate(&ir);
        assert!(errors.is_empty(), "{:?}", errors);
    }

    #[test]
    fn select_star_with_aggregate_rejected() {
        let schema = ecommerce_schema();
        let mut ir = base_ir();
        ir.select = vec![Expression::column("customers.*"), Expression::count_star()];
        let errors = IrValidator::new(&schema).validate(&ir);
        assert!(kinds(&errors).contains(&ValidationErrorKind::GroupByMissing));
    }

    #[test]
    fn order_by_aggregate_must_be_selected() {
        let schema = ecommerce_schema();
        let mut ir = base_ir();
        ir.select = vec![Expression::column("customers.country")];
        ir.group_by = vec!["customers.country".to_string()];
        ir.order_by = vec![OrderBy {
            column: OrderKey::Expr(Box::new(Expression::count_star())),
            direction: OrderDirection::Desc,
        }];
        let errors = IrValidator::new(&schema).validate(&ir);
        assert!(kinds(&errors).contains(&ValidationErrorKind::OrderByInvalid));

        ir.select.push(Expression::count_star());
        let errors = IrValidator::new(&schema).validate(&ir);
        assert!(errors.is_empty(), "{:?}", errors);
    }

    #[test]
    fn order_by_string_aggregate_matches_select() {
        let schema = ecommerce_schema();
        let ir: QueryIr = serde_json::from_value(json!({
            "select": [
                {"type": "column", "value": "customers.country"},
                {"type": "aggregate", "function": "COUNT", "args": [{"type": "column", "value": "*"}]}
            ],
            "from_table": "customers",
            "group_by": ["customers.country"],
            "order_by": [{"column": "COUNT(*)", "direction": "DESC"}]
        }))
        .unwrap();
        let errors = IrValidator::new(&schema).validate(&ir);
        assert!(errors.is_empty(), "{:?}", errors);
    }

    #[test]
    fn order_by_alias_and_position_accepted() {
        let schema = ecommerce_schema();
        let ir: QueryIr = serde_json::from_value(json!({
            "select": [{"type": "column", "value": "customers.name", "alias": "customer"}],
            "from_table": "customers",
            "order_by": [{"column": "customer"}, {"column": "1"}]
        }))
        .unwrap();
        let errors = IrValidator::new(&schema).validate(&ir);
        assert!(errors.is_empty(), "{:?}", errors);
    }

    #[test]
    fn is_null_with_right_side_rejected() {
        let schema = ecommerce_schema();
        let ir: QueryIr = serde_json::from_value(json!({
            "select": [{"type": "column", "value": "customers.name"}],
            "from_table": "customers",
            "where": [{
                "left": {"type": "column", "value": "customers.email"},
                "operator": "IS NULL",
                "right": {"type": "literal", "value": 1}
            }]
        }))
        .unwrap();
        let errors = IrValidator::new(&schema).validate(&ir);
        assert!(kinds(&errors).contains(&ValidationErrorKind::PredicateArity));
    }

    #[test]
    fn between_requires_two_literals() {
        let schema = ecommerce_schema();
        let ir: QueryIr = serde_json::from_value(json!({
            "select": [{"type": "column", "value": "orders.order_id"}],
            "from_table": "orders",
            "where": [{
                "left": {"type": "column", "value": "orders.total_amount"},
                "operator": "BETWEEN",
                "right": [{"type": "literal", "value": 10}]
            }]
        }))
        .unwrap();
        let errors = IrValidator::new(&schema).validate(&ir);
        assert!(kinds(&errors).contains(&ValidationErrorKind::PredicateArity));
    }

    #[test]
    fn window_in_where_rejected() {
        let schema = ecommerce_schema();
        let ir: QueryIr = serde_json::from_value(json!({
            "select": [{"type": "column", "value": "orders.order_id"}],
            "from_table": "orders",
            "where": [{
                "left": {
                    "type": "window",
                    "function": "ROW_NUMBER",
                    "partition_by": ["orders.customer_id"]
                },
                "operator": "=",
                "right": {"type": "literal", "value": 1}
            }]
        }))
        .unwrap();
        let errors = IrValidator::new(&schema).validate(&ir);
        assert!(kinds(&errors).contains(&ValidationErrorKind::WindowMisplaced));
    }

    #[test]
    fn cte_is_a_virtual_table() {
        let schema = ecommerce_schema();
        let ir: QueryIr = serde_json::from_value(json!({
            "ctes": [{
                "name": "big_orders",
                "query": {
                    "select": [{"type": "column", "value": "orders.order_id"}],
                    "from_table": "orders"
                }
            }],
            "select": [{"type": "column", "value": "big_orders.order_id"}],
            "from_table": "big_orders"
        }))
        .unwrap();
        let errors = IrValidator::new(&schema).validate(&ir);
        assert!(errors.is_empty(), "{:?}", errors);
    }

    #[test]
    fn duplicate_cte_names_rejected() {
        let schema = ecommerce_schema();
        let mut ir = base_ir();
        let sub: QueryIr = base_ir();
        ir.ctes = vec![
            Cte {
                name: "x".to_string(),
                query: sub.clone(),
            },
            Cte {
                name: "x".to_string(),
                query: sub,
            },
        ];
        let errors = IrValidator::new(&schema).validate(&ir);
        assert!(kinds(&errors).contains(&ValidationErrorKind::CteDuplicate));
    }

    #[test]
    fn cte_self_reference_is_a_cycle() {
        let schema = ecommerce_schema();
        let ir: QueryIr = serde_json::from_value(json!({
            "ctes": [{
                "name": "loop",
                "query": {
                    "select": [{"type": "column", "value": "loop.x"}],
                    "from_table": "loop"
                }
            }],
            "select": [{"type": "column", "value": "loop.x"}],
            "from_table": "loop"
        }))
        .unwrap();
        let errors = IrValidator::new(&schema).validate(&ir);
        assert!(kinds(&errors).contains(&ValidationErrorKind::CteCycle));
    }

    #[test]
    fn later_cte_may_use_earlier_cte() {
        let schema = ecommerce_schema();
        let ir: QueryIr = serde_json::from_value(json!({
            "ctes": [
                {
                    "name": "a",
                    "query": {
                        "select": [{"type": "column", "value": "orders.order_id"}],
                        "from_table": "orders"
                    }
                },
                {
                    "name": "b",
                    "query": {
                        "select": [{"type": "column", "value": "a.order_id"}],
                        "from_table": "a"
                    }
                }
            ],
            "select": [{"type": "column", "value": "b.order_id"}],
            "from_table": "b"
        }))
        .unwrap();
        let errors = IrValidator::new(&schema).validate(&ir);
        assert!(errors.is_empty(), "{:?}", errors);
    }

    #[test]
    fn negative_limit_rejected() {
        let schema = ecommerce_schema();
        let mut ir = base_ir();
        ir.limit = Some(-1);
        let errors = IrValidator::new(&schema).validate(&ir);
        assert!(kinds(&errors).contains(&ValidationErrorKind::NegativeLimit));
    }

    #[test]
    fn cross_join_with_on_rejected() {
        let schema = ecommerce_schema();
        let ir: QueryIr = serde_json::from_value(json!({
            "select": [{"type": "column", "value": "customers.name"}],
            "from_table": "customers",
            "joins": [{
                "type": "CROSS",
                "table": "orders",
                "on": [{
                    "left": {"type": "column", "value": "orders.customer_id"},
                    "operator": "=",
                    "right": {"type": "column", "value": "customers.customer_id"}
                }]
            }]
        }))
        .unwrap();
        let errors = IrValidator::new(&schema).validate(&ir);
        assert!(kinds(&errors).contains(&ValidationErrorKind::PredicateArity));
    }

    #[test]
    fn alias_does_not_make_unqualified_column_ambiguous() {
        let schema = ecommerce_schema();
        let ir: QueryIr = serde_json::from_value(json!({
            "select": [{"type": "column", "value": "email"}],
            "from_table": "customers",
            "from_alias": "c"
        }))
        .unwrap();
        let errors = IrValidator::new(&schema).validate(&ir);
        assert!(errors.is_empty(), "{:?}", errors);
    }

    #[test]
    fn alias_resolves_to_underlying_table() {
        let schema = ecommerce_schema();
        let ir: QueryIr = serde_json::from_value(json!({
            "select": [{"type": "column", "value": "c.name"}],
            "from_table": "customers",
            "from_alias": "c"
        }))
        .unwrap();
        let errors = IrValidator::new(&schema).validate(&ir);
        assert!(errors.is_empty(), "{:?}", errors);
    }
}
