//! Intermediate representation of a SELECT query
//!
//! A closed algebraic description: the LLM produces it (as JSON), the
//! sanitizer normalizes it, the validator checks it, the compiler reads
//! it. No stage mutates an IR after validation.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Expression over the query's scope, discriminated by `type`
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Expression {
    /// `"t.c"`, `"c"`, `"*"`, or `"t.*"`
    Column {
        value: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        alias: Option<String>,
    },
    /// A constant; always compiled through the binding map
    Literal {
        value: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        alias: Option<String>,
    },
    /// Scalar function call
    Function {
        #[serde(alias = "name")]
        function: String,
        #[serde(default)]
        args: Vec<Expression>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        alias: Option<String>,
    },
    /// Aggregate; `COUNT(*)` is `function="COUNT", args=[column("*")]`
    Aggregate {
        #[serde(alias = "name")]
        function: String,
        #[serde(default)]
        args: Vec<Expression>,
        #[serde(default)]
        distinct: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        alias: Option<String>,
    },
    /// Window function; only legal in SELECT and ORDER BY
    Window {
        #[serde(alias = "name")]
        function: String,
        #[serde(default)]
        args: Vec<Expression>,
        #[serde(default)]
        partition_by: Vec<String>,
        #[serde(default)]
        order_by: Vec<OrderBy>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        alias: Option<String>,
    },
    /// Scalar or IN-list subquery
    Subquery {
        #[serde(alias = "subquery")]
        query: Box<QueryIr>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        alias: Option<String>,
    },
}

impl Expression {
    pub fn column(value: impl Into<String>) -> Self {
        Self::Column {
            value: value.into(),
            alias: None,
        }
    }

    pub fn literal(value: impl Into<Value>) -> Self {
        Self::Literal {
            value: value.into(),
            alias: None,
        }
    }

    pub fn aggregate(function: impl Into<String>, args: Vec<Expression>) -> Self {
        Self::Aggregate {
            function: function.into(),
            args,
            distinct: false,
            alias: None,
        }
    }

    pub fn count_star() -> Self {
        Self::aggregate("COUNT", vec![Self::column("*")])
    }

    pub fn alias(&self) -> Option<&str> {
        match self {
            Self::Column { alias, .. }
            | Self::Literal { alias, .. }
            | Self::Function { alias, .. }
            | Self::Aggregate { alias, .. }
            | Self::Window { alias, .. }
            | Self::Subquery { alias, .. } => alias.as_deref(),
        }
    }

    pub fn is_aggregate(&self) -> bool {
        matches!(self, Self::Aggregate { .. })
    }

    pub fn is_window(&self) -> bool {
        matches!(self, Self::Window { .. })
    }

    /// True if this expression or any nested argument is a window function
    pub fn contains_window(&self) -> bool {
        match self {
            Self::Window { .. } => true,
            Self::Function { args, .. } | Self::Aggregate { args, .. } => {
                args.iter().any(|a| a.contains_window())
            }
            _ => false,
        }
    }

    /// True if this expression or any nested argument is a subquery
    pub fn contains_subquery(&self) -> bool {
        match self {
            Self::Subquery { .. } => true,
            Self::Function { args, .. }
            | Self::Aggregate { args, .. }
            | Self::Window { args, .. } => args.iter().any(|a| a.contains_subquery()),
            _ => false,
        }
    }

    /// Equality that ignores aliases, used for "appears in SELECT" checks
    pub fn same_shape(&self, other: &Expression) -> bool {
        match (self, other) {
            (Self::Column { value: a, .. }, Self::Column { value: b, .. }) => a == b,
            (Self::Literal { value: a, .. }, Self::Literal { value: b, .. }) => a == b,
            (
                Self::Function {
                    function: fa,
                    args: aa,
                    ..
                },
                Self::Function {
                    function: fb,
                    args: ab,
                    ..
                },
            ) => {
                fa.eq_ignore_ascii_case(fb)
                    && aa.len() == ab.len()
                    && aa.iter().zip(ab).all(|(x, y)| x.same_shape(y))
            }
            (
                Self::Aggregate {
                    function: fa,
                    args: aa,
                    distinct: da,
                    ..
                },
                Self::Aggregate {
                    function: fb,
                    args: ab,
                    distinct: db,
                    ..
                },
            ) => {
                fa.eq_ignore_ascii_case(fb)
                    && da == db
                    && aa.len() == ab.len()
                    && aa.iter().zip(ab).all(|(x, y)| x.same_shape(y))
            }
            _ => false,
        }
    }
}

/// Comparison operators supported in predicates
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum Operator {
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "!=", alias = "<>")]
    Ne,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "IN")]
    In,
    #[serde(rename = "NOT IN")]
    NotIn,
    #[serde(rename = "LIKE")]
    Like,
    #[serde(rename = "NOT LIKE")]
    NotLike,
    #[serde(rename = "BETWEEN")]
    Between,
    #[serde(rename = "IS NULL")]
    IsNull,
    #[serde(rename = "IS NOT NULL")]
    IsNotNull,
}

impl Operator {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::In => "IN",
            Self::NotIn => "NOT IN",
            Self::Like => "LIKE",
            Self::NotLike => "NOT LIKE",
            Self::Between => "BETWEEN",
            Self::IsNull => "IS NULL",
            Self::IsNotNull => "IS NOT NULL",
        }
    }

    /// Unary operators take no right operand
    pub fn is_unary(&self) -> bool {
        matches!(self, Self::IsNull | Self::IsNotNull)
    }
}

/// Right-hand side of a predicate: a single expression, or a list for
/// `IN` and `BETWEEN`
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Operand {
    One(Box<Expression>),
    Many(Vec<Expression>),
}

/// Conjunctive predicate
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Predicate {
    pub left: Expression,
    pub operator: Operator,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub right: Option<Operand>,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Full,
    Cross,
}

impl JoinType {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Inner => "INNER",
            Self::Left => "LEFT",
            Self::Right => "RIGHT",
            Self::Full => "FULL",
            Self::Cross => "CROSS",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Join {
    #[serde(rename = "type")]
    pub join_type: JoinType,
    pub table: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    /// Equality predicates; empty for CROSS joins
    #[serde(default)]
    pub on: Vec<Predicate>,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderDirection {
    #[default]
    Asc,
    Desc,
}

impl OrderDirection {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// An order-by key: a bare column/alias name, or a full expression
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum OrderKey {
    Name(String),
    Expr(Box<Expression>),
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct OrderBy {
    pub column: OrderKey,
    #[serde(default)]
    pub direction: OrderDirection,
}

/// Named subquery visible to the main query
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Cte {
    pub name: String,
    pub query: QueryIr,
}

/// Clarification signal reported by the producer
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Default)]
pub struct Ambiguity {
    #[serde(default)]
    pub what: String,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub interpretations: Vec<String>,
}

fn default_confidence() -> f64 {
    1.0
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct QueryIr {
    #[serde(default)]
    pub ctes: Vec<Cte>,
    pub select: Vec<Expression>,
    #[serde(default)]
    pub distinct: bool,
    /// Root table or CTE name
    pub from_table: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_alias: Option<String>,
    #[serde(default)]
    pub joins: Vec<Join>,
    #[serde(default, rename = "where")]
    pub where_clause: Vec<Predicate>,
    #[serde(default)]
    pub group_by: Vec<String>,
    #[serde(default)]
    pub having: Vec<Predicate>,
    #[serde(default)]
    pub order_by: Vec<OrderBy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<i64>,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    #[serde(default)]
    pub ambiguities: Vec<Ambiguity>,
    #[serde(default)]
    pub questions: Vec<String>,
}

impl QueryIr {
    /// True if any selected expression is an aggregate
    pub fn has_aggregate_select(&self) -> bool {
        self.select.iter().any(|e| e.is_aggregate())
    }

    /// Tables touched by the query: FROM plus join targets (not CTEs)
    pub fn tables_used(&self) -> Vec<String> {
        let mut tables = vec![self.from_table.clone()];
        for join in &self.joins {
            if !tables.contains(&join.table) {
                tables.push(join.table.clone());
            }
        }
        tables
    }
}
