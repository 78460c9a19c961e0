//! Typed intermediate representation: model, sanitizer, validator, compiler

pub mod compiler;
pub mod model;
pub mod sanitizer;
pub mod validator;

pub use compiler::{Params, SqlCompiler};
pub use model::{
    Ambiguity, Cte, Expression, Join, JoinType, Operand, Operator, OrderBy, OrderDirection,
    OrderKey, Predicate, QueryIr,
};
pub use sanitizer::sanitize;
pub use validator::{IrValidator, ValidationError, ValidationErrorKind};
