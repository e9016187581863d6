//! Query definition model.
//!
//! The typed description of a query that every other component reads:
//! field references, the definition itself, calculated-field formulas,
//! read-time formats and reference validation.

mod definition;
mod field;
mod format;
mod formula;
mod validate;

pub use definition::{
    Aggregation, ColumnSpec, FilterOperator, FilterSpec, Granularity, GroupSpec, Join, JoinType,
    Pagination, QueryDefinition, SortDirection, SortSpec,
};
pub use field::{FieldRef, CALCULATED_TABLE};
pub use format::{compact, plain, FormatSpec};
pub use formula::{
    parse_formula, ArithmeticOp, CalculatedField, FormulaError, FormulaExpr, FormulaResult,
};
pub use validate::ValidationIssue;
