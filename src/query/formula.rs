//! Calculated field formulas.
//!
//! A formula is an arithmetic expression over bracketed field references,
//! e.g. `[Orders.amount] * 0.2 - [shipping]`. References without a table
//! point at other calculated fields.
//!
//! Parsing substitutes each reference with a placeholder identifier and hands
//! the result to sqlparser, then converts the sqlparser AST into
//! [`FormulaExpr`].

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlparser::ast as sql;
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;
use thiserror::Error;

use super::field::FieldRef;

/// Pattern for `[Table.field]` / `[calculated]` references
static REFERENCE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[([^\[\]]+)\]").expect("valid reference pattern"));

/// Prefix used for reference substitution
const REFERENCE_PREFIX: &str = "__ref_";

#[derive(Debug, Error, Clone, PartialEq)]
pub enum FormulaError {
    #[error("Formula is empty")]
    Empty,

    #[error("Invalid field reference: [{0}]")]
    InvalidReference(String),

    #[error("Formula syntax error: {0}")]
    Syntax(String),

    #[error("Unsupported formula construct: {0}")]
    Unsupported(String),
}

pub type FormulaResult<T> = Result<T, FormulaError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithmeticOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
}

/// Parsed formula.
#[derive(Debug, Clone, PartialEq)]
pub enum FormulaExpr {
    Number(f64),
    Field(FieldRef),
    Negate(Box<FormulaExpr>),
    Binary {
        op: ArithmeticOp,
        left: Box<FormulaExpr>,
        right: Box<FormulaExpr>,
    },
}

impl FormulaExpr {
    /// Evaluate against a field lookup. Any null operand yields `None`, as
    /// does division by zero.
    pub fn evaluate<F>(&self, lookup: &F) -> Option<f64>
    where
        F: Fn(&FieldRef) -> Option<f64>,
    {
        match self {
            FormulaExpr::Number(n) => Some(*n),
            FormulaExpr::Field(field) => lookup(field),
            FormulaExpr::Negate(inner) => inner.evaluate(lookup).map(|v| -v),
            FormulaExpr::Binary { op, left, right } => {
                let l = left.evaluate(lookup)?;
                let r = right.evaluate(lookup)?;
                match op {
                    ArithmeticOp::Add => Some(l + r),
                    ArithmeticOp::Subtract => Some(l - r),
                    ArithmeticOp::Multiply => Some(l * r),
                    ArithmeticOp::Divide if r == 0.0 => None,
                    ArithmeticOp::Divide => Some(l / r),
                    ArithmeticOp::Modulo if r == 0.0 => None,
                    ArithmeticOp::Modulo => Some(l % r),
                }
            }
        }
    }
}

/// A named, formula-defined field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CalculatedField {
    pub name: String,
    pub formula: String,
}

impl CalculatedField {
    pub fn new(name: impl Into<String>, formula: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            formula: formula.into(),
        }
    }

    /// Field references in order of appearance, without duplicates.
    /// Malformed references are skipped; [`parse`](Self::parse) reports them.
    pub fn references(&self) -> Vec<FieldRef> {
        let mut refs = Vec::new();
        for cap in REFERENCE_PATTERN.captures_iter(&self.formula) {
            if let Some(field) = FieldRef::parse(&cap[1]) {
                if !refs.contains(&field) {
                    refs.push(field);
                }
            }
        }
        refs
    }

    pub fn parse(&self) -> FormulaResult<FormulaExpr> {
        parse_formula(&self.formula)
    }
}

/// Parse a formula string.
pub fn parse_formula(formula: &str) -> FormulaResult<FormulaExpr> {
    if formula.trim().is_empty() {
        return Err(FormulaError::Empty);
    }

    let mut fields: Vec<FieldRef> = Vec::new();
    let mut bad_reference = None;
    let substituted = REFERENCE_PATTERN.replace_all(formula, |caps: &regex::Captures| {
        match FieldRef::parse(&caps[1]) {
            Some(field) => {
                let idx = fields.iter().position(|f| *f == field).unwrap_or_else(|| {
                    fields.push(field);
                    fields.len() - 1
                });
                format!("{}{}", REFERENCE_PREFIX, idx)
            }
            None => {
                bad_reference.get_or_insert_with(|| caps[1].to_string());
                String::from("NULL")
            }
        }
    });
    if let Some(bad) = bad_reference {
        return Err(FormulaError::InvalidReference(bad));
    }

    let sql = format!("SELECT {}", substituted);
    let statements = Parser::parse_sql(&GenericDialect {}, &sql)
        .map_err(|e| FormulaError::Syntax(e.to_string()))?;

    let expr = single_projection(&statements)?;
    convert(expr, &fields)
}

fn single_projection(statements: &[sql::Statement]) -> FormulaResult<&sql::Expr> {
    let [sql::Statement::Query(query)] = statements else {
        return Err(FormulaError::Syntax("expected a single expression".into()));
    };
    let sql::SetExpr::Select(select) = query.body.as_ref() else {
        return Err(FormulaError::Syntax("expected a single expression".into()));
    };
    if !select.from.is_empty() || select.selection.is_some() {
        return Err(FormulaError::Syntax("expected a single expression".into()));
    }
    match select.projection.as_slice() {
        [sql::SelectItem::UnnamedExpr(expr)] => Ok(expr),
        _ => Err(FormulaError::Syntax("expected a single expression".into())),
    }
}

fn convert(expr: &sql::Expr, fields: &[FieldRef]) -> FormulaResult<FormulaExpr> {
    match expr {
        sql::Expr::Value(sql::Value::Number(n, _)) => n
            .parse::<f64>()
            .map(FormulaExpr::Number)
            .map_err(|_| FormulaError::Syntax(format!("invalid number '{}'", n))),
        sql::Expr::Identifier(ident) => ident
            .value
            .strip_prefix(REFERENCE_PREFIX)
            .and_then(|idx| idx.parse::<usize>().ok())
            .and_then(|idx| fields.get(idx))
            .map(|field| FormulaExpr::Field(field.clone()))
            .ok_or_else(|| {
                FormulaError::Unsupported(format!(
                    "bare identifier '{}' (wrap field names in brackets)",
                    ident.value
                ))
            }),
        sql::Expr::Nested(inner) => convert(inner, fields),
        sql::Expr::UnaryOp { op, expr } => {
            let inner = convert(expr, fields)?;
            match op {
                sql::UnaryOperator::Minus => Ok(FormulaExpr::Negate(Box::new(inner))),
                sql::UnaryOperator::Plus => Ok(inner),
                other => Err(FormulaError::Unsupported(format!("operator {}", other))),
            }
        }
        sql::Expr::BinaryOp { left, op, right } => {
            let op = match op {
                sql::BinaryOperator::Plus => ArithmeticOp::Add,
                sql::BinaryOperator::Minus => ArithmeticOp::Subtract,
                sql::BinaryOperator::Multiply => ArithmeticOp::Multiply,
                sql::BinaryOperator::Divide => ArithmeticOp::Divide,
                sql::BinaryOperator::Modulo => ArithmeticOp::Modulo,
                other => return Err(FormulaError::Unsupported(format!("operator {}", other))),
            };
            Ok(FormulaExpr::Binary {
                op,
                left: Box::new(convert(left, fields)?),
                right: Box::new(convert(right, fields)?),
            })
        }
        other => Err(FormulaError::Unsupported(other.to_string())),
    }
}
