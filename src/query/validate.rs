//! Reference validation of a definition against a catalog.

use std::collections::HashSet;

use super::definition::QueryDefinition;
use super::field::FieldRef;
use super::formula::FormulaError;
use crate::catalog::SchemaCatalog;

/// A problem found by [`QueryDefinition::validate_against`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationIssue {
    #[error("Unknown field: {0}")]
    UnknownField(FieldRef),

    #[error("Calculated field '{0}' is defined more than once")]
    DuplicateCalculatedField(String),

    #[error("Calculated field '{name}' is invalid: {error}")]
    InvalidFormula { name: String, error: FormulaError },

    #[error("Calculated field '{0}' refers to itself")]
    CircularFormula(String),

    #[error("Aggregation {aggregation} is not allowed on non-numeric field {field}")]
    AggregationNotAllowed { field: FieldRef, aggregation: String },

    #[error("Join table '{0}' is not referenced by the query")]
    JoinTableNotReferenced(String),
}

impl QueryDefinition {
    /// Check that every reference resolves to a schema field or a calculated
    /// field, and that joins only link referenced tables.
    pub fn validate_against(&self, catalog: &SchemaCatalog) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();

        let mut names = HashSet::new();
        for calc in &self.calculated_fields {
            if !names.insert(calc.name.as_str()) {
                issues.push(ValidationIssue::DuplicateCalculatedField(calc.name.clone()));
            }
            if let Err(error) = calc.parse() {
                issues.push(ValidationIssue::InvalidFormula {
                    name: calc.name.clone(),
                    error,
                });
            }
            for reference in calc.references() {
                self.check_reference(&reference, catalog, &mut issues);
            }
            if self.is_circular(&calc.name) {
                issues.push(ValidationIssue::CircularFormula(calc.name.clone()));
            }
        }

        for field in self.referenced_fields() {
            self.check_reference(&field, catalog, &mut issues);
        }

        for column in &self.columns {
            if column.field.is_calculated() {
                continue;
            }
            if let Some(schema_field) = catalog.field(&column.field) {
                if !column.aggregation.is_allowed_for(schema_field.is_numeric) {
                    issues.push(ValidationIssue::AggregationNotAllowed {
                        field: column.field.clone(),
                        aggregation: column.aggregation.sql_name().to_string(),
                    });
                }
            }
        }

        let tables = self.referenced_tables();
        for join in &self.joins {
            for side in [&join.left, &join.right] {
                self.check_reference(side, catalog, &mut issues);
                if !tables.contains(&side.table) {
                    let issue = ValidationIssue::JoinTableNotReferenced(side.table.clone());
                    if !issues.contains(&issue) {
                        issues.push(issue);
                    }
                }
            }
        }

        issues
    }

    fn check_reference(&self, field: &FieldRef, catalog: &SchemaCatalog, issues: &mut Vec<ValidationIssue>) {
        let known = if field.is_calculated() {
            self.calculated(&field.name).is_some()
        } else {
            catalog.contains(field)
        };
        if !known {
            let issue = ValidationIssue::UnknownField(field.clone());
            if !issues.contains(&issue) {
                issues.push(issue);
            }
        }
    }

    /// True when a calculated field reaches itself through its references.
    pub fn is_circular(&self, name: &str) -> bool {
        let mut pending: Vec<String> = self
            .calculated(name)
            .map(|c| {
                c.references()
                    .into_iter()
                    .filter(FieldRef::is_calculated)
                    .map(|r| r.name)
                    .collect()
            })
            .unwrap_or_default();
        let mut seen = HashSet::new();
        while let Some(current) = pending.pop() {
            if current == name {
                return true;
            }
            if !seen.insert(current.clone()) {
                continue;
            }
            if let Some(calc) = self.calculated(&current) {
                pending.extend(
                    calc.references()
                        .into_iter()
                        .filter(FieldRef::is_calculated)
                        .map(|r| r.name),
                );
            }
        }
        false
    }
}
