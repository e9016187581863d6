//! The canonical query definition.
//!
//! A [`QueryDefinition`] is the single source of truth for a report or a
//! widget query. The composition surface never patches it in place: every
//! edit produces a fresh snapshot (see `compose::CompositionSurface::resync`).

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::field::FieldRef;
use super::format::FormatSpec;
use super::formula::CalculatedField;
use crate::catalog::FieldType;

/// Aggregation applied to a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
    #[default]
    None,
    Sum,
    Count,
    Avg,
    Min,
    Max,
}

impl Aggregation {
    const NUMERIC: &'static [Aggregation] = &[
        Aggregation::None,
        Aggregation::Sum,
        Aggregation::Count,
        Aggregation::Avg,
        Aggregation::Min,
        Aggregation::Max,
    ];
    const NON_NUMERIC: &'static [Aggregation] = &[Aggregation::None, Aggregation::Count];

    /// Aggregations selectable for a field.
    pub fn allowed_for(is_numeric: bool) -> &'static [Aggregation] {
        if is_numeric {
            Self::NUMERIC
        } else {
            Self::NON_NUMERIC
        }
    }

    pub fn is_allowed_for(self, is_numeric: bool) -> bool {
        Self::allowed_for(is_numeric).contains(&self)
    }

    pub fn is_aggregate(self) -> bool {
        self != Aggregation::None
    }

    pub fn sql_name(self) -> &'static str {
        match self {
            Aggregation::None => "",
            Aggregation::Sum => "SUM",
            Aggregation::Count => "COUNT",
            Aggregation::Avg => "AVG",
            Aggregation::Min => "MIN",
            Aggregation::Max => "MAX",
        }
    }
}

/// Comparison used by a filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOperator {
    #[default]
    Equals,
    NotEquals,
    GreaterThan,
    GreaterOrEqual,
    LessThan,
    LessOrEqual,
    Contains,
    IsNull,
    IsNotNull,
}

impl FilterOperator {
    /// Whether the operator compares against a value.
    pub fn takes_value(self) -> bool {
        !matches!(self, FilterOperator::IsNull | FilterOperator::IsNotNull)
    }
}

/// Bucketing applied to a grouped (or drilled) date value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    #[default]
    Exact,
    Year,
    Quarter,
    Month,
}

impl Granularity {
    const TEMPORAL: &'static [Granularity] = &[
        Granularity::Exact,
        Granularity::Year,
        Granularity::Quarter,
        Granularity::Month,
    ];
    const EXACT_ONLY: &'static [Granularity] = &[Granularity::Exact];

    /// Granularities selectable for a field type.
    pub fn allowed_for(field_type: FieldType) -> &'static [Granularity] {
        if field_type.is_temporal() {
            Self::TEMPORAL
        } else {
            Self::EXACT_ONLY
        }
    }

    pub fn is_allowed_for(self, field_type: FieldType) -> bool {
        Self::allowed_for(field_type).contains(&self)
    }

    pub fn label(self) -> &'static str {
        match self {
            Granularity::Exact => "exact",
            Granularity::Year => "year",
            Granularity::Quarter => "quarter",
            Granularity::Month => "month",
        }
    }

    /// Bucket an ISO-8601 date or timestamp string.
    ///
    /// `2024-05-11` becomes `2024` (year), `2024-Q2` (quarter) or `2024-05`
    /// (month). Returns `None` when the value is not a date.
    pub fn bucket(self, value: &str) -> Option<String> {
        if self == Granularity::Exact {
            return Some(value.to_string());
        }
        let year = value.get(0..4).filter(|y| y.bytes().all(|b| b.is_ascii_digit()))?;
        let month: u32 = value
            .get(5..7)
            .filter(|_| value.as_bytes().get(4) == Some(&b'-'))
            .and_then(|m| m.parse().ok())
            .filter(|m| (1..=12).contains(m))?;
        Some(match self {
            Granularity::Year => year.to_string(),
            Granularity::Quarter => format!("{}-Q{}", year, (month - 1) / 3 + 1),
            Granularity::Month => format!("{}-{:02}", year, month),
            Granularity::Exact => value.to_string(),
        })
    }

    /// Bucket a JSON value; non-string values pass through unchanged.
    pub fn bucket_value(self, value: &Value) -> Value {
        match (self, value) {
            (Granularity::Exact, _) => value.clone(),
            (_, Value::String(s)) => self.bucket(s).map(Value::String).unwrap_or(Value::Null),
            _ => value.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinType {
    #[default]
    Inner,
    Left,
}

/// A selected output column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub field: FieldRef,
    #[serde(default)]
    pub aggregation: Aggregation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl ColumnSpec {
    pub fn new(field: FieldRef) -> Self {
        Self {
            field,
            aggregation: Aggregation::None,
            label: None,
        }
    }

    pub fn aggregated(field: FieldRef, aggregation: Aggregation) -> Self {
        Self {
            field,
            aggregation,
            label: None,
        }
    }

    /// Result header produced for this column.
    pub fn header(&self) -> String {
        if let Some(label) = &self.label {
            return label.clone();
        }
        match self.aggregation {
            Aggregation::None => self.field.qualified(),
            agg => format!("{}({})", agg.sql_name(), self.field.qualified()),
        }
    }
}

/// A builder filter condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterSpec {
    pub field: FieldRef,
    #[serde(default)]
    pub operator: FilterOperator,
    #[serde(default)]
    pub value: Value,
    /// Bucketing applied to the field before comparison.
    #[serde(default)]
    pub granularity: Granularity,
}

impl FilterSpec {
    pub fn new(field: FieldRef, operator: FilterOperator, value: impl Into<Value>) -> Self {
        Self {
            field,
            operator,
            value: value.into(),
            granularity: Granularity::Exact,
        }
    }

    pub fn equals(field: FieldRef, value: impl Into<Value>) -> Self {
        Self::new(field, FilterOperator::Equals, value)
    }
}

/// A grouping dimension.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupSpec {
    pub field: FieldRef,
    #[serde(default)]
    pub granularity: Granularity,
}

impl GroupSpec {
    pub fn new(field: FieldRef) -> Self {
        Self {
            field,
            granularity: Granularity::Exact,
        }
    }

    /// Result header produced for this grouping.
    ///
    /// Drill-down uses this name to find the grouping behind a clicked cell.
    pub fn header(&self) -> String {
        match self.granularity {
            Granularity::Exact => self.field.qualified(),
            g => format!("{} ({})", self.field.qualified(), g.label()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SortSpec {
    pub field: FieldRef,
    #[serde(default)]
    pub direction: SortDirection,
}

/// An explicit join between two referenced tables.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Join {
    pub left: FieldRef,
    #[serde(default)]
    pub join_type: JoinType,
    pub right: FieldRef,
}

impl Join {
    pub fn inner(left: FieldRef, right: FieldRef) -> Self {
        Self {
            left,
            join_type: JoinType::Inner,
            right,
        }
    }

    /// Whether this join links the two given tables, in either direction.
    pub fn connects(&self, a: &str, b: &str) -> bool {
        (self.left.table == a && self.right.table == b)
            || (self.left.table == b && self.right.table == a)
    }
}

impl fmt::Display for Join {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.join_type {
            JoinType::Inner => "INNER",
            JoinType::Left => "LEFT",
        };
        write!(f, "{} {} JOIN ON {}", self.left, kind, self.right)
    }
}

/// Requested result page. `page_size == 0` returns every row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub page: u32,
    pub page_size: u32,
}

impl Pagination {
    pub fn new(page: u32, page_size: u32) -> Self {
        Self {
            page: page.max(1),
            page_size,
        }
    }

    pub fn unpaged() -> Self {
        Self {
            page: 1,
            page_size: 0,
        }
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self::new(1, 25)
    }
}

/// Canonical semantic description of a query.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryDefinition {
    pub connection_id: Option<String>,
    pub columns: Vec<ColumnSpec>,
    pub filters: Vec<FilterSpec>,
    pub groups: Vec<GroupSpec>,
    pub sorts: Vec<SortSpec>,
    pub joins: Vec<Join>,
    pub calculated_fields: Vec<CalculatedField>,
    /// Read-time formats keyed by result header.
    pub formats: BTreeMap<String, FormatSpec>,
    pub pagination: Pagination,
}

impl QueryDefinition {
    pub fn new(connection_id: impl Into<String>) -> Self {
        Self {
            connection_id: Some(connection_id.into()),
            ..Self::default()
        }
    }

    /// True when there is nothing to select.
    pub fn is_empty_selection(&self) -> bool {
        self.columns.is_empty() && self.groups.is_empty()
    }

    /// True when the result is aggregated (grouped or using aggregate columns).
    pub fn is_aggregated(&self) -> bool {
        !self.groups.is_empty() || self.columns.iter().any(|c| c.aggregation.is_aggregate())
    }

    /// Distinct physical tables referenced by columns, groups, filters and
    /// sorts, in order of first appearance. The calculated pseudo-table is
    /// excluded; fields referenced by calculated formulas are included.
    pub fn referenced_tables(&self) -> Vec<String> {
        let mut tables: Vec<String> = Vec::new();
        let mut push = |field: &FieldRef| {
            if !field.is_calculated() && !tables.iter().any(|t| *t == field.table) {
                tables.push(field.table.clone());
            }
        };

        let direct = self
            .columns
            .iter()
            .map(|c| &c.field)
            .chain(self.groups.iter().map(|g| &g.field))
            .chain(self.filters.iter().map(|f| &f.field))
            .chain(self.sorts.iter().map(|s| &s.field));

        for field in direct {
            if field.is_calculated() {
                for reference in self.formula_references(&field.name) {
                    push(&reference);
                }
            } else {
                push(field);
            }
        }
        tables
    }

    /// Physical fields a calculated field depends on, following references
    /// to other calculated fields.
    pub fn formula_references(&self, name: &str) -> Vec<FieldRef> {
        let mut out = Vec::new();
        let mut pending = vec![name.to_string()];
        let mut seen: Vec<String> = Vec::new();
        while let Some(current) = pending.pop() {
            if seen.contains(&current) {
                continue;
            }
            seen.push(current.clone());
            let Some(calc) = self.calculated(&current) else {
                continue;
            };
            for reference in calc.references() {
                if reference.is_calculated() {
                    pending.push(reference.name);
                } else if !out.contains(&reference) {
                    out.push(reference);
                }
            }
        }
        out
    }

    /// Every field referenced anywhere except in joins and formulas.
    pub fn referenced_fields(&self) -> Vec<FieldRef> {
        let mut fields: Vec<FieldRef> = Vec::new();
        let all = self
            .columns
            .iter()
            .map(|c| &c.field)
            .chain(self.groups.iter().map(|g| &g.field))
            .chain(self.filters.iter().map(|f| &f.field))
            .chain(self.sorts.iter().map(|s| &s.field));
        for field in all {
            if !fields.contains(field) {
                fields.push(field.clone());
            }
        }
        fields
    }

    /// Fields a hand-built join may use: the referenced fields, with each
    /// calculated field replaced by the fields its formula reads.
    pub fn join_candidate_fields(&self) -> Vec<FieldRef> {
        let mut fields: Vec<FieldRef> = Vec::new();
        for field in self.referenced_fields() {
            let expanded = if field.is_calculated() {
                self.formula_references(&field.name)
            } else {
                vec![field]
            };
            for candidate in expanded {
                if !fields.contains(&candidate) {
                    fields.push(candidate);
                }
            }
        }
        fields
    }

    pub fn calculated(&self, name: &str) -> Option<&CalculatedField> {
        self.calculated_fields.iter().find(|c| c.name == name)
    }

    /// Result headers in output order: groups first, then columns.
    pub fn headers(&self) -> Vec<String> {
        self.groups
            .iter()
            .map(GroupSpec::header)
            .chain(self.columns.iter().map(ColumnSpec::header))
            .collect()
    }

    /// Copy of this definition with additional filters appended.
    ///
    /// Used to compose interactive (end-user) filters alongside the builder
    /// filters without touching the canonical definition.
    pub fn with_extra_filters(&self, extra: &[FilterSpec]) -> QueryDefinition {
        let mut composed = self.clone();
        composed.filters.extend(extra.iter().cloned());
        composed
    }

    /// Copy of this definition requesting another page.
    pub fn with_page(&self, page: u32) -> QueryDefinition {
        let mut paged = self.clone();
        paged.pagination.page = page.max(1);
        paged
    }
}
