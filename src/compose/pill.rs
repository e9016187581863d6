//! Pills: the typed items placed in the slots of the composition surface.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::catalog::FieldType;
use crate::query::{Aggregation, FieldRef, FilterOperator, Granularity, JoinType, SortDirection};

/// Drop zones of the composition surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Slot {
    Columns,
    Filters,
    Groups,
    Sorts,
    Joins,
    Calculated,
}

impl Slot {
    pub const ALL: [Slot; 6] = [
        Slot::Columns,
        Slot::Filters,
        Slot::Groups,
        Slot::Sorts,
        Slot::Joins,
        Slot::Calculated,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Slot::Columns => "columns",
            Slot::Filters => "filters",
            Slot::Groups => "groups",
            Slot::Sorts => "sorts",
            Slot::Joins => "joins",
            Slot::Calculated => "calculated",
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stable identity of a pill on the surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PillId(pub u64);

impl fmt::Display for PillId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Slot-specific pill state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PillKind {
    Column {
        field: FieldRef,
        numeric: bool,
        aggregation: Aggregation,
        label: Option<String>,
    },
    Filter {
        field: FieldRef,
        field_type: FieldType,
        operator: FilterOperator,
        value: Value,
        granularity: Granularity,
    },
    Group {
        field: FieldRef,
        field_type: FieldType,
        granularity: Granularity,
    },
    Sort {
        field: FieldRef,
        direction: SortDirection,
    },
    /// A join under construction; incomplete joins are skipped on resync.
    Join {
        left: Option<FieldRef>,
        join_type: JoinType,
        right: Option<FieldRef>,
    },
    Calculated {
        name: String,
        formula: String,
    },
}

impl PillKind {
    /// The field this pill places, if any.
    pub fn field(&self) -> Option<&FieldRef> {
        match self {
            PillKind::Column { field, .. }
            | PillKind::Filter { field, .. }
            | PillKind::Group { field, .. }
            | PillKind::Sort { field, .. } => Some(field),
            PillKind::Join { .. } | PillKind::Calculated { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pill {
    pub id: PillId,
    pub slot: Slot,
    pub kind: PillKind,
}

/// An in-pill edit.
#[derive(Debug, Clone, PartialEq)]
pub enum PillEdit {
    Aggregation(Aggregation),
    Operator(FilterOperator),
    Value(Value),
    Direction(SortDirection),
    Granularity(Granularity),
    Label(Option<String>),
    JoinType(JoinType),
    JoinLeft(FieldRef),
    JoinRight(FieldRef),
    Formula(String),
}

impl PillEdit {
    pub fn name(&self) -> &'static str {
        match self {
            PillEdit::Aggregation(_) => "aggregation",
            PillEdit::Operator(_) => "operator",
            PillEdit::Value(_) => "value",
            PillEdit::Direction(_) => "direction",
            PillEdit::Granularity(_) => "granularity",
            PillEdit::Label(_) => "label",
            PillEdit::JoinType(_) => "join type",
            PillEdit::JoinLeft(_) => "join left side",
            PillEdit::JoinRight(_) => "join right side",
            PillEdit::Formula(_) => "formula",
        }
    }

    /// Whether the edit can change the referenced tables or the joins, and so
    /// requires join revalidation.
    pub fn affects_joins(&self) -> bool {
        matches!(
            self,
            PillEdit::JoinType(_) | PillEdit::JoinLeft(_) | PillEdit::JoinRight(_) | PillEdit::Formula(_)
        )
    }
}
