//! Visual composition surface.
//!
//! Users build a query by dropping schema fields into slots and editing the
//! resulting pills. The surface holds no query semantics of its own: the
//! [`QueryDefinition`](crate::query::QueryDefinition) is always re-derived
//! from all pills at once.

mod pill;
mod surface;

pub use pill::{Pill, PillEdit, PillId, PillKind, Slot};
pub use surface::CompositionSurface;

use crate::query::{Aggregation, FieldRef, FormulaError, Granularity};

/// A rejected surface edit.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CompositionError {
    #[error("No pill {0} on the surface")]
    UnknownPill(PillId),

    #[error("Field {0} is not in the schema catalog")]
    UnknownField(FieldRef),

    #[error("Fields cannot be dropped into the {0} slot")]
    SlotNotAccepting(Slot),

    #[error("{aggregation:?} is not allowed on non-numeric field {field}")]
    AggregationNotAllowed {
        field: FieldRef,
        aggregation: Aggregation,
    },

    #[error("{granularity:?} granularity is not allowed on {field}")]
    GranularityNotAllowed {
        field: FieldRef,
        granularity: Granularity,
    },

    #[error("A {edit} edit does not apply to a pill in the {slot} slot")]
    EditNotApplicable { edit: &'static str, slot: Slot },

    #[error("Invalid calculated field name '{0}'")]
    InvalidCalculatedName(String),

    #[error("Calculated field '{0}' already exists")]
    DuplicateCalculatedField(String),

    #[error("Unknown calculated field '{0}'")]
    UnknownCalculatedField(String),

    #[error("Calculated field '{name}': {error}")]
    InvalidFormula { name: String, error: FormulaError },

    #[error("Calculated field '{0}' refers to itself")]
    CircularFormula(String),

    #[error("Calculated field '{0}' is still in use")]
    CalculatedFieldInUse(String),

    #[error("Join field {0} is not used by the query")]
    JoinFieldNotReferenced(FieldRef),
}

pub type CompositionResult<T> = Result<T, CompositionError>;
