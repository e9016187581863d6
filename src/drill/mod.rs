//! Drill-down navigation.
//!
//! Clicking a value in a grouped column narrows the query to that value and
//! pushes the previous filters onto a stack, so the user can step back.

use serde::Serialize;
use serde_json::Value;

use crate::query::{FieldRef, FilterOperator, FilterSpec, GroupSpec, QueryDefinition};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DrillError {
    #[error("Column '{0}' is not a grouping and cannot be drilled into")]
    NotGrouped(String),

    #[error("Nothing to go back to")]
    Empty,
}

pub type DrillResult<T> = Result<T, DrillError>;

/// One drill step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DrillDownFrame {
    pub field: FieldRef,
    pub value: Value,
    /// Builder filters active before this step.
    pub previous_filters: Vec<FilterSpec>,
}

/// LIFO stack of drill steps. Never persisted.
#[derive(Debug, Clone, Default)]
pub struct DrillStack {
    frames: Vec<DrillDownFrame>,
}

impl DrillStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// The grouping whose result header equals `header`.
    pub fn resolve_group<'a>(definition: &'a QueryDefinition, header: &str) -> DrillResult<&'a GroupSpec> {
        definition
            .groups
            .iter()
            .find(|g| g.header() == header)
            .ok_or_else(|| DrillError::NotGrouped(header.to_string()))
    }

    /// Push a frame and return the narrowed filter list.
    ///
    /// The new filter compares the group's field with the clicked value,
    /// bucketed at the group's granularity.
    pub fn drill_down(&mut self, definition: &QueryDefinition, header: &str, value: Value) -> DrillResult<Vec<FilterSpec>> {
        let group = Self::resolve_group(definition, header)?;
        let mut filters = definition.filters.clone();
        filters.push(FilterSpec {
            field: group.field.clone(),
            operator: FilterOperator::Equals,
            value: value.clone(),
            granularity: group.granularity,
        });

        self.frames.push(DrillDownFrame {
            field: group.field.clone(),
            value,
            previous_filters: definition.filters.clone(),
        });
        tracing::debug!(field = %group.field, depth = self.frames.len(), "drilled down");
        Ok(filters)
    }

    /// Pop a frame and return the filters that were active before it.
    ///
    /// `current_filters` only serves to report filters that are discarded.
    pub fn drill_back(&mut self, current_filters: &[FilterSpec]) -> DrillResult<Vec<FilterSpec>> {
        let frame = self.frames.pop().ok_or(DrillError::Empty)?;
        let expected = frame.previous_filters.len() + 1;
        if current_filters.len() > expected {
            tracing::debug!(
                discarded = current_filters.len() - expected,
                "filters added while drilled are discarded"
            );
        }
        Ok(frame.previous_filters)
    }

    pub fn can_go_back(&self) -> bool {
        !self.frames.is_empty()
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn frames(&self) -> &[DrillDownFrame] {
        &self.frames
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }
}
