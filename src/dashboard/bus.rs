//! Cross-widget filter bus.
//!
//! A click on a chart publishes a filter that narrows every other widget on
//! the dashboard. A widget is never filtered by its own publications.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::widget::WidgetId;
use crate::query::{FieldRef, FilterOperator, FilterSpec};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossWidgetFilter {
    pub source_widget_id: WidgetId,
    pub field: FieldRef,
    pub value: Value,
    #[serde(default)]
    pub operator: FilterOperator,
}

impl CrossWidgetFilter {
    pub fn equals(source: WidgetId, field: FieldRef, value: impl Into<Value>) -> Self {
        Self {
            source_widget_id: source,
            field,
            value: value.into(),
            operator: FilterOperator::Equals,
        }
    }

    pub fn to_filter_spec(&self) -> FilterSpec {
        FilterSpec::new(self.field.clone(), self.operator, self.value.clone())
    }
}

#[derive(Debug, Clone, Default)]
pub struct CrossFilterBus {
    filters: Vec<CrossWidgetFilter>,
}

impl CrossFilterBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a filter. An existing filter from the same source on the same
    /// field is replaced.
    pub fn publish(&mut self, filter: CrossWidgetFilter) {
        match self
            .filters
            .iter_mut()
            .find(|f| f.source_widget_id == filter.source_widget_id && f.field == filter.field)
        {
            Some(existing) => *existing = filter,
            None => self.filters.push(filter),
        }
    }

    /// Remove one filter. Returns true if it existed.
    pub fn remove(&mut self, source: WidgetId, field: &FieldRef) -> bool {
        let before = self.filters.len();
        self.filters
            .retain(|f| !(f.source_widget_id == source && f.field == *field));
        self.filters.len() != before
    }

    /// Remove every filter published by a widget.
    pub fn clear_source(&mut self, source: WidgetId) -> bool {
        let before = self.filters.len();
        self.filters.retain(|f| f.source_widget_id != source);
        self.filters.len() != before
    }

    pub fn clear(&mut self) {
        self.filters.clear();
    }

    pub fn active(&self) -> &[CrossWidgetFilter] {
        &self.filters
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Filters that apply to `widget`: all except the ones it published.
    pub fn effective_for(&self, widget: WidgetId) -> Vec<CrossWidgetFilter> {
        self.filters
            .iter()
            .filter(|f| f.source_widget_id != widget)
            .cloned()
            .collect()
    }
}
