//! Interactive filter panel.
//!
//! End users of a report narrow its result by picking values of the
//! non-numeric result columns. These filters are ephemeral: they are
//! composed with the builder filters at execution time and never saved.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::catalog::SchemaCatalog;
use crate::execute::{ExecutionResult, QueryResult};
use crate::query::{FieldRef, FilterSpec};

/// Provides the distinct values of a field.
#[async_trait]
pub trait DistinctValueService: Send + Sync {
    async fn distinct_values(&self, connection_id: &str, field: &FieldRef) -> ExecutionResult<Vec<Value>>;
}

/// A selector's current choice.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Choice {
    #[default]
    All,
    Value(Value),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldSelector {
    pub field: FieldRef,
    pub options: Vec<Value>,
    pub choice: Choice,
}

/// An applied end-user filter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InteractiveFilter {
    pub field: FieldRef,
    pub value: Value,
}

impl InteractiveFilter {
    pub fn to_filter_spec(&self) -> FilterSpec {
        FilterSpec::equals(self.field.clone(), self.value.clone())
    }
}

#[derive(Debug, Clone, Default)]
pub struct FilterPanel {
    visible: bool,
    selectors: Vec<FieldSelector>,
    user_filters: Vec<InteractiveFilter>,
}

impl FilterPanel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Result columns that map to non-numeric schema fields.
    pub fn eligible_fields(result: &QueryResult, catalog: &SchemaCatalog) -> Vec<FieldRef> {
        Self::eligible_headers(&result.headers, catalog)
    }

    pub fn eligible_headers(headers: &[String], catalog: &SchemaCatalog) -> Vec<FieldRef> {
        headers
            .iter()
            .filter_map(|h| catalog.find(h))
            .filter(|f| !f.is_numeric)
            .map(|f| f.field_ref())
            .collect()
    }

    /// Drop selectors and user filters on fields outside `keep`.
    /// Returns the number of user filters dropped.
    pub fn retain_fields(&mut self, keep: &[FieldRef]) -> usize {
        self.selectors.retain(|s| keep.contains(&s.field));
        let before = self.user_filters.len();
        self.user_filters.retain(|f| keep.contains(&f.field));
        before - self.user_filters.len()
    }

    /// Fetch distinct values for `fields` in parallel.
    ///
    /// Choices made earlier are kept for fields that are still offered.
    pub async fn load(
        &mut self,
        service: &dyn DistinctValueService,
        connection_id: &str,
        fields: Vec<FieldRef>,
    ) -> ExecutionResult<()> {
        let futures: Vec<_> = fields
            .iter()
            .map(|f| service.distinct_values(connection_id, f))
            .collect();
        let results = futures::future::join_all(futures).await;

        let mut selectors = Vec::with_capacity(fields.len());
        for (field, result) in fields.into_iter().zip(results) {
            let options = result?;
            let choice = self
                .selector(&field)
                .map(|s| s.choice.clone())
                .filter(|c| match c {
                    Choice::All => true,
                    Choice::Value(v) => options.contains(v),
                })
                .unwrap_or_default();
            selectors.push(FieldSelector {
                field,
                options,
                choice,
            });
        }
        tracing::debug!(selectors = selectors.len(), "filter panel loaded");
        self.selectors = selectors;
        Ok(())
    }

    pub fn selectors(&self) -> &[FieldSelector] {
        &self.selectors
    }

    pub fn selector(&self, field: &FieldRef) -> Option<&FieldSelector> {
        self.selectors.iter().find(|s| s.field == *field)
    }

    /// Set a selector's choice. Returns false if the field has no selector.
    pub fn select(&mut self, field: &FieldRef, choice: Choice) -> bool {
        match self.selectors.iter_mut().find(|s| s.field == *field) {
            Some(selector) => {
                selector.choice = choice;
                true
            }
            None => false,
        }
    }

    /// Turn the current choices into the active user filters.
    pub fn apply(&mut self) -> &[InteractiveFilter] {
        self.user_filters = self
            .selectors
            .iter()
            .filter_map(|s| match &s.choice {
                Choice::All => None,
                Choice::Value(v) => Some(InteractiveFilter {
                    field: s.field.clone(),
                    value: v.clone(),
                }),
            })
            .collect();
        &self.user_filters
    }

    pub fn user_filters(&self) -> &[InteractiveFilter] {
        &self.user_filters
    }

    /// User filters as equality filter specs.
    pub fn filter_specs(&self) -> Vec<FilterSpec> {
        self.user_filters.iter().map(InteractiveFilter::to_filter_spec).collect()
    }

    pub fn show(&mut self) {
        self.visible = true;
    }

    /// Hide the panel. Applied filters stay active.
    pub fn hide(&mut self) {
        self.visible = false;
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn reset(&mut self) {
        self.selectors.clear();
        self.user_filters.clear();
    }
}
