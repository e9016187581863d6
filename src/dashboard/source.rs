//! Widget data sources.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use super::bus::CrossWidgetFilter;
use super::widget::Widget;
use crate::execute::{ExecutionResult, QueryExecutor};
use crate::query::{GroupSpec, Join, Pagination, QueryDefinition};

/// Rows backing one widget.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct WidgetData {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl WidgetData {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, header: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == header)
    }
}

/// Fetches the data of a widget under a set of cross-widget filters.
#[async_trait]
pub trait WidgetDataSource: Send + Sync {
    async fn fetch(
        &self,
        connection_id: &str,
        widget: &Widget,
        filters: &[CrossWidgetFilter],
        joins: &[Join],
    ) -> ExecutionResult<WidgetData>;
}

/// Data source that turns a widget config into a query.
pub struct QueryWidgetSource {
    executor: Arc<dyn QueryExecutor>,
}

impl QueryWidgetSource {
    pub fn new(executor: Arc<dyn QueryExecutor>) -> Self {
        Self { executor }
    }

    /// Dimensions become exact groups, measures become aggregated columns and
    /// filters become comparisons. All rows are requested.
    pub fn definition_for(
        connection_id: &str,
        widget: &Widget,
        filters: &[CrossWidgetFilter],
        joins: &[Join],
    ) -> QueryDefinition {
        let config = &widget.data_config;
        let mut def = QueryDefinition::new(connection_id);
        def.groups = config.dimensions.iter().cloned().map(GroupSpec::new).collect();
        def.columns = config.measures.iter().map(|m| m.column()).collect();
        def.filters = filters.iter().map(CrossWidgetFilter::to_filter_spec).collect();
        def.pagination = Pagination::unpaged();

        let tables = def.referenced_tables();
        def.joins = joins
            .iter()
            .filter(|j| tables.contains(&j.left.table) && tables.contains(&j.right.table))
            .cloned()
            .collect();
        def
    }
}

#[async_trait]
impl WidgetDataSource for QueryWidgetSource {
    async fn fetch(
        &self,
        connection_id: &str,
        widget: &Widget,
        filters: &[CrossWidgetFilter],
        joins: &[Join],
    ) -> ExecutionResult<WidgetData> {
        let def = Self::definition_for(connection_id, widget, filters, joins);
        let result = self.executor.execute(&def).await?;
        Ok(WidgetData {
            headers: result.headers,
            rows: result.rows,
        })
    }
}
