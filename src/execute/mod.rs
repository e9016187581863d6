//! Query execution.
//!
//! The [`QueryExecutor`] collaborator runs a definition against its
//! connection. The [`ExecutionGateway`] wraps it with precondition checks,
//! sequence-guarded submission and the result view state.

mod gateway;
mod pagination;
mod sequence;

pub use gateway::{Completion, ExecutionGateway, ResultView};
pub use pagination::{page_links, PageLink};
pub use sequence::{SequenceGuard, Ticket};

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::query::{plain, FormatSpec, QueryDefinition};

/// Errors produced while running a query.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExecutionError {
    #[error("No connection selected")]
    NoConnection,

    #[error("Select at least one column or grouping before running")]
    EmptyQuery,

    /// The backend rejected the query. The message is shown verbatim.
    #[error("{0}")]
    Rejected(String),

    #[error("Query transport failed: {0}")]
    Transport(String),
}

pub type ExecutionResult<T> = Result<T, ExecutionError>;

/// Page position of a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageInfo {
    pub current_page: u32,
    pub page_size: u32,
    pub total_pages: u32,
}

impl PageInfo {
    /// Page info for `total_rows` rows. A page size of zero is a single page.
    pub fn compute(page: u32, page_size: u32, total_rows: u64) -> Self {
        let total_pages = if page_size == 0 {
            1
        } else {
            total_rows.div_ceil(page_size as u64).max(1) as u32
        };
        Self {
            current_page: page.clamp(1, total_pages),
            page_size,
            total_pages,
        }
    }
}

/// Rows returned for one page of a query, stored verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Value>>,
    pub pagination: PageInfo,
    pub total_rows: u64,
}

impl QueryResult {
    pub fn column_index(&self, header: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == header)
    }

    /// Display strings with the read-time formats applied per header.
    pub fn formatted_rows(&self, formats: &BTreeMap<String, FormatSpec>) -> Vec<Vec<String>> {
        let specs: Vec<Option<&FormatSpec>> = self.headers.iter().map(|h| formats.get(h)).collect();
        self.rows
            .iter()
            .map(|row| {
                row.iter()
                    .enumerate()
                    .map(|(i, value)| match specs.get(i).copied().flatten() {
                        Some(spec) => spec.apply(value),
                        None => plain(value),
                    })
                    .collect()
            })
            .collect()
    }

    /// Values of one column.
    pub fn column(&self, header: &str) -> Option<Vec<&Value>> {
        let idx = self.column_index(header)?;
        Some(self.rows.iter().filter_map(|r| r.get(idx)).collect())
    }
}

/// Runs definitions against their connection.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn execute(&self, definition: &QueryDefinition) -> ExecutionResult<QueryResult>;
}

/// Check the preconditions every submission must satisfy.
pub fn check_preconditions(definition: &QueryDefinition) -> ExecutionResult<()> {
    if definition.connection_id.as_deref().map_or(true, str::is_empty) {
        return Err(ExecutionError::NoConnection);
    }
    if definition.is_empty_selection() {
        return Err(ExecutionError::EmptyQuery);
    }
    Ok(())
}
