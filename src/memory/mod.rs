//! In-process backend over in-memory tables.
//!
//! [`MemoryBackend`] answers schema, relationship, query and distinct-value
//! requests for a single connection without an external worker. It backs
//! the `demo` command and the integration tests.

mod exec;
mod sample;
mod store;

pub use sample::{sales_backend, SALES_CONNECTION};
pub use store::MemoryDocumentStore;

use async_trait::async_trait;
use serde_json::Value;

use crate::catalog::{SchemaField, SchemaLoadError, SchemaLoadResult, SchemaService};
use crate::execute::{ExecutionError, ExecutionResult, QueryExecutor, QueryResult};
use crate::interactive::DistinctValueService;
use crate::join::{IndexError, IndexResult, RelationshipGraph, RelationshipIndex};
use crate::query::{FieldRef, Join, QueryDefinition};

/// A table held entirely in memory.
#[derive(Debug, Clone)]
pub struct MemoryTable {
    name: String,
    columns: Vec<SchemaField>,
    rows: Vec<Vec<Value>>,
}

impl MemoryTable {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            rows: Vec::new(),
        }
    }

    pub fn column(mut self, name: &str, data_type: &str) -> Self {
        self.columns.push(SchemaField::new(self.name.clone(), name, data_type));
        self
    }

    /// Append a row. Missing trailing values are null.
    pub fn row(mut self, mut values: Vec<Value>) -> Self {
        values.resize(self.columns.len(), Value::Null);
        self.rows.push(values);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[SchemaField] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    fn value(&self, row: usize, column: usize) -> Option<&Value> {
        self.rows.get(row).and_then(|r| r.get(column))
    }
}

/// One connection's worth of tables and declared relationships.
#[derive(Debug, Clone)]
pub struct MemoryBackend {
    connection_id: String,
    tables: Vec<MemoryTable>,
    graph: RelationshipGraph,
}

impl MemoryBackend {
    pub fn new(connection_id: impl Into<String>) -> Self {
        Self {
            connection_id: connection_id.into(),
            tables: Vec::new(),
            graph: RelationshipGraph::new(),
        }
    }

    pub fn with_table(mut self, table: MemoryTable) -> Self {
        self.graph.add_table(&table.name);
        self.tables.push(table);
        self
    }

    /// Declare that `from` references `to`.
    pub fn with_relationship(mut self, from: FieldRef, to: FieldRef) -> Self {
        self.graph.add_relationship(from, to);
        self
    }

    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    pub fn table(&self, name: &str) -> Option<&MemoryTable> {
        self.tables.iter().find(|t| t.name == name)
    }

    pub fn graph(&self) -> &RelationshipGraph {
        &self.graph
    }

    fn check_connection(&self, connection_id: &str) -> Result<(), String> {
        if connection_id == self.connection_id {
            Ok(())
        } else {
            Err(format!("Unknown connection: {}", connection_id))
        }
    }
}

#[async_trait]
impl SchemaService for MemoryBackend {
    async fn describe(&self, connection_id: &str) -> SchemaLoadResult<Vec<SchemaField>> {
        if connection_id != self.connection_id {
            return Err(SchemaLoadError::UnknownConnection(connection_id.to_string()));
        }
        Ok(self
            .tables
            .iter()
            .flat_map(|t| t.columns.iter().cloned())
            .collect())
    }
}

#[async_trait]
impl RelationshipIndex for MemoryBackend {
    async fn path_exists(&self, connection_id: &str, tables: &[String]) -> IndexResult<bool> {
        self.check_connection(connection_id).map_err(IndexError)?;
        Ok(self.graph.connects(tables))
    }

    async fn suggested_joins(&self, connection_id: &str, tables: &[String]) -> IndexResult<Vec<Join>> {
        self.check_connection(connection_id).map_err(IndexError)?;
        Ok(self.graph.join_tree(tables))
    }
}

#[async_trait]
impl QueryExecutor for MemoryBackend {
    async fn execute(&self, definition: &QueryDefinition) -> ExecutionResult<QueryResult> {
        if let Some(conn) = definition.connection_id.as_deref() {
            self.check_connection(conn).map_err(ExecutionError::Rejected)?;
        }
        let result = exec::execute(self, definition)?;
        tracing::debug!(
            connection = %self.connection_id,
            rows = result.rows.len(),
            total = result.total_rows,
            "memory query executed"
        );
        Ok(result)
    }
}

#[async_trait]
impl DistinctValueService for MemoryBackend {
    async fn distinct_values(&self, connection_id: &str, field: &FieldRef) -> ExecutionResult<Vec<Value>> {
        self.check_connection(connection_id).map_err(ExecutionError::Rejected)?;
        exec::distinct_values(self, field)
    }
}
