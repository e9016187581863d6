//! Collaborators backed by the worker process.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::client::WorkerClient;
use super::error::WorkerError;
use super::protocol::{
    methods, ConnectionParams, DescribeParams, DescribeResponse, DistinctValuesParams,
    DistinctValuesResponse, ExecuteParams, ExecuteResponse, PathExistsResponse,
    SuggestJoinsResponse, TablesParams,
};
use crate::catalog::{SchemaField, SchemaLoadError, SchemaLoadResult, SchemaService};
use crate::config::Settings;
use crate::execute::{ExecutionError, ExecutionResult, PageInfo, QueryExecutor, QueryResult};
use crate::interactive::DistinctValueService;
use crate::join::{IndexError, IndexResult, RelationshipIndex};
use crate::query::{FieldRef, Join, QueryDefinition};

/// Upper bound on the values offered by an interactive filter selector.
const DISTINCT_VALUE_LIMIT: u32 = 500;

/// Schema, relationship, query and distinct-value service over a worker.
pub struct WorkerBackend {
    client: Arc<WorkerClient>,
    connections: HashMap<String, ConnectionParams>,
}

impl WorkerBackend {
    pub fn new(client: Arc<WorkerClient>, connections: HashMap<String, ConnectionParams>) -> Self {
        Self {
            client,
            connections,
        }
    }

    /// Resolve every configured connection. Connections whose driver or
    /// connection string cannot be resolved are skipped.
    pub fn from_settings(client: Arc<WorkerClient>, settings: &Settings) -> Self {
        let connections = settings
            .connections
            .iter()
            .filter_map(|(id, conn)| {
                let resolved = conn
                    .driver_type()
                    .and_then(|driver| Ok((driver, conn.resolved_connection_string()?)));
                match resolved {
                    Ok((driver, connection_string)) => Some((
                        id.clone(),
                        ConnectionParams {
                            driver: driver.as_str().to_string(),
                            connection_string,
                            default_schema: conn.default_schema.clone(),
                        },
                    )),
                    Err(e) => {
                        tracing::warn!(connection = %id, error = %e, "skipping connection");
                        None
                    }
                }
            })
            .collect();
        Self::new(client, connections)
    }

    fn connection(&self, connection_id: &str) -> Result<ConnectionParams, WorkerError> {
        self.connections
            .get(connection_id)
            .cloned()
            .ok_or_else(|| WorkerError::UnknownConnection(connection_id.to_string()))
    }

    async fn tables_request<R: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        connection_id: &str,
        tables: &[String],
    ) -> Result<R, WorkerError> {
        let params = TablesParams {
            connection: self.connection(connection_id)?,
            tables: tables.to_vec(),
        };
        self.client.request(method, params).await
    }
}

fn execution_error(e: WorkerError) -> ExecutionError {
    match e {
        WorkerError::Refused(message) => ExecutionError::Rejected(message),
        WorkerError::UnknownConnection(id) => ExecutionError::Rejected(format!("Unknown connection: {}", id)),
        other => ExecutionError::Transport(other.to_string()),
    }
}

#[async_trait]
impl SchemaService for WorkerBackend {
    async fn describe(&self, connection_id: &str) -> SchemaLoadResult<Vec<SchemaField>> {
        let connection = self.connection(connection_id).map_err(|_| {
            SchemaLoadError::UnknownConnection(connection_id.to_string())
        })?;
        let response: DescribeResponse = self
            .client
            .request(methods::SCHEMA_DESCRIBE, DescribeParams { connection })
            .await
            .map_err(|e| match e {
                WorkerError::Codec(e) => SchemaLoadError::Malformed(e.to_string()),
                other => SchemaLoadError::Unreachable {
                    connection_id: connection_id.to_string(),
                    message: other.to_string(),
                },
            })?;
        Ok(response
            .fields
            .into_iter()
            .map(|f| SchemaField::new(f.table, f.name, f.data_type))
            .collect())
    }
}

#[async_trait]
impl RelationshipIndex for WorkerBackend {
    async fn path_exists(&self, connection_id: &str, tables: &[String]) -> IndexResult<bool> {
        let response: PathExistsResponse = self
            .tables_request(methods::PATH_EXISTS, connection_id, tables)
            .await
            .map_err(|e| IndexError(e.to_string()))?;
        Ok(response.exists)
    }

    async fn suggested_joins(&self, connection_id: &str, tables: &[String]) -> IndexResult<Vec<Join>> {
        let response: SuggestJoinsResponse = self
            .tables_request(methods::SUGGEST_JOINS, connection_id, tables)
            .await
            .map_err(|e| IndexError(e.to_string()))?;
        Ok(response.joins)
    }
}

#[async_trait]
impl QueryExecutor for WorkerBackend {
    async fn execute(&self, definition: &QueryDefinition) -> ExecutionResult<QueryResult> {
        let connection_id = definition
            .connection_id
            .as_deref()
            .ok_or(ExecutionError::NoConnection)?;
        let params = ExecuteParams {
            connection: self.connection(connection_id).map_err(execution_error)?,
            definition: definition.clone(),
        };
        let response: ExecuteResponse = self
            .client
            .request(methods::QUERY_EXECUTE, params)
            .await
            .map_err(execution_error)?;

        Ok(QueryResult {
            headers: response.headers,
            rows: response.rows,
            pagination: PageInfo::compute(
                definition.pagination.page,
                definition.pagination.page_size,
                response.total_rows,
            ),
            total_rows: response.total_rows,
        })
    }
}

#[async_trait]
impl DistinctValueService for WorkerBackend {
    async fn distinct_values(&self, connection_id: &str, field: &FieldRef) -> ExecutionResult<Vec<Value>> {
        let params = DistinctValuesParams {
            connection: self.connection(connection_id).map_err(execution_error)?,
            field: field.clone(),
            limit: Some(DISTINCT_VALUE_LIMIT),
        };
        let response: DistinctValuesResponse = self
            .client
            .request(methods::DISTINCT_VALUES, params)
            .await
            .map_err(execution_error)?;
        Ok(response.values)
    }
}
