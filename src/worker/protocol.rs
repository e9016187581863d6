//! Protocol types for worker communication.
//!
//! Every message is one JSON object per line. Requests carry an id that the
//! matching response echoes back.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::query::{FieldRef, Join, QueryDefinition};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestEnvelope {
    pub id: String,
    /// Method name (e.g., "query.execute").
    pub method: String,
    pub params: Value,
}

/// Response envelope received from the worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    /// Echoes the request id.
    pub id: String,
    pub success: bool,
    /// Result data (present if success = true).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error information (present if success = false).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

impl ResponseEnvelope {
    pub fn failure(id: String, code: &str, message: &str) -> Self {
        Self {
            id,
            success: false,
            result: None,
            error: Some(ErrorInfo {
                code: code.to_string(),
                message: message.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
}

/// Method names understood by the worker.
pub mod methods {
    pub const SCHEMA_DESCRIBE: &str = "schema.describe";
    pub const PATH_EXISTS: &str = "relationships.path_exists";
    pub const SUGGEST_JOINS: &str = "relationships.suggest_joins";
    pub const QUERY_EXECUTE: &str = "query.execute";
    pub const DISTINCT_VALUES: &str = "query.distinct_values";
}

// --- connection parameters ---

/// Resolved connection, sent with every request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionParams {
    /// Driver name as accepted in `tessera.toml`.
    pub driver: String,
    /// Driver-specific connection string.
    pub connection_string: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_schema: Option<String>,
}

// --- schema ---

/// Parameters for `schema.describe`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DescribeParams {
    #[serde(flatten)]
    pub connection: ConnectionParams,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldInfo {
    pub table: String,
    pub name: String,
    pub data_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DescribeResponse {
    pub fields: Vec<FieldInfo>,
}

// --- relationships ---

/// Parameters for `relationships.path_exists` and
/// `relationships.suggest_joins`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TablesParams {
    #[serde(flatten)]
    pub connection: ConnectionParams,
    pub tables: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathExistsResponse {
    pub exists: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuggestJoinsResponse {
    #[serde(default)]
    pub joins: Vec<Join>,
}

// --- queries ---

/// Parameters for `query.execute`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteParams {
    #[serde(flatten)]
    pub connection: ConnectionParams,
    pub definition: QueryDefinition,
}

/// One page of rows. `total_rows` counts every row the query matched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteResponse {
    pub headers: Vec<String>,
    #[serde(default)]
    pub rows: Vec<Vec<Value>>,
    pub total_rows: u64,
}

/// Parameters for `query.distinct_values`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistinctValuesParams {
    #[serde(flatten)]
    pub connection: ConnectionParams,
    pub field: FieldRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistinctValuesResponse {
    #[serde(default)]
    pub values: Vec<Value>,
}
