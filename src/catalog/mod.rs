//! Schema catalog.
//!
//! The catalog is the set of fields offered to the composition surface for
//! one connection. It is loaded through a [`SchemaService`] whenever the
//! user selects a connection and is immutable afterwards.

mod loader;

pub use loader::CatalogLoader;

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::query::FieldRef;

/// Errors that can occur while loading a catalog.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SchemaLoadError {
    #[error("Unknown connection: {0}")]
    UnknownConnection(String),

    #[error("Connection '{connection_id}' is unreachable: {message}")]
    Unreachable {
        connection_id: String,
        message: String,
    },

    #[error("Malformed schema metadata: {0}")]
    Malformed(String),
}

pub type SchemaLoadResult<T> = Result<T, SchemaLoadError>;

/// Coarse classification of a vendor column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Integer,
    Float,
    Decimal,
    Text,
    Boolean,
    Date,
    Timestamp,
    Other,
}

impl FieldType {
    /// Classify a vendor type string such as `VARCHAR(50)` or `numeric(12,2)`.
    pub fn classify(data_type: &str) -> Self {
        let lower = data_type.trim().to_lowercase();
        let base = lower.split('(').next().unwrap_or("").trim();

        match base {
            "int" | "integer" | "bigint" | "smallint" | "tinyint" | "int2" | "int4" | "int8"
            | "serial" | "bigserial" | "hugeint" | "ubigint" | "uinteger" => FieldType::Integer,
            "float" | "float4" | "float8" | "real" | "double" | "double precision" => {
                FieldType::Float
            }
            "decimal" | "numeric" | "number" | "money" | "smallmoney" => FieldType::Decimal,
            "bool" | "boolean" | "bit" => FieldType::Boolean,
            "date" => FieldType::Date,
            "text" | "varchar" | "char" | "nvarchar" | "nchar" | "string" | "character varying"
            | "character" | "uuid" | "uniqueidentifier" => FieldType::Text,
            _ if base.starts_with("timestamp") || base.starts_with("datetime") => {
                FieldType::Timestamp
            }
            _ => FieldType::Other,
        }
    }

    pub fn is_numeric(self) -> bool {
        matches!(self, FieldType::Integer | FieldType::Float | FieldType::Decimal)
    }

    pub fn is_temporal(self) -> bool {
        matches!(self, FieldType::Date | FieldType::Timestamp)
    }
}

/// A selectable field of the active connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaField {
    pub table: String,
    pub name: String,
    /// Vendor type string as reported by the connection.
    pub data_type: String,
    pub field_type: FieldType,
    pub is_numeric: bool,
}

impl SchemaField {
    pub fn new(table: impl Into<String>, name: impl Into<String>, data_type: impl Into<String>) -> Self {
        let data_type = data_type.into();
        let field_type = FieldType::classify(&data_type);
        Self {
            table: table.into(),
            name: name.into(),
            data_type,
            field_type,
            is_numeric: field_type.is_numeric(),
        }
    }

    pub fn field_ref(&self) -> FieldRef {
        FieldRef::new(&self.table, &self.name)
    }
}

/// Fields of one connection, indexed by reference.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "CatalogRepr", into = "CatalogRepr")]
pub struct SchemaCatalog {
    connection_id: String,
    fields: Vec<SchemaField>,
    index: HashMap<FieldRef, usize>,
}

#[derive(Serialize, Deserialize)]
struct CatalogRepr {
    connection_id: String,
    fields: Vec<SchemaField>,
}

impl From<CatalogRepr> for SchemaCatalog {
    fn from(repr: CatalogRepr) -> Self {
        Self::build(repr.connection_id, repr.fields)
    }
}

impl From<SchemaCatalog> for CatalogRepr {
    fn from(catalog: SchemaCatalog) -> Self {
        Self {
            connection_id: catalog.connection_id,
            fields: catalog.fields,
        }
    }
}

impl SchemaCatalog {
    /// Build a catalog, rejecting empty names and duplicate fields.
    pub fn new(connection_id: impl Into<String>, fields: Vec<SchemaField>) -> SchemaLoadResult<Self> {
        let mut seen = std::collections::HashSet::new();
        for field in &fields {
            if field.table.is_empty() || field.name.is_empty() {
                return Err(SchemaLoadError::Malformed(format!(
                    "field with empty name '{}.{}'",
                    field.table, field.name
                )));
            }
            if !seen.insert(field.field_ref()) {
                return Err(SchemaLoadError::Malformed(format!(
                    "duplicate field '{}.{}'",
                    field.table, field.name
                )));
            }
        }
        Ok(Self::build(connection_id.into(), fields))
    }

    fn build(connection_id: String, fields: Vec<SchemaField>) -> Self {
        let index = fields
            .iter()
            .enumerate()
            .map(|(i, f)| (f.field_ref(), i))
            .collect();
        Self {
            connection_id,
            fields,
            index,
        }
    }

    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    pub fn fields(&self) -> &[SchemaField] {
        &self.fields
    }

    pub fn field(&self, field: &FieldRef) -> Option<&SchemaField> {
        self.index.get(field).map(|&i| &self.fields[i])
    }

    /// Look up a field by its qualified `Table.name`.
    pub fn find(&self, qualified: &str) -> Option<&SchemaField> {
        FieldRef::parse(qualified).and_then(|f| self.field(&f))
    }

    pub fn contains(&self, field: &FieldRef) -> bool {
        self.index.contains_key(field)
    }

    /// Table names in catalog order.
    pub fn tables(&self) -> Vec<&str> {
        let mut tables: Vec<&str> = Vec::new();
        for field in &self.fields {
            if !tables.contains(&field.table.as_str()) {
                tables.push(&field.table);
            }
        }
        tables
    }

    pub fn fields_of<'a>(&'a self, table: &'a str) -> impl Iterator<Item = &'a SchemaField> + 'a {
        self.fields.iter().filter(move |f| f.table == table)
    }

    pub fn is_numeric(&self, field: &FieldRef) -> bool {
        self.field(field).is_some_and(|f| f.is_numeric)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Describes the fields of a connection.
#[async_trait]
pub trait SchemaService: Send + Sync {
    /// Every field of every table visible through the connection.
    async fn describe(&self, connection_id: &str) -> SchemaLoadResult<Vec<SchemaField>>;
}
