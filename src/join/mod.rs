//! Join path validation.
//!
//! Before a query may run, every table it references must be reachable
//! from every other one, either through the connection's declared
//! relationships or through joins the user added explicitly.

mod graph;
mod validator;

pub use graph::{Relationship, RelationshipGraph};
pub use validator::{manual_join_choices, JoinValidation, JoinValidator, RunGate};

use async_trait::async_trait;

use crate::query::Join;

/// Failure reported by a relationship index. The message is shown verbatim.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct IndexError(pub String);

pub type IndexResult<T> = Result<T, IndexError>;

/// Errors that block execution until the join path is fixed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum JoinPathError {
    #[error("No join path connects tables: {}", tables.join(", "))]
    NoPath { tables: Vec<String> },

    #[error("{0}")]
    Index(String),

    #[error("Joins have not been validated for the current query")]
    NotValidated,
}

/// Answers connectivity questions about a connection's tables.
#[async_trait]
pub trait RelationshipIndex: Send + Sync {
    /// Whether a path of declared relationships spans all `tables`.
    async fn path_exists(&self, connection_id: &str, tables: &[String]) -> IndexResult<bool>;

    /// Joins that would connect `tables`, as far as the relationships allow.
    async fn suggested_joins(&self, connection_id: &str, tables: &[String]) -> IndexResult<Vec<Join>>;
}
