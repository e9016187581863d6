//! Layout persistence.
//!
//! Dashboard edits are saved under a debounced autosave. Grid geometry and
//! widget configuration are tracked separately and merged when a save
//! fires, so a late geometry update never loses a widget.

mod autosave;
mod layout;
mod sqlite;

pub use autosave::{Autosaver, SaveRequest, SaveStatus};
pub use layout::{merge_layout, GridItem};
pub use sqlite::SqliteStore;

use async_trait::async_trait;

use crate::dashboard::DashboardDocument;

/// Errors from save, update, share and load operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PersistenceError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Not allowed: {0}")]
    Forbidden(String),

    #[error("No report is open")]
    NoCurrentReport,

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<rusqlite::Error> for PersistenceError {
    fn from(e: rusqlite::Error) -> Self {
        PersistenceError::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for PersistenceError {
    fn from(e: serde_json::Error) -> Self {
        PersistenceError::Serialization(e.to_string())
    }
}

pub type PersistenceResult<T> = Result<T, PersistenceError>;

/// Loads and saves whole dashboard documents.
#[async_trait]
pub trait DashboardConfigStore: Send + Sync {
    async fn load(&self, dashboard_id: &str) -> PersistenceResult<DashboardDocument>;

    /// Save a document, returning its new revision.
    async fn save(&self, document: &DashboardDocument) -> PersistenceResult<u64>;
}
