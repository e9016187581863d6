//! Engine-wide error taxonomy and user-facing notices.
//!
//! Each component owns a `thiserror` enum. [`EngineError`] gathers them so
//! the coordinators can return one error type, and [`EngineError::notice`]
//! maps every failure to the place it is shown to the user.

use serde::Serialize;

use crate::catalog::SchemaLoadError;
use crate::compose::CompositionError;
use crate::drill::DrillError;
use crate::execute::ExecutionError;
use crate::export::ExportError;
use crate::join::JoinPathError;
use crate::persist::PersistenceError;

/// Result type for coordinator operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Any failure surfaced by a coordinator operation.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Schema metadata could not be loaded for the selected connection.
    #[error(transparent)]
    SchemaLoad(#[from] SchemaLoadError),

    /// The referenced tables are not connected.
    #[error(transparent)]
    JoinPath(#[from] JoinPathError),

    /// The query was malformed or rejected.
    #[error(transparent)]
    Execution(#[from] ExecutionError),

    /// Save, update or share failed.
    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    /// Image or data export failed.
    #[error(transparent)]
    Export(#[from] ExportError),

    /// A pill edit was rejected.
    #[error(transparent)]
    Composition(#[from] CompositionError),

    /// Drill navigation was not possible.
    #[error(transparent)]
    Drill(#[from] DrillError),
}

/// Where a notice is displayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
    /// Next to the connection selector; cleared by reselecting.
    Inline,
    /// Blocks the run affordance until remediated.
    Blocking,
    /// Replaces the result area.
    ResultArea,
    /// Short-lived toast; state is untouched.
    Transient,
}

/// A user-visible message produced from an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub kind: NoticeKind,
    pub message: String,
}

impl Notice {
    pub fn new(kind: NoticeKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl EngineError {
    /// The notice category for this error.
    pub fn kind(&self) -> NoticeKind {
        match self {
            EngineError::SchemaLoad(_) => NoticeKind::Inline,
            EngineError::JoinPath(_) => NoticeKind::Blocking,
            EngineError::Execution(_) | EngineError::Drill(_) => NoticeKind::ResultArea,
            EngineError::Persistence(_)
            | EngineError::Export(_)
            | EngineError::Composition(_) => NoticeKind::Transient,
        }
    }

    /// Convert to a user-visible notice.
    pub fn notice(&self) -> Notice {
        Notice::new(self.kind(), self.to_string())
    }
}
