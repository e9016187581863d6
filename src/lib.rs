//! # Tessera
//!
//! An ad-hoc analytical query composition and dashboard engine.
//!
//! ## Architecture
//!
//! Tessera turns a visually assembled query description into a validated,
//! executable query against a chosen data connection, and renders the
//! results for a report builder or a dashboard of widgets:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │          Schema Catalog (fields per connection)          │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [compose]
//! ┌─────────────────────────────────────────────────────────┐
//! │   Composition Surface (pills)  ──resync──▶  Definition   │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [join validator]
//! ┌─────────────────────────────────────────────────────────┐
//! │        Execution Gateway (sequence-guarded runs)         │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!           ┌──────────────┼────────────────┐
//!           ▼              ▼                ▼
//!      Drill-down    Filter panel    Widget pipeline ◀─▶ Cross-filter bus
//!                                           │
//!                                           ▼
//!                              Autosave / Export / Report library
//! ```
//!
//! The coordinators in [`session`] own all mutable state. Every mutation
//! goes through them and ends in a full resync of the query definition.

pub mod cache;
pub mod catalog;
pub mod compose;
pub mod config;
pub mod dashboard;
pub mod drill;
pub mod error;
pub mod execute;
pub mod export;
pub mod interactive;
pub mod join;
pub mod memory;
pub mod persist;
pub mod query;
pub mod reports;
pub mod session;
pub mod worker;

/// Re-exports for convenient usage.
pub mod prelude {
    pub use crate::catalog::{FieldType, SchemaCatalog, SchemaField, SchemaService};
    pub use crate::compose::{CompositionSurface, PillEdit, PillId, Slot};
    pub use crate::dashboard::{
        CrossFilterBus, CrossWidgetFilter, DataConfig, MeasureSpec, RenderOutput, Widget,
        WidgetId, WidgetType,
    };
    pub use crate::error::{EngineError, EngineResult, Notice, NoticeKind};
    pub use crate::execute::{ExecutionError, QueryExecutor, QueryResult};
    pub use crate::interactive::{Choice, DistinctValueService};
    pub use crate::join::{JoinValidation, RelationshipIndex};
    pub use crate::query::{
        Aggregation, CalculatedField, ColumnSpec, FieldRef, FilterOperator, FilterSpec,
        Granularity, GroupSpec, Join, JoinType, QueryDefinition, SortDirection, SortSpec,
    };
    pub use crate::session::{BuilderServices, DashboardSession, ReportBuilder};
}

pub use error::{EngineError, EngineResult, Notice, NoticeKind};
pub use query::{FieldRef, QueryDefinition};
