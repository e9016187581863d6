//! Coordinators.
//!
//! [`ReportBuilder`] and [`DashboardSession`] are the only owners of mutable
//! engine state. Each operation takes `&mut self`, calls its collaborators,
//! and turns every failure into a [`Notice`](crate::Notice) as well as an
//! [`EngineError`](crate::EngineError) result.

mod builder;
mod dashboard;

pub use builder::ReportBuilder;
pub use dashboard::DashboardSession;

use std::sync::Arc;

use crate::catalog::SchemaService;
use crate::error::{EngineError, Notice, NoticeKind};
use crate::execute::QueryExecutor;
use crate::interactive::DistinctValueService;
use crate::join::RelationshipIndex;
use crate::reports::{ReportLibrary, ReportStore};

/// Collaborators used by a [`ReportBuilder`].
#[derive(Clone)]
pub struct BuilderServices {
    pub schema: Arc<dyn SchemaService>,
    pub index: Arc<dyn RelationshipIndex>,
    pub executor: Arc<dyn QueryExecutor>,
    pub distinct: Arc<dyn DistinctValueService>,
    pub library: Arc<ReportLibrary>,
}

impl BuilderServices {
    /// Services backed by one backend implementing every query-side trait.
    pub fn from_backend<B>(backend: Arc<B>, reports: Arc<dyn ReportStore>) -> Self
    where
        B: SchemaService + RelationshipIndex + QueryExecutor + DistinctValueService + 'static,
    {
        Self {
            schema: backend.clone(),
            index: backend.clone(),
            executor: backend.clone(),
            distinct: backend,
            library: Arc::new(ReportLibrary::with_grants(reports)),
        }
    }
}

/// Notices currently shown. Holds at most one notice per kind except
/// [`NoticeKind::Transient`], which accumulate until taken.
#[derive(Debug, Clone, Default)]
pub(crate) struct NoticeBoard {
    notices: Vec<Notice>,
}

impl NoticeBoard {
    pub(crate) fn push(&mut self, notice: Notice) {
        if notice.kind != NoticeKind::Transient {
            self.clear(notice.kind);
        }
        self.notices.push(notice);
    }

    /// Record the notice for `error` and log it.
    pub(crate) fn report(&mut self, operation: &str, error: EngineError) -> EngineError {
        let notice = error.notice();
        tracing::warn!(operation, kind = ?notice.kind, error = %notice.message, "operation failed");
        self.push(notice);
        error
    }

    pub(crate) fn clear(&mut self, kind: NoticeKind) {
        self.notices.retain(|n| n.kind != kind);
    }

    pub(crate) fn all(&self) -> &[Notice] {
        &self.notices
    }

    pub(crate) fn take_transient(&mut self) -> Vec<Notice> {
        let (transient, kept) = self
            .notices
            .drain(..)
            .partition(|n| n.kind == NoticeKind::Transient);
        self.notices = kept;
        transient
    }
}
