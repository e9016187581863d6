//! In-memory report and dashboard store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::dashboard::DashboardDocument;
use crate::persist::{DashboardConfigStore, PersistenceError, PersistenceResult};
use crate::reports::{ReportRecord, ReportStore, ShareGrant};

#[derive(Default)]
struct Documents {
    reports: Vec<ReportRecord>,
    grants: Vec<ShareGrant>,
    dashboards: HashMap<String, (DashboardDocument, u64)>,
    saves: usize,
}

/// Store kept in process memory. Saves can be made to fail on demand.
#[derive(Default)]
pub struct MemoryDocumentStore {
    inner: Mutex<Documents>,
    fail_saves: AtomicBool,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent dashboard saves fail (or succeed again).
    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// Number of successful dashboard saves.
    pub fn save_count(&self) -> usize {
        self.lock().map(|d| d.saves).unwrap_or(0)
    }

    /// Last saved version of a dashboard.
    pub fn dashboard(&self, id: &str) -> Option<DashboardDocument> {
        self.lock()
            .ok()
            .and_then(|d| d.dashboards.get(id).map(|(doc, _)| doc.clone()))
    }

    fn lock(&self) -> PersistenceResult<MutexGuard<'_, Documents>> {
        self.inner
            .lock()
            .map_err(|_| PersistenceError::Storage("store lock poisoned".to_string()))
    }
}

#[async_trait]
impl ReportStore for MemoryDocumentStore {
    async fn insert(&self, report: &ReportRecord) -> PersistenceResult<()> {
        let mut docs = self.lock()?;
        if docs.reports.iter().any(|r| r.id == report.id) {
            return Err(PersistenceError::Storage(format!("report {} already exists", report.id)));
        }
        docs.reports.push(report.clone());
        Ok(())
    }

    async fn update(&self, report: &ReportRecord) -> PersistenceResult<()> {
        let mut docs = self.lock()?;
        let existing = docs
            .reports
            .iter_mut()
            .find(|r| r.id == report.id)
            .ok_or_else(|| PersistenceError::NotFound(format!("report {}", report.id)))?;
        *existing = report.clone();
        Ok(())
    }

    async fn get(&self, report_id: &str) -> PersistenceResult<Option<ReportRecord>> {
        Ok(self.lock()?.reports.iter().find(|r| r.id == report_id).cloned())
    }

    async fn delete(&self, report_id: &str) -> PersistenceResult<bool> {
        let mut docs = self.lock()?;
        let before = docs.reports.len();
        docs.reports.retain(|r| r.id != report_id);
        docs.grants.retain(|g| g.report_id != report_id);
        Ok(docs.reports.len() < before)
    }

    async fn list_owned(&self, owner_id: &str) -> PersistenceResult<Vec<ReportRecord>> {
        let mut owned: Vec<ReportRecord> = self
            .lock()?
            .reports
            .iter()
            .filter(|r| r.owner_id == owner_id)
            .cloned()
            .collect();
        owned.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        Ok(owned)
    }

    async fn grant(&self, grant: &ShareGrant) -> PersistenceResult<()> {
        let mut docs = self.lock()?;
        docs.grants
            .retain(|g| !(g.report_id == grant.report_id && g.grantee_id == grant.grantee_id));
        docs.grants.push(grant.clone());
        Ok(())
    }

    async fn grants_for_report(&self, report_id: &str) -> PersistenceResult<Vec<ShareGrant>> {
        Ok(self
            .lock()?
            .grants
            .iter()
            .filter(|g| g.report_id == report_id)
            .cloned()
            .collect())
    }

    async fn shared_with(&self, user_id: &str) -> PersistenceResult<Vec<ShareGrant>> {
        Ok(self
            .lock()?
            .grants
            .iter()
            .filter(|g| g.grantee_id == user_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl DashboardConfigStore for MemoryDocumentStore {
    async fn load(&self, dashboard_id: &str) -> PersistenceResult<DashboardDocument> {
        self.lock()?
            .dashboards
            .get(dashboard_id)
            .map(|(doc, _)| doc.clone())
            .ok_or_else(|| PersistenceError::NotFound(format!("dashboard {}", dashboard_id)))
    }

    async fn save(&self, document: &DashboardDocument) -> PersistenceResult<u64> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(PersistenceError::Storage("dashboard store unavailable".to_string()));
        }
        let mut docs = self.lock()?;
        let revision = docs
            .dashboards
            .get(&document.id)
            .map_or(1, |(_, rev)| rev + 1);
        docs.dashboards
            .insert(document.id.clone(), (document.clone(), revision));
        docs.saves += 1;
        Ok(revision)
    }
}
