//! Saved reports and sharing.
//!
//! A report is a named [`QueryDefinition`] owned by one user. The owner may
//! grant Edit or View rights to others. Interactive filters and drill state
//! are session-only and never reach the store.

mod library;

pub use library::ReportLibrary;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::persist::PersistenceResult;
use crate::query::QueryDefinition;

/// Rights a user holds on a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionTier {
    Owner,
    Edit,
    View,
}

impl PermissionTier {
    pub fn can_edit(&self) -> bool {
        matches!(self, PermissionTier::Owner | PermissionTier::Edit)
    }

    pub fn is_owner(&self) -> bool {
        matches!(self, PermissionTier::Owner)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionTier::Owner => "owner",
            PermissionTier::Edit => "edit",
            PermissionTier::View => "view",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "owner" => Some(PermissionTier::Owner),
            "edit" => Some(PermissionTier::Edit),
            "view" => Some(PermissionTier::View),
            _ => None,
        }
    }
}

impl fmt::Display for PermissionTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A report as stored, independent of who is looking at it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub owner_id: String,
    pub definition: QueryDefinition,
}

/// A report together with the viewing user's tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub id: String,
    pub name: String,
    pub description: String,
    pub owner_id: String,
    pub permission_tier: PermissionTier,
    pub definition: QueryDefinition,
}

impl Report {
    pub fn from_record(record: ReportRecord, permission_tier: PermissionTier) -> Self {
        Self {
            id: record.id,
            name: record.name,
            description: record.description,
            owner_id: record.owner_id,
            permission_tier,
            definition: record.definition,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareGrant {
    pub report_id: String,
    pub grantee_id: String,
    pub tier: PermissionTier,
}

/// Durable storage for reports and grants.
#[async_trait]
pub trait ReportStore: Send + Sync {
    async fn insert(&self, report: &ReportRecord) -> PersistenceResult<()>;

    /// Overwrite an existing report. `NotFound` if it does not exist.
    async fn update(&self, report: &ReportRecord) -> PersistenceResult<()>;

    async fn get(&self, report_id: &str) -> PersistenceResult<Option<ReportRecord>>;

    /// Delete a report and its grants. Returns true if it existed.
    async fn delete(&self, report_id: &str) -> PersistenceResult<bool>;

    async fn list_owned(&self, owner_id: &str) -> PersistenceResult<Vec<ReportRecord>>;

    /// Insert or replace the grant for `(report_id, grantee_id)`.
    async fn grant(&self, grant: &ShareGrant) -> PersistenceResult<()>;

    async fn grants_for_report(&self, report_id: &str) -> PersistenceResult<Vec<ShareGrant>>;

    async fn shared_with(&self, user_id: &str) -> PersistenceResult<Vec<ShareGrant>>;
}

/// Decides what a user may do with a report.
#[async_trait]
pub trait AccessPolicy: Send + Sync {
    /// The user's tier on `report`, or `None` for no access.
    async fn tier_for(
        &self,
        user_id: &str,
        report: &ReportRecord,
    ) -> PersistenceResult<Option<PermissionTier>>;
}

/// Rights from ownership and explicit grants.
pub struct GrantPolicy {
    store: Arc<dyn ReportStore>,
}

impl GrantPolicy {
    pub fn new(store: Arc<dyn ReportStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl AccessPolicy for GrantPolicy {
    async fn tier_for(
        &self,
        user_id: &str,
        report: &ReportRecord,
    ) -> PersistenceResult<Option<PermissionTier>> {
        if report.owner_id == user_id {
            return Ok(Some(PermissionTier::Owner));
        }
        let grants = self.store.grants_for_report(&report.id).await?;
        Ok(grants
            .into_iter()
            .find(|g| g.grantee_id == user_id)
            .map(|g| g.tier))
    }
}
