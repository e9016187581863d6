use std::sync::Arc;

use uuid::Uuid;

use super::{
    AccessPolicy, GrantPolicy, PermissionTier, Report, ReportRecord, ReportStore, ShareGrant,
};
use crate::persist::{PersistenceError, PersistenceResult};
use crate::query::QueryDefinition;

/// Report operations on behalf of a user, checked against an [`AccessPolicy`].
pub struct ReportLibrary {
    store: Arc<dyn ReportStore>,
    policy: Arc<dyn AccessPolicy>,
}

impl ReportLibrary {
    pub fn new(store: Arc<dyn ReportStore>, policy: Arc<dyn AccessPolicy>) -> Self {
        Self { store, policy }
    }

    /// A library whose rights come from ownership and grants in `store`.
    pub fn with_grants(store: Arc<dyn ReportStore>) -> Self {
        let policy = Arc::new(GrantPolicy::new(Arc::clone(&store)));
        Self { store, policy }
    }

    /// Create a new report owned by `user_id`.
    pub async fn save_as(
        &self,
        user_id: &str,
        name: &str,
        description: &str,
        definition: &QueryDefinition,
    ) -> PersistenceResult<Report> {
        let name = name.trim();
        if name.is_empty() {
            return Err(PersistenceError::Storage("report name is empty".to_string()));
        }
        let record = ReportRecord {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            description: description.to_string(),
            owner_id: user_id.to_string(),
            definition: definition.clone(),
        };
        self.store.insert(&record).await?;
        tracing::info!(report = %record.id, owner = user_id, "report saved");
        Ok(Report::from_record(record, PermissionTier::Owner))
    }

    /// Overwrite a report's definition. Needs Edit or Owner.
    pub async fn update(
        &self,
        user_id: &str,
        report_id: &str,
        definition: &QueryDefinition,
    ) -> PersistenceResult<Report> {
        let (mut record, tier) = self.authorized(user_id, report_id).await?;
        if !tier.can_edit() {
            return Err(PersistenceError::Forbidden(format!(
                "{} cannot edit report {}",
                user_id, report_id
            )));
        }
        record.definition = definition.clone();
        self.store.update(&record).await?;
        tracing::info!(report = report_id, user = user_id, "report updated");
        Ok(Report::from_record(record, tier))
    }

    /// Grant `grantee_id` Edit or View on a report. Owner only.
    pub async fn share(
        &self,
        user_id: &str,
        report_id: &str,
        grantee_id: &str,
        tier: PermissionTier,
    ) -> PersistenceResult<ShareGrant> {
        let (record, user_tier) = self.authorized(user_id, report_id).await?;
        if !user_tier.is_owner() {
            return Err(PersistenceError::Forbidden(format!(
                "only the owner can share report {}",
                report_id
            )));
        }
        if tier.is_owner() {
            return Err(PersistenceError::Forbidden(
                "ownership cannot be granted".to_string(),
            ));
        }
        if grantee_id == record.owner_id {
            return Err(PersistenceError::Forbidden(
                "the owner already has full access".to_string(),
            ));
        }

        let grant = ShareGrant {
            report_id: report_id.to_string(),
            grantee_id: grantee_id.to_string(),
            tier,
        };
        self.store.grant(&grant).await?;
        tracing::info!(report = report_id, grantee = grantee_id, %tier, "report shared");
        Ok(grant)
    }

    /// Reports owned by or shared with `user_id`, sorted by name.
    pub async fn list(&self, user_id: &str) -> PersistenceResult<Vec<Report>> {
        let mut reports: Vec<Report> = self
            .store
            .list_owned(user_id)
            .await?
            .into_iter()
            .map(|r| Report::from_record(r, PermissionTier::Owner))
            .collect();

        for grant in self.store.shared_with(user_id).await? {
            if reports.iter().any(|r| r.id == grant.report_id) {
                continue;
            }
            match self.store.get(&grant.report_id).await? {
                Some(record) => reports.push(Report::from_record(record, grant.tier)),
                None => tracing::debug!(report = %grant.report_id, "grant for missing report"),
            }
        }

        reports.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        Ok(reports)
    }

    /// Load a report the user can at least view.
    pub async fn open(&self, user_id: &str, report_id: &str) -> PersistenceResult<Report> {
        let (record, tier) = self.authorized(user_id, report_id).await?;
        Ok(Report::from_record(record, tier))
    }

    /// Delete a report. Owner only.
    pub async fn delete(&self, user_id: &str, report_id: &str) -> PersistenceResult<()> {
        let (_, tier) = self.authorized(user_id, report_id).await?;
        if !tier.is_owner() {
            return Err(PersistenceError::Forbidden(format!(
                "only the owner can delete report {}",
                report_id
            )));
        }
        self.store.delete(report_id).await?;
        tracing::info!(report = report_id, "report deleted");
        Ok(())
    }

    async fn authorized(
        &self,
        user_id: &str,
        report_id: &str,
    ) -> PersistenceResult<(ReportRecord, PermissionTier)> {
        let record = self
            .store
            .get(report_id)
            .await?
            .ok_or_else(|| PersistenceError::NotFound(format!("report {}", report_id)))?;
        match self.policy.tier_for(user_id, &record).await? {
            Some(tier) => Ok((record, tier)),
            None => Err(PersistenceError::Forbidden(format!(
                "{} has no access to report {}",
                user_id, report_id
            ))),
        }
    }
}
