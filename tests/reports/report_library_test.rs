// tests/reports/report_library_test.rs
use std::sync::Arc;

use async_trait::async_trait;
use tessera::memory::MemoryDocumentStore;
use tessera::persist::{PersistenceError, PersistenceResult, SqliteStore};
use tessera::query::{Aggregation, ColumnSpec, FieldRef, GroupSpec, QueryDefinition};
use tessera::reports::*;

fn revenue_by_region() -> QueryDefinition {
    let mut def = QueryDefinition::new("sales");
    def.groups.push(GroupSpec::new(FieldRef::new("Customers", "region")));
    def.columns.push(ColumnSpec::aggregated(
        FieldRef::new("Orders", "amount"),
        Aggregation::Sum,
    ));
    def
}

fn library() -> ReportLibrary {
    ReportLibrary::with_grants(Arc::new(MemoryDocumentStore::new()))
}

/// Everyone may view, nobody may edit.
struct ReadOnlyPolicy;

#[async_trait]
impl AccessPolicy for ReadOnlyPolicy {
    async fn tier_for(
        &self,
        _user_id: &str,
        _report: &ReportRecord,
    ) -> PersistenceResult<Option<PermissionTier>> {
        Ok(Some(PermissionTier::View))
    }
}

#[tokio::test]
async fn test_save_as_makes_caller_owner() {
    let library = library();
    let report = library
        .save_as("alice", "  Revenue  ", "by region", &revenue_by_region())
        .await
        .unwrap();

    assert_eq!(report.name, "Revenue");
    assert_eq!(report.owner_id, "alice");
    assert_eq!(report.permission_tier, PermissionTier::Owner);

    let opened = library.open("alice", &report.id).await.unwrap();
    assert_eq!(opened.definition, revenue_by_region());
}

#[tokio::test]
async fn test_save_as_requires_name() {
    let err = library()
        .save_as("alice", "   ", "", &revenue_by_region())
        .await
        .unwrap_err();
    assert!(matches!(err, PersistenceError::Storage(_)));
}

#[tokio::test]
async fn test_share_grants_view_and_edit() {
    let library = library();
    let report = library
        .save_as("alice", "Revenue", "", &revenue_by_region())
        .await
        .unwrap();

    library
        .share("alice", &report.id, "bob", PermissionTier::View)
        .await
        .unwrap();
    let mut changed = revenue_by_region();
    changed.groups.clear();

    let err = library.update("bob", &report.id, &changed).await.unwrap_err();
    assert!(matches!(err, PersistenceError::Forbidden(_)));

    library
        .share("alice", &report.id, "bob", PermissionTier::Edit)
        .await
        .unwrap();
    let updated = library.update("bob", &report.id, &changed).await.unwrap();
    assert_eq!(updated.permission_tier, PermissionTier::Edit);
    assert!(library
        .open("alice", &report.id)
        .await
        .unwrap()
        .definition
        .groups
        .is_empty());
}

#[tokio::test]
async fn test_share_restrictions() {
    let library = library();
    let report = library
        .save_as("alice", "Revenue", "", &revenue_by_region())
        .await
        .unwrap();
    library
        .share("alice", &report.id, "bob", PermissionTier::Edit)
        .await
        .unwrap();

    let by_editor = library
        .share("bob", &report.id, "carol", PermissionTier::View)
        .await;
    assert!(matches!(by_editor, Err(PersistenceError::Forbidden(_))));

    let ownership = library
        .share("alice", &report.id, "carol", PermissionTier::Owner)
        .await;
    assert!(matches!(ownership, Err(PersistenceError::Forbidden(_))));

    let to_owner = library
        .share("alice", &report.id, "alice", PermissionTier::View)
        .await;
    assert!(matches!(to_owner, Err(PersistenceError::Forbidden(_))));
}

#[tokio::test]
async fn test_open_without_access() {
    let library = library();
    let report = library
        .save_as("alice", "Revenue", "", &revenue_by_region())
        .await
        .unwrap();

    assert!(matches!(
        library.open("mallory", &report.id).await,
        Err(PersistenceError::Forbidden(_))
    ));
    assert!(matches!(
        library.open("alice", "no-such-report").await,
        Err(PersistenceError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_list_merges_owned_and_shared() {
    let library = ReportLibrary::with_grants(Arc::new(SqliteStore::open_in_memory().unwrap()));
    let def = revenue_by_region();
    library.save_as("bob", "Zebra", "", &def).await.unwrap();
    let shared = library.save_as("alice", "Margins", "", &def).await.unwrap();
    library.save_as("alice", "Private", "", &def).await.unwrap();
    library
        .share("alice", &shared.id, "bob", PermissionTier::View)
        .await
        .unwrap();

    let listed: Vec<(String, PermissionTier)> = library
        .list("bob")
        .await
        .unwrap()
        .into_iter()
        .map(|r| (r.name, r.permission_tier))
        .collect();
    assert_eq!(
        listed,
        vec![
            ("Margins".to_string(), PermissionTier::View),
            ("Zebra".to_string(), PermissionTier::Owner),
        ]
    );
}

#[tokio::test]
async fn test_delete_is_owner_only() {
    let library = library();
    let report = library
        .save_as("alice", "Revenue", "", &revenue_by_region())
        .await
        .unwrap();
    library
        .share("alice", &report.id, "bob", PermissionTier::Edit)
        .await
        .unwrap();

    assert!(matches!(
        library.delete("bob", &report.id).await,
        Err(PersistenceError::Forbidden(_))
    ));
    library.delete("alice", &report.id).await.unwrap();
    assert!(library.list("bob").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_custom_policy_decides_tier() {
    let store: Arc<dyn ReportStore> = Arc::new(MemoryDocumentStore::new());
    let owners = ReportLibrary::with_grants(Arc::clone(&store));
    let report = owners
        .save_as("alice", "Revenue", "", &revenue_by_region())
        .await
        .unwrap();

    let read_only = ReportLibrary::new(store, Arc::new(ReadOnlyPolicy));
    assert_eq!(
        read_only.open("anyone", &report.id).await.unwrap().permission_tier,
        PermissionTier::View
    );
    assert!(matches!(
        read_only.update("alice", &report.id, &revenue_by_region()).await,
        Err(PersistenceError::Forbidden(_))
    ));
}
