// tests/persist/sqlite_store_test.rs
use tessera::dashboard::{DashboardDocument, Widget, WidgetType};
use tessera::persist::*;
use tessera::query::{ColumnSpec, FieldRef, QueryDefinition};
use tessera::reports::{PermissionTier, ReportRecord, ReportStore, ShareGrant};

fn record(id: &str, name: &str, owner: &str) -> ReportRecord {
    let mut definition = QueryDefinition::new("sales");
    definition
        .columns
        .push(ColumnSpec::new(FieldRef::new("Orders", "amount")));
    ReportRecord {
        id: id.to_string(),
        name: name.to_string(),
        description: String::new(),
        owner_id: owner.to_string(),
        definition,
    }
}

fn grant(report: &str, grantee: &str, tier: PermissionTier) -> ShareGrant {
    ShareGrant {
        report_id: report.to_string(),
        grantee_id: grantee.to_string(),
        tier,
    }
}

#[tokio::test]
async fn test_insert_and_get_round_trips_definition() {
    let store = SqliteStore::open_in_memory().unwrap();
    let report = record("r1", "Revenue", "alice");
    store.insert(&report).await.unwrap();

    assert_eq!(store.get("r1").await.unwrap(), Some(report));
    assert_eq!(store.get("missing").await.unwrap(), None);
}

#[tokio::test]
async fn test_duplicate_insert_is_a_storage_error() {
    let store = SqliteStore::open_in_memory().unwrap();
    store.insert(&record("r1", "Revenue", "alice")).await.unwrap();
    let err = store.insert(&record("r1", "Other", "bob")).await.unwrap_err();
    assert!(matches!(err, PersistenceError::Storage(_)));
}

#[tokio::test]
async fn test_update_requires_existing_report() {
    let store = SqliteStore::open_in_memory().unwrap();
    let mut report = record("r1", "Revenue", "alice");
    assert!(matches!(
        store.update(&report).await,
        Err(PersistenceError::NotFound(_))
    ));

    store.insert(&report).await.unwrap();
    report.name = "Revenue 2024".into();
    store.update(&report).await.unwrap();
    assert_eq!(store.get("r1").await.unwrap().unwrap().name, "Revenue 2024");
}

#[tokio::test]
async fn test_list_owned_sorted_by_name() {
    let store = SqliteStore::open_in_memory().unwrap();
    store.insert(&record("r1", "Revenue", "alice")).await.unwrap();
    store.insert(&record("r2", "Customers", "alice")).await.unwrap();
    store.insert(&record("r3", "Audit", "bob")).await.unwrap();

    let names: Vec<String> = store
        .list_owned("alice")
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.name)
        .collect();
    assert_eq!(names, vec!["Customers", "Revenue"]);
}

#[tokio::test]
async fn test_grant_upserts_tier() {
    let store = SqliteStore::open_in_memory().unwrap();
    store.insert(&record("r1", "Revenue", "alice")).await.unwrap();
    store.grant(&grant("r1", "bob", PermissionTier::View)).await.unwrap();
    store.grant(&grant("r1", "bob", PermissionTier::Edit)).await.unwrap();
    store.grant(&grant("r1", "carol", PermissionTier::View)).await.unwrap();

    let grants = store.grants_for_report("r1").await.unwrap();
    assert_eq!(grants.len(), 2);
    assert_eq!(
        store.shared_with("bob").await.unwrap(),
        vec![grant("r1", "bob", PermissionTier::Edit)]
    );
}

#[tokio::test]
async fn test_delete_cascades_grants() {
    let store = SqliteStore::open_in_memory().unwrap();
    store.insert(&record("r1", "Revenue", "alice")).await.unwrap();
    store.grant(&grant("r1", "bob", PermissionTier::View)).await.unwrap();

    assert!(store.delete("r1").await.unwrap());
    assert!(!store.delete("r1").await.unwrap());
    assert!(store.shared_with("bob").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_dashboard_save_and_load() {
    let store = SqliteStore::open_in_memory().unwrap();
    let mut doc = DashboardDocument::new("dash-1", "Sales Overview", "sales");
    doc.pages[0].widgets.push(Widget::new(WidgetType::Bar, 0, 0));

    assert_eq!(store.save(&doc).await.unwrap(), 1);
    doc.name = "Sales".into();
    assert_eq!(store.save(&doc).await.unwrap(), 2);

    assert_eq!(store.load("dash-1").await.unwrap(), doc);
    assert_eq!(store.dashboard_count().unwrap(), 1);
}

#[tokio::test]
async fn test_missing_dashboard_is_not_found() {
    let store = SqliteStore::open_in_memory().unwrap();
    assert!(matches!(
        store.load("nope").await,
        Err(PersistenceError::NotFound(_))
    ));
}

#[test]
fn test_open_creates_file_store() {
    let dir = std::env::temp_dir().join(format!("tessera-store-{}", std::process::id()));
    let path = dir.join("nested").join("store.db");
    let store = SqliteStore::open(&path).unwrap();
    assert_eq!(store.dashboard_count().unwrap(), 0);
    drop(store);

    assert!(SqliteStore::open(&path).is_ok());
    let _ = std::fs::remove_dir_all(dir);
}
