// tests/persist/autosave_test.rs
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tessera::dashboard::{DashboardDocument, GridLayout, Widget, WidgetType};
use tessera::memory::MemoryDocumentStore;
use tessera::persist::*;

const DELAY: Duration = Duration::from_millis(1500);

fn document_with(widgets: Vec<Widget>) -> DashboardDocument {
    let mut doc = DashboardDocument::new("dash-1", "Sales Overview", "sales");
    doc.pages[0].widgets = widgets;
    doc
}

#[tokio::test(start_paused = true)]
async fn test_burst_of_edits_saves_once() {
    let store = Arc::new(MemoryDocumentStore::new());
    let saver = Autosaver::spawn(store.clone(), DELAY);
    assert_eq!(saver.status(), SaveStatus::Idle);

    let mut doc = document_with(vec![]);
    for i in 0..3 {
        doc.pages[0].widgets.push(Widget::new(WidgetType::Kpi, i * 3, 0));
        saver.schedule(SaveRequest::from_document(&doc));
    }
    assert_eq!(saver.status(), SaveStatus::Pending);

    tokio::time::sleep(Duration::from_millis(2000)).await;
    assert_eq!(store.save_count(), 1);
    assert_eq!(saver.status(), SaveStatus::Saved { revision: 1 });
    assert_eq!(store.dashboard("dash-1").unwrap().active_widgets().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_each_edit_restarts_quiet_period() {
    let store = Arc::new(MemoryDocumentStore::new());
    let saver = Autosaver::spawn(store.clone(), DELAY);
    let doc = document_with(vec![Widget::new(WidgetType::Bar, 0, 0)]);

    saver.schedule(SaveRequest::from_document(&doc));
    tokio::time::sleep(Duration::from_millis(1000)).await;
    saver.schedule(SaveRequest::from_document(&doc));
    tokio::time::sleep(Duration::from_millis(1000)).await;
    assert_eq!(store.save_count(), 0);

    tokio::time::sleep(Duration::from_millis(1000)).await;
    assert_eq!(store.save_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_later_saves_bump_revision() {
    let store = Arc::new(MemoryDocumentStore::new());
    let saver = Autosaver::spawn(store.clone(), DELAY);
    let doc = document_with(vec![]);

    saver.schedule(SaveRequest::from_document(&doc));
    tokio::time::sleep(Duration::from_millis(2000)).await;
    saver.schedule(SaveRequest::from_document(&doc));
    tokio::time::sleep(Duration::from_millis(2000)).await;

    assert_eq!(saver.status(), SaveStatus::Saved { revision: 2 });
}

#[tokio::test(start_paused = true)]
async fn test_failed_save_is_reported() {
    let store = Arc::new(MemoryDocumentStore::new());
    store.set_fail_saves(true);
    let saver = Autosaver::spawn(store.clone(), DELAY);
    let mut status = saver.subscribe();

    saver.schedule(SaveRequest::from_document(&document_with(vec![])));
    tokio::time::sleep(Duration::from_millis(2000)).await;

    let expected = SaveStatus::Failed {
        message: "Storage error: dashboard store unavailable".into(),
    };
    assert_eq!(*status.borrow_and_update(), expected);
    assert_eq!(store.save_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_flushes_pending_save() {
    let store = Arc::new(MemoryDocumentStore::new());
    let saver = Autosaver::spawn(store.clone(), DELAY);
    saver.schedule(SaveRequest::from_document(&document_with(vec![])));

    let last = saver.shutdown().await;
    assert_eq!(last, SaveStatus::Saved { revision: 1 });
    assert_eq!(store.save_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_without_edits_is_idle() {
    let store = Arc::new(MemoryDocumentStore::new());
    let saver = Autosaver::spawn(store.clone(), DELAY);
    assert_eq!(saver.shutdown().await, SaveStatus::Idle);
    assert_eq!(store.save_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_save_merges_grid_geometry_with_configs() {
    let store = Arc::new(MemoryDocumentStore::new());
    let saver = Autosaver::spawn(store.clone(), DELAY);

    let kept = Widget::new(WidgetType::Kpi, 0, 0);
    let dropped = Widget::new(WidgetType::Table, 0, 2);
    let orphan = Widget::new(WidgetType::Pie, 0, 0);

    let mut moved = GridItem::of(&kept);
    moved.x = 9;
    let mut orphan_item = GridItem::of(&orphan);
    orphan_item.y = 7;

    let mut configs = HashMap::new();
    configs.insert(kept.id, kept.clone());
    configs.insert(dropped.id, dropped.clone());

    saver.schedule(SaveRequest {
        document: document_with(vec![]),
        grid: vec![moved, orphan_item],
        configs,
    });
    saver.shutdown().await;

    let saved = store.dashboard("dash-1").unwrap();
    let widgets = saved.active_widgets();
    assert_eq!(widgets.len(), 2);
    assert_eq!(widgets[0].id, kept.id);
    assert_eq!(widgets[0].layout, GridLayout { x: 9, y: 0, w: 3, h: 2 });
    assert_eq!(widgets[1].id, orphan.id);
    assert_eq!(widgets[1].widget_type, WidgetType::Table);
    assert_eq!(widgets[1].layout.y, 7);
}
