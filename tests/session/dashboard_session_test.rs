// tests/session/dashboard_session_test.rs
use std::sync::Arc;

use serde_json::json;
use tessera::config::Settings;
use tessera::dashboard::*;
use tessera::export::ExportError;
use tessera::memory::{sales_backend, MemoryDocumentStore, SALES_CONNECTION};
use tessera::persist::{GridItem, PersistenceError, SaveStatus};
use tessera::query::{Aggregation, FieldRef};
use tessera::session::DashboardSession;
use tessera::{EngineError, NoticeKind};

fn source() -> Arc<dyn WidgetDataSource> {
    Arc::new(QueryWidgetSource::new(Arc::new(sales_backend())))
}

fn region() -> FieldRef {
    FieldRef::new("Customers", "region")
}

fn revenue() -> MeasureSpec {
    MeasureSpec::new(FieldRef::new("Orders", "amount"), Aggregation::Sum)
}

fn by_region() -> DataConfig {
    DataConfig {
        dimensions: vec![region()],
        measures: vec![revenue()],
    }
}

fn total() -> DataConfig {
    DataConfig {
        dimensions: vec![],
        measures: vec![revenue()],
    }
}

fn session(store: Arc<MemoryDocumentStore>) -> DashboardSession {
    let doc = DashboardDocument::new("dash-1", "Sales Overview", SALES_CONNECTION);
    DashboardSession::new(doc, source(), store, &Settings::default())
}

fn kpi_value(session: &DashboardSession, id: WidgetId) -> Option<f64> {
    match session.output(id) {
        Some(RenderOutput::Kpi(view)) => view.value,
        _ => None,
    }
}

/// A bar chart by region and a total KPI.
async fn chart_and_kpi(session: &mut DashboardSession) -> (WidgetId, WidgetId) {
    let chart = session.add_widget(WidgetType::Bar, 0, 0).await;
    assert!(session.configure_widget(chart, by_region()).await);
    let kpi = session.add_widget(WidgetType::Kpi, 6, 0).await;
    assert!(session.configure_widget(kpi, total()).await);
    (chart, kpi)
}

#[tokio::test]
async fn test_new_widget_shows_configure_prompt_and_saves() {
    let store = Arc::new(MemoryDocumentStore::new());
    let mut session = session(store.clone());

    let id = session.add_widget(WidgetType::Pie, 2, 1).await;
    let widget = session.widget(id).unwrap();
    assert_eq!(widget.layout, GridLayout { x: 2, y: 1, w: 4, h: 4 });
    assert_eq!(widget.display.title, "Pie Chart");
    assert_eq!(
        session.output(id),
        Some(&RenderOutput::empty("Configure this widget"))
    );
    assert_eq!(session.save_status(), SaveStatus::Pending);

    assert_eq!(session.shutdown().await, SaveStatus::Saved { revision: 1 });
    let saved = store.dashboard("dash-1").unwrap();
    assert_eq!(saved.active_widgets().len(), 1);
    assert_eq!(saved.active_widgets()[0].id, id);
}

#[tokio::test]
async fn test_configure_renders_and_follows_suggested_title() {
    let store = Arc::new(MemoryDocumentStore::new());
    let mut session = session(store);
    let (chart, kpi) = chart_and_kpi(&mut session).await;

    assert_eq!(session.widget(chart).unwrap().display.title, "Amount by Region");
    let Some(RenderOutput::Chart(view)) = session.output(chart) else {
        panic!("expected a chart");
    };
    assert_eq!(view.labels, vec!["East", "West", "North"]);
    assert_eq!(kpi_value(&session, kpi), Some(460.5));

    session.rename_widget(kpi, "Total revenue");
    session.configure_widget(kpi, by_region()).await;
    assert_eq!(session.widget(kpi).unwrap().display.title, "Total revenue");
}

#[tokio::test]
async fn test_chart_click_filters_other_widgets() {
    let store = Arc::new(MemoryDocumentStore::new());
    let mut session = session(store);
    let (chart, kpi) = chart_and_kpi(&mut session).await;

    let filter = session.click_chart(chart, 0).await.unwrap();
    assert_eq!(filter.source_widget_id, chart);
    assert_eq!(filter.field, region());
    assert_eq!(filter.value, json!("East"));
    assert_eq!(session.cross_filters().len(), 1);

    assert_eq!(kpi_value(&session, kpi), Some(175.5));
    let Some(RenderOutput::Chart(view)) = session.output(chart) else {
        panic!("expected a chart");
    };
    assert_eq!(view.labels.len(), 3);

    session.click_chart(chart, 1).await.unwrap();
    assert_eq!(session.cross_filters().len(), 1);
    assert_eq!(kpi_value(&session, kpi), Some(275.0));

    assert!(session.remove_cross_filter(chart, &region()).await);
    assert_eq!(kpi_value(&session, kpi), Some(460.5));
}

#[tokio::test]
async fn test_click_without_dimension_or_label_is_ignored() {
    let store = Arc::new(MemoryDocumentStore::new());
    let mut session = session(store);
    let (chart, kpi) = chart_and_kpi(&mut session).await;

    assert!(session.click_chart(kpi, 0).await.is_none());
    assert!(session.click_chart(chart, 42).await.is_none());
    assert!(session.cross_filters().is_empty());
}

#[tokio::test]
async fn test_clear_cross_filters() {
    let store = Arc::new(MemoryDocumentStore::new());
    let mut session = session(store);
    let (chart, kpi) = chart_and_kpi(&mut session).await;

    session.click_chart(chart, 2).await.unwrap();
    assert_eq!(kpi_value(&session, kpi), Some(10.0));

    session.clear_cross_filters().await;
    assert!(session.cross_filters().is_empty());
    assert_eq!(kpi_value(&session, kpi), Some(460.5));
}

#[tokio::test]
async fn test_delete_widget_disposes_and_withdraws_filters() {
    let store = Arc::new(MemoryDocumentStore::new());
    let mut session = session(store);
    let (chart, kpi) = chart_and_kpi(&mut session).await;
    session.click_chart(chart, 0).await.unwrap();

    assert!(session.delete_widget(chart).await);
    assert!(!session.delete_widget(chart).await);
    assert!(session.output(chart).is_none());
    assert!(session.cross_filters().is_empty());
    assert_eq!(kpi_value(&session, kpi), Some(460.5));
    assert_eq!(session.pipeline().registry().mounted_count(), 1);
    assert_eq!(session.pipeline().registry().live_resources(), 1);
}

#[tokio::test]
async fn test_move_and_resize_stay_on_grid() {
    let store = Arc::new(MemoryDocumentStore::new());
    let mut session = session(store);
    let id = session.add_widget(WidgetType::Bar, 0, 0).await;

    assert!(session.move_widget(id, 10, 3));
    assert_eq!(session.widget(id).unwrap().layout, GridLayout { x: 6, y: 3, w: 6, h: 4 });

    assert!(session.resize_widget(id, 20, 0));
    assert_eq!(session.widget(id).unwrap().layout, GridLayout { x: 6, y: 3, w: 6, h: 1 });

    assert!(!session.move_widget(WidgetId::new(), 0, 0));
}

#[tokio::test]
async fn test_exports() {
    let store = Arc::new(MemoryDocumentStore::new());
    let mut session = session(store);
    let (chart, _) = chart_and_kpi(&mut session).await;
    session.click_chart(chart, 0).await.unwrap();

    let image = session.export_image().unwrap();
    assert_eq!(image.file_name, "sales-overview.svg");
    assert!(image.text().contains("bar_chart (3 points)"));

    let csv = session.export_widget_csv(chart).await.unwrap();
    assert_eq!(csv.file_name, "amount-by-region.csv");
    assert_eq!(csv.text().lines().count(), 4);
}

#[tokio::test]
async fn test_export_failures_are_transient_notices() {
    let store = Arc::new(MemoryDocumentStore::new());
    let mut session = session(store);

    let err = session.export_image().unwrap_err();
    assert!(matches!(err, EngineError::Export(ExportError::EmptyDashboard)));

    let missing = WidgetId::new();
    let err = session.export_widget_csv(missing).await.unwrap_err();
    assert!(matches!(err, EngineError::Export(ExportError::UnknownWidget(id)) if id == missing));

    let notices = session.take_transient_notices();
    assert_eq!(notices.len(), 2);
    assert!(notices.iter().all(|n| n.kind == NoticeKind::Transient));
}

#[tokio::test]
async fn test_new_widget_stays_inside_grid() {
    let store = Arc::new(MemoryDocumentStore::new());
    let mut session = session(store);

    let id = session.add_widget(WidgetType::Kpi, 40, 0).await;
    let layout = session.widget(id).unwrap().layout;
    assert_eq!(layout.x + layout.w, 12);

    session.add_widget(WidgetType::Kpi, 0, 80_000_000).await;
    let err = session.export_image().unwrap_err();
    assert!(matches!(err, EngineError::Export(ExportError::LayoutTooLarge)));
    let notices = session.take_transient_notices();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].kind, NoticeKind::Transient);
}

#[tokio::test]
async fn test_grid_facet_is_merged_on_save() {
    let store = Arc::new(MemoryDocumentStore::new());
    let mut session = session(store.clone());
    let (chart, kpi) = chart_and_kpi(&mut session).await;
    assert!(session.move_widget(chart, 0, 1));
    assert_eq!(session.grid()[0].y, 1);

    let placeholder = WidgetId::new();
    let mut grid = session.grid().to_vec();
    grid.reverse();
    grid[0].y = 4;
    grid.push(GridItem {
        id: placeholder,
        x: 0,
        y: 8,
        w: 4,
        h: 2,
    });
    session.apply_grid(grid);
    assert_eq!(session.widget(kpi).unwrap().layout.y, 4);
    assert!(session.widget(placeholder).is_none());

    session.shutdown().await;
    let saved = store.dashboard("dash-1").unwrap();
    let widgets = saved.active_widgets();
    let ids: Vec<WidgetId> = widgets.iter().map(|w| w.id).collect();
    assert_eq!(ids, vec![kpi, chart, placeholder]);
    assert_eq!(widgets[0].layout.y, 4);
    assert_eq!(widgets[0].data_config, total());
    assert_eq!(widgets[1].layout.y, 1);
    assert_eq!(widgets[2].widget_type, WidgetType::Table);
    assert_eq!(widgets[2].data_config, DataConfig::default());
}

#[tokio::test]
async fn test_open_renders_stored_dashboard() {
    let store = Arc::new(MemoryDocumentStore::new());
    let mut first = session(store.clone());
    let (chart, kpi) = chart_and_kpi(&mut first).await;
    first.shutdown().await;

    let reopened = DashboardSession::open("dash-1", source(), store.clone(), &Settings::default())
        .await
        .unwrap();
    assert_eq!(reopened.widgets().len(), 2);
    assert!(matches!(reopened.output(chart), Some(RenderOutput::Chart(_))));
    assert_eq!(kpi_value(&reopened, kpi), Some(460.5));
    assert!(reopened.cross_filters().is_empty());
}

#[tokio::test]
async fn test_open_missing_dashboard() {
    let store = Arc::new(MemoryDocumentStore::new());
    let result = DashboardSession::open("nope", source(), store, &Settings::default()).await;
    assert!(matches!(
        result,
        Err(EngineError::Persistence(PersistenceError::NotFound(_)))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_failed_autosave_is_visible() {
    let store = Arc::new(MemoryDocumentStore::new());
    store.set_fail_saves(true);
    let mut session = session(store.clone());
    let mut status = session.subscribe_save_status();
    session.add_widget(WidgetType::Table, 0, 0).await;

    status
        .wait_for(|s| matches!(s, SaveStatus::Failed { .. }))
        .await
        .unwrap();
    let notices = session.take_transient_notices();
    assert_eq!(notices.len(), 1);
    assert!(notices[0].message.starts_with("Dashboard could not be saved"));
    assert!(session.take_transient_notices().is_empty());

    assert!(matches!(session.shutdown().await, SaveStatus::Failed { .. }));
    assert_eq!(store.save_count(), 0);
}
