// tests/scenarios/scenario_test.rs
//
// End-to-end walks through the builder and a dashboard over the sample
// sales connection.
use std::sync::Arc;

use serde_json::json;
use tessera::compose::{PillEdit, Slot};
use tessera::config::{QuerySettings, Settings};
use tessera::dashboard::*;
use tessera::join::JoinValidation;
use tessera::memory::{sales_backend, MemoryDocumentStore, SALES_CONNECTION};
use tessera::query::{Aggregation, FieldRef};
use tessera::session::{BuilderServices, DashboardSession, ReportBuilder};

fn region() -> FieldRef {
    FieldRef::new("Customers", "region")
}

fn revenue() -> MeasureSpec {
    MeasureSpec::new(FieldRef::new("Orders", "amount"), Aggregation::Sum)
}

fn dashboard() -> DashboardSession {
    let doc = DashboardDocument::new("dash-1", "Regional Sales", SALES_CONNECTION);
    let source: Arc<dyn WidgetDataSource> =
        Arc::new(QueryWidgetSource::new(Arc::new(sales_backend())));
    DashboardSession::new(
        doc,
        source,
        Arc::new(MemoryDocumentStore::new()),
        &Settings::default(),
    )
}

#[tokio::test]
async fn test_revenue_by_region_report() {
    let services = BuilderServices::from_backend(
        Arc::new(sales_backend()),
        Arc::new(MemoryDocumentStore::new()),
    );
    let mut builder = ReportBuilder::new("analyst", services, QuerySettings::default());
    builder.select_connection(SALES_CONNECTION).await.unwrap();
    builder.add_field(Slot::Groups, &region()).await.unwrap();
    let amount = builder
        .add_field(Slot::Columns, &FieldRef::new("Orders", "amount"))
        .await
        .unwrap();
    builder
        .edit_pill(amount, PillEdit::Aggregation(Aggregation::Sum))
        .await
        .unwrap();

    assert_eq!(builder.validation(), Some(&JoinValidation::Valid));
    builder.run(1).await.unwrap();

    let result = builder.result().unwrap();
    assert_eq!(result.total_rows, 3);
    assert_eq!(
        result.rows,
        vec![
            vec![json!("East"), json!(175.5)],
            vec![json!("West"), json!(275.0)],
            vec![json!("North"), json!(10.0)],
        ]
    );
}

#[tokio::test]
async fn test_kpi_scoped_by_chart_click() {
    let mut session = dashboard();
    let chart = session.add_widget(WidgetType::Bar, 0, 0).await;
    session
        .configure_widget(
            chart,
            DataConfig {
                dimensions: vec![region()],
                measures: vec![revenue()],
            },
        )
        .await;
    let kpi = session.add_widget(WidgetType::Kpi, 6, 0).await;
    session
        .configure_widget(
            kpi,
            DataConfig {
                dimensions: vec![],
                measures: vec![revenue()],
            },
        )
        .await;

    session.click_chart(chart, 0).await.unwrap();
    let Some(RenderOutput::Kpi(view)) = session.output(kpi) else {
        panic!("expected a kpi");
    };
    assert_eq!(view.value, Some(175.5));

    session.remove_cross_filter(chart, &region()).await;
    let Some(RenderOutput::Kpi(view)) = session.output(kpi) else {
        panic!("expected a kpi");
    };
    assert_eq!(view.value, Some(460.5));
    assert_eq!(view.text, "460.5");

    session.shutdown().await;
}

#[tokio::test]
async fn test_widget_csv_export() {
    let mut session = dashboard();
    let chart = session.add_widget(WidgetType::Bar, 0, 0).await;
    session
        .configure_widget(
            chart,
            DataConfig {
                dimensions: vec![region()],
                measures: vec![revenue()],
            },
        )
        .await;

    let file = session.export_widget_csv(chart).await.unwrap();
    assert_eq!(file.content_type, "text/csv");
    insta::assert_snapshot!(file.text().trim_end(), @r###"
    Customers.region,SUM(Orders.amount)
    East,175.5
    West,275.0
    North,10.0
    "###);

    session.shutdown().await;
}
