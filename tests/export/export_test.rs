// tests/export/export_test.rs
use std::sync::Arc;

use serde_json::json;
use tessera::config::default_palette;
use tessera::dashboard::*;
use tessera::execute::ExecutionError;
use tessera::export::*;
use tessera::memory::{sales_backend, SALES_CONNECTION};
use tessera::query::{Aggregation, FieldRef};

fn source() -> QueryWidgetSource {
    QueryWidgetSource::new(Arc::new(sales_backend()))
}

fn revenue_chart() -> Widget {
    let mut widget = Widget::new(WidgetType::Bar, 0, 0);
    widget.data_config.dimensions.push(FieldRef::new("Customers", "region"));
    widget.data_config.measures.push(MeasureSpec::new(
        FieldRef::new("Orders", "amount"),
        Aggregation::Sum,
    ));
    widget.display.title = widget.suggested_title();
    widget
}

#[test]
fn test_write_csv_uses_plain_values() {
    let headers = vec!["region".to_string(), "total".to_string()];
    let rows = vec![
        vec![json!("East"), json!(1234.5)],
        vec![json!("West, Coast"), json!(7)],
    ];
    let text = String::from_utf8(write_csv(&headers, &rows, b',').unwrap()).unwrap();
    insta::assert_snapshot!(text.trim_end(), @r###"
    region,total
    East,1234.5
    "West, Coast",7
    "###);
}

#[tokio::test]
async fn test_widget_csv_export() {
    let widget = revenue_chart();
    let file = export_widget_csv(&source(), SALES_CONNECTION, &widget, &[], b',')
        .await
        .unwrap();

    assert_eq!(file.file_name, "amount-by-region.csv");
    assert_eq!(file.content_type, "text/csv");
    insta::assert_snapshot!(file.text().trim_end(), @r###"
    Customers.region,SUM(Orders.amount)
    East,175.5
    West,275.0
    North,10.0
    "###);
}

#[tokio::test]
async fn test_widget_csv_with_semicolons() {
    let file = export_widget_csv(&source(), SALES_CONNECTION, &revenue_chart(), &[], b';')
        .await
        .unwrap();
    assert!(file.text().starts_with("Customers.region;SUM(Orders.amount)\n"));
}

#[tokio::test]
async fn test_unconfigured_widget_cannot_export() {
    let widget = Widget::new(WidgetType::Table, 0, 0);
    let err = export_widget_csv(&source(), SALES_CONNECTION, &widget, &[], b',')
        .await
        .unwrap_err();
    assert_eq!(err, ExportError::UnconfiguredWidget);
}

#[tokio::test]
async fn test_fetch_failure_is_reported() {
    let err = export_widget_csv(&source(), "hr", &revenue_chart(), &[], b',')
        .await
        .unwrap_err();
    assert_eq!(
        err,
        ExportError::Fetch(ExecutionError::Rejected("Unknown connection: hr".into()).to_string())
    );
}

#[test]
fn test_image_of_empty_dashboard_fails() {
    let doc = DashboardDocument::new("d1", "Empty", SALES_CONNECTION);
    assert_eq!(
        export_image(&doc, SvgOptions::default(), |_| None).unwrap_err(),
        ExportError::EmptyDashboard
    );
}

#[tokio::test]
async fn test_image_contains_each_widget_with_caption() {
    let mut doc = DashboardDocument::new("d1", "Sales Overview", SALES_CONNECTION);
    let chart = revenue_chart();
    let mut kpi = Widget::new(WidgetType::Kpi, 6, 0);
    kpi.data_config.measures.push(MeasureSpec::new(
        FieldRef::new("Orders", "amount"),
        Aggregation::Sum,
    ));
    kpi.display.title = "Revenue <total>".into();
    doc.pages[0].widgets = vec![chart.clone(), kpi.clone()];

    let mut pipeline = WidgetPipeline::new(Arc::new(source()));
    pipeline
        .render_all(
            SALES_CONNECTION,
            &[&chart, &kpi],
            &CrossFilterBus::new(),
            &[],
            &default_palette(),
        )
        .await;

    let file = export_image(&doc, SvgOptions::default(), |id| pipeline.output(id)).unwrap();
    assert_eq!(file.file_name, "sales-overview.svg");
    assert_eq!(file.content_type, "image/svg+xml");

    let svg = file.text();
    assert!(svg.starts_with("<svg "));
    assert!(svg.trim_end().ends_with("</svg>"));
    assert!(svg.contains(&format!("data-widget=\"{}\"", chart.id)));
    assert!(svg.contains(&format!("data-widget=\"{}\"", kpi.id)));
    assert!(svg.contains("Amount by Region"));
    assert!(svg.contains("bar_chart (3 points)"));
    assert!(svg.contains("Revenue &lt;total&gt;"));
    assert!(svg.contains(">460.5<"));
}

#[test]
fn test_image_size_follows_grid() {
    let mut doc = DashboardDocument::new("d1", "", SALES_CONNECTION);
    doc.pages[0].widgets.push(Widget::new(WidgetType::Table, 0, 3));

    let file = export_image(&doc, SvgOptions::default(), |_| None).unwrap();
    assert_eq!(file.file_name, "dashboard.svg");
    assert!(file.text().contains(r#"width="960" height="480""#));
}

#[test]
fn test_image_of_oversized_layout_fails() {
    let mut doc = DashboardDocument::new("d1", "", SALES_CONNECTION);
    doc.pages[0].widgets.push(Widget::new(WidgetType::Kpi, 0, 80_000_000));
    assert_eq!(
        export_image(&doc, SvgOptions::default(), |_| None).unwrap_err(),
        ExportError::LayoutTooLarge
    );

    let mut wide = DashboardDocument::new("d2", "", SALES_CONNECTION);
    let mut widget = Widget::new(WidgetType::Table, 0, 0);
    widget.layout.x = u32::MAX - 1;
    wide.pages[0].widgets.push(widget);
    assert_eq!(
        export_image(&wide, SvgOptions::default(), |_| None).unwrap_err(),
        ExportError::LayoutTooLarge
    );
}
