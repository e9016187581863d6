// tests/dashboard/cross_filter_test.rs
use serde_json::json;
use tessera::dashboard::*;
use tessera::query::{FieldRef, FilterOperator, FilterSpec};

fn region() -> FieldRef {
    FieldRef::new("Customers", "region")
}

#[test]
fn test_publish_and_replace() {
    let chart = WidgetId::new();
    let mut bus = CrossFilterBus::new();
    assert!(bus.is_empty());

    bus.publish(CrossWidgetFilter::equals(chart, region(), "East"));
    bus.publish(CrossWidgetFilter::equals(chart, FieldRef::new("Orders", "order_date"), "2024-02"));
    bus.publish(CrossWidgetFilter::equals(chart, region(), "West"));

    assert_eq!(bus.active().len(), 2);
    assert_eq!(bus.active()[0].value, json!("West"));
}

#[test]
fn test_filters_from_different_sources_coexist() {
    let a = WidgetId::new();
    let b = WidgetId::new();
    let mut bus = CrossFilterBus::new();
    bus.publish(CrossWidgetFilter::equals(a, region(), "East"));
    bus.publish(CrossWidgetFilter::equals(b, region(), "West"));
    assert_eq!(bus.active().len(), 2);
}

#[test]
fn test_widget_is_not_filtered_by_itself() {
    let chart = WidgetId::new();
    let kpi = WidgetId::new();
    let mut bus = CrossFilterBus::new();
    bus.publish(CrossWidgetFilter::equals(chart, region(), "East"));

    assert!(bus.effective_for(chart).is_empty());
    let effective = bus.effective_for(kpi);
    assert_eq!(effective.len(), 1);
    assert_eq!(effective[0].source_widget_id, chart);
}

#[test]
fn test_remove_and_clear() {
    let a = WidgetId::new();
    let b = WidgetId::new();
    let mut bus = CrossFilterBus::new();
    bus.publish(CrossWidgetFilter::equals(a, region(), "East"));
    bus.publish(CrossWidgetFilter::equals(a, FieldRef::new("Customers", "name"), "Acme"));
    bus.publish(CrossWidgetFilter::equals(b, region(), "North"));

    assert!(bus.remove(a, &region()));
    assert!(!bus.remove(a, &region()));
    assert_eq!(bus.active().len(), 2);

    assert!(bus.clear_source(a));
    assert_eq!(bus.active().len(), 1);
    assert!(!bus.clear_source(a));

    bus.clear();
    assert!(bus.is_empty());
}

#[test]
fn test_to_filter_spec() {
    let filter = CrossWidgetFilter::equals(WidgetId::new(), region(), "East");
    assert_eq!(filter.operator, FilterOperator::Equals);
    assert_eq!(filter.to_filter_spec(), FilterSpec::equals(region(), "East"));
}

#[test]
fn test_filter_serializes_with_source_id() {
    let source = WidgetId::new();
    let filter = CrossWidgetFilter::equals(source, region(), "East");
    let value = serde_json::to_value(&filter).unwrap();
    assert_eq!(value["source_widget_id"], json!(source.to_string()));
    assert_eq!(value["value"], json!("East"));

    let back: CrossWidgetFilter = serde_json::from_value(value).unwrap();
    assert_eq!(back, filter);
}
