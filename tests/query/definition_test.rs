// tests/query/definition_test.rs
use serde_json::json;
use tessera::catalog::{SchemaCatalog, SchemaField};
use tessera::query::*;

fn sales_catalog() -> SchemaCatalog {
    SchemaCatalog::new(
        "sales",
        vec![
            SchemaField::new("Orders", "id", "INTEGER"),
            SchemaField::new("Orders", "customer_id", "INTEGER"),
            SchemaField::new("Orders", "amount", "FLOAT"),
            SchemaField::new("Orders", "order_date", "DATE"),
            SchemaField::new("Customers", "id", "INTEGER"),
            SchemaField::new("Customers", "region", "VARCHAR"),
        ],
    )
    .unwrap()
}

fn revenue_by_region() -> QueryDefinition {
    let mut def = QueryDefinition::new("sales");
    def.groups.push(GroupSpec::new(FieldRef::new("Customers", "region")));
    def.columns.push(ColumnSpec::aggregated(
        FieldRef::new("Orders", "amount"),
        Aggregation::Sum,
    ));
    def
}

#[test]
fn test_referenced_tables_in_first_appearance_order() {
    let mut def = revenue_by_region();
    def.filters.push(FilterSpec::equals(FieldRef::new("Orders", "id"), 1));
    assert_eq!(def.referenced_tables(), vec!["Orders", "Customers"]);
}

#[test]
fn test_referenced_tables_follow_calculated_fields() {
    let mut def = QueryDefinition::new("sales");
    def.calculated_fields
        .push(CalculatedField::new("tax", "[Orders.amount] * 0.2"));
    def.columns.push(ColumnSpec::new(FieldRef::calculated("tax")));
    def.groups.push(GroupSpec::new(FieldRef::new("Customers", "region")));

    assert_eq!(def.referenced_tables(), vec!["Orders", "Customers"]);
    assert!(!def
        .referenced_tables()
        .contains(&CALCULATED_TABLE.to_string()));
}

#[test]
fn test_referenced_fields_skip_joins() {
    let mut def = revenue_by_region();
    def.joins.push(Join::inner(
        FieldRef::new("Orders", "customer_id"),
        FieldRef::new("Customers", "id"),
    ));
    assert_eq!(
        def.referenced_fields(),
        vec![
            FieldRef::new("Orders", "amount"),
            FieldRef::new("Customers", "region"),
        ]
    );
}

#[test]
fn test_headers_put_groups_first() {
    let mut def = revenue_by_region();
    def.columns[0].label = Some("Revenue".into());
    assert_eq!(def.headers(), vec!["Customers.region", "Revenue"]);
}

#[test]
fn test_extra_filters_leave_original_untouched() {
    let def = revenue_by_region();
    let composed = def
        .with_extra_filters(&[FilterSpec::equals(
            FieldRef::new("Customers", "region"),
            "East",
        )])
        .with_page(3);

    assert!(def.filters.is_empty());
    assert_eq!(def.pagination.page, 1);
    assert_eq!(composed.filters.len(), 1);
    assert_eq!(composed.pagination.page, 3);
    assert_eq!(composed.with_page(0).pagination.page, 1);
}

#[test]
fn test_default_pagination() {
    assert_eq!(Pagination::default(), Pagination::new(1, 25));
    assert_eq!(Pagination::unpaged().page_size, 0);
}

#[test]
fn test_valid_definition_has_no_issues() {
    let def = revenue_by_region();
    assert!(def.validate_against(&sales_catalog()).is_empty());
}

#[test]
fn test_unknown_field_is_reported_once() {
    let mut def = revenue_by_region();
    def.columns.push(ColumnSpec::new(FieldRef::new("Orders", "discount")));
    def.sorts.push(SortSpec {
        field: FieldRef::new("Orders", "discount"),
        direction: SortDirection::Desc,
    });

    let issues = def.validate_against(&sales_catalog());
    assert_eq!(
        issues,
        vec![ValidationIssue::UnknownField(FieldRef::new("Orders", "discount"))]
    );
    assert_eq!(issues[0].to_string(), "Unknown field: Orders.discount");
}

#[test]
fn test_aggregation_on_text_field_is_rejected() {
    let mut def = QueryDefinition::new("sales");
    def.columns.push(ColumnSpec::aggregated(
        FieldRef::new("Customers", "region"),
        Aggregation::Avg,
    ));
    let issues = def.validate_against(&sales_catalog());
    assert!(matches!(
        &issues[..],
        [ValidationIssue::AggregationNotAllowed { aggregation, .. }] if aggregation == "AVG"
    ));
}

#[test]
fn test_join_on_unreferenced_table() {
    let mut def = QueryDefinition::new("sales");
    def.columns.push(ColumnSpec::new(FieldRef::new("Orders", "amount")));
    def.joins.push(Join::inner(
        FieldRef::new("Orders", "customer_id"),
        FieldRef::new("Customers", "id"),
    ));
    assert_eq!(
        def.validate_against(&sales_catalog()),
        vec![ValidationIssue::JoinTableNotReferenced("Customers".into())]
    );
}

#[test]
fn test_calculated_field_issues() {
    let mut def = QueryDefinition::new("sales");
    def.calculated_fields.push(CalculatedField::new("a", "[b] + 1"));
    def.calculated_fields.push(CalculatedField::new("b", "[a] * 2"));
    def.calculated_fields.push(CalculatedField::new("b", "[Orders.amount]"));
    def.columns.push(ColumnSpec::new(FieldRef::calculated("a")));

    let issues = def.validate_against(&sales_catalog());
    assert!(issues.contains(&ValidationIssue::CircularFormula("a".into())));
    assert!(issues.contains(&ValidationIssue::DuplicateCalculatedField("b".into())));
}

#[test]
fn test_granularity_restricted_to_temporal_fields() {
    let catalog = sales_catalog();
    let date = catalog.find("Orders.order_date").unwrap();
    let region = catalog.find("Customers.region").unwrap();
    assert!(Granularity::Quarter.is_allowed_for(date.field_type));
    assert!(!Granularity::Quarter.is_allowed_for(region.field_type));
    assert_eq!(Granularity::allowed_for(region.field_type), &[Granularity::Exact]);
}

#[test]
fn test_granularity_bucket_values() {
    assert_eq!(Granularity::Quarter.bucket("2024-05-11"), Some("2024-Q2".into()));
    assert_eq!(Granularity::Month.bucket_value(&json!("2024-05-11")), json!("2024-05"));
    assert_eq!(Granularity::Year.bucket_value(&json!(42)), json!(42));
    assert_eq!(Granularity::Year.bucket_value(&json!("n/a")), json!(null));
}

#[test]
fn test_definition_json_round_trip() {
    let mut def = revenue_by_region();
    def.formats.insert(
        "SUM(Orders.amount)".into(),
        FormatSpec::Currency {
            symbol: "$".into(),
            decimals: 2,
        },
    );
    let json = serde_json::to_string(&def).unwrap();
    let back: QueryDefinition = serde_json::from_str(&json).unwrap();
    assert_eq!(back, def);

    let sparse: QueryDefinition =
        serde_json::from_str(r#"{"connection_id": "sales", "columns": [{"field": {"table": "Orders", "name": "amount"}}]}"#)
            .unwrap();
    assert_eq!(sparse.columns[0].aggregation, Aggregation::None);
    assert_eq!(sparse.pagination, Pagination::default());
}

#[test]
fn test_formats_apply_at_read_time() {
    assert_eq!(FormatSpec::Number { decimals: 1 }.apply(&json!(12345.67)), "12,345.7");
    assert_eq!(FormatSpec::Compact.apply(&json!(1500)), "1.5K");
    assert_eq!(FormatSpec::Percent { decimals: 0 }.apply(&json!(0.5)), "50%");
    assert_eq!(plain(&json!(275.0)), "275.0");
    assert_eq!(compact(2_000_000.0), "2M");
}
