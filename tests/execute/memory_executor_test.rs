// tests/execute/memory_executor_test.rs
use serde_json::{json, Value};
use tessera::execute::{ExecutionError, QueryExecutor, QueryResult};
use tessera::interactive::DistinctValueService;
use tessera::memory::{sales_backend, MemoryBackend, MemoryTable, SALES_CONNECTION};
use tessera::query::*;

fn def() -> QueryDefinition {
    let mut def = QueryDefinition::new(SALES_CONNECTION);
    def.pagination = Pagination::unpaged();
    def
}

fn amount() -> FieldRef {
    FieldRef::new("Orders", "amount")
}

fn region() -> FieldRef {
    FieldRef::new("Customers", "region")
}

async fn run(def: &QueryDefinition) -> QueryResult {
    sales_backend().execute(def).await.unwrap()
}

#[tokio::test]
async fn test_sum_by_region_in_first_appearance_order() {
    let mut def = def();
    def.groups.push(GroupSpec::new(region()));
    def.columns.push(ColumnSpec::aggregated(amount(), Aggregation::Sum));

    let result = run(&def).await;
    assert_eq!(result.headers, vec!["Customers.region", "SUM(Orders.amount)"]);
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
async fn test_other_aggregations() {
    let mut def = def();
    def.groups.push(GroupSpec::new(region()));
    for agg in [Aggregation::Count, Aggregation::Avg, Aggregation::Min, Aggregation::Max] {
        def.columns.push(ColumnSpec::aggregated(amount(), agg));
    }

    let result = run(&def).await;
    assert_eq!(
        result.headers[1..],
        [
            "COUNT(Orders.amount)",
            "AVG(Orders.amount)",
            "MIN(Orders.amount)",
            "MAX(Orders.amount)",
        ]
    );
    assert_eq!(
        result.rows[1],
        vec![json!("West"), json!(2), json!(137.5), json!(75.0), json!(200.0)]
    );
}

#[tokio::test]
async fn test_group_by_month() {
    let mut def = def();
    def.groups.push(GroupSpec {
        field: FieldRef::new("Orders", "order_date"),
        granularity: Granularity::Month,
    });
    def.columns.push(ColumnSpec::aggregated(amount(), Aggregation::Sum));

    let result = run(&def).await;
    assert_eq!(result.headers[0], "Orders.order_date (month)");
    let months: Vec<&Value> = result.column("Orders.order_date (month)").unwrap();
    assert_eq!(
        months,
        vec![
            &json!("2024-01"),
            &json!("2024-02"),
            &json!("2024-04"),
            &json!("2024-05"),
            &json!("2024-07"),
        ]
    );
    assert_eq!(result.rows[1][1], json!(250.5));
}

#[tokio::test]
async fn test_filter_at_granularity() {
    let mut def = def();
    def.columns.push(ColumnSpec::aggregated(FieldRef::new("Orders", "id"), Aggregation::Count));
    def.filters.push(FilterSpec {
        field: FieldRef::new("Orders", "order_date"),
        operator: FilterOperator::Equals,
        value: json!("2024-Q1"),
        granularity: Granularity::Quarter,
    });
    assert_eq!(run(&def).await.rows, vec![vec![json!(3)]]);
}

#[tokio::test]
async fn test_detail_rows_filtered_and_sorted() {
    let mut def = def();
    def.columns.push(ColumnSpec::new(FieldRef::new("Customers", "name")));
    def.columns.push(ColumnSpec::new(amount()));
    def.filters.push(FilterSpec::equals(region(), "East"));
    def.sorts.push(SortSpec {
        field: amount(),
        direction: SortDirection::Desc,
    });

    let result = run(&def).await;
    assert_eq!(
        result.rows,
        vec![
            vec![json!("Acme"), json!(100.0)],
            vec![json!("Acme"), json!(50.5)],
            vec![json!("Initech"), json!(25.0)],
        ]
    );
}

#[tokio::test]
async fn test_comparison_filters() {
    let mut def = def();
    def.columns.push(ColumnSpec::new(FieldRef::new("Customers", "name")));
    def.filters.push(FilterSpec::new(
        FieldRef::new("Customers", "name"),
        FilterOperator::Contains,
        "AC",
    ));
    assert_eq!(run(&def).await.rows, vec![vec![json!("Acme")]]);

    let mut def = self::def();
    def.columns.push(ColumnSpec::new(FieldRef::new("Orders", "id")));
    def.filters.push(FilterSpec::new(amount(), FilterOperator::GreaterOrEqual, 75));
    def.filters.push(FilterSpec::new(amount(), FilterOperator::NotEquals, 200));
    assert_eq!(run(&def).await.rows, vec![vec![json!(1)], vec![json!(5)]]);

    let mut def = self::def();
    def.columns.push(ColumnSpec::new(FieldRef::new("Orders", "id")));
    def.filters.push(FilterSpec::new(amount(), FilterOperator::IsNull, Value::Null));
    assert!(run(&def).await.rows.is_empty());
}

#[tokio::test]
async fn test_sort_aggregated_output() {
    let mut def = def();
    def.groups.push(GroupSpec::new(region()));
    def.columns.push(ColumnSpec::aggregated(amount(), Aggregation::Sum));
    def.sorts.push(SortSpec {
        field: amount(),
        direction: SortDirection::Desc,
    });

    let result = run(&def).await;
    let regions: Vec<&Value> = result.column("Customers.region").unwrap();
    assert_eq!(regions, vec![&json!("West"), &json!("East"), &json!("North")]);
}

#[tokio::test]
async fn test_calculated_field_column() {
    let mut def = def();
    def.calculated_fields
        .push(CalculatedField::new("doubled", "[Orders.amount] * 2"));
    def.groups.push(GroupSpec::new(region()));
    def.columns.push(ColumnSpec::aggregated(
        FieldRef::calculated("doubled"),
        Aggregation::Sum,
    ));

    let result = run(&def).await;
    assert_eq!(result.headers[1], "SUM(doubled)");
    assert_eq!(result.rows[0], vec![json!("East"), json!(351.0)]);
}

#[tokio::test]
async fn test_paging() {
    let mut def = def();
    def.columns.push(ColumnSpec::new(FieldRef::new("Orders", "id")));
    def.sorts.push(SortSpec {
        field: FieldRef::new("Orders", "id"),
        direction: SortDirection::Asc,
    });
    def.pagination = Pagination::new(2, 4);

    let result = run(&def).await;
    assert_eq!(result.rows, vec![vec![json!(5)], vec![json!(6)]]);
    assert_eq!(result.total_rows, 6);
    assert_eq!(result.pagination.total_pages, 2);
    assert_eq!(result.pagination.current_page, 2);
}

#[tokio::test]
async fn test_ungrouped_aggregate_over_no_rows() {
    let mut def = def();
    def.columns.push(ColumnSpec::aggregated(amount(), Aggregation::Sum));
    def.columns.push(ColumnSpec::aggregated(FieldRef::new("Orders", "id"), Aggregation::Count));
    def.filters.push(FilterSpec::new(amount(), FilterOperator::GreaterThan, 1000));

    let result = run(&def).await;
    assert_eq!(result.rows, vec![vec![Value::Null, json!(0)]]);
    assert_eq!(result.total_rows, 1);
}

#[tokio::test]
async fn test_left_join_keeps_unmatched_rows() {
    let backend = MemoryBackend::new("crm")
        .with_table(
            MemoryTable::new("Customers")
                .column("id", "INTEGER")
                .column("region", "VARCHAR")
                .row(vec![json!(1), json!("East")])
                .row(vec![json!(2), json!("South")]),
        )
        .with_table(
            MemoryTable::new("Orders")
                .column("id", "INTEGER")
                .column("customer_id", "INTEGER")
                .row(vec![json!(10), json!(1)]),
        );

    let mut def = QueryDefinition::new("crm");
    def.columns.push(ColumnSpec::new(region()));
    def.columns.push(ColumnSpec::new(FieldRef::new("Orders", "id")));
    def.joins.push(Join {
        left: FieldRef::new("Customers", "id"),
        join_type: JoinType::Left,
        right: FieldRef::new("Orders", "customer_id"),
    });

    let result = backend.execute(&def).await.unwrap();
    assert_eq!(
        result.rows,
        vec![vec![json!("East"), json!(10)], vec![json!("South"), Value::Null]]
    );
}

#[tokio::test]
async fn test_unconnected_tables_are_rejected() {
    let backend = MemoryBackend::new("sales")
        .with_table(MemoryTable::new("Orders").column("amount", "FLOAT"))
        .with_table(MemoryTable::new("Vendors").column("name", "VARCHAR"));

    let mut def = def();
    def.columns.push(ColumnSpec::new(amount()));
    def.columns.push(ColumnSpec::new(FieldRef::new("Vendors", "name")));

    let err = backend.execute(&def).await.unwrap_err();
    assert_eq!(
        err,
        ExecutionError::Rejected("No join path connects tables: Vendors".into())
    );
}

#[tokio::test]
async fn test_unknown_connection_is_rejected() {
    let mut def = QueryDefinition::new("hr");
    def.columns.push(ColumnSpec::new(amount()));
    let err = sales_backend().execute(&def).await.unwrap_err();
    assert_eq!(err, ExecutionError::Rejected("Unknown connection: hr".into()));
}

#[tokio::test]
async fn test_distinct_values_sorted_without_nulls() {
    let values = sales_backend()
        .distinct_values(SALES_CONNECTION, &region())
        .await
        .unwrap();
    assert_eq!(values, vec![json!("East"), json!("North"), json!("West")]);
}
