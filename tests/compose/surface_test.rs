// tests/compose/surface_test.rs
use serde_json::json;
use tessera::catalog::{SchemaCatalog, SchemaField};
use tessera::compose::*;
use tessera::query::*;

fn catalog() -> SchemaCatalog {
    SchemaCatalog::new(
        "sales",
        vec![
            SchemaField::new("Orders", "customer_id", "INTEGER"),
            SchemaField::new("Orders", "amount", "FLOAT"),
            SchemaField::new("Orders", "order_date", "DATE"),
            SchemaField::new("Customers", "id", "INTEGER"),
            SchemaField::new("Customers", "region", "VARCHAR"),
        ],
    )
    .unwrap()
}

fn field(catalog: &SchemaCatalog, qualified: &str) -> SchemaField {
    catalog.find(qualified).unwrap().clone()
}

fn resync(surface: &CompositionSurface) -> QueryDefinition {
    surface.resync(Some("sales"), Pagination::default())
}

#[test]
fn test_resync_reads_every_slot() {
    let catalog = catalog();
    let mut surface = CompositionSurface::new();
    surface
        .drop_field(Slot::Groups, &field(&catalog, "Customers.region"))
        .unwrap();
    let amount = surface
        .drop_field(Slot::Columns, &field(&catalog, "Orders.amount"))
        .unwrap();
    surface
        .edit(amount, PillEdit::Aggregation(Aggregation::Sum))
        .unwrap();
    let filter = surface
        .drop_field(Slot::Filters, &field(&catalog, "Orders.amount"))
        .unwrap();
    surface
        .edit(filter, PillEdit::Operator(FilterOperator::GreaterThan))
        .unwrap();
    surface.edit(filter, PillEdit::Value(json!(20))).unwrap();
    let sort = surface
        .drop_field(Slot::Sorts, &field(&catalog, "Customers.region"))
        .unwrap();
    surface
        .edit(sort, PillEdit::Direction(SortDirection::Desc))
        .unwrap();

    let def = resync(&surface);
    assert_eq!(def.connection_id.as_deref(), Some("sales"));
    assert_eq!(def.groups, vec![GroupSpec::new(FieldRef::new("Customers", "region"))]);
    assert_eq!(
        def.columns,
        vec![ColumnSpec::aggregated(FieldRef::new("Orders", "amount"), Aggregation::Sum)]
    );
    assert_eq!(
        def.filters,
        vec![FilterSpec::new(
            FieldRef::new("Orders", "amount"),
            FilterOperator::GreaterThan,
            20
        )]
    );
    assert_eq!(def.sorts[0].direction, SortDirection::Desc);
}

#[test]
fn test_resync_is_a_fresh_snapshot() {
    let catalog = catalog();
    let mut surface = CompositionSurface::new();
    let id = surface
        .drop_field(Slot::Columns, &field(&catalog, "Orders.amount"))
        .unwrap();
    let before = resync(&surface);

    surface.remove(id).unwrap();
    let after = resync(&surface);

    assert_eq!(before.columns.len(), 1);
    assert!(after.columns.is_empty());
    assert!(after.is_empty_selection());
}

#[test]
fn test_aggregation_restricted_for_text_fields() {
    let catalog = catalog();
    let mut surface = CompositionSurface::new();
    let id = surface
        .drop_field(Slot::Columns, &field(&catalog, "Customers.region"))
        .unwrap();

    let err = surface
        .edit(id, PillEdit::Aggregation(Aggregation::Sum))
        .unwrap_err();
    assert!(matches!(err, CompositionError::AggregationNotAllowed { .. }));
    surface
        .edit(id, PillEdit::Aggregation(Aggregation::Count))
        .unwrap();
    assert_eq!(resync(&surface).columns[0].header(), "COUNT(Customers.region)");
}

#[test]
fn test_granularity_only_on_dates() {
    let catalog = catalog();
    let mut surface = CompositionSurface::new();
    let date = surface
        .drop_field(Slot::Groups, &field(&catalog, "Orders.order_date"))
        .unwrap();
    let region = surface
        .drop_field(Slot::Groups, &field(&catalog, "Customers.region"))
        .unwrap();

    surface
        .edit(date, PillEdit::Granularity(Granularity::Quarter))
        .unwrap();
    assert!(matches!(
        surface.edit(region, PillEdit::Granularity(Granularity::Month)),
        Err(CompositionError::GranularityNotAllowed { .. })
    ));
    assert_eq!(resync(&surface).headers()[0], "Orders.order_date (quarter)");
}

#[test]
fn test_blank_label_clears_label() {
    let catalog = catalog();
    let mut surface = CompositionSurface::new();
    let id = surface
        .drop_field(Slot::Columns, &field(&catalog, "Orders.amount"))
        .unwrap();
    surface
        .edit(id, PillEdit::Label(Some("Revenue".into())))
        .unwrap();
    assert_eq!(resync(&surface).headers(), vec!["Revenue"]);

    surface.edit(id, PillEdit::Label(Some("  ".into()))).unwrap();
    assert_eq!(resync(&surface).headers(), vec!["Orders.amount"]);
}

#[test]
fn test_calculated_field_lifecycle() {
    let catalog = catalog();
    let mut surface = CompositionSurface::new();
    surface
        .drop_field(Slot::Columns, &field(&catalog, "Orders.amount"))
        .unwrap();
    let calc = surface.add_calculated("tax", "[Orders.amount] * 0.2").unwrap();

    assert!(matches!(
        surface.add_calculated("tax", "1"),
        Err(CompositionError::DuplicateCalculatedField(_))
    ));
    assert!(matches!(
        surface.add_calculated("Orders.tax", "1"),
        Err(CompositionError::InvalidCalculatedName(_))
    ));
    assert!(matches!(
        surface.add_calculated("bad", "[Orders.amount] *"),
        Err(CompositionError::InvalidFormula { .. })
    ));

    let placed = surface.drop_calculated(Slot::Columns, "tax").unwrap();
    assert!(matches!(
        surface.remove(calc),
        Err(CompositionError::CalculatedFieldInUse(_))
    ));

    surface.remove(placed).unwrap();
    surface.remove(calc).unwrap();
    assert!(resync(&surface).calculated_fields.is_empty());
}

#[test]
fn test_circular_formula_is_rejected_and_reverted() {
    let mut surface = CompositionSurface::new();
    surface.add_calculated("a", "[b] + 1").unwrap();
    assert!(matches!(
        surface.add_calculated("b", "[a] * 2"),
        Err(CompositionError::CircularFormula(_))
    ));

    let b = surface.add_calculated("b", "2").unwrap();
    assert!(matches!(
        surface.edit(b, PillEdit::Formula("[a] - 1".into())),
        Err(CompositionError::CircularFormula(_))
    ));
    let def = resync(&surface);
    assert_eq!(def.calculated("b").unwrap().formula, "2");
}

#[test]
fn test_unknown_calculated_field_cannot_be_dropped() {
    let mut surface = CompositionSurface::new();
    assert_eq!(
        surface.drop_calculated(Slot::Columns, "margin"),
        Err(CompositionError::UnknownCalculatedField("margin".into()))
    );
}

#[test]
fn test_join_sides_must_be_referenced_fields() {
    let catalog = catalog();
    let mut surface = CompositionSurface::new();
    surface
        .drop_field(Slot::Columns, &field(&catalog, "Orders.amount"))
        .unwrap();
    surface
        .drop_field(Slot::Groups, &field(&catalog, "Customers.region"))
        .unwrap();

    // Both tables are used, but neither key field is.
    assert_eq!(
        surface.add_join(
            Some(FieldRef::new("Orders", "customer_id")),
            JoinType::Inner,
            Some(FieldRef::new("Customers", "id")),
        ),
        Err(CompositionError::JoinFieldNotReferenced(FieldRef::new("Orders", "customer_id")))
    );

    surface
        .drop_field(Slot::Columns, &field(&catalog, "Orders.customer_id"))
        .unwrap();
    surface
        .drop_field(Slot::Columns, &field(&catalog, "Customers.id"))
        .unwrap();
    let join = surface
        .add_join(Some(FieldRef::new("Orders", "customer_id")), JoinType::Inner, None)
        .unwrap();
    assert!(resync(&surface).joins.is_empty());

    assert_eq!(
        surface.edit(join, PillEdit::JoinRight(FieldRef::new("Orders", "order_date"))),
        Err(CompositionError::JoinFieldNotReferenced(FieldRef::new("Orders", "order_date")))
    );
    surface
        .edit(join, PillEdit::JoinRight(FieldRef::new("Customers", "id")))
        .unwrap();
    surface.edit(join, PillEdit::JoinType(JoinType::Left)).unwrap();
    let def = resync(&surface);
    assert_eq!(def.joins.len(), 1);
    assert_eq!(def.joins[0].join_type, JoinType::Left);
}

#[test]
fn test_suggested_join_may_use_key_fields() {
    let catalog = catalog();
    let mut surface = CompositionSurface::new();
    surface
        .drop_field(Slot::Columns, &field(&catalog, "Orders.amount"))
        .unwrap();
    surface
        .drop_field(Slot::Groups, &field(&catalog, "Customers.region"))
        .unwrap();

    surface.add_suggested_join(Join::inner(
        FieldRef::new("Orders", "customer_id"),
        FieldRef::new("Customers", "id"),
    ));
    let def = resync(&surface);
    assert_eq!(def.joins.len(), 1);
    assert!(def.joins[0].connects("Orders", "Customers"));
}

#[test]
fn test_removing_last_field_of_table_prunes_its_joins() {
    let catalog = catalog();
    let mut surface = CompositionSurface::new();
    surface
        .drop_field(Slot::Columns, &field(&catalog, "Orders.amount"))
        .unwrap();
    let region = surface
        .drop_field(Slot::Groups, &field(&catalog, "Customers.region"))
        .unwrap();
    surface.add_suggested_join(Join::inner(
        FieldRef::new("Orders", "customer_id"),
        FieldRef::new("Customers", "id"),
    ));

    surface.remove(region).unwrap();
    assert!(surface.pills_in(Slot::Joins).next().is_none());
}

#[test]
fn test_replace_filters_and_load_definition() {
    let catalog = catalog();
    let mut def = QueryDefinition::new("sales");
    def.columns.push(ColumnSpec::aggregated(
        FieldRef::new("Orders", "amount"),
        Aggregation::Sum,
    ));
    def.groups.push(GroupSpec {
        field: FieldRef::new("Orders", "order_date"),
        granularity: Granularity::Month,
    });
    def.filters.push(FilterSpec::equals(FieldRef::new("Orders", "amount"), 10));
    def.formats.insert("SUM(Orders.amount)".into(), FormatSpec::Compact);

    let mut surface = CompositionSurface::new();
    surface.load_definition(&def, &catalog);
    assert_eq!(resync(&surface), def);

    let narrowed = vec![FilterSpec::equals(FieldRef::new("Customers", "region"), "East")];
    surface.replace_filters(&narrowed, &catalog);
    assert_eq!(resync(&surface).filters, narrowed);
    assert_eq!(surface.pills_in(Slot::Filters).count(), 1);
}

#[test]
fn test_formats_survive_resync() {
    let mut surface = CompositionSurface::new();
    surface.set_format("SUM(Orders.amount)", Some(FormatSpec::Compact));
    assert_eq!(
        resync(&surface).formats.get("SUM(Orders.amount)"),
        Some(&FormatSpec::Compact)
    );
    surface.set_format("SUM(Orders.amount)", None);
    assert!(resync(&surface).formats.is_empty());
}
