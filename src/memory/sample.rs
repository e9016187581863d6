//! Sample sales dataset.

use serde_json::json;

use super::{MemoryBackend, MemoryTable};
use crate::query::FieldRef;

pub const SALES_CONNECTION: &str = "sales";

/// Customers and their orders, related by `Orders.customer_id = Customers.id`.
///
/// Order totals by region are East 175.5, West 275.0 and North 10.0.
pub fn sales_backend() -> MemoryBackend {
    let customers = MemoryTable::new("Customers")
        .column("id", "INTEGER")
        .column("region", "VARCHAR")
        .column("name", "VARCHAR")
        .row(vec![json!(1), json!("East"), json!("Acme")])
        .row(vec![json!(2), json!("West"), json!("Globex")])
        .row(vec![json!(3), json!("East"), json!("Initech")])
        .row(vec![json!(4), json!("North"), json!("Umbrella")]);

    let orders = MemoryTable::new("Orders")
        .column("id", "INTEGER")
        .column("customer_id", "INTEGER")
        .column("amount", "FLOAT")
        .column("order_date", "DATE")
        .row(vec![json!(1), json!(1), json!(100.0), json!("2024-01-15")])
        .row(vec![json!(2), json!(1), json!(50.5), json!("2024-02-03")])
        .row(vec![json!(3), json!(2), json!(200.0), json!("2024-02-20")])
        .row(vec![json!(4), json!(3), json!(25.0), json!("2024-04-02")])
        .row(vec![json!(5), json!(2), json!(75.0), json!("2024-05-11")])
        .row(vec![json!(6), json!(4), json!(10.0), json!("2024-07-30")]);

    MemoryBackend::new(SALES_CONNECTION)
        .with_table(customers)
        .with_table(orders)
        .with_relationship(
            FieldRef::new("Orders", "customer_id"),
            FieldRef::new("Customers", "id"),
        )
}
