//! Flattening of nested order records into warehouse row-sets.
use indexmap::IndexMap;
use serde_json::Value;
use tracing::warn;

use crate::rows::{Row, RowSet};
use crate::shopify::models::Order;

pub const ORDER_COLUMNS: [&str; 8] = [
    "order_id",
    "created_at",
    "total_price",
    "currency",
    "country",
    "city",
    "zip",
    "street",
];

pub const LINE_ITEM_COLUMNS: [&str; 8] = [
    "line_item_id",
    "order_id",
    "product_id",
    "variant_id",
    "title",
    "quantity",
    "price",
    "sku",
];

pub const CUSTOMER_COLUMNS: [&str; 6] = [
    "customer_id",
    "first_name",
    "last_name",
    "email",
    "phone",
    "created_at",
];

/// The three row-sets derived from one fetch.
#[derive(Debug, Clone)]
pub struct Flattened {
    pub orders: RowSet,
    pub line_items: RowSet,
    pub customers: RowSet,
}

/// Decode raw API records, skipping (and logging) any that don't look like orders.
pub fn decode_orders(raw: Vec<Value>) -> Vec<Order> {
    raw.into_iter()
        .enumerate()
        .filter_map(|(idx, v)| match serde_json::from_value::<Order>(v) {
            Ok(o) => Some(o),
            Err(e) => {
                warn!(index = idx, error = %e, "skipping undecodable order record");
                None
            }
        })
        .collect()
}

pub fn flatten(orders: &[Order]) -> Flattened {
    Flattened {
        orders: order_rows(orders),
        line_items: line_item_rows(orders),
        customers: customer_rows(orders),
    }
}

fn row<const N: usize>(cells: [(&str, Value); N]) -> Row {
    cells
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect::<IndexMap<_, _>>()
}

pub fn order_rows(orders: &[Order]) -> RowSet {
    let mut set = RowSet::new(ORDER_COLUMNS);
    for o in orders {
        let addr = o.shipping_address.clone().unwrap_or_default();
        set.push(row([
            ("order_id", o.id.clone()),
            ("created_at", o.created_at.clone()),
            ("total_price", o.total_price.clone()),
            ("currency", o.currency.clone()),
            ("country", addr.country),
            ("city", addr.city),
            ("zip", addr.zip),
            ("street", addr.address1),
        ]));
    }
    set
}

pub fn line_item_rows(orders: &[Order]) -> RowSet {
    let mut set = RowSet::new(LINE_ITEM_COLUMNS);
    for o in orders {
        for item in &o.line_items {
            set.push(row([
                ("line_item_id", item.id.clone()),
                ("order_id", o.id.clone()),
                ("product_id", item.product_id.clone()),
                ("variant_id", item.variant_id.clone()),
                ("title", item.title.clone()),
                ("quantity", item.quantity.clone()),
                ("price", item.price.clone()),
                ("sku", item.sku.clone()),
            ]));
        }
    }
    set
}

/// One row per distinct customer id; the first order a customer appears on wins.
pub fn customer_rows(orders: &[Order]) -> RowSet {
    let mut set = RowSet::new(CUSTOMER_COLUMNS);
    for c in orders.iter().filter_map(|o| o.customer.as_ref()) {
        set.push(row([
            ("customer_id", c.id.clone()),
            ("first_name", c.first_name.clone()),
            ("last_name", c.last_name.clone()),
            ("email", c.email.clone()),
            ("phone", c.phone.clone()),
            ("created_at", c.created_at.clone()),
        ]));
    }
    set.dedup_by("customer_id");
    set
}
