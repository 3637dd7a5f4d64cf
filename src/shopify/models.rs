use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The subset of a REST `Order` the warehouse tables use.
///
/// Scalars stay as raw JSON so ids, prices and timestamps reach the store
/// with the type Shopify sent (prices are strings, ids are integers).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Value,
    #[serde(default)]
    pub created_at: Value,
    #[serde(default)]
    pub total_price: Value,
    #[serde(default)]
    pub currency: Value,
    #[serde(default)]
    pub shipping_address: Option<Address>,
    #[serde(default)]
    pub line_items: Vec<LineItem>,
    #[serde(default)]
    pub customer: Option<Customer>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Address {
    #[serde(default)]
    pub country: Value,
    #[serde(default)]
    pub city: Value,
    #[serde(default)]
    pub zip: Value,
    #[serde(default)]
    pub address1: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineItem {
    #[serde(default)]
    pub id: Value,
    #[serde(default)]
    pub product_id: Value,
    #[serde(default)]
    pub variant_id: Value,
    #[serde(default)]
    pub title: Value,
    #[serde(default)]
    pub quantity: Value,
    #[serde(default)]
    pub price: Value,
    #[serde(default)]
    pub sku: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    #[serde(default)]
    pub id: Value,
    #[serde(default)]
    pub first_name: Value,
    #[serde(default)]
    pub last_name: Value,
    #[serde(default)]
    pub email: Value,
    #[serde(default)]
    pub phone: Value,
    #[serde(default)]
    pub created_at: Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deserializes_sparse_order() {
        let order: Order = serde_json::from_value(json!({
            "id": 450789469,
            "created_at": "2008-01-10T11:00:00-05:00",
            "total_price": "598.94",
            "currency": "USD",
            "shipping_address": null,
            "customer": null
        }))
        .unwrap();

        assert_eq!(order.id, json!(450789469));
        assert!(order.shipping_address.is_none());
        assert!(order.line_items.is_empty());
        assert!(order.customer.is_none());
    }

    #[test]
    fn address_fields_default_to_null() {
        let addr: Address = serde_json::from_value(json!({"country": "Portugal"})).unwrap();
        assert_eq!(addr.country, json!("Portugal"));
        assert_eq!(addr.zip, Value::Null);
    }
}
