use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::{Measurement, StyleConfig};

/// Order lifecycle. PENDING -> PAID is the only transition, and only the
/// payment webhook performs it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Paid,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
        }
    }
}

impl FromStr for OrderStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "paid" => Ok(Self::Paid),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShippingDetails {
    pub name: String,
    pub address: String,
    pub city: String,
    pub phone: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Order {
    pub id: String,
    pub user_id: String,
    pub shipping_details: ShippingDetails,
    /// Minor units, recomputed server-side from the items.
    pub total: i64,
    pub status: OrderStatus,
    /// Reconciliation key for the payment webhook.
    pub stripe_session_id: String,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderItem {
    pub id: String,
    pub order_id: String,
    pub measurement_id: String,
    pub config: StyleConfig,
    pub quantity: i64,
    pub unit_amount: i64,
}

/// Order item joined with the measurement it tailors for.
#[derive(Debug, Clone, Serialize)]
pub struct OrderItemDetail {
    #[serde(flatten)]
    pub item: OrderItem,
    pub measurement: Measurement,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderWithItems {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItemDetail>,
}

/// One line of a checkout request. Deliberately carries no price field:
/// the server's unit price is the only amount that counts.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutItem {
    pub measurement_id: String,
    pub config: StyleConfig,
    pub quantity: i64,
    #[serde(default)]
    pub image_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub items: Vec<CheckoutItem>,
    pub shipping_details: ShippingDetails,
}

#[derive(Debug)]
pub struct NewOrder {
    pub shipping_details: ShippingDetails,
    pub total: i64,
    pub stripe_session_id: String,
    pub items: Vec<NewOrderItem>,
}

#[derive(Debug)]
pub struct NewOrderItem {
    pub measurement_id: String,
    pub config: StyleConfig,
    pub quantity: i64,
    pub unit_amount: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrip() {
        assert_eq!("pending".parse::<OrderStatus>(), Ok(OrderStatus::Pending));
        assert_eq!("paid".parse::<OrderStatus>(), Ok(OrderStatus::Paid));
        assert!("PAID".parse::<OrderStatus>().is_err());
        assert_eq!(OrderStatus::Paid.as_str(), "paid");
    }

    #[test]
    fn test_checkout_item_ignores_injected_price() {
        let json = r#"{
            "measurement_id": "at_msr_0",
            "config": {"fabric": "f", "pattern": "p", "style": "s", "closure": "c", "pocket": true},
            "quantity": 2,
            "unit_amount": 1,
            "price": 1
        }"#;
        let item: CheckoutItem = serde_json::from_str(json).unwrap();
        assert_eq!(item.quantity, 2);
        // No price field exists to deserialize into.
    }
}
