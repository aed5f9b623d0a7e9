use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Internal order state machine. Strictly forward-moving except for
/// `Cancelled`, which is reachable from any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Processing => "processing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    fn rank(&self) -> u8 {
        match self {
            OrderStatus::Pending => 0,
            OrderStatus::Confirmed => 1,
            OrderStatus::Processing => 2,
            OrderStatus::Shipped => 3,
            OrderStatus::Delivered => 4,
            // Terminal, never ranked against forward progress.
            OrderStatus::Cancelled => 5,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }

    /// Whether moving from `self` to `next` is a legal transition. Stale or
    /// replayed courier events that would move the order backwards are not.
    pub fn can_advance_to(&self, next: OrderStatus) -> bool {
        if next == OrderStatus::Cancelled {
            return !self.is_terminal();
        }
        !self.is_terminal() && next.rank() > self.rank()
    }
}

/// Persisted order of record. Money fields are integer paise and must satisfy
/// total_amount = subtotal - discount_amount + delivery_charge
///                - discount_on_delivery + tax_amount (clamped at zero).
///
/// `order_number` is the human-readable correlation key shared with the
/// courier platform; the numeric `id` never leaves this system.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Order {
    pub id: i64,
    pub order_number: String,
    pub user_id: Option<i64>,
    pub customer_email: String,
    pub status: OrderStatus,
    pub subtotal: i64,
    pub discount_amount: i64,
    pub discount_on_delivery: i64,
    pub delivery_charge: i64,
    pub tax_amount: i64,
    pub total_amount: i64,
    pub coupon_code: Option<String>,
    pub payment_method: String,
    pub payment_status: String,
    pub razorpay_order_id: Option<String>,
    pub razorpay_payment_id: Option<String>,
    pub awb_code: Option<String>,
    pub courier_name: Option<String>,
    pub tracking_url: Option<String>,
    pub shipping_address: String,
    pub placed_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Checkout draft, persisted once totals are assembled.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub order_number: String,
    pub user_id: Option<i64>,
    pub customer_email: String,
    pub status: OrderStatus,
    pub subtotal: i64,
    pub discount_amount: i64,
    pub discount_on_delivery: i64,
    pub delivery_charge: i64,
    pub tax_amount: i64,
    pub total_amount: i64,
    pub coupon_code: Option<String>,
    pub payment_method: String,
    pub payment_status: String,
    pub razorpay_order_id: Option<String>,
    pub shipping_address: String,
}

#[derive(Debug, Clone)]
pub struct NewOrderItem {
    pub product_name: String,
    pub sku: Option<String>,
    pub quantity: i64,
    pub unit_price: i64,
}

impl NewOrderItem {
    pub fn line_total(&self) -> i64 {
        self.unit_price * self.quantity
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct OrderItem {
    pub id: i64,
    pub order_id: i64,
    pub product_name: String,
    pub sku: Option<String>,
    pub quantity: i64,
    pub unit_price: i64,
    pub line_total: i64,
}

/// One row per inbound courier callback. Append-only; never deduplicated.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ShipmentEvent {
    pub id: i64,
    pub order_id: i64,
    pub status_text: String,
    pub status_code: Option<String>,
    pub location: Option<String>,
    pub remarks: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_transitions_allowed() {
        assert!(OrderStatus::Pending.can_advance_to(OrderStatus::Confirmed));
        assert!(OrderStatus::Confirmed.can_advance_to(OrderStatus::Processing));
        assert!(OrderStatus::Processing.can_advance_to(OrderStatus::Shipped));
        assert!(OrderStatus::Shipped.can_advance_to(OrderStatus::Delivered));
        // skipping intermediate states is fine, the courier decides the pace
        assert!(OrderStatus::Confirmed.can_advance_to(OrderStatus::Delivered));
    }

    #[test]
    fn backward_transitions_rejected() {
        assert!(!OrderStatus::Delivered.can_advance_to(OrderStatus::Processing));
        assert!(!OrderStatus::Shipped.can_advance_to(OrderStatus::Processing));
        assert!(!OrderStatus::Shipped.can_advance_to(OrderStatus::Shipped));
    }

    #[test]
    fn cancel_only_from_non_terminal() {
        assert!(OrderStatus::Pending.can_advance_to(OrderStatus::Cancelled));
        assert!(OrderStatus::Shipped.can_advance_to(OrderStatus::Cancelled));
        assert!(!OrderStatus::Delivered.can_advance_to(OrderStatus::Cancelled));
        assert!(!OrderStatus::Cancelled.can_advance_to(OrderStatus::Cancelled));
        assert!(!OrderStatus::Cancelled.can_advance_to(OrderStatus::Shipped));
    }
}
