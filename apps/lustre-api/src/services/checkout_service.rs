use anyhow::anyhow;
use lustre_db::models::coupon::Coupon;
use lustre_db::models::order::{NewOrder, NewOrderItem, Order, OrderStatus};
use lustre_db::repositories::order_repo::OrderRepository;
use rand::Rng;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::services::coupon_service::{ApplyError, CouponService};
use crate::services::pricing::{assemble_totals, CouponError, DiscountResult, OrderTotals};
use crate::services::razorpay::PaymentGateway;
use crate::services::shipping_service::ShippingService;
use crate::settings::SettingsService;

/// GST default in basis points, overridable via the `tax_rate_bps` setting.
const DEFAULT_TAX_RATE_BPS: i64 = 1_800;

#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("Cart is empty")]
    EmptyCart,
    #[error("Invalid cart item: {0}")]
    InvalidItem(String),
    #[error("Delivery is not available to pincode {0}")]
    Unserviceable(String),
    #[error("Unsupported payment method: {0}")]
    UnknownPaymentMethod(String),
    #[error(transparent)]
    Coupon(#[from] ApplyError),
    #[error("No order found for this payment")]
    UnknownOrder,
    #[error("Payment signature verification failed")]
    SignatureMismatch,
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Deserialize)]
pub struct CartItem {
    pub product_name: String,
    pub sku: Option<String>,
    pub quantity: i64,
    /// Unit price in paise.
    pub unit_price: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlaceOrderRequest {
    pub items: Vec<CartItem>,
    pub customer_email: String,
    pub user_id: Option<i64>,
    pub shipping_address: serde_json::Value,
    pub delivery_pincode: String,
    pub coupon_code: Option<String>,
    /// "cod" or "razorpay".
    pub payment_method: String,
}

/// What the storefront needs to either show a confirmation (COD) or open
/// the gateway checkout (prepaid).
#[derive(Debug, Serialize)]
pub struct PlacedOrder {
    pub order_number: String,
    pub status: OrderStatus,
    pub totals: OrderTotals,
    pub razorpay_order_id: Option<String>,
    pub razorpay_key_id: Option<String>,
}

pub struct CheckoutService {
    pool: SqlitePool,
    orders: OrderRepository,
    coupons: Arc<CouponService>,
    shipping: Arc<ShippingService>,
    gateway: Arc<dyn PaymentGateway>,
    settings: Arc<SettingsService>,
}

impl CheckoutService {
    pub fn new(
        pool: SqlitePool,
        orders: OrderRepository,
        coupons: Arc<CouponService>,
        shipping: Arc<ShippingService>,
        gateway: Arc<dyn PaymentGateway>,
        settings: Arc<SettingsService>,
    ) -> Self {
        Self {
            pool,
            orders,
            coupons,
            shipping,
            gateway,
            settings,
        }
    }

    /// Price the cart and persist the order. COD orders confirm (and redeem
    /// the coupon) immediately; prepaid orders stay pending until the
    /// gateway payment is verified.
    pub async fn place_order(&self, req: &PlaceOrderRequest) -> Result<PlacedOrder, CheckoutError> {
        if req.items.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }
        for item in &req.items {
            if item.quantity <= 0 || item.unit_price < 0 {
                return Err(CheckoutError::InvalidItem(item.product_name.clone()));
            }
        }

        let subtotal: i64 = req.items.iter().map(|i| i.quantity * i.unit_price).sum();

        let quote = self
            .shipping
            .resolve_delivery_charge(&req.delivery_pincode)
            .await;
        if !quote.available {
            return Err(CheckoutError::Unserviceable(req.delivery_pincode.clone()));
        }
        let delivery_charge = match quote.chosen_rate {
            Some(rate) => rate,
            None => self.shipping.fallback_rate().await,
        };

        let (coupon, discount) = match &req.coupon_code {
            Some(code) => {
                let (coupon, discount) = self
                    .coupons
                    .apply(code, req.user_id, subtotal, delivery_charge)
                    .await?;
                (Some(coupon), discount)
            }
            None => (None, DiscountResult::default()),
        };

        let tax_rate_bps = self
            .settings
            .get_i64("tax_rate_bps", DEFAULT_TAX_RATE_BPS)
            .await;
        let totals = assemble_totals(subtotal, discount, delivery_charge, tax_rate_bps);

        let is_prepaid = match req.payment_method.to_lowercase().as_str() {
            "razorpay" => true,
            "cod" => false,
            other => return Err(CheckoutError::UnknownPaymentMethod(other.to_string())),
        };
        let payment_method = if is_prepaid { "razorpay" } else { "cod" };

        let items: Vec<NewOrderItem> = req
            .items
            .iter()
            .map(|i| NewOrderItem {
                product_name: i.product_name.clone(),
                sku: i.sku.clone(),
                quantity: i.quantity,
                unit_price: i.unit_price,
            })
            .collect();

        // The UNIQUE constraint decides order-number collisions, not a
        // pre-check: a concurrent checkout that grabbed the same candidate
        // fails the insert and a fresh number is tried.
        let mut created = None;
        for _ in 0..5 {
            let candidate = generate_order_number();
            let new_order = NewOrder {
                order_number: candidate.clone(),
                user_id: req.user_id,
                customer_email: req.customer_email.clone(),
                status: OrderStatus::Pending,
                subtotal: totals.subtotal,
                discount_amount: totals.discount_amount,
                discount_on_delivery: totals.discount_on_delivery,
                delivery_charge: totals.delivery_charge,
                tax_amount: totals.tax_amount,
                total_amount: totals.total_amount,
                coupon_code: coupon.as_ref().map(|c| c.code.clone()),
                payment_method: payment_method.to_string(),
                payment_status: "pending".to_string(),
                razorpay_order_id: None,
                shipping_address: req.shipping_address.to_string(),
            };
            match self.orders.create(&new_order, &items).await {
                Ok(id) => {
                    created = Some((id, candidate));
                    break;
                }
                Err(e) if is_unique_violation(&e) => continue,
                Err(e) => return Err(CheckoutError::Storage(e)),
            }
        }
        let (order_id, order_number) =
            created.ok_or_else(|| anyhow!("Failed to generate a unique order number"))?;

        let gateway_order = if is_prepaid {
            let gateway_order = self
                .gateway
                .create_order(totals.total_amount, &order_number)
                .await?;
            self.orders
                .set_gateway_order(order_id, &gateway_order.gateway_order_id)
                .await?;
            Some(gateway_order)
        } else {
            None
        };

        info!(
            "Order {} placed: {} paise via {}",
            order_number, totals.total_amount, payment_method
        );

        let mut status = OrderStatus::Pending;
        if !is_prepaid {
            // Cash on delivery: nothing left to wait for.
            self.confirm_order(order_id, coupon.as_ref(), req.user_id, None)
                .await?;
            status = OrderStatus::Confirmed;
        }

        Ok(PlacedOrder {
            order_number,
            status,
            totals,
            razorpay_order_id: gateway_order.as_ref().map(|g| g.gateway_order_id.clone()),
            razorpay_key_id: gateway_order.map(|g| g.key_id),
        })
    }

    /// Verify the gateway callback for a prepaid order and confirm it.
    /// Confirmation and coupon redemption commit in one transaction:
    /// either the order is paid-and-counted or nothing happened.
    pub async fn verify_payment(
        &self,
        gateway_order_id: &str,
        payment_id: &str,
        signature: &str,
    ) -> Result<Order, CheckoutError> {
        let order = self
            .orders
            .find_by_razorpay_order_id(gateway_order_id)
            .await?
            .ok_or(CheckoutError::UnknownOrder)?;

        let valid = self
            .gateway
            .verify(gateway_order_id, payment_id, signature)
            .await?;
        if !valid {
            warn!(
                "Signature mismatch for order {} payment {}",
                order.order_number, payment_id
            );
            return Err(CheckoutError::SignatureMismatch);
        }

        let coupon = match &order.coupon_code {
            Some(code) => self.coupons.lookup(code).await?,
            None => None,
        };

        self.confirm_order(order.id, coupon.as_ref(), order.user_id, Some(payment_id))
            .await?;

        self.orders
            .find_by_razorpay_order_id(gateway_order_id)
            .await?
            .ok_or(CheckoutError::UnknownOrder)
    }

    async fn confirm_order(
        &self,
        order_id: i64,
        coupon: Option<&Coupon>,
        user_id: Option<i64>,
        payment_id: Option<&str>,
    ) -> Result<(), CheckoutError> {
        let mut tx = self.pool.begin().await.map_err(anyhow::Error::from)?;
        let confirmed = self
            .orders
            .mark_confirmed(&mut tx, order_id, payment_id)
            .await?;

        // Replayed or raced confirmation: the order already left pending.
        // Acknowledge without touching the coupon counters again.
        if !confirmed {
            tx.rollback().await.map_err(anyhow::Error::from)?;
            return Ok(());
        }

        if let Some(coupon) = coupon {
            let redeemed = self
                .coupons
                .redeem_for_order(&mut tx, coupon.id, user_id.unwrap_or(0), order_id)
                .await?;
            if !redeemed {
                tx.rollback().await.map_err(anyhow::Error::from)?;
                return Err(CheckoutError::Coupon(ApplyError::Rejected(
                    CouponError::UsageLimitExceeded,
                )));
            }
        }

        tx.commit().await.map_err(anyhow::Error::from)?;
        Ok(())
    }

}

fn generate_order_number() -> String {
    format!("LST-{:08}", rand::rng().random_range(0..100_000_000u64))
}

fn is_unique_violation(e: &anyhow::Error) -> bool {
    matches!(
        e.downcast_ref::<sqlx::Error>(),
        Some(sqlx::Error::Database(db)) if db.is_unique_violation()
    )
}
