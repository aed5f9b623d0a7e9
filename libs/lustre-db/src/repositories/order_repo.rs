use anyhow::{Context, Result};
use sqlx::SqlitePool;

use crate::models::order::{NewOrder, NewOrderItem, Order, OrderItem, OrderStatus, ShipmentEvent};

#[derive(Debug, Clone)]
pub struct OrderRepository {
    pool: SqlitePool,
}

impl OrderRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn begin(&self) -> Result<sqlx::Transaction<'static, sqlx::Sqlite>> {
        self.pool.begin().await.context("Failed to begin transaction")
    }

    pub async fn create(&self, new: &NewOrder, items: &[NewOrderItem]) -> Result<i64> {
        let mut tx = self.pool.begin().await?;

        let order_id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO orders (order_number, user_id, customer_email, status,
                subtotal, discount_amount, discount_on_delivery, delivery_charge,
                tax_amount, total_amount, coupon_code, payment_method,
                payment_status, razorpay_order_id, shipping_address)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(&new.order_number)
        .bind(new.user_id)
        .bind(&new.customer_email)
        .bind(new.status)
        .bind(new.subtotal)
        .bind(new.discount_amount)
        .bind(new.discount_on_delivery)
        .bind(new.delivery_charge)
        .bind(new.tax_amount)
        .bind(new.total_amount)
        .bind(&new.coupon_code)
        .bind(&new.payment_method)
        .bind(&new.payment_status)
        .bind(&new.razorpay_order_id)
        .bind(&new.shipping_address)
        .fetch_one(&mut *tx)
        .await
        .context("Failed to insert order")?;

        for item in items {
            sqlx::query(
                "INSERT INTO order_items (order_id, product_name, sku, quantity, unit_price, line_total)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(order_id)
            .bind(&item.product_name)
            .bind(&item.sku)
            .bind(item.quantity)
            .bind(item.unit_price)
            .bind(item.line_total())
            .execute(&mut *tx)
            .await
            .context("Failed to insert order item")?;
        }

        tx.commit().await?;
        Ok(order_id)
    }

    pub async fn find_by_order_number(&self, order_number: &str) -> Result<Option<Order>> {
        sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE order_number = ?")
            .bind(order_number)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch order by order number")
    }

    pub async fn find_by_razorpay_order_id(&self, rzp_order_id: &str) -> Result<Option<Order>> {
        sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE razorpay_order_id = ?")
            .bind(rzp_order_id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch order by gateway order ID")
    }

    pub async fn get_items(&self, order_id: i64) -> Result<Vec<OrderItem>> {
        sqlx::query_as::<_, OrderItem>("SELECT * FROM order_items WHERE order_id = ? ORDER BY id")
            .bind(order_id)
            .fetch_all(&self.pool)
            .await
            .context("Failed to fetch order items")
    }

    pub async fn get_events(&self, order_id: i64) -> Result<Vec<ShipmentEvent>> {
        sqlx::query_as::<_, ShipmentEvent>(
            "SELECT * FROM shipment_events WHERE order_id = ? ORDER BY recorded_at, id",
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch shipment events")
    }

    pub async fn list_recent(&self, limit: i64) -> Result<Vec<Order>> {
        sqlx::query_as::<_, Order>("SELECT * FROM orders ORDER BY created_at DESC LIMIT ?")
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .context("Failed to list orders")
    }

    /// Flip a pending order to confirmed inside the caller's transaction,
    /// recording the gateway payment reference. `confirmed_at` is stamped
    /// at most once. Returns false when the order had already left
    /// `pending`, so a replayed confirmation can be acknowledged without
    /// re-running its side effects.
    pub async fn mark_confirmed(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        order_id: i64,
        payment_id: Option<&str>,
    ) -> Result<bool> {
        let res = sqlx::query(
            r#"
            UPDATE orders SET
                status = 'confirmed',
                payment_status = 'paid',
                razorpay_payment_id = COALESCE(razorpay_payment_id, ?),
                confirmed_at = COALESCE(confirmed_at, CURRENT_TIMESTAMP),
                updated_at = CURRENT_TIMESTAMP
            WHERE id = ? AND status = 'pending'
            "#,
        )
        .bind(payment_id)
        .bind(order_id)
        .execute(&mut **tx)
        .await
        .context("Failed to confirm order")?;
        Ok(res.rows_affected() > 0)
    }

    /// Attach the gateway order reference once the draft row exists.
    pub async fn set_gateway_order(&self, order_id: i64, gateway_order_id: &str) -> Result<()> {
        sqlx::query(
            "UPDATE orders SET razorpay_order_id = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
        )
        .bind(gateway_order_id)
        .bind(order_id)
        .execute(&self.pool)
        .await
        .context("Failed to set gateway order reference")?;
        Ok(())
    }

    /// Update-if-unchanged status advance, inside the caller's transaction
    /// so the matching audit row commits with it. The `expected` guard makes
    /// concurrent webhook deliveries serialize: a writer that lost the race
    /// affects zero rows and the caller re-reads. Per-status timestamps are
    /// stamped at most once via COALESCE, so replays never overwrite them.
    pub async fn advance_status(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        order_id: i64,
        expected: OrderStatus,
        next: OrderStatus,
    ) -> Result<bool> {
        let res = sqlx::query(
            r#"
            UPDATE orders SET
                status = ?2,
                confirmed_at = CASE WHEN ?2 = 'confirmed'
                    THEN COALESCE(confirmed_at, CURRENT_TIMESTAMP) ELSE confirmed_at END,
                shipped_at = CASE WHEN ?2 = 'shipped'
                    THEN COALESCE(shipped_at, CURRENT_TIMESTAMP) ELSE shipped_at END,
                delivered_at = CASE WHEN ?2 = 'delivered'
                    THEN COALESCE(delivered_at, CURRENT_TIMESTAMP) ELSE delivered_at END,
                updated_at = CURRENT_TIMESTAMP
            WHERE id = ?1 AND status = ?3
            "#,
        )
        .bind(order_id)
        .bind(next)
        .bind(expected)
        .execute(&mut **tx)
        .await
        .context("Failed to advance order status")?;
        Ok(res.rows_affected() > 0)
    }

    /// Append one audit-trail row. Called for every inbound callback, even
    /// when the top-level status did not change.
    pub async fn append_event(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        order_id: i64,
        status_text: &str,
        status_code: Option<&str>,
        location: Option<&str>,
        remarks: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO shipment_events (order_id, status_text, status_code, location, remarks)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(order_id)
        .bind(status_text)
        .bind(status_code)
        .bind(location)
        .bind(remarks)
        .execute(&mut **tx)
        .await
        .context("Failed to append shipment event")?;
        Ok(())
    }

    /// First-write-wins backfill of courier tracking references. Later
    /// callbacks never overwrite an existing value.
    pub async fn backfill_tracking(
        &self,
        order_id: i64,
        awb_code: Option<&str>,
        courier_name: Option<&str>,
        tracking_url: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE orders SET
                awb_code = COALESCE(awb_code, ?),
                courier_name = COALESCE(courier_name, ?),
                tracking_url = COALESCE(tracking_url, ?),
                updated_at = CURRENT_TIMESTAMP
            WHERE id = ?
            "#,
        )
        .bind(awb_code)
        .bind(courier_name)
        .bind(tracking_url)
        .bind(order_id)
        .execute(&self.pool)
        .await
        .context("Failed to backfill tracking info")?;
        Ok(())
    }
}
