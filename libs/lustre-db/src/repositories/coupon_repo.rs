use anyhow::{Context, Result};
use sqlx::SqlitePool;

use crate::models::coupon::{Coupon, CouponRedemption, NewCoupon};

#[derive(Debug, Clone)]
pub struct CouponRepository {
    pool: SqlitePool,
}

impl CouponRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Codes are stored uppercase; lookups normalize the same way.
    pub async fn find_by_code(&self, code: &str) -> Result<Option<Coupon>> {
        let code = code.trim().to_uppercase();
        sqlx::query_as::<_, Coupon>("SELECT * FROM coupons WHERE code = ?")
            .bind(&code)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch coupon by code")
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<Coupon>> {
        sqlx::query_as::<_, Coupon>("SELECT * FROM coupons WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch coupon by ID")
    }

    pub async fn list_all(&self) -> Result<Vec<Coupon>> {
        sqlx::query_as::<_, Coupon>("SELECT * FROM coupons ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await
            .context("Failed to list coupons")
    }

    pub async fn list_public(&self) -> Result<Vec<Coupon>> {
        sqlx::query_as::<_, Coupon>(
            "SELECT * FROM coupons WHERE is_public = 1 AND is_active = 1 ORDER BY created_at DESC",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list public coupons")
    }

    pub async fn create(&self, new: &NewCoupon) -> Result<i64> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO coupons (code, name, description, discount_type, value,
                minimum_order_amount, maximum_discount_amount, usage_limit,
                user_usage_limit, valid_from, valid_until, is_public)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(new.code.trim().to_uppercase())
        .bind(&new.name)
        .bind(&new.description)
        .bind(new.discount_type)
        .bind(new.value)
        .bind(new.minimum_order_amount)
        .bind(new.maximum_discount_amount)
        .bind(new.usage_limit)
        .bind(new.user_usage_limit)
        .bind(new.valid_from)
        .bind(new.valid_until)
        .bind(new.is_public)
        .fetch_one(&self.pool)
        .await
        .context("Failed to create coupon")?;
        Ok(id)
    }

    /// Soft kill switch. Coupons are never hard-deleted once used.
    pub async fn deactivate(&self, id: i64) -> Result<bool> {
        let res = sqlx::query("UPDATE coupons SET is_active = 0 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to deactivate coupon")?;
        Ok(res.rows_affected() > 0)
    }

    /// How many times this user has already redeemed this coupon.
    pub async fn user_redemption_count(&self, coupon_id: i64, user_id: i64) -> Result<i64> {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM coupon_redemptions WHERE coupon_id = ? AND user_id = ?",
        )
        .bind(coupon_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .context("Failed to count user redemptions")
    }

    pub async fn list_redemptions(&self, coupon_id: i64) -> Result<Vec<CouponRedemption>> {
        sqlx::query_as::<_, CouponRedemption>(
            "SELECT * FROM coupon_redemptions WHERE coupon_id = ? ORDER BY redeemed_at DESC",
        )
        .bind(coupon_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch coupon redemptions")
    }

    /// Conditional increment + redemption log, inside the caller's
    /// transaction so it commits (or rolls back) together with order
    /// confirmation. Returns false when the global usage limit lost the
    /// race: zero rows means another checkout took the last unit.
    pub async fn redeem(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        coupon_id: i64,
        user_id: i64,
        order_id: i64,
    ) -> Result<bool> {
        let res = sqlx::query(
            "UPDATE coupons SET used_count = used_count + 1
             WHERE id = ? AND (usage_limit IS NULL OR used_count < usage_limit)",
        )
        .bind(coupon_id)
        .execute(&mut **tx)
        .await
        .context("Failed to increment coupon usage")?;

        if res.rows_affected() == 0 {
            return Ok(false);
        }

        sqlx::query(
            "INSERT INTO coupon_redemptions (coupon_id, user_id, order_id) VALUES (?, ?, ?)",
        )
        .bind(coupon_id)
        .bind(user_id)
        .bind(order_id)
        .execute(&mut **tx)
        .await
        .context("Failed to record coupon redemption")?;

        Ok(true)
    }
}
