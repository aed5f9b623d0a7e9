use anyhow::Result;
use chrono::Utc;
use lustre_db::models::coupon::{Coupon, CouponRedemption, NewCoupon};
use lustre_db::repositories::coupon_repo::CouponRepository;
use serde::Serialize;
use thiserror::Error;

use crate::services::pricing::{calculate_discount, CouponError, DiscountResult};

#[derive(Debug, Error)]
pub enum ApplyError {
    #[error("Invalid coupon code")]
    UnknownCode,
    #[error(transparent)]
    Rejected(#[from] CouponError),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// Preview of a coupon against a cart, returned by the apply endpoint.
/// Nothing is consumed here; usage counters only move at redemption.
#[derive(Debug, Serialize)]
pub struct AppliedCoupon {
    pub code: String,
    pub name: String,
    pub discount: i64,
    pub discount_on_delivery: i64,
    pub savings: i64,
}

pub struct CouponService {
    coupons: CouponRepository,
}

impl CouponService {
    pub fn new(coupons: CouponRepository) -> Self {
        Self { coupons }
    }

    /// Look up and price a coupon against the cart. Unknown and known-but
    /// -rejected codes are distinct errors so the storefront can tell "typo"
    /// from "expired".
    pub async fn apply(
        &self,
        code: &str,
        user_id: Option<i64>,
        order_subtotal: i64,
        delivery_charge: i64,
    ) -> Result<(Coupon, DiscountResult), ApplyError> {
        let coupon = self
            .coupons
            .find_by_code(code)
            .await?
            .ok_or(ApplyError::UnknownCode)?;

        let user_usage_count = match user_id {
            Some(uid) => self.coupons.user_redemption_count(coupon.id, uid).await?,
            None => 0,
        };

        let discount = calculate_discount(
            &coupon,
            order_subtotal,
            delivery_charge,
            user_usage_count,
            Utc::now(),
        )?;

        Ok((coupon, discount))
    }

    pub async fn preview(
        &self,
        code: &str,
        user_id: Option<i64>,
        order_subtotal: i64,
        delivery_charge: i64,
    ) -> Result<AppliedCoupon, ApplyError> {
        let (coupon, discount) = self
            .apply(code, user_id, order_subtotal, delivery_charge)
            .await?;
        Ok(AppliedCoupon {
            code: coupon.code,
            name: coupon.name,
            discount: discount.discount,
            discount_on_delivery: discount.discount_on_delivery,
            savings: discount.savings(),
        })
    }

    pub async fn lookup(&self, code: &str) -> Result<Option<Coupon>> {
        self.coupons.find_by_code(code).await
    }

    /// Consume one usage unit inside the caller's transaction. False means
    /// the global limit was hit between preview and confirmation.
    pub async fn redeem_for_order(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        coupon_id: i64,
        user_id: i64,
        order_id: i64,
    ) -> Result<bool> {
        self.coupons.redeem(tx, coupon_id, user_id, order_id).await
    }

    pub async fn list_public(&self) -> Result<Vec<Coupon>> {
        self.coupons.list_public().await
    }

    pub async fn list_all(&self) -> Result<Vec<Coupon>> {
        self.coupons.list_all().await
    }

    pub async fn create(&self, new: &NewCoupon) -> Result<Coupon> {
        let id = self.coupons.create(new).await?;
        let coupon = self
            .coupons
            .get_by_id(id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Coupon vanished after insert"))?;
        Ok(coupon)
    }

    pub async fn deactivate(&self, id: i64) -> Result<bool> {
        self.coupons.deactivate(id).await
    }

    pub async fn redemptions(&self, coupon_id: i64) -> Result<Vec<CouponRedemption>> {
        self.coupons.list_redemptions(coupon_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use lustre_db::db::init_test_db;
    use lustre_db::models::coupon::DiscountType;

    fn percent_coupon(code: &str) -> NewCoupon {
        let now = Utc::now();
        NewCoupon {
            code: code.to_string(),
            name: "Twenty off".to_string(),
            description: None,
            discount_type: DiscountType::Percentage,
            value: 20,
            minimum_order_amount: 50_000,
            maximum_discount_amount: Some(20_000),
            usage_limit: None,
            user_usage_limit: Some(1),
            valid_from: now - Duration::days(1),
            valid_until: now + Duration::days(30),
            is_public: true,
        }
    }

    async fn service() -> (CouponService, sqlx::SqlitePool) {
        let pool = init_test_db().await.unwrap();
        (CouponService::new(CouponRepository::new(pool.clone())), pool)
    }

    #[tokio::test]
    async fn apply_prices_known_coupon() {
        let (svc, _pool) = service().await;
        svc.create(&percent_coupon("TEST20")).await.unwrap();

        let applied = svc.preview("test20", None, 100_000, 5_000).await.unwrap();
        assert_eq!(applied.code, "TEST20");
        assert_eq!(applied.discount, 20_000);
        assert_eq!(applied.savings, 20_000);
    }

    #[tokio::test]
    async fn unknown_code_is_its_own_error() {
        let (svc, _pool) = service().await;
        let err = svc.preview("NOPE", None, 100_000, 0).await.unwrap_err();
        assert!(matches!(err, ApplyError::UnknownCode));
    }

    #[tokio::test]
    async fn preview_does_not_consume_usage() {
        let (svc, _pool) = service().await;
        let created = svc.create(&percent_coupon("TEST20")).await.unwrap();

        for _ in 0..3 {
            svc.preview("TEST20", Some(1), 100_000, 0).await.unwrap();
        }
        let coupon = svc
            .list_all()
            .await
            .unwrap()
            .into_iter()
            .find(|c| c.id == created.id)
            .unwrap();
        assert_eq!(coupon.used_count, 0);
    }

    #[tokio::test]
    async fn per_user_limit_enforced_after_redemption() {
        let (svc, pool) = service().await;
        let created = svc.create(&percent_coupon("TEST20")).await.unwrap();

        let mut tx = pool.begin().await.unwrap();
        assert!(svc.redeem_for_order(&mut tx, created.id, 42, 1).await.unwrap());
        tx.commit().await.unwrap();

        // the redeeming user is now blocked, others are not
        let err = svc.preview("TEST20", Some(42), 100_000, 0).await.unwrap_err();
        assert!(matches!(
            err,
            ApplyError::Rejected(CouponError::UserLimitExceeded)
        ));
        assert!(svc.preview("TEST20", Some(43), 100_000, 0).await.is_ok());
    }

    #[tokio::test]
    async fn deactivated_coupon_rejected_not_unknown() {
        let (svc, _pool) = service().await;
        let created = svc.create(&percent_coupon("TEST20")).await.unwrap();
        assert!(svc.deactivate(created.id).await.unwrap());

        let err = svc.preview("TEST20", None, 100_000, 0).await.unwrap_err();
        assert!(matches!(
            err,
            ApplyError::Rejected(CouponError::NotCurrentlyValid)
        ));
    }
}
