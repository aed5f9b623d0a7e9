use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// How a coupon reduces cost. Stored as lowercase snake_case text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DiscountType {
    Percentage,
    FixedAmount,
    FreeShipping,
}

impl DiscountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscountType::Percentage => "percentage",
            DiscountType::FixedAmount => "fixed_amount",
            DiscountType::FreeShipping => "free_shipping",
        }
    }
}

/// Immutable coupon snapshot. Discount math lives in the pricing module and
/// takes this struct by reference; nothing here touches the database.
///
/// All currency amounts are integer paise. `value` means percentage points
/// for `Percentage`, paise for `FixedAmount`, and is ignored for
/// `FreeShipping`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Coupon {
    pub id: i64,
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    pub discount_type: DiscountType,
    pub value: i64,
    pub minimum_order_amount: i64,
    pub maximum_discount_amount: Option<i64>,
    pub usage_limit: Option<i64>,
    pub used_count: i64,
    pub user_usage_limit: Option<i64>,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    pub is_active: bool,
    pub is_public: bool,
    pub created_at: DateTime<Utc>,
}

impl Coupon {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.valid_until
    }

    /// Active, inside the [valid_from, valid_until] window (inclusive) and
    /// global usage not exhausted.
    pub fn is_currently_valid(&self, now: DateTime<Utc>) -> bool {
        if !self.is_active {
            return false;
        }
        if now < self.valid_from || now > self.valid_until {
            return false;
        }
        match self.usage_limit {
            Some(limit) => self.used_count < limit,
            None => true,
        }
    }
}

/// Payload for creating a coupon (admin side).
#[derive(Debug, Clone, Deserialize)]
pub struct NewCoupon {
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    pub discount_type: DiscountType,
    pub value: i64,
    #[serde(default)]
    pub minimum_order_amount: i64,
    pub maximum_discount_amount: Option<i64>,
    pub usage_limit: Option<i64>,
    pub user_usage_limit: Option<i64>,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    #[serde(default = "default_true")]
    pub is_public: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CouponRedemption {
    pub id: i64,
    pub coupon_id: i64,
    pub user_id: i64,
    pub order_id: i64,
    pub redeemed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample_coupon() -> Coupon {
        let now = Utc::now();
        Coupon {
            id: 1,
            code: "TEST20".to_string(),
            name: "Test 20%".to_string(),
            description: None,
            discount_type: DiscountType::Percentage,
            value: 20,
            minimum_order_amount: 0,
            maximum_discount_amount: None,
            usage_limit: None,
            used_count: 0,
            user_usage_limit: None,
            valid_from: now - Duration::days(1),
            valid_until: now + Duration::days(1),
            is_active: true,
            is_public: true,
            created_at: now,
        }
    }

    #[test]
    fn valid_inside_window() {
        let c = sample_coupon();
        assert!(c.is_currently_valid(Utc::now()));
        assert!(!c.is_expired(Utc::now()));
    }

    #[test]
    fn invalid_when_inactive() {
        let mut c = sample_coupon();
        c.is_active = false;
        assert!(!c.is_currently_valid(Utc::now()));
    }

    #[test]
    fn invalid_before_start_and_after_end() {
        let c = sample_coupon();
        assert!(!c.is_currently_valid(c.valid_from - Duration::seconds(1)));
        assert!(!c.is_currently_valid(c.valid_until + Duration::seconds(1)));
        assert!(c.is_expired(c.valid_until + Duration::seconds(1)));
        // window bounds are inclusive
        assert!(c.is_currently_valid(c.valid_from));
        assert!(c.is_currently_valid(c.valid_until));
    }

    #[test]
    fn invalid_when_usage_exhausted() {
        let mut c = sample_coupon();
        c.usage_limit = Some(5);
        c.used_count = 5;
        assert!(!c.is_currently_valid(Utc::now()));
        c.used_count = 4;
        assert!(c.is_currently_valid(Utc::now()));
    }
}
