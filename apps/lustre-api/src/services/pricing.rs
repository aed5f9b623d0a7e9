//! Pure pricing math: coupon discount calculation and order-total assembly.
//!
//! Everything here is side-effect-free so the checkout flow can preview a
//! coupon any number of times without consuming usage. Redemption (the
//! usage-counter increment) is a separate, explicit operation performed at
//! order confirmation, see `CouponService::redeem_for_order`.
//!
//! All amounts are integer paise. Rounding happens once, at the tax line
//! during total assembly, so intermediate steps never accumulate residue.

use chrono::{DateTime, Utc};
use lustre_db::models::coupon::{Coupon, DiscountType};
use serde::Serialize;
use thiserror::Error;

/// Business-rule failures of coupon application. These are structured
/// results, not panics: the checkout UI renders the message inline.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CouponError {
    #[error("This coupon is not valid right now")]
    NotCurrentlyValid,
    #[error("This coupon requires a minimum order of {}, your cart is {}", rupees(.required), rupees(.subtotal))]
    MinimumOrderNotMet { required: i64, subtotal: i64 },
    #[error("This coupon has reached its usage limit")]
    UsageLimitExceeded,
    #[error("You have already used this coupon the maximum number of times")]
    UserLimitExceeded,
}

fn rupees(paise: &i64) -> String {
    format!("\u{20b9}{}.{:02}", paise / 100, (paise % 100).abs())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DiscountResult {
    pub discount: i64,
    pub discount_on_delivery: i64,
}

impl DiscountResult {
    pub fn savings(&self) -> i64 {
        self.discount + self.discount_on_delivery
    }
}

/// Itemized breakdown reported to the client. The four summands always add
/// up exactly to `total_amount`; any rounding residue sits in the tax line.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct OrderTotals {
    pub subtotal: i64,
    pub discount_amount: i64,
    pub discount_on_delivery: i64,
    pub delivery_charge: i64,
    pub tax_amount: i64,
    pub total_amount: i64,
}

/// Compute the discount a coupon yields against an order context.
///
/// Preconditions are checked in a fixed order, each with its own error so
/// the caller can show the actual reason. `user_usage_count` is how many
/// times this user has redeemed this coupon before (0 for guests).
pub fn calculate_discount(
    coupon: &Coupon,
    order_subtotal: i64,
    delivery_charge: i64,
    user_usage_count: i64,
    now: DateTime<Utc>,
) -> Result<DiscountResult, CouponError> {
    if !coupon.is_active || now < coupon.valid_from || now > coupon.valid_until {
        return Err(CouponError::NotCurrentlyValid);
    }

    if order_subtotal < coupon.minimum_order_amount {
        return Err(CouponError::MinimumOrderNotMet {
            required: coupon.minimum_order_amount,
            subtotal: order_subtotal,
        });
    }

    if let Some(limit) = coupon.usage_limit {
        if coupon.used_count >= limit {
            return Err(CouponError::UsageLimitExceeded);
        }
    }

    if let Some(limit) = coupon.user_usage_limit {
        if user_usage_count >= limit {
            return Err(CouponError::UserLimitExceeded);
        }
    }

    let result = match coupon.discount_type {
        DiscountType::Percentage => {
            let raw = order_subtotal * coupon.value / 100;
            let discount = match coupon.maximum_discount_amount {
                Some(cap) => raw.min(cap),
                None => raw,
            };
            DiscountResult {
                discount,
                discount_on_delivery: 0,
            }
        }
        // Never discount below a zero net subtotal.
        DiscountType::FixedAmount => DiscountResult {
            discount: coupon.value.min(order_subtotal),
            discount_on_delivery: 0,
        },
        // Full waiver of the delivery charge; `value` is ignored.
        DiscountType::FreeShipping => DiscountResult {
            discount: 0,
            discount_on_delivery: delivery_charge,
        },
    };

    Ok(result)
}

/// Assemble the final payable amount. Fixed computation order: discount,
/// delivery, tax on the discounted subtotal (half-up at the paise), then the
/// clamped total. `tax_rate_bps` is basis points (1800 = 18%).
pub fn assemble_totals(
    subtotal: i64,
    discount: DiscountResult,
    delivery_charge: i64,
    tax_rate_bps: i64,
) -> OrderTotals {
    let discount_on_delivery = discount.discount_on_delivery.min(delivery_charge);
    let taxable = (subtotal - discount.discount).max(0);
    let tax_amount = (taxable * tax_rate_bps + 5_000) / 10_000;
    let total_amount =
        (subtotal - discount.discount + delivery_charge - discount_on_delivery + tax_amount)
            .max(0);

    OrderTotals {
        subtotal,
        discount_amount: discount.discount,
        discount_on_delivery,
        delivery_charge,
        tax_amount,
        total_amount,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn coupon(discount_type: DiscountType, value: i64) -> Coupon {
        let now = Utc::now();
        Coupon {
            id: 1,
            code: "TEST".to_string(),
            name: "Test coupon".to_string(),
            description: None,
            discount_type,
            value,
            minimum_order_amount: 0,
            maximum_discount_amount: None,
            usage_limit: None,
            used_count: 0,
            user_usage_limit: None,
            valid_from: now - Duration::days(1),
            valid_until: now + Duration::days(30),
            is_active: true,
            is_public: true,
            created_at: now,
        }
    }

    #[test]
    fn percentage_with_cap() {
        // TEST20: 20% off, min order 500, cap 200
        let mut c = coupon(DiscountType::Percentage, 20);
        c.code = "TEST20".to_string();
        c.minimum_order_amount = 500;
        c.maximum_discount_amount = Some(200);

        let r = calculate_discount(&c, 1000, 0, 0, Utc::now()).unwrap();
        assert_eq!(r.discount, 200); // 20% of 1000, exactly at the cap
        assert_eq!(r.discount_on_delivery, 0);

        // cap binds
        let r = calculate_discount(&c, 2000, 0, 0, Utc::now()).unwrap();
        assert_eq!(r.discount, 200);
    }

    #[test]
    fn percentage_without_cap() {
        let c = coupon(DiscountType::Percentage, 15);
        let r = calculate_discount(&c, 2000, 0, 0, Utc::now()).unwrap();
        assert_eq!(r.discount, 300);
    }

    #[test]
    fn minimum_order_not_met() {
        let mut c = coupon(DiscountType::Percentage, 20);
        c.minimum_order_amount = 500;

        let err = calculate_discount(&c, 300, 0, 0, Utc::now()).unwrap_err();
        assert_eq!(
            err,
            CouponError::MinimumOrderNotMet {
                required: 500,
                subtotal: 300
            }
        );
        // the message carries the threshold for display
        assert!(err.to_string().contains("\u{20b9}5.00"));
    }

    #[test]
    fn fixed_amount_is_clamped_to_subtotal() {
        // FIXED100: flat 100 off, no minimum
        let mut c = coupon(DiscountType::FixedAmount, 100);
        c.code = "FIXED100".to_string();

        let r = calculate_discount(&c, 500, 0, 0, Utc::now()).unwrap();
        assert_eq!(r.discount, 100);

        // never discounts below a zero net subtotal
        let r = calculate_discount(&c, 60, 0, 0, Utc::now()).unwrap();
        assert_eq!(r.discount, 60);
    }

    #[test]
    fn free_shipping_waives_full_delivery_charge() {
        // FREESHIP: subtotal 500, delivery 50
        let mut c = coupon(DiscountType::FreeShipping, 0);
        c.code = "FREESHIP".to_string();

        let r = calculate_discount(&c, 500, 50, 0, Utc::now()).unwrap();
        assert_eq!(r.discount, 0);
        assert_eq!(r.discount_on_delivery, 50);
        assert_eq!(r.savings(), 50);
    }

    #[test]
    fn inactive_or_out_of_window_rejected() {
        let mut c = coupon(DiscountType::Percentage, 10);
        c.is_active = false;
        assert_eq!(
            calculate_discount(&c, 1000, 0, 0, Utc::now()).unwrap_err(),
            CouponError::NotCurrentlyValid
        );

        let c = coupon(DiscountType::Percentage, 10);
        let after_expiry = c.valid_until + Duration::seconds(1);
        assert_eq!(
            calculate_discount(&c, 1000, 0, 0, after_expiry).unwrap_err(),
            CouponError::NotCurrentlyValid
        );
        let before_start = c.valid_from - Duration::seconds(1);
        assert_eq!(
            calculate_discount(&c, 1000, 0, 0, before_start).unwrap_err(),
            CouponError::NotCurrentlyValid
        );
    }

    #[test]
    fn usage_limits_produce_distinct_errors() {
        let mut c = coupon(DiscountType::Percentage, 10);
        c.usage_limit = Some(100);
        c.used_count = 100;
        assert_eq!(
            calculate_discount(&c, 1000, 0, 0, Utc::now()).unwrap_err(),
            CouponError::UsageLimitExceeded
        );

        let mut c = coupon(DiscountType::Percentage, 10);
        c.user_usage_limit = Some(1);
        assert_eq!(
            calculate_discount(&c, 1000, 0, 1, Utc::now()).unwrap_err(),
            CouponError::UserLimitExceeded
        );
        // fresh user is fine
        assert!(calculate_discount(&c, 1000, 0, 0, Utc::now()).is_ok());
    }

    #[test]
    fn calculation_is_repeatable() {
        // preview-safe: same inputs, same result, nothing mutated
        let c = coupon(DiscountType::Percentage, 20);
        let a = calculate_discount(&c, 1000, 50, 0, Utc::now()).unwrap();
        let b = calculate_discount(&c, 1000, 50, 0, Utc::now()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn totals_sum_exactly() {
        let discount = DiscountResult {
            discount: 20_000,
            discount_on_delivery: 0,
        };
        let t = assemble_totals(100_000, discount, 5_000, 1_800);
        assert_eq!(t.tax_amount, 14_400); // 18% of 80_000
        assert_eq!(
            t.total_amount,
            t.subtotal - t.discount_amount + t.delivery_charge - t.discount_on_delivery
                + t.tax_amount
        );
        assert_eq!(t.total_amount, 99_400);
    }

    #[test]
    fn tax_rounds_half_up_at_the_paise() {
        // 18% of 103 = 18.54 -> 19
        let t = assemble_totals(103, DiscountResult::default(), 0, 1_800);
        assert_eq!(t.tax_amount, 19);
        // 18% of 25 = 4.5 -> 5
        let t = assemble_totals(25, DiscountResult::default(), 0, 1_800);
        assert_eq!(t.tax_amount, 5);
    }

    #[test]
    fn total_never_negative() {
        let discount = DiscountResult {
            discount: 500,
            discount_on_delivery: 0,
        };
        let t = assemble_totals(500, discount, 0, 0);
        assert_eq!(t.total_amount, 0);
    }

    #[test]
    fn delivery_waiver_never_exceeds_charge() {
        let discount = DiscountResult {
            discount: 0,
            discount_on_delivery: 9_999,
        };
        let t = assemble_totals(1_000, discount, 5_000, 0);
        assert_eq!(t.discount_on_delivery, 5_000);
        assert_eq!(t.total_amount, 1_000);
    }

    #[test]
    fn no_coupon_means_zero_discount() {
        let t = assemble_totals(100_000, DiscountResult::default(), 5_000, 1_800);
        assert_eq!(t.discount_amount, 0);
        assert_eq!(t.total_amount, 100_000 + 5_000 + 18_000);
    }
}
