pub mod coupon_repo;
pub mod order_repo;
