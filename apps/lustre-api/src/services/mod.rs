pub mod checkout_service;
pub mod coupon_service;
pub mod pricing;
pub mod razorpay;
pub mod shiprocket;
pub mod shipping_service;
pub mod tracking_service;
