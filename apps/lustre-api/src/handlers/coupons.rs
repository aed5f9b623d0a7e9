use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use crate::handlers::error_response;
use crate::services::checkout_service::CartItem;
use crate::services::coupon_service::ApplyError;
use crate::services::pricing::assemble_totals;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ApplyCouponRequest {
    pub coupon_code: String,
    pub items: Vec<CartItem>,
    pub user_id: Option<i64>,
    /// When present, delivery is quoted live so free-shipping coupons can
    /// price the waiver; otherwise delivery is treated as zero.
    pub pincode: Option<String>,
}

/// Preview a coupon against a cart. Read-only: nothing is consumed here.
pub async fn apply_coupon(
    State(state): State<AppState>,
    Json(payload): Json<ApplyCouponRequest>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    let subtotal: i64 = payload.items.iter().map(|i| i.quantity * i.unit_price).sum();
    if subtotal <= 0 {
        return Err(error_response(StatusCode::BAD_REQUEST, "Cart is empty"));
    }

    let delivery_charge = match &payload.pincode {
        Some(pincode) => state
            .shipping_service
            .resolve_delivery_charge(pincode)
            .await
            .chosen_rate
            .unwrap_or(0),
        None => 0,
    };

    let applied = state
        .coupon_service
        .preview(&payload.coupon_code, payload.user_id, subtotal, delivery_charge)
        .await
        .map_err(|e| match e {
            ApplyError::UnknownCode | ApplyError::Rejected(_) => {
                error_response(StatusCode::BAD_REQUEST, e.to_string())
            }
            ApplyError::Storage(e) => {
                tracing::error!("Coupon apply failed: {:#}", e);
                error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
            }
        })?;

    let tax_rate_bps = state.settings.get_i64("tax_rate_bps", 1_800).await;
    let totals = assemble_totals(
        subtotal,
        crate::services::pricing::DiscountResult {
            discount: applied.discount,
            discount_on_delivery: applied.discount_on_delivery,
        },
        delivery_charge,
        tax_rate_bps,
    );

    Ok(Json(serde_json::json!({
        "success": true,
        "coupon": applied,
        "totals": totals,
    })))
}

/// Publicly listed, active coupons for the storefront banner.
pub async fn list_public_coupons(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    let coupons = state.coupon_service.list_public().await.map_err(|e| {
        tracing::error!("Failed to list public coupons: {:#}", e);
        error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
    })?;
    Ok(Json(serde_json::json!({ "success": true, "coupons": coupons })))
}
