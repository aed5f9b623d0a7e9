use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use crate::handlers::error_response;
use crate::services::checkout_service::{CheckoutError, PlaceOrderRequest};
use crate::AppState;

fn checkout_error_response(e: CheckoutError) -> (StatusCode, Json<serde_json::Value>) {
    match e {
        CheckoutError::EmptyCart
        | CheckoutError::InvalidItem(_)
        | CheckoutError::Unserviceable(_)
        | CheckoutError::UnknownPaymentMethod(_)
        | CheckoutError::Coupon(_)
        | CheckoutError::SignatureMismatch => error_response(StatusCode::BAD_REQUEST, e.to_string()),
        CheckoutError::UnknownOrder => error_response(StatusCode::NOT_FOUND, e.to_string()),
        CheckoutError::Storage(e) => {
            tracing::error!("Checkout failed: {:#}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
        }
    }
}

pub async fn place_order(
    State(state): State<AppState>,
    Json(payload): Json<PlaceOrderRequest>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    let placed = state
        .checkout_service
        .place_order(&payload)
        .await
        .map_err(checkout_error_response)?;
    Ok(Json(serde_json::json!({ "success": true, "order": placed })))
}

#[derive(Debug, Deserialize)]
pub struct VerifyPaymentRequest {
    pub razorpay_order_id: String,
    pub razorpay_payment_id: String,
    pub razorpay_signature: String,
}

pub async fn verify_payment(
    State(state): State<AppState>,
    Json(payload): Json<VerifyPaymentRequest>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    let order = state
        .checkout_service
        .verify_payment(
            &payload.razorpay_order_id,
            &payload.razorpay_payment_id,
            &payload.razorpay_signature,
        )
        .await
        .map_err(checkout_error_response)?;
    Ok(Json(serde_json::json!({ "success": true, "order": order })))
}

/// Order details with line items and the full shipment timeline.
pub async fn get_order(
    State(state): State<AppState>,
    Path(order_number): Path<String>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    let order = state
        .orders
        .find_by_order_number(&order_number)
        .await
        .map_err(|e| {
            tracing::error!("Failed to fetch order {}: {:#}", order_number, e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
        })?
        .ok_or_else(|| error_response(StatusCode::NOT_FOUND, "Order not found"))?;

    let items = state.orders.get_items(order.id).await.map_err(|e| {
        tracing::error!("Failed to fetch items for order {}: {:#}", order_number, e);
        error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
    })?;
    let events = state.orders.get_events(order.id).await.map_err(|e| {
        tracing::error!("Failed to fetch events for order {}: {:#}", order_number, e);
        error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
    })?;

    Ok(Json(serde_json::json!({
        "success": true,
        "order": order,
        "items": items,
        "events": events,
    })))
}
