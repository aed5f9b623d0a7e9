use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use lustre_db::models::coupon::NewCoupon;
use std::collections::HashMap;

use crate::handlers::error_response;
use crate::AppState;

pub async fn list_coupons(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    let coupons = state.coupon_service.list_all().await.map_err(|e| {
        tracing::error!("Failed to list coupons: {:#}", e);
        error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
    })?;
    Ok(Json(serde_json::json!({ "success": true, "coupons": coupons })))
}

pub async fn create_coupon(
    State(state): State<AppState>,
    Json(payload): Json<NewCoupon>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    if payload.code.trim().is_empty() {
        return Err(error_response(StatusCode::BAD_REQUEST, "Coupon code is required"));
    }
    if payload.valid_until < payload.valid_from {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            "valid_until must not precede valid_from",
        ));
    }

    let coupon = state.coupon_service.create(&payload).await.map_err(|e| {
        // UNIQUE violation on code is the common admin mistake.
        tracing::warn!("Failed to create coupon {}: {:#}", payload.code, e);
        error_response(StatusCode::BAD_REQUEST, "Could not create coupon (duplicate code?)")
    })?;
    Ok(Json(serde_json::json!({ "success": true, "coupon": coupon })))
}

pub async fn deactivate_coupon(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    let found = state.coupon_service.deactivate(id).await.map_err(|e| {
        tracing::error!("Failed to deactivate coupon {}: {:#}", id, e);
        error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
    })?;
    if !found {
        return Err(error_response(StatusCode::NOT_FOUND, "Coupon not found"));
    }
    Ok(Json(serde_json::json!({ "success": true })))
}

pub async fn coupon_redemptions(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    let redemptions = state.coupon_service.redemptions(id).await.map_err(|e| {
        tracing::error!("Failed to list redemptions for coupon {}: {:#}", id, e);
        error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
    })?;
    Ok(Json(serde_json::json!({ "success": true, "redemptions": redemptions })))
}

pub async fn list_orders(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    let orders = state.orders.list_recent(100).await.map_err(|e| {
        tracing::error!("Failed to list orders: {:#}", e);
        error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
    })?;
    Ok(Json(serde_json::json!({ "success": true, "orders": orders })))
}

pub async fn get_settings(
    State(state): State<AppState>,
) -> Json<serde_json::Value> {
    let settings = state.settings.all().await;
    Json(serde_json::json!({ "success": true, "settings": settings }))
}

pub async fn save_settings(
    State(state): State<AppState>,
    Json(payload): Json<HashMap<String, String>>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    state.settings.set_multiple(payload).await.map_err(|e| {
        tracing::error!("Failed to save settings: {:#}", e);
        error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
    })?;
    Ok(Json(serde_json::json!({ "success": true })))
}
