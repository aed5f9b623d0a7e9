use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;

use crate::handlers::error_response;
use crate::services::tracking_service::{CourierCallback, TrackingError};
use crate::AppState;

/// Shiprocket status callback. Unauthenticated by the platform's design;
/// the handler only trusts the payload as far as the state machine allows.
pub async fn shiprocket_webhook(
    State(state): State<AppState>,
    Json(payload): Json<CourierCallback>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    let outcome = state
        .tracking_service
        .process_callback(&payload)
        .await
        .map_err(|e| match e {
            TrackingError::MissingOrderId => error_response(StatusCode::BAD_REQUEST, e.to_string()),
            TrackingError::UnknownOrder(_) => error_response(StatusCode::NOT_FOUND, e.to_string()),
            TrackingError::Storage(e) => {
                tracing::error!("Webhook processing failed: {:#}", e);
                error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
            }
        })?;

    Ok(Json(serde_json::json!({
        "success": true,
        "order_number": outcome.order_number,
        "status": outcome.new_status,
    })))
}
