pub mod admin;
pub mod coupons;
pub mod orders;
pub mod shipping;
pub mod webhooks;

use axum::http::StatusCode;
use axum::Json;

/// Uniform error body: `{"success": false, "message": "..."}`.
pub fn error_response(
    status: StatusCode,
    message: impl Into<String>,
) -> (StatusCode, Json<serde_json::Value>) {
    (
        status,
        Json(serde_json::json!({ "success": false, "message": message.into() })),
    )
}
