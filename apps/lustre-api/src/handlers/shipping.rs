use axum::extract::{Path, State};
use axum::Json;

use crate::AppState;

/// Quote serviceability and delivery rates for a destination pincode.
/// Always 200: unserviceable and fallback outcomes are data, not errors.
pub async fn serviceability(
    State(state): State<AppState>,
    Path(pincode): Path<String>,
) -> Json<serde_json::Value> {
    let quote = state.shipping_service.resolve_delivery_charge(&pincode).await;
    Json(serde_json::json!({
        "success": true,
        "available": quote.available,
        "couriers": quote.couriers,
        "chosen_rate": quote.chosen_rate,
        "fallback": quote.fallback,
    }))
}
