use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

use crate::services::shiprocket::ServiceabilitySource;
use crate::settings::SettingsService;

/// Flat rate used when the live lookup is unavailable, overridable via the
/// `delivery_fallback_rate` setting. ₹50 in paise.
pub const DEFAULT_FALLBACK_RATE: i64 = 5_000;

const DEFAULT_PICKUP_PINCODE: &str = "110001";

/// Transient per-checkout quote. Never persisted; recomputed on every
/// checkout session.
#[derive(Debug, Clone, Serialize)]
pub struct DeliveryQuote {
    pub available: bool,
    pub couriers: Vec<QuotedCourier>,
    pub chosen_rate: Option<i64>,
    /// True when the live lookup failed and the flat fallback rate was used.
    pub fallback: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct QuotedCourier {
    pub name: String,
    pub rate: i64,
}

impl DeliveryQuote {
    fn fallback(rate: i64) -> Self {
        Self {
            available: true,
            couriers: Vec::new(),
            chosen_rate: Some(rate),
            fallback: true,
        }
    }

    fn unserviceable() -> Self {
        Self {
            available: false,
            couriers: Vec::new(),
            chosen_rate: None,
            fallback: false,
        }
    }
}

/// Delivery charge resolver. Availability over accuracy: a courier-API
/// outage degrades to the flat fallback rate instead of failing checkout.
pub struct ShippingService {
    source: Arc<dyn ServiceabilitySource>,
    settings: Arc<SettingsService>,
}

impl ShippingService {
    pub fn new(source: Arc<dyn ServiceabilitySource>, settings: Arc<SettingsService>) -> Self {
        Self { source, settings }
    }

    pub async fn fallback_rate(&self) -> i64 {
        self.settings
            .get_i64("delivery_fallback_rate", DEFAULT_FALLBACK_RATE)
            .await
    }

    /// Quote delivery to a destination pincode. Cheapest serviceable courier
    /// wins; zero couriers means the address is undeliverable; any lookup
    /// failure yields the fallback quote.
    pub async fn resolve_delivery_charge(&self, destination_pincode: &str) -> DeliveryQuote {
        let pickup = self
            .settings
            .get_or_default("pickup_pincode", DEFAULT_PICKUP_PINCODE)
            .await;

        match self
            .source
            .serviceable_couriers(&pickup, destination_pincode)
            .await
        {
            Ok(couriers) if couriers.is_empty() => DeliveryQuote::unserviceable(),
            Ok(couriers) => {
                let quoted: Vec<QuotedCourier> = couriers
                    .into_iter()
                    .map(|c| QuotedCourier {
                        name: c.name,
                        rate: c.rate,
                    })
                    .collect();
                let chosen = quoted.iter().map(|c| c.rate).min();
                DeliveryQuote {
                    available: true,
                    couriers: quoted,
                    chosen_rate: chosen,
                    fallback: false,
                }
            }
            Err(e) => {
                warn!(
                    "Live rate lookup failed for pincode {}: {}. Using fallback rate.",
                    destination_pincode, e
                );
                DeliveryQuote::fallback(self.fallback_rate().await)
            }
        }
    }
}
