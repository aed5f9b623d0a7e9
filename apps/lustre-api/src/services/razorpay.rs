use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::settings::SettingsService;

const RAZORPAY_BASE: &str = "https://api.razorpay.com/v1";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

type HmacSha256 = Hmac<Sha256>;

/// Gateway order handle returned at checkout. The client completes payment
/// against `gateway_order_id`; we only trust the result after signature
/// verification.
#[derive(Debug, Clone)]
pub struct GatewayOrder {
    pub gateway_order_id: String,
    pub amount: i64,
    pub currency: String,
    pub key_id: String,
}

/// Seam for the payment gateway so checkout can be tested without network.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_order(&self, amount: i64, receipt: &str) -> Result<GatewayOrder>;
    async fn verify(
        &self,
        gateway_order_id: &str,
        payment_id: &str,
        signature: &str,
    ) -> Result<bool>;
}

#[derive(Debug, Deserialize)]
struct CreateOrderResponse {
    id: String,
    amount: i64,
    currency: String,
}

/// Razorpay REST client. Orders are created server-side so the payable
/// amount is fixed before the client ever sees the gateway.
pub struct RazorpayClient {
    http: reqwest::Client,
    settings: Arc<SettingsService>,
}

impl RazorpayClient {
    pub fn new(settings: Arc<SettingsService>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { http, settings })
    }

    async fn credentials(&self) -> Result<(String, String)> {
        let key_id = self
            .settings
            .get("razorpay_key_id")
            .await
            .ok_or_else(|| anyhow!("razorpay_key_id not configured"))?;
        let key_secret = self
            .settings
            .get("razorpay_key_secret")
            .await
            .ok_or_else(|| anyhow!("razorpay_key_secret not configured"))?;
        Ok((key_id, key_secret))
    }

    /// Create a gateway order for `amount` paise, tagged with our order
    /// number for reconciliation in the Razorpay dashboard.
    pub async fn create_order(&self, amount: i64, receipt: &str) -> Result<GatewayOrder> {
        let (key_id, key_secret) = self.credentials().await?;

        let resp = self
            .http
            .post(format!("{}/orders", RAZORPAY_BASE))
            .basic_auth(&key_id, Some(&key_secret))
            .json(&serde_json::json!({
                "amount": amount,
                "currency": "INR",
                "receipt": receipt,
            }))
            .send()
            .await
            .context("Razorpay order request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(anyhow!("Razorpay order creation: HTTP {} {}", status, body));
        }

        let body: CreateOrderResponse =
            resp.json().await.context("Razorpay order: bad response")?;

        info!("Gateway order {} created for receipt {}", body.id, receipt);
        Ok(GatewayOrder {
            gateway_order_id: body.id,
            amount: body.amount,
            currency: body.currency,
            key_id,
        })
    }

    /// Verify the client-supplied payment signature against our key secret.
    pub async fn verify_payment_signature(
        &self,
        gateway_order_id: &str,
        payment_id: &str,
        signature: &str,
    ) -> Result<bool> {
        let (_, key_secret) = self.credentials().await?;
        Ok(verify_signature(
            gateway_order_id,
            payment_id,
            signature,
            &key_secret,
        ))
    }
}

#[async_trait]
impl PaymentGateway for RazorpayClient {
    async fn create_order(&self, amount: i64, receipt: &str) -> Result<GatewayOrder> {
        RazorpayClient::create_order(self, amount, receipt).await
    }

    async fn verify(
        &self,
        gateway_order_id: &str,
        payment_id: &str,
        signature: &str,
    ) -> Result<bool> {
        self.verify_payment_signature(gateway_order_id, payment_id, signature)
            .await
    }
}

/// HMAC-SHA256 over "order_id|payment_id", hex-encoded, compared against the
/// signature the client relayed from the gateway.
pub fn verify_signature(
    gateway_order_id: &str,
    payment_id: &str,
    signature: &str,
    key_secret: &str,
) -> bool {
    let Ok(mut mac) = HmacSha256::new_from_slice(key_secret.as_bytes()) else {
        return false;
    };
    mac.update(format!("{}|{}", gateway_order_id, payment_id).as_bytes());
    let expected = hex::encode(mac.finalize().into_bytes());
    expected == signature.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign(order_id: &str, payment_id: &str, secret: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(format!("{}|{}", order_id, payment_id).as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn accepts_valid_signature() {
        let sig = sign("order_ABC", "pay_XYZ", "secret123");
        assert!(verify_signature("order_ABC", "pay_XYZ", &sig, "secret123"));
    }

    #[test]
    fn accepts_uppercase_hex() {
        let sig = sign("order_ABC", "pay_XYZ", "secret123").to_uppercase();
        assert!(verify_signature("order_ABC", "pay_XYZ", &sig, "secret123"));
    }

    #[test]
    fn rejects_wrong_secret() {
        let sig = sign("order_ABC", "pay_XYZ", "secret123");
        assert!(!verify_signature("order_ABC", "pay_XYZ", &sig, "other-secret"));
    }

    #[test]
    fn rejects_tampered_payment_id() {
        let sig = sign("order_ABC", "pay_XYZ", "secret123");
        assert!(!verify_signature("order_ABC", "pay_FORGED", &sig, "secret123"));
    }

    #[test]
    fn rejects_garbage_signature() {
        assert!(!verify_signature("order_ABC", "pay_XYZ", "not-hex", "secret123"));
    }
}
