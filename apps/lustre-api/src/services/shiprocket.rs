use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::settings::SettingsService;

const SHIPROCKET_BASE: &str = "https://apiv2.shiprocket.in/v1/external";

// Shiprocket tokens are valid for 10 days; refresh a day early.
const TOKEN_TTL: Duration = Duration::from_secs(9 * 24 * 3600);

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct CourierOption {
    pub name: String,
    /// Quoted rate in paise.
    pub rate: i64,
}

/// Seam for the serviceability lookup so the shipping service can be tested
/// with a fake source.
#[async_trait]
pub trait ServiceabilitySource: Send + Sync {
    async fn serviceable_couriers(
        &self,
        pickup_pincode: &str,
        delivery_pincode: &str,
    ) -> Result<Vec<CourierOption>>;
}

struct CachedToken {
    token: String,
    fetched_at: Instant,
}

/// Thin Shiprocket HTTP client. Auth is a separate login step; the token is
/// cached process-wide and refreshed lazily when it ages out or the API
/// answers 401/403.
pub struct ShiprocketClient {
    http: reqwest::Client,
    settings: Arc<SettingsService>,
    token: RwLock<Option<CachedToken>>,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ServiceabilityResponse {
    data: Option<ServiceabilityData>,
}

#[derive(Debug, Deserialize)]
struct ServiceabilityData {
    #[serde(default)]
    available_courier_companies: Vec<CourierCompany>,
}

#[derive(Debug, Deserialize)]
struct CourierCompany {
    courier_name: String,
    #[serde(default)]
    rate: f64,
}

impl ShiprocketClient {
    pub fn new(settings: Arc<SettingsService>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            http,
            settings,
            token: RwLock::new(None),
        })
    }

    async fn login(&self) -> Result<String> {
        let email = self
            .settings
            .get("shiprocket_email")
            .await
            .ok_or_else(|| anyhow!("shiprocket_email not configured"))?;
        let password = self
            .settings
            .get("shiprocket_password")
            .await
            .ok_or_else(|| anyhow!("shiprocket_password not configured"))?;

        let resp = self
            .http
            .post(format!("{}/auth/login", SHIPROCKET_BASE))
            .json(&serde_json::json!({ "email": email, "password": password }))
            .send()
            .await
            .context("Shiprocket login request failed")?;

        let body: LoginResponse = resp.json().await.context("Shiprocket login: bad response")?;
        let token = body
            .token
            .ok_or_else(|| anyhow!("Shiprocket login: no token in response"))?;

        info!("Shiprocket session token refreshed");
        Ok(token)
    }

    async fn ensure_token(&self) -> Result<String> {
        {
            let cached = self.token.read().await;
            if let Some(t) = cached.as_ref() {
                if t.fetched_at.elapsed() < TOKEN_TTL {
                    return Ok(t.token.clone());
                }
            }
        }

        let token = self.login().await?;
        let mut cached = self.token.write().await;
        *cached = Some(CachedToken {
            token: token.clone(),
            fetched_at: Instant::now(),
        });
        Ok(token)
    }

    async fn invalidate_token(&self) {
        let mut cached = self.token.write().await;
        *cached = None;
    }

    async fn fetch_serviceability(
        &self,
        token: &str,
        pickup_pincode: &str,
        delivery_pincode: &str,
    ) -> Result<reqwest::Response> {
        self.http
            .get(format!("{}/courier/serviceability/", SHIPROCKET_BASE))
            .bearer_auth(token)
            .query(&[
                ("pickup_postcode", pickup_pincode),
                ("delivery_postcode", delivery_pincode),
                ("weight", "0.5"),
                ("cod", "0"),
            ])
            .send()
            .await
            .context("Shiprocket serviceability request failed")
    }
}

#[async_trait]
impl ServiceabilitySource for ShiprocketClient {
    async fn serviceable_couriers(
        &self,
        pickup_pincode: &str,
        delivery_pincode: &str,
    ) -> Result<Vec<CourierOption>> {
        let token = self.ensure_token().await?;
        let mut resp = self
            .fetch_serviceability(&token, pickup_pincode, delivery_pincode)
            .await?;

        // Stale or revoked token: re-login once and retry.
        if resp.status() == reqwest::StatusCode::UNAUTHORIZED
            || resp.status() == reqwest::StatusCode::FORBIDDEN
        {
            warn!("Shiprocket token rejected, re-authenticating");
            self.invalidate_token().await;
            let token = self.ensure_token().await?;
            resp = self
                .fetch_serviceability(&token, pickup_pincode, delivery_pincode)
                .await?;
        }

        if !resp.status().is_success() {
            return Err(anyhow!("Shiprocket serviceability: HTTP {}", resp.status()));
        }

        let body: ServiceabilityResponse = resp
            .json()
            .await
            .context("Shiprocket serviceability: bad response")?;

        let couriers = body
            .data
            .map(|d| d.available_courier_companies)
            .unwrap_or_default()
            .into_iter()
            .map(|c| CourierOption {
                name: c.courier_name,
                rate: (c.rate * 100.0).round() as i64,
            })
            .collect();

        Ok(couriers)
    }
}
