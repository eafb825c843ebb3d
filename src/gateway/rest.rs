//! REST-backed gateway adapter.
//!
//! Holds a short-lived OAuth access token per adapter instance. Two requests
//! racing an expired token may each fetch a fresh one; correctness does not
//! depend on single-fetch.

use serde::Deserialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};

use crate::config::GatewayConfig;

use super::{GatewayError, PaymentGateway, PaymentLink, PaymentLinkRequest, signature};

/// Renew slightly before the gateway-reported expiry.
const TOKEN_EXPIRY_SLACK: Duration = Duration::from_secs(30);

struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

pub struct RestGateway {
    config: GatewayConfig,
    http: reqwest::Client,
    token: Mutex<Option<CachedToken>>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

impl RestGateway {
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
            token: Mutex::new(None),
        }
    }

    async fn access_token(&self) -> Result<String, GatewayError> {
        let mut slot = self.token.lock().await;
        if let Some(cached) = slot.as_ref() {
            if Instant::now() < cached.expires_at {
                return Ok(cached.access_token.clone());
            }
        }

        let response = self
            .http
            .post(format!("{}/oauth/token", self.config.base_url))
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", &self.config.client_id),
                ("client_secret", &self.config.client_secret),
            ])
            .send()
            .await
            .map_err(|e| GatewayError::Auth(e.to_string()))?;

        if !response.status().is_success() {
            return Err(GatewayError::Auth(format!(
                "token endpoint returned {}",
                response.status()
            )));
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::Auth(format!("unparseable token response: {e}")))?;

        let expires_in = Duration::from_secs(body.expires_in).saturating_sub(TOKEN_EXPIRY_SLACK);
        let token = body.access_token.clone();
        *slot = Some(CachedToken {
            access_token: body.access_token,
            expires_at: Instant::now() + expires_in,
        });

        Ok(token)
    }
}

#[async_trait::async_trait]
impl PaymentGateway for RestGateway {
    async fn create_payment_link(
        &self,
        request: &PaymentLinkRequest,
    ) -> Result<PaymentLink, GatewayError> {
        let token = self.access_token().await?;

        let response = self
            .http
            .post(format!("{}/payment-links", self.config.base_url))
            .bearer_auth(token)
            .json(request)
            .send()
            .await
            .map_err(|e| GatewayError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let raw: Value = response
            .json()
            .await
            .map_err(|e| GatewayError::Malformed(e.to_string()))?;

        let id = raw
            .get("id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| GatewayError::Malformed("missing id".into()))?
            .to_string();
        let short_url = raw
            .get("shortUrl")
            .and_then(|v| v.as_str())
            .ok_or_else(|| GatewayError::Malformed("missing shortUrl".into()))?
            .to_string();
        let state = raw
            .get("state")
            .and_then(|v| v.as_str())
            .unwrap_or("pending")
            .to_string();

        Ok(PaymentLink {
            id,
            short_url,
            amount: request.amount,
            currency: request.currency.clone(),
            state,
            raw,
        })
    }

    fn verify_payment(&self, amount_minor: &str, bank_order_code: &str, sig: &str) -> bool {
        signature::verify(
            amount_minor,
            bank_order_code,
            sig,
            &self.config.client_id,
            &self.config.client_secret,
        )
    }
}
