//! Payment gateway adapters.
//!
//! The variant is a startup-time decision: `gateway_for` picks the REST
//! adapter or the mock from configuration, and everything downstream talks to
//! the `PaymentGateway` trait.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use utoipa::ToSchema;

use crate::config::GatewayConfig;

pub mod mock;
pub mod rest;
pub mod signature;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("gateway authentication failed: {0}")]
    Auth(String),

    #[error("gateway request failed: {0}")]
    Http(String),

    #[error("gateway rejected the request ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("malformed gateway response: {0}")]
    Malformed(String),
}

/// Payload for a hosted payment link, as received from the storefront proxy.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaymentLinkRequest {
    pub reference: String,
    pub concept: String,
    /// Minor currency units.
    pub amount: i64,
    pub currency: String,
    pub description: String,
    pub url_success: String,
    pub url_failed: String,
    pub client: Option<ClientDetails>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClientDetails {
    pub name: String,
    pub last_name: String,
    pub address: String,
    pub phone: String,
    pub email: String,
    pub country_iso: String,
}

/// A hosted payment link created at the gateway.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaymentLink {
    pub id: String,
    pub short_url: String,
    pub amount: i64,
    pub currency: String,
    pub state: String,
    /// Raw gateway fields, passed through to the storefront untouched.
    pub raw: Value,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_payment_link(
        &self,
        request: &PaymentLinkRequest,
    ) -> Result<PaymentLink, GatewayError>;

    /// Checks a webhook signature against the gateway credentials.
    /// Never fails on a wrong signature; it simply returns false.
    fn verify_payment(&self, amount_minor: &str, bank_order_code: &str, signature: &str) -> bool;
}

pub fn gateway_for(config: &GatewayConfig) -> Arc<dyn PaymentGateway> {
    if config.mock_mode {
        Arc::new(mock::MockGateway)
    } else {
        Arc::new(rest::RestGateway::new(config.clone()))
    }
}
