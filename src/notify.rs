//! Outbound notifications fired after a payment settles. Both calls are
//! fire-and-forget from the caller's point of view; failures are logged and
//! never roll back the payment.

use anyhow::Context;
use serde_json::json;

use crate::{
    config::NotifyConfig,
    models::{OrderEntity, PaymentOrderEntity},
};

pub struct NotificationClient {
    http: reqwest::Client,
    email_url: Option<String>,
    stats_url: Option<String>,
}

impl NotificationClient {
    pub fn new(http: reqwest::Client, config: &NotifyConfig) -> Self {
        Self {
            http,
            email_url: config.email_url.clone(),
            stats_url: config.stats_url.clone(),
        }
    }

    /// Asks the mailer service to send the customer their confirmation.
    pub async fn send_order_confirmation(&self, order: &OrderEntity) -> anyhow::Result<()> {
        let Some(url) = self.email_url.as_deref() else {
            tracing::debug!("email notifications disabled, skipping order {}", order.id);
            return Ok(());
        };

        self.http
            .post(url)
            .json(&json!({
                "orderId": order.id,
                "customerId": order.customer_id,
                "packageName": order.package_name,
                "totalCents": order.total_cents,
                "currency": order.currency,
            }))
            .send()
            .await
            .context("Failed to reach email service")?
            .error_for_status()
            .context("Email service rejected the confirmation")?;

        Ok(())
    }

    /// Records the settled purchase with the stats service.
    pub async fn register_purchase(
        &self,
        order: &OrderEntity,
        payment: &PaymentOrderEntity,
    ) -> anyhow::Result<()> {
        let Some(url) = self.stats_url.as_deref() else {
            tracing::debug!("stats notifications disabled, skipping order {}", order.id);
            return Ok(());
        };

        self.http
            .post(url)
            .json(&json!({
                "orderId": order.id,
                "paymentOrderId": payment.id,
                "customerId": order.customer_id,
                "packageId": order.package_id,
                "amountCents": payment.amount_cents,
                "currency": payment.currency,
                "method": payment.method,
            }))
            .send()
            .await
            .context("Failed to reach stats service")?
            .error_for_status()
            .context("Stats service rejected the purchase record")?;

        Ok(())
    }
}
