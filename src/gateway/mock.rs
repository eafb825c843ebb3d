//! Mock gateway for non-production configurations: synthesizes a plausible
//! pending payment link and accepts every signature.

use serde_json::json;
use uuid::Uuid;

use super::{GatewayError, PaymentGateway, PaymentLink, PaymentLinkRequest};

pub struct MockGateway;

#[async_trait::async_trait]
impl PaymentGateway for MockGateway {
    async fn create_payment_link(
        &self,
        request: &PaymentLinkRequest,
    ) -> Result<PaymentLink, GatewayError> {
        let id = format!("mock-{}", Uuid::new_v4().simple());
        let short_url = format!("https://pay.example.test/l/{id}");
        let raw = json!({
            "id": id,
            "shortUrl": short_url,
            "amount": request.amount,
            "currency": request.currency,
            "reference": request.reference,
            "state": "pending",
        });

        Ok(PaymentLink {
            id,
            short_url,
            amount: request.amount,
            currency: request.currency.clone(),
            state: "pending".into(),
            raw,
        })
    }

    fn verify_payment(&self, _amount_minor: &str, _bank_order_code: &str, _sig: &str) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> PaymentLinkRequest {
        PaymentLinkRequest {
            reference: "ref-1".into(),
            concept: "Week Starter".into(),
            amount: 2999,
            currency: "EUR".into(),
            description: "3 meals, 3 deliveries".into(),
            url_success: "https://shop.example/thanks".into(),
            url_failed: "https://shop.example/failed".into(),
            client: None,
        }
    }

    #[tokio::test]
    async fn synthesizes_a_pending_link() {
        let link = MockGateway.create_payment_link(&request()).await.unwrap();
        assert!(link.id.starts_with("mock-"));
        assert!(link.short_url.contains(&link.id));
        assert_eq!(link.state, "pending");
        assert_eq!(link.amount, 2999);
        assert_eq!(link.raw["reference"], "ref-1");
    }

    #[tokio::test]
    async fn links_get_distinct_ids() {
        let a = MockGateway.create_payment_link(&request()).await.unwrap();
        let b = MockGateway.create_payment_link(&request()).await.unwrap();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn accepts_any_signature() {
        assert!(MockGateway.verify_payment("2999", "BANK-1", "whatever"));
    }
}
