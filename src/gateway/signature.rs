//! Webhook signature scheme.
//!
//! The gateway signs its notifications with
//! `SHA256(bank_order_code + client_id + hex(SHA1(client_secret)) + amount)`,
//! hex-encoded, where `+` is plain string concatenation and `amount` is the
//! decimal text of the original amount in minor units.

use sha1::Sha1;
use sha2::{Digest, Sha256};

pub fn expected_signature(
    amount_minor: &str,
    bank_order_code: &str,
    client_id: &str,
    client_secret: &str,
) -> String {
    let secret_digest = hex::encode(Sha1::digest(client_secret.as_bytes()));
    let material = format!("{bank_order_code}{client_id}{secret_digest}{amount_minor}");
    hex::encode(Sha256::digest(material.as_bytes()))
}

/// Case-sensitive comparison against the supplied hex signature.
pub fn verify(
    amount_minor: &str,
    bank_order_code: &str,
    supplied_signature: &str,
    client_id: &str,
    client_secret: &str,
) -> bool {
    expected_signature(amount_minor, bank_order_code, client_id, client_secret)
        == supplied_signature
}

#[cfg(test)]
mod tests {
    use super::*;

    const AMOUNT: &str = "2999";
    const ORDER_CODE: &str = "BANK-0042";
    const CLIENT_ID: &str = "client-abc";
    const CLIENT_SECRET: &str = "s3cret";

    #[test]
    fn signature_is_deterministic() {
        let a = expected_signature(AMOUNT, ORDER_CODE, CLIENT_ID, CLIENT_SECRET);
        let b = expected_signature(AMOUNT, ORDER_CODE, CLIENT_ID, CLIENT_SECRET);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn signature_changes_with_each_input() {
        let base = expected_signature(AMOUNT, ORDER_CODE, CLIENT_ID, CLIENT_SECRET);
        assert_ne!(
            base,
            expected_signature("3000", ORDER_CODE, CLIENT_ID, CLIENT_SECRET)
        );
        assert_ne!(
            base,
            expected_signature(AMOUNT, "BANK-0043", CLIENT_ID, CLIENT_SECRET)
        );
        assert_ne!(
            base,
            expected_signature(AMOUNT, ORDER_CODE, "client-xyz", CLIENT_SECRET)
        );
        assert_ne!(
            base,
            expected_signature(AMOUNT, ORDER_CODE, CLIENT_ID, "other-secret")
        );
    }

    #[test]
    fn verify_accepts_the_expected_signature() {
        let signature = expected_signature(AMOUNT, ORDER_CODE, CLIENT_ID, CLIENT_SECRET);
        assert!(verify(
            AMOUNT,
            ORDER_CODE,
            &signature,
            CLIENT_ID,
            CLIENT_SECRET
        ));
    }

    #[test]
    fn verify_is_case_sensitive() {
        let signature =
            expected_signature(AMOUNT, ORDER_CODE, CLIENT_ID, CLIENT_SECRET).to_uppercase();
        assert!(!verify(
            AMOUNT,
            ORDER_CODE,
            &signature,
            CLIENT_ID,
            CLIENT_SECRET
        ));
    }

    #[test]
    fn verify_rejects_garbage() {
        assert!(!verify(
            AMOUNT,
            ORDER_CODE,
            "deadbeef",
            CLIENT_ID,
            CLIENT_SECRET
        ));
    }
}
