/// Payment provider callback verification
///
/// The provider signs each notification with
/// `hex(SHA-512(order_id ‖ status_code ‖ gross_amount ‖ server_key))`.
/// Verification must run before anything inspects or acts on the payload.

use serde::Deserialize;
use sha2::{Digest, Sha512};

/// Compare two byte strings without an early exit on the first difference
///
/// Unequal lengths return `false` immediately; that only reveals the
/// length, which is public for fixed-size digests.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Inbound payment notification
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentNotification {
    pub order_id: String,
    pub status_code: String,
    pub gross_amount: String,
    pub signature_key: String,
    #[serde(default)]
    pub transaction_status: Option<String>,
    #[serde(default)]
    pub payment_type: Option<String>,
    #[serde(default)]
    pub fraud_status: Option<String>,
}

#[derive(Clone)]
pub struct WebhookSignatureVerifier {
    server_key: String,
}

impl WebhookSignatureVerifier {
    pub fn new(server_key: impl Into<String>) -> Self {
        Self {
            server_key: server_key.into(),
        }
    }

    /// Expected signature for the given fields, lowercase hex
    pub fn sign(order_id: &str, status_code: &str, gross_amount: &str, server_key: &str) -> String {
        let mut hasher = Sha512::new();
        hasher.update(order_id.as_bytes());
        hasher.update(status_code.as_bytes());
        hasher.update(gross_amount.as_bytes());
        hasher.update(server_key.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    pub fn verify(
        order_id: &str,
        status_code: &str,
        gross_amount: &str,
        presented_signature: &str,
        server_key: &str,
    ) -> bool {
        let expected = Self::sign(order_id, status_code, gross_amount, server_key);
        let presented = presented_signature.trim().to_ascii_lowercase();
        constant_time_eq(expected.as_bytes(), presented.as_bytes())
    }

    /// Verify a notification against the configured server key
    pub fn verify_notification(&self, notification: &PaymentNotification) -> bool {
        Self::verify(
            &notification.order_id,
            &notification.status_code,
            &notification.gross_amount,
            &notification.signature_key,
            &self.server_key,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SERVER_KEY: &str = "SB-Mid-server-test-key";

    fn notification() -> PaymentNotification {
        PaymentNotification {
            order_id: "INV-2024-0001".to_string(),
            status_code: "200".to_string(),
            gross_amount: "150000.00".to_string(),
            signature_key: WebhookSignatureVerifier::sign(
                "INV-2024-0001",
                "200",
                "150000.00",
                SERVER_KEY,
            ),
            transaction_status: Some("settlement".to_string()),
            payment_type: None,
            fraud_status: None,
        }
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"ab"));
        assert!(constant_time_eq(b"", b""));
    }

    #[test]
    fn test_signature_is_sha512_hex() {
        let signature = WebhookSignatureVerifier::sign("1", "200", "10.00", "key");
        assert_eq!(signature.len(), 128);
        assert!(signature.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_valid_notification() {
        let verifier = WebhookSignatureVerifier::new(SERVER_KEY);
        assert!(verifier.verify_notification(&notification()));
    }

    #[test]
    fn test_uppercase_signature_accepted() {
        let verifier = WebhookSignatureVerifier::new(SERVER_KEY);
        let mut n = notification();
        n.signature_key = n.signature_key.to_ascii_uppercase();
        assert!(verifier.verify_notification(&n));
    }

    #[test]
    fn test_any_altered_amount_byte_is_rejected() {
        let verifier = WebhookSignatureVerifier::new(SERVER_KEY);
        let original = notification();

        for i in 0..original.gross_amount.len() {
            let mut bytes = original.gross_amount.clone().into_bytes();
            bytes[i] = if bytes[i] == b'9' { b'8' } else { b'9' };
            let mut tampered = original.clone();
            tampered.gross_amount = String::from_utf8(bytes).unwrap();

            assert!(
                !verifier.verify_notification(&tampered),
                "altered byte {} was accepted",
                i
            );
        }
    }

    #[test]
    fn test_wrong_key_and_truncated_signature() {
        let n = notification();
        assert!(!WebhookSignatureVerifier::new("other-key").verify_notification(&n));

        let mut truncated = n.clone();
        truncated.signature_key.pop();
        assert!(!WebhookSignatureVerifier::new(SERVER_KEY).verify_notification(&truncated));
    }
}
