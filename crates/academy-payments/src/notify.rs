//! Outbound Enrollment Notifications
//!
//! Posts new enrollments to an external hook (CRM, community chat). Each
//! delivery runs as its own spawned task; failures are logged and never reach
//! the Stripe webhook response.

use std::time::Duration;

use hmac::{Hmac, Mac};
use serde_json::json;
use sha2::Sha256;
use tokio::task::JoinHandle;

use crate::enrollment::Enrollment;
use crate::error::{PaymentError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the body signature
pub const SIGNATURE_HEADER: &str = "x-academy-signature";

const DELIVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Notifies an external hook about new enrollments
#[derive(Clone, Debug)]
pub struct EnrollmentNotifier {
    client: reqwest::Client,
    url: String,
    signing_secret: Option<String>,
}

impl EnrollmentNotifier {
    pub fn new(url: impl Into<String>, signing_secret: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(DELIVERY_TIMEOUT)
            .build()
            .map_err(|e| PaymentError::Config(format!("notification client: {e}")))?;

        Ok(Self {
            client,
            url: url.into(),
            signing_secret,
        })
    }

    /// Create from `ENROLLMENT_WEBHOOK_URL` / `ENROLLMENT_WEBHOOK_SECRET`;
    /// `Ok(None)` when no URL is set
    pub fn from_env() -> Result<Option<Self>> {
        let Some(url) = std::env::var("ENROLLMENT_WEBHOOK_URL")
            .ok()
            .filter(|u| !u.trim().is_empty())
        else {
            return Ok(None);
        };
        let secret = std::env::var("ENROLLMENT_WEBHOOK_SECRET")
            .ok()
            .filter(|s| !s.is_empty());

        Self::new(url.trim(), secret).map(Some)
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Spawn delivery of an `enrollment.created` event
    pub fn dispatch(&self, enrollment: &Enrollment) -> JoinHandle<()> {
        let notifier = self.clone();
        let payload = json!({
            "event": "enrollment.created",
            "enrollment": enrollment,
        });
        let enrollment_id = enrollment.id.clone();

        tokio::spawn(async move {
            match notifier.deliver(&payload).await {
                Ok(()) => tracing::debug!(
                    enrollment_id = %enrollment_id,
                    url = %notifier.url,
                    "Enrollment notification delivered"
                ),
                Err(e) => tracing::warn!(
                    enrollment_id = %enrollment_id,
                    url = %notifier.url,
                    error = %e,
                    "Enrollment notification failed"
                ),
            }
        })
    }

    async fn deliver(&self, payload: &serde_json::Value) -> Result<()> {
        let body = serde_json::to_vec(payload)
            .map_err(|e| PaymentError::Upstream(format!("encode notification: {e}")))?;

        let mut request = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "application/json");
        if let Some(ref secret) = self.signing_secret {
            request = request.header(SIGNATURE_HEADER, format!("sha256={}", sign(secret, &body)?));
        }

        let response = request
            .body(body)
            .send()
            .await
            .map_err(|e| PaymentError::Upstream(e.to_string()))?;

        if !response.status().is_success() {
            return Err(PaymentError::Upstream(format!(
                "notification hook answered {}",
                response.status()
            )));
        }
        Ok(())
    }
}

/// Hex HMAC-SHA256 of `body`
pub fn sign(secret: &str, body: &[u8]) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| PaymentError::Config(format!("signing key: {e}")))?;
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkout::Flow;

    #[test]
    fn test_signature_matches_known_vector() {
        let sig = sign("key", b"The quick brown fox jumps over the lazy dog").unwrap();
        assert_eq!(
            sig,
            "f7bc83f430538424b13298e6aa6fb143ef4d59a14946175997479dbc2d1a3cd8"
        );
    }

    #[tokio::test]
    async fn test_failed_delivery_does_not_panic() {
        // Nothing listens on the discard port
        let notifier =
            EnrollmentNotifier::new("http://127.0.0.1:9/hooks/enrollment", Some("s3cret".into()))
                .unwrap();
        let enrollment = Enrollment::new("cs_1", "a@example.com", Flow::Membership);

        notifier.dispatch(&enrollment).await.unwrap();
    }
}
