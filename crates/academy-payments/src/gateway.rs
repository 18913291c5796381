//! Stripe Checkout Gateway
//!
//! The resolver only talks to Stripe through [`CheckoutGateway`], so tests can
//! count calls without a network.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use stripe::{
    CheckoutSession as StripeCheckoutSession, CheckoutSessionMode, Client,
    CreateCheckoutSession, CreateCheckoutSessionLineItems, RequestStrategy,
};

use crate::error::{PaymentError, Result};

/// Stripe session mode
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    /// One-time payment
    Payment,
    /// Recurring subscription
    Subscription,
}

/// Everything needed for one "create checkout session" call
#[derive(Clone, Debug)]
pub struct SessionParams {
    pub mode: SessionMode,
    pub price_id: String,
    pub quantity: u64,
    pub success_url: String,
    pub cancel_url: String,
    pub customer_email: Option<String>,
    pub metadata: HashMap<String, String>,
    /// Forwarded to Stripe so retried submissions collapse into one session
    pub idempotency_key: Option<String>,
}

/// Session as returned by the provider
#[derive(Clone, Debug)]
pub struct CreatedSession {
    pub id: String,
    pub url: Option<String>,
}

/// Payments provider seam
#[async_trait]
pub trait CheckoutGateway: Send + Sync {
    /// Whether a provider credential is available
    fn is_configured(&self) -> bool;

    /// Create one hosted checkout session
    async fn create_session(&self, params: SessionParams) -> Result<CreatedSession>;
}

/// Stripe-backed gateway
///
/// Holds no client when the secret key is missing; the server still starts
/// and checkout requests answer with a configuration error.
pub struct StripeGateway {
    client: Option<Client>,
}

impl StripeGateway {
    /// Create a gateway with a secret key
    pub fn new(secret_key: &str) -> Self {
        Self {
            client: Some(Client::new(secret_key)),
        }
    }

    /// A gateway that refuses every call
    pub const fn unconfigured() -> Self {
        Self { client: None }
    }

    /// Create from `STRIPE_SECRET_KEY`
    pub fn from_env() -> Self {
        match std::env::var("STRIPE_SECRET_KEY") {
            Ok(key) if !key.trim().is_empty() => Self::new(key.trim()),
            _ => Self::unconfigured(),
        }
    }
}

#[async_trait]
impl CheckoutGateway for StripeGateway {
    fn is_configured(&self) -> bool {
        self.client.is_some()
    }

    async fn create_session(&self, params: SessionParams) -> Result<CreatedSession> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| PaymentError::Config("STRIPE_SECRET_KEY not set".into()))?;

        let client = match &params.idempotency_key {
            Some(key) => client.clone().with_strategy(RequestStrategy::Idempotent(key.clone())),
            None => client.clone(),
        };

        let mut create = CreateCheckoutSession::new();
        create.success_url = Some(&params.success_url);
        create.cancel_url = Some(&params.cancel_url);
        create.customer_email = params.customer_email.as_deref();
        create.mode = Some(match params.mode {
            SessionMode::Payment => CheckoutSessionMode::Payment,
            SessionMode::Subscription => CheckoutSessionMode::Subscription,
        });
        create.metadata = Some(params.metadata.clone());
        create.line_items = Some(vec![CreateCheckoutSessionLineItems {
            price: Some(params.price_id.clone()),
            quantity: Some(params.quantity),
            ..Default::default()
        }]);

        let session = StripeCheckoutSession::create(&client, create)
            .await
            .map_err(|e| PaymentError::Upstream(e.to_string()))?;

        tracing::debug!(session_id = %session.id, "Stripe checkout session created");

        Ok(CreatedSession {
            id: session.id.to_string(),
            url: session.url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> SessionParams {
        SessionParams {
            mode: SessionMode::Payment,
            price_id: "price_cohort_demo".into(),
            quantity: 1,
            success_url: "https://school.example/checkout/success".into(),
            cancel_url: "https://school.example/checkout".into(),
            customer_email: None,
            metadata: HashMap::new(),
            idempotency_key: None,
        }
    }

    #[test]
    fn test_configured_flag() {
        assert!(StripeGateway::new("sk_test_xxx").is_configured());
        assert!(!StripeGateway::unconfigured().is_configured());
    }

    #[tokio::test]
    async fn test_unconfigured_gateway_rejects() {
        let err = StripeGateway::unconfigured()
            .create_session(params())
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::Config(_)));
    }
}
