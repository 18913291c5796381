//! Payment Error Types

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, PaymentError>;

/// Payment-related errors
#[derive(Error, Debug)]
pub enum PaymentError {
    /// Missing or unusable configuration (e.g. no Stripe secret key)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Stripe rejected or failed the request
    #[error("Stripe error: {0}")]
    Upstream(String),

    /// Webhook signature verification failed
    #[error("Webhook signature invalid: {0}")]
    WebhookSignature(String),

    /// Webhook payload parsing failed
    #[error("Webhook parse error: {0}")]
    WebhookParse(String),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(String),
}

impl PaymentError {
    /// Message relayed to the caller alongside the error code.
    ///
    /// Upstream failures carry Stripe's own message in `details` instead,
    /// see [`PaymentError::details`].
    pub fn user_message(&self) -> &str {
        match self {
            Self::Config(_) => "Payments are not configured.",
            Self::Upstream(_) => "Unable to create checkout session.",
            Self::WebhookSignature(_) => "Invalid signature.",
            Self::WebhookParse(_) => "Invalid webhook payload.",
            Self::Storage(_) => "An error occurred processing your request.",
        }
    }

    /// Provider message for diagnostics, only for upstream failures
    pub fn details(&self) -> Option<&str> {
        match self {
            Self::Upstream(msg) => Some(msg.as_str()),
            _ => None,
        }
    }

    /// Stable machine-readable code
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Config(_) => "PAYMENTS_NOT_CONFIGURED",
            Self::Upstream(_) => "CHECKOUT_ERROR",
            Self::WebhookSignature(_) => "INVALID_SIGNATURE",
            Self::WebhookParse(_) => "INVALID_WEBHOOK",
            Self::Storage(_) => "STORAGE_ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_details_are_kept() {
        let err = PaymentError::Upstream("No such price: 'price_bogus'".into());
        assert_eq!(err.details(), Some("No such price: 'price_bogus'"));
        assert_eq!(err.code(), "CHECKOUT_ERROR");
    }

    #[test]
    fn test_config_has_no_details() {
        let err = PaymentError::Config("STRIPE_SECRET_KEY not set".into());
        assert!(err.details().is_none());
        assert_eq!(err.user_message(), "Payments are not configured.");
    }
}
