//! Checkout Configuration
//!
//! Fixed Stripe price ids and the redirect URLs handed to Stripe for each
//! flow. Both are built once at startup and injected into the resolver.

use serde::{Deserialize, Serialize};

use crate::checkout::{CohortTier, Flow};
use crate::error::{PaymentError, Result};

/// Placeholder Stripe substitutes with the session id on redirect
pub const SESSION_ID_PLACEHOLDER: &str = "{CHECKOUT_SESSION_ID}";

/// Fixed price ids for the membership and cohort catalogs
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceCatalog {
    /// Recurring membership price
    pub membership: String,

    /// Cohort seat, demo tier
    pub cohort_demo: String,

    /// Cohort seat, paid tier
    pub cohort_paid: String,
}

impl PriceCatalog {
    pub fn new(
        membership: impl Into<String>,
        cohort_demo: impl Into<String>,
        cohort_paid: impl Into<String>,
    ) -> Self {
        Self {
            membership: membership.into(),
            cohort_demo: cohort_demo.into(),
            cohort_paid: cohort_paid.into(),
        }
    }

    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        Ok(Self::new(
            required_env("STRIPE_PRICE_MEMBERSHIP")?,
            required_env("STRIPE_PRICE_COHORT_DEMO")?,
            required_env("STRIPE_PRICE_COHORT_PAID")?,
        ))
    }

    /// Price id for a cohort tier
    pub fn cohort(&self, tier: CohortTier) -> &str {
        match tier {
            CohortTier::Demo => &self.cohort_demo,
            CohortTier::Paid => &self.cohort_paid,
        }
    }
}

/// Success/cancel URLs per flow
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedirectUrls {
    pub merch_success: String,
    pub merch_cancel: String,
    pub membership_success: String,
    pub membership_cancel: String,
    pub cohort_success: String,
    pub cohort_cancel: String,
}

impl RedirectUrls {
    /// Default page layout under a public site origin
    pub fn for_site(site_url: &str) -> Self {
        let site = site_url.trim_end_matches('/');
        Self {
            merch_success: format!("{site}/store/success?session_id={SESSION_ID_PLACEHOLDER}"),
            merch_cancel: format!("{site}/store"),
            membership_success: format!(
                "{site}/students/lounge?membership=success&session_id={SESSION_ID_PLACEHOLDER}"
            ),
            membership_cancel: format!("{site}/membership"),
            cohort_success: format!("{site}/checkout/success?session_id={SESSION_ID_PLACEHOLDER}"),
            cohort_cancel: format!("{site}/checkout"),
        }
    }

    /// Create from `SITE_URL`, defaulting to a local dev origin
    pub fn from_env() -> Self {
        let site = std::env::var("SITE_URL")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| "http://localhost:3000".into());
        Self::for_site(&site)
    }

    /// `(success_url, cancel_url)` for a flow
    pub fn for_flow(&self, flow: Flow) -> (&str, &str) {
        match flow {
            Flow::Generic => (&self.merch_success, &self.merch_cancel),
            Flow::Membership => (&self.membership_success, &self.membership_cancel),
            Flow::Cohort(_) => (&self.cohort_success, &self.cohort_cancel),
        }
    }
}

fn required_env(name: &str) -> Result<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| PaymentError::Config(format!("{name} not set")))
}
