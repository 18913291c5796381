//! Checkout Session Resolution
//!
//! One endpoint sells three unrelated catalogs. The resolver picks the
//! catalog for an incoming request, in this order (first match wins):
//!
//! 1. an explicit, non-empty `priceId` → generic one-time payment
//! 2. `mode` is `membership`/`subscription`, or `source` is `membership`
//!    → recurring membership
//! 3. anything else → cohort seat; `mode == "paid"` selects the paid tier,
//!    every other value falls back to the demo tier
//!
//! Parsing is lenient on purpose: a malformed body never blocks a visitor
//! from reaching checkout, it just lands on the cheapest cohort tier.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::{PriceCatalog, RedirectUrls};
use crate::error::{PaymentError, Result};
use crate::gateway::{CheckoutGateway, SessionMode, SessionParams};

/// Metadata keys attached to every Stripe session
pub mod metadata {
    pub const FLOW: &str = "flow";
    pub const SOURCE: &str = "source";
    pub const PRICE_ID: &str = "price_id";
    pub const COHORT_TIER: &str = "cohort_tier";
}

/// Cohort price tier
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CohortTier {
    Demo,
    Paid,
}

impl CohortTier {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Demo => "demo",
            Self::Paid => "paid",
        }
    }

    /// Only the exact string `paid` selects the paid tier
    pub fn from_mode(mode: Option<&str>) -> Self {
        match mode {
            Some("paid") => Self::Paid,
            _ => Self::Demo,
        }
    }
}

/// Purchase flow a request resolves to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "kind", content = "tier")]
pub enum Flow {
    /// Merch or any product addressed by explicit price id
    Generic,
    /// Recurring membership subscription
    Membership,
    /// Cohort seat
    Cohort(CohortTier),
}

impl Flow {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Generic => "generic",
            Self::Membership => "membership",
            Self::Cohort(_) => "cohort",
        }
    }

    pub const fn session_mode(self) -> SessionMode {
        match self {
            Self::Membership => SessionMode::Subscription,
            Self::Generic | Self::Cohort(_) => SessionMode::Payment,
        }
    }

    /// Rebuild a flow from session metadata written by [`CheckoutResolver`]
    pub fn from_metadata(flow: Option<&str>, tier: Option<&str>) -> Option<Self> {
        match flow? {
            "generic" => Some(Self::Generic),
            "membership" => Some(Self::Membership),
            "cohort" => Some(Self::Cohort(CohortTier::from_mode(tier))),
            _ => None,
        }
    }
}

/// Inbound checkout intent
///
/// Never persisted. Build it with [`CheckoutRequest::from_json_slice`] or
/// [`CheckoutRequest::from_query`]; both fall back to defaults instead of
/// rejecting bad input.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CheckoutRequest {
    /// demo | paid | payment | membership | subscription, or anything else
    pub mode: Option<String>,

    /// Explicit price; overrides mode-based resolution when non-empty
    pub price_id: Option<String>,

    /// Positive quantity, only honoured for the generic flow
    pub quantity: u64,

    /// Free-text origin tag
    pub source: Option<String>,

    /// Prefills the Stripe form and later keys enrollment claims
    pub email: Option<String>,
}

impl Default for CheckoutRequest {
    fn default() -> Self {
        Self {
            mode: None,
            price_id: None,
            quantity: 1,
            source: None,
            email: None,
        }
    }
}

impl CheckoutRequest {
    /// Parse a JSON body, treating anything unusable as absent
    pub fn from_json_slice(body: &[u8]) -> Self {
        match serde_json::from_slice::<Value>(body) {
            Ok(value) => Self::from_value(&value),
            Err(e) => {
                if !body.is_empty() {
                    tracing::debug!(error = %e, "Unparseable checkout body, using defaults");
                }
                Self::default()
            }
        }
    }

    /// Read fields from a JSON value; non-objects yield the defaults
    pub fn from_value(value: &Value) -> Self {
        let Some(obj) = value.as_object() else {
            return Self::default();
        };

        let field = |names: &[&str]| {
            names
                .iter()
                .find_map(|n| obj.get(*n))
                .and_then(Value::as_str)
        };

        Self {
            mode: field(&["mode"]).and_then(verbatim),
            price_id: field(&["priceId", "price_id"]).and_then(trimmed),
            quantity: obj
                .get("quantity")
                .and_then(positive_quantity)
                .unwrap_or(1),
            source: field(&["source"]).and_then(verbatim),
            email: field(&["email"]).and_then(trimmed),
        }
    }

    /// Read fields from query parameters (link-based entry point)
    pub fn from_query(params: &HashMap<String, String>) -> Self {
        let field = |names: &[&str]| names.iter().find_map(|n| params.get(*n)).map(String::as_str);

        Self {
            mode: field(&["mode"]).and_then(verbatim),
            price_id: field(&["priceId", "price_id"]).and_then(trimmed),
            quantity: field(&["quantity"])
                .and_then(|q| q.trim().parse::<u64>().ok())
                .filter(|q| *q > 0)
                .unwrap_or(1),
            source: field(&["source"]).and_then(verbatim),
            email: field(&["email"]).and_then(trimmed),
        }
    }

    fn has_membership_signal(&self) -> bool {
        matches!(self.mode.as_deref(), Some("membership" | "subscription"))
            || self.source.as_deref() == Some("membership")
    }
}

/// Selector values are compared exactly, so only emptiness makes them absent
fn verbatim(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

fn trimmed(value: &str) -> Option<String> {
    verbatim(value.trim())
}

fn positive_quantity(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    }
    .filter(|q| *q > 0)
}

/// What a request resolves to, before any provider call
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedCheckout {
    pub flow: Flow,
    pub price_id: String,
    pub quantity: u64,
}

/// Resolve a request against the price catalog
pub fn resolve(request: &CheckoutRequest, catalog: &PriceCatalog) -> ResolvedCheckout {
    if let Some(price_id) = request.price_id.as_deref().map(str::trim).filter(|p| !p.is_empty()) {
        return ResolvedCheckout {
            flow: Flow::Generic,
            price_id: price_id.to_string(),
            quantity: request.quantity.max(1),
        };
    }

    if request.has_membership_signal() {
        return ResolvedCheckout {
            flow: Flow::Membership,
            price_id: catalog.membership.clone(),
            quantity: 1,
        };
    }

    let tier = CohortTier::from_mode(request.mode.as_deref());
    ResolvedCheckout {
        flow: Flow::Cohort(tier),
        price_id: catalog.cohort(tier).to_string(),
        quantity: 1,
    }
}

/// Result of creating a checkout session
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CheckoutSession {
    /// Stripe session ID
    pub id: String,

    /// Hosted checkout page to send the visitor to
    pub url: String,

    /// Flow the session was created for
    pub flow: Flow,

    /// Metadata sent to Stripe
    pub metadata: HashMap<String, String>,
}

/// Resolves checkout intents and creates Stripe sessions
pub struct CheckoutResolver {
    gateway: Arc<dyn CheckoutGateway>,
    catalog: PriceCatalog,
    urls: RedirectUrls,
}

impl CheckoutResolver {
    pub fn new(gateway: Arc<dyn CheckoutGateway>, catalog: PriceCatalog, urls: RedirectUrls) -> Self {
        Self {
            gateway,
            catalog,
            urls,
        }
    }

    /// Whether the gateway holds a provider credential
    pub fn is_configured(&self) -> bool {
        self.gateway.is_configured()
    }

    pub fn catalog(&self) -> &PriceCatalog {
        &self.catalog
    }

    /// Resolve without creating anything
    pub fn resolve(&self, request: &CheckoutRequest) -> ResolvedCheckout {
        resolve(request, &self.catalog)
    }

    /// Resolve a request and create exactly one Stripe session for it
    ///
    /// Fails with [`PaymentError::Config`] before touching the gateway when no
    /// credential is configured, and with [`PaymentError::Upstream`] carrying
    /// Stripe's message when session creation fails.
    pub async fn create_session(
        &self,
        request: &CheckoutRequest,
        idempotency_key: Option<&str>,
    ) -> Result<CheckoutSession> {
        if !self.gateway.is_configured() {
            return Err(PaymentError::Config("STRIPE_SECRET_KEY not set".into()));
        }

        let resolved = self.resolve(request);
        let meta = session_metadata(&resolved, request.source.as_deref());
        let (success_url, cancel_url) = self.urls.for_flow(resolved.flow);

        let params = SessionParams {
            mode: resolved.flow.session_mode(),
            price_id: resolved.price_id.clone(),
            quantity: resolved.quantity,
            success_url: success_url.to_string(),
            cancel_url: cancel_url.to_string(),
            customer_email: request.email.clone(),
            metadata: meta.clone(),
            idempotency_key: idempotency_key.map(str::to_string),
        };

        tracing::info!(
            flow = resolved.flow.as_str(),
            price_id = %resolved.price_id,
            quantity = resolved.quantity,
            source = ?request.source,
            "Creating checkout session"
        );

        let created = self.gateway.create_session(params).await.inspect_err(|e| {
            tracing::error!(
                error = %e,
                flow = resolved.flow.as_str(),
                price_id = %resolved.price_id,
                "Checkout session creation failed"
            );
        })?;

        let url = created.url.ok_or_else(|| {
            PaymentError::Upstream(format!("No checkout URL returned for session {}", created.id))
        })?;

        Ok(CheckoutSession {
            id: created.id,
            url,
            flow: resolved.flow,
            metadata: meta,
        })
    }
}

fn session_metadata(resolved: &ResolvedCheckout, source: Option<&str>) -> HashMap<String, String> {
    let mut meta = HashMap::new();
    meta.insert(metadata::FLOW.to_string(), resolved.flow.as_str().to_string());
    meta.insert(metadata::PRICE_ID.to_string(), resolved.price_id.clone());
    if let Some(source) = source {
        meta.insert(metadata::SOURCE.to_string(), source.to_string());
    }
    if let Flow::Cohort(tier) = resolved.flow {
        meta.insert(metadata::COHORT_TIER.to_string(), tier.as_str().to_string());
    }
    meta
}
