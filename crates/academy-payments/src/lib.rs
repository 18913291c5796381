//! # academy-payments
//!
//! Checkout resolution and Stripe integration for the academy site.
//!
//! ## Checkout flow
//!
//! One endpoint serves three catalogs (store items, the membership, cohort
//! seats). [`CheckoutResolver`] maps a request onto exactly one of them and
//! creates a hosted Stripe Checkout session:
//!
//! ```text
//! ┌─────────────┐     ┌──────────────────┐     ┌─────────────────┐
//! │  Site form  │────▶│ CheckoutResolver │────▶│  Stripe Hosted  │
//! │  or link    │     │ (priceId/mode/   │     │  Checkout Page  │
//! └─────────────┘     │  source)         │     └────────┬────────┘
//!                     └──────────────────┘              │ webhook
//!                                                       ▼
//!                     ┌──────────────────┐     ┌─────────────────┐
//!                     │ EnrollmentStore  │◀────│ WebhookHandler  │
//!                     │ (claimed later)  │     │                 │
//!                     └──────────────────┘     └─────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use academy_payments::{CheckoutRequest, CheckoutResolver, PriceCatalog, RedirectUrls, StripeGateway};
//!
//! let resolver = CheckoutResolver::new(
//!     Arc::new(StripeGateway::from_env()),
//!     PriceCatalog::from_env()?,
//!     RedirectUrls::from_env(),
//! );
//!
//! let request = CheckoutRequest::from_json_slice(br#"{"mode": "paid"}"#);
//! let session = resolver.create_session(&request, None).await?;
//!
//! // Redirect user to: session.url
//! ```

mod checkout;
mod config;
mod enrollment;
mod error;
mod gateway;
mod notify;
mod webhook;

pub use checkout::{
    CheckoutRequest, CheckoutResolver, CheckoutSession, CohortTier, Flow, ResolvedCheckout,
    metadata, resolve,
};
pub use config::{PriceCatalog, RedirectUrls, SESSION_ID_PLACEHOLDER};
pub use enrollment::{Enrollment, EnrollmentId, EnrollmentStore, MemoryEnrollmentStore};
pub use error::{PaymentError, Result};
pub use gateway::{CheckoutGateway, CreatedSession, SessionMode, SessionParams, StripeGateway};
pub use notify::{EnrollmentNotifier, SIGNATURE_HEADER};
pub use webhook::{WebhookEvent, WebhookHandler, WebhookOutcome};
