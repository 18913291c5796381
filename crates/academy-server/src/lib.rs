//! Academy HTTP server
//!
//! Axum router for checkout, legacy redirects, Stripe webhooks and
//! enrollment claiming. The binary in `main.rs` wires configuration into
//! [`AppState`] and serves [`build_router`].

pub mod config;
pub mod handlers;
pub mod state;

use axum::{
    Router,
    routing::{get, post},
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::handlers::{
    checkout_link, claim_enrollments, create_checkout, health_check, legacy_redirect,
    list_enrollments, stripe_webhook,
};
pub use crate::state::AppState;

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let mut router = Router::new()
        // Health
        .route("/health", get(health_check))
        // Checkout
        .route("/api/checkout", post(create_checkout).get(checkout_link))
        // Enrollments
        .route("/api/enrollments", get(list_enrollments))
        .route("/api/enrollments/claim", post(claim_enrollments))
        // Stripe
        .route("/webhook/stripe", post(stripe_webhook));

    // Deprecated entry points
    for from in state.legacy_redirects.keys() {
        router = router.route(from, get(legacy_redirect));
    }

    router
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}
