//! Academy HTTP Server
//!
//! Axum-based server for checkout, Stripe webhooks and enrollment claiming.

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use academy_payments::{
    CheckoutGateway, CheckoutResolver, EnrollmentNotifier, MemoryEnrollmentStore, PriceCatalog,
    RedirectUrls, StripeGateway,
};
use academy_server::{AppState, build_router, config::ServerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment first so RUST_LOG from .env applies
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env()?;

    // Payments
    let gateway = StripeGateway::from_env();
    if gateway.is_configured() {
        tracing::info!("✓ Stripe configured");
    } else {
        tracing::warn!("⚠ Stripe not configured - checkout will answer 500");
        tracing::warn!("  Set STRIPE_SECRET_KEY in .env");
    }
    if config.webhook_secret.is_none() {
        tracing::warn!("⚠ STRIPE_WEBHOOK_SECRET not set - webhooks disabled");
    }

    let catalog = PriceCatalog::from_env()?;
    tracing::info!(
        membership = %catalog.membership,
        cohort_demo = %catalog.cohort_demo,
        cohort_paid = %catalog.cohort_paid,
        "Price catalog loaded"
    );

    let resolver = CheckoutResolver::new(Arc::new(gateway), catalog, RedirectUrls::from_env());

    let notifier = EnrollmentNotifier::from_env()?;
    if let Some(ref notifier) = notifier {
        tracing::info!(url = %notifier.url(), "✓ Enrollment notifications enabled");
    }

    let state = AppState::new(
        resolver,
        Arc::new(MemoryEnrollmentStore::new()),
        notifier,
        &config,
    );

    let app = build_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;

    tracing::info!("🚀 academy server running on http://{}", config.bind_addr);
    tracing::info!("Endpoints:");
    tracing::info!("  GET  /health                 - Health check");
    tracing::info!("  POST /api/checkout           - Create checkout session");
    tracing::info!("  GET  /api/checkout           - Checkout link (redirects to Stripe)");
    tracing::info!("  POST /api/enrollments/claim  - Claim enrollments");
    tracing::info!("  GET  /api/enrollments        - List enrollments");
    tracing::info!("  POST /webhook/stripe         - Stripe webhooks");
    for redirect in &config.legacy_redirects {
        tracing::info!("  GET  {:<24} - 302 → {}", redirect.from, redirect.to);
    }

    axum::serve(listener, app).await?;

    Ok(())
}
