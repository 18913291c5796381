//! Application State

use std::collections::HashMap;
use std::sync::Arc;

use academy_payments::{CheckoutResolver, EnrollmentNotifier, EnrollmentStore, WebhookHandler};

use crate::config::ServerConfig;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Checkout resolver (Stripe or a test gateway behind it)
    pub checkout: Arc<CheckoutResolver>,

    /// Enrollment records
    pub enrollments: Arc<dyn EnrollmentStore>,

    /// Stripe webhook processing
    pub webhooks: Arc<WebhookHandler<dyn EnrollmentStore>>,

    /// Stripe webhook signing secret (optional - webhooks disabled if None)
    pub webhook_secret: Option<Arc<str>>,

    /// Legacy path → canonical path
    pub legacy_redirects: Arc<HashMap<String, String>>,
}

impl AppState {
    pub fn new(
        checkout: CheckoutResolver,
        enrollments: Arc<dyn EnrollmentStore>,
        notifier: Option<EnrollmentNotifier>,
        config: &ServerConfig,
    ) -> Self {
        let mut webhooks = WebhookHandler::new(enrollments.clone());
        if let Some(notifier) = notifier {
            webhooks = webhooks.with_notifier(notifier);
        }

        let legacy_redirects = config
            .legacy_redirects
            .iter()
            .map(|r| (r.from.clone(), r.to.clone()))
            .collect();

        Self {
            checkout: Arc::new(checkout),
            enrollments,
            webhooks: Arc::new(webhooks),
            webhook_secret: config.webhook_secret.as_deref().map(Arc::from),
            legacy_redirects: Arc::new(legacy_redirects),
        }
    }
}
