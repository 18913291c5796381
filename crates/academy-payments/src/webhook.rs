//! Stripe Webhook Handling
//!
//! Turns completed checkouts into enrollments and keeps membership
//! enrollments in step with their subscription.

use stripe::{Event, EventObject, EventType, Webhook};
use std::sync::Arc;

use crate::checkout::{Flow, metadata};
use crate::enrollment::{Enrollment, EnrollmentStore};
use crate::error::{PaymentError, Result};
use crate::notify::EnrollmentNotifier;

/// Parsed webhook event
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WebhookEvent {
    /// Checkout completed
    CheckoutCompleted {
        session_id: String,
        customer_email: Option<String>,
        /// `None` for sessions this service did not create
        flow: Option<Flow>,
        price_id: Option<String>,
        source: Option<String>,
        subscription_id: Option<String>,
    },

    /// Subscription status changed
    SubscriptionUpdated {
        subscription_id: String,
        status: String,
    },

    /// Subscription cancelled
    SubscriptionCancelled {
        subscription_id: String,
    },

    /// Unhandled event type
    Other {
        event_type: String,
    },
}

/// What handling an event did
#[derive(Clone, Debug)]
pub enum WebhookOutcome {
    /// New enrollment recorded
    Enrolled(Enrollment),
    /// Redelivery of an already recorded checkout
    Duplicate(Enrollment),
    /// Existing enrollment changed
    Updated(Enrollment),
    /// Nothing to store
    Ignored,
}

/// Webhook handler
pub struct WebhookHandler<S: EnrollmentStore + ?Sized> {
    store: Arc<S>,
    notifier: Option<EnrollmentNotifier>,
}

impl<S: EnrollmentStore + ?Sized> WebhookHandler<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store, notifier: None }
    }

    /// Announce new enrollments through `notifier`
    #[must_use]
    pub fn with_notifier(mut self, notifier: EnrollmentNotifier) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Verify webhook signature and parse event
    pub fn parse_event(&self, payload: &str, signature: &str, secret: &str) -> Result<Event> {
        Webhook::construct_event(payload, signature, secret)
            .map_err(|e| PaymentError::WebhookSignature(e.to_string()))
    }

    /// Process a verified Stripe event
    pub fn handle(&self, event: Event) -> Result<WebhookOutcome> {
        tracing::info!(event_type = ?event.type_, "Processing Stripe webhook");

        let parsed = parse_webhook_event(&event)?;
        self.apply(parsed)
    }

    /// Apply an already parsed event to the store
    pub fn apply(&self, event: WebhookEvent) -> Result<WebhookOutcome> {
        match event {
            WebhookEvent::CheckoutCompleted {
                session_id,
                customer_email,
                flow,
                price_id,
                source,
                subscription_id,
            } => {
                let flow = match flow {
                    Some(flow @ (Flow::Membership | Flow::Cohort(_))) => flow,
                    Some(Flow::Generic) => {
                        tracing::info!(
                            session_id = %session_id,
                            price_id = ?price_id,
                            "Store order completed"
                        );
                        return Ok(WebhookOutcome::Ignored);
                    }
                    None => {
                        tracing::debug!(session_id = %session_id, "Checkout without flow metadata");
                        return Ok(WebhookOutcome::Ignored);
                    }
                };

                let email = customer_email.unwrap_or_default();
                if email.is_empty() {
                    tracing::warn!(session_id = %session_id, "Checkout completed without an email, enrollment cannot be claimed");
                }

                let mut enrollment = Enrollment::new(session_id, &email, flow);
                enrollment.price_id = price_id;
                enrollment.source = source;
                enrollment.subscription_id = subscription_id;
                if let Some(existing) = self.store.insert_if_absent(&enrollment)? {
                    tracing::debug!(session_id = %existing.session_id, "Duplicate checkout delivery");
                    return Ok(WebhookOutcome::Duplicate(existing));
                }

                tracing::info!(
                    enrollment_id = %enrollment.id,
                    email = %enrollment.email,
                    flow = flow.as_str(),
                    "Created enrollment"
                );

                if let Some(ref notifier) = self.notifier {
                    let _delivery = notifier.dispatch(&enrollment);
                }

                Ok(WebhookOutcome::Enrolled(enrollment))
            }

            WebhookEvent::SubscriptionCancelled { subscription_id } => {
                let Some(mut enrollment) = self.store.get_by_subscription(&subscription_id)? else {
                    return Ok(WebhookOutcome::Ignored);
                };
                enrollment.deactivate();
                self.store.save(&enrollment)?;

                tracing::info!(
                    enrollment_id = %enrollment.id,
                    subscription_id = %subscription_id,
                    "Deactivated membership"
                );
                Ok(WebhookOutcome::Updated(enrollment))
            }

            WebhookEvent::SubscriptionUpdated { subscription_id, status } => {
                let Some(mut enrollment) = self.store.get_by_subscription(&subscription_id)? else {
                    return Ok(WebhookOutcome::Ignored);
                };

                let is_active = matches!(status.as_str(), "active" | "trialing");
                if is_active {
                    enrollment.reactivate();
                } else {
                    enrollment.deactivate();
                }
                self.store.save(&enrollment)?;

                tracing::info!(
                    enrollment_id = %enrollment.id,
                    status = %status,
                    active = is_active,
                    "Updated membership"
                );
                Ok(WebhookOutcome::Updated(enrollment))
            }

            WebhookEvent::Other { event_type } => {
                tracing::debug!(event_type = %event_type, "Unhandled webhook event");
                Ok(WebhookOutcome::Ignored)
            }
        }
    }
}

/// Parse Stripe event into our event type
fn parse_webhook_event(event: &Event) -> Result<WebhookEvent> {
    match event.type_ {
        EventType::CheckoutSessionCompleted => {
            let EventObject::CheckoutSession(session) = &event.data.object else {
                return Err(PaymentError::WebhookParse("Invalid checkout session data".into()));
            };

            let meta = |key: &str| {
                session
                    .metadata
                    .as_ref()
                    .and_then(|m| m.get(key))
                    .cloned()
            };

            let customer_email = session.customer_email.clone().or_else(|| {
                session
                    .customer_details
                    .as_ref()
                    .and_then(|d| d.email.clone())
            });

            Ok(WebhookEvent::CheckoutCompleted {
                session_id: session.id.to_string(),
                customer_email,
                flow: Flow::from_metadata(
                    meta(metadata::FLOW).as_deref(),
                    meta(metadata::COHORT_TIER).as_deref(),
                ),
                price_id: meta(metadata::PRICE_ID),
                source: meta(metadata::SOURCE),
                subscription_id: session.subscription.as_ref().map(|s| s.id().to_string()),
            })
        }

        EventType::CustomerSubscriptionUpdated => {
            let EventObject::Subscription(sub) = &event.data.object else {
                return Err(PaymentError::WebhookParse("Invalid subscription data".into()));
            };
            Ok(WebhookEvent::SubscriptionUpdated {
                subscription_id: sub.id.to_string(),
                status: sub.status.to_string(),
            })
        }

        EventType::CustomerSubscriptionDeleted => {
            let EventObject::Subscription(sub) = &event.data.object else {
                return Err(PaymentError::WebhookParse("Invalid subscription data".into()));
            };
            Ok(WebhookEvent::SubscriptionCancelled {
                subscription_id: sub.id.to_string(),
            })
        }

        _ => Ok(WebhookEvent::Other {
            event_type: format!("{:?}", event.type_),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkout::CohortTier;
    use crate::enrollment::MemoryEnrollmentStore;

    fn completed(session_id: &str, flow: Option<Flow>) -> WebhookEvent {
        WebhookEvent::CheckoutCompleted {
            session_id: session_id.into(),
            customer_email: Some("Student@Example.com".into()),
            flow,
            price_id: Some("price_cohort_paid".into()),
            source: Some("pricing-page".into()),
            subscription_id: None,
        }
    }

    #[test]
    fn test_cohort_checkout_creates_enrollment() {
        let store = Arc::new(MemoryEnrollmentStore::new());
        let handler = WebhookHandler::new(store.clone());

        let outcome = handler
            .apply(completed("cs_1", Some(Flow::Cohort(CohortTier::Paid))))
            .unwrap();

        let WebhookOutcome::Enrolled(enrollment) = outcome else {
            panic!("expected enrollment, got {outcome:?}");
        };
        assert_eq!(enrollment.email, "student@example.com");
        assert_eq!(enrollment.flow, Flow::Cohort(CohortTier::Paid));
        assert_eq!(enrollment.source.as_deref(), Some("pricing-page"));
        assert!(store.get_by_session("cs_1").unwrap().is_some());
    }

    #[test]
    fn test_redelivery_is_idempotent() {
        let store = Arc::new(MemoryEnrollmentStore::new());
        let handler = WebhookHandler::new(store.clone());

        handler.apply(completed("cs_1", Some(Flow::Membership))).unwrap();
        let outcome = handler.apply(completed("cs_1", Some(Flow::Membership))).unwrap();

        assert!(matches!(outcome, WebhookOutcome::Duplicate(_)));
        assert_eq!(store.claim("student@example.com", "user_1").unwrap().len(), 1);
    }

    #[test]
    fn test_store_orders_and_foreign_sessions_are_ignored() {
        let store = Arc::new(MemoryEnrollmentStore::new());
        let handler = WebhookHandler::new(store.clone());

        assert!(matches!(
            handler.apply(completed("cs_merch", Some(Flow::Generic))).unwrap(),
            WebhookOutcome::Ignored
        ));
        assert!(matches!(
            handler.apply(completed("cs_link", None)).unwrap(),
            WebhookOutcome::Ignored
        ));
        assert!(store.get_by_session("cs_merch").unwrap().is_none());
    }

    #[test]
    fn test_subscription_lifecycle() {
        let store = Arc::new(MemoryEnrollmentStore::new());
        let handler = WebhookHandler::new(store.clone());

        handler
            .apply(WebhookEvent::CheckoutCompleted {
                session_id: "cs_1".into(),
                customer_email: Some("member@example.com".into()),
                flow: Some(Flow::Membership),
                price_id: Some("price_membership".into()),
                source: None,
                subscription_id: Some("sub_1".into()),
            })
            .unwrap();

        handler
            .apply(WebhookEvent::SubscriptionUpdated {
                subscription_id: "sub_1".into(),
                status: "past_due".into(),
            })
            .unwrap();
        assert!(!store.get_by_subscription("sub_1").unwrap().unwrap().active);

        handler
            .apply(WebhookEvent::SubscriptionUpdated {
                subscription_id: "sub_1".into(),
                status: "active".into(),
            })
            .unwrap();
        assert!(store.get_by_subscription("sub_1").unwrap().unwrap().active);

        let outcome = handler
            .apply(WebhookEvent::SubscriptionCancelled {
                subscription_id: "sub_1".into(),
            })
            .unwrap();
        assert!(matches!(outcome, WebhookOutcome::Updated(ref e) if !e.active));
    }

    #[test]
    fn test_unknown_subscription_is_ignored() {
        let handler = WebhookHandler::new(Arc::new(MemoryEnrollmentStore::new()));
        let outcome = handler
            .apply(WebhookEvent::SubscriptionCancelled {
                subscription_id: "sub_missing".into(),
            })
            .unwrap();
        assert!(matches!(outcome, WebhookOutcome::Ignored));
    }

    #[test]
    fn test_bad_signature_is_rejected() {
        let handler = WebhookHandler::new(Arc::new(MemoryEnrollmentStore::new()));
        let err = handler
            .parse_event(r#"{"id":"evt_1"}"#, "t=1,v1=deadbeef", "whsec_test")
            .unwrap_err();
        assert!(matches!(err, PaymentError::WebhookSignature(_)));
    }

    #[test]
    fn test_concurrent_redelivery_enrolls_once() {
        let store = Arc::new(MemoryEnrollmentStore::new());
        let handler = Arc::new(WebhookHandler::new(store.clone()));
        let barrier = Arc::new(std::sync::Barrier::new(4));

        let deliveries: Vec<_> = (0..4)
            .map(|_| {
                let handler = Arc::clone(&handler);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    handler.apply(completed("cs_race", Some(Flow::Membership))).unwrap()
                })
            })
            .collect();

        let enrolled = deliveries
            .into_iter()
            .map(|d| d.join().unwrap())
            .filter(|outcome| matches!(outcome, WebhookOutcome::Enrolled(_)))
            .count();
        assert_eq!(enrolled, 1);
        assert_eq!(store.claim("student@example.com", "user_1").unwrap().len(), 1);
    }

    #[test]
    fn test_parse_checkout_session_event() {
        let event: Event = serde_json::from_value(serde_json::json!({
            "id": "evt_1",
            "object": "event",
            "created": 1_700_000_000,
            "data": { "object": {
                "id": "cs_1",
                "object": "checkout.session",
                "automatic_tax": { "enabled": false },
                "created": 1_700_000_000,
                "custom_fields": [],
                "custom_text": {},
                "customer_email": "form@example.com",
                "customer_details": { "email": "details@example.com" },
                "expires_at": 1_700_086_400,
                "livemode": false,
                "metadata": { "flow": "membership", "source": "membership" },
                "mode": "subscription",
                "payment_method_types": ["card"],
                "payment_status": "paid",
                "shipping_options": [],
                "subscription": "sub_1"
            }},
            "livemode": false,
            "pending_webhooks": 1,
            "type": "checkout.session.completed"
        }))
        .unwrap();

        assert_eq!(
            parse_webhook_event(&event).unwrap(),
            WebhookEvent::CheckoutCompleted {
                session_id: "cs_1".into(),
                customer_email: Some("form@example.com".into()),
                flow: Some(Flow::Membership),
                price_id: None,
                source: Some("membership".into()),
                subscription_id: Some("sub_1".into()),
            }
        );
    }
}
