//! HTTP Handlers

use std::collections::HashMap;

use axum::{
    Json,
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, StatusCode, Uri, header},
    response::{IntoResponse, Redirect, Response},
};
use serde::{Deserialize, Serialize};

use academy_payments::{CheckoutRequest, Enrollment, PaymentError};

use crate::state::AppState;

/// Header clients may send to make checkout submissions retry-safe
pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

// ============================================================================
// Response Types
// ============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub payments_configured: bool,
    pub webhooks_configured: bool,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    fn new(error: impl Into<String>, code: &str) -> Self {
        Self {
            error: error.into(),
            code: code.into(),
            details: None,
        }
    }
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn payment_error(err: &PaymentError) -> ApiError {
    let status = match err {
        PaymentError::Config(_) | PaymentError::Upstream(_) | PaymentError::Storage(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
        PaymentError::WebhookSignature(_) | PaymentError::WebhookParse(_) => StatusCode::BAD_REQUEST,
    };

    (
        status,
        Json(ErrorResponse {
            error: err.user_message().into(),
            code: err.code().into(),
            details: err.details().map(str::to_string),
        }),
    )
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    pub url: String,
    pub session_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimRequest {
    pub user_id: String,
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct ClaimResponse {
    pub claimed: usize,
    pub enrollments: Vec<Enrollment>,
}

#[derive(Debug, Serialize)]
pub struct EnrollmentListResponse {
    pub count: usize,
    pub enrollments: Vec<Enrollment>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollmentsQuery {
    pub user_id: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        payments_configured: state.checkout.is_configured(),
        webhooks_configured: state.webhook_secret.is_some(),
    })
}

/// Create a checkout session from a JSON body
///
/// The body is read raw so that malformed JSON falls back to defaults
/// instead of being rejected by the extractor.
pub async fn create_checkout(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<CheckoutResponse>, ApiError> {
    let request = CheckoutRequest::from_json_slice(&body);
    let idempotency_key = headers
        .get(IDEMPOTENCY_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty());

    let session = state
        .checkout
        .create_session(&request, idempotency_key)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Checkout error");
            payment_error(&e)
        })?;

    Ok(Json(CheckoutResponse {
        url: session.url,
        session_id: session.id,
    }))
}

/// Create a checkout session from query parameters and redirect to Stripe
pub async fn checkout_link(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Redirect, ApiError> {
    let request = CheckoutRequest::from_query(&params);

    let session = state
        .checkout
        .create_session(&request, None)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Checkout link error");
            payment_error(&e)
        })?;

    Ok(Redirect::to(&session.url))
}

/// Forward a deprecated path to its canonical one, query untouched
pub async fn legacy_redirect(State(state): State<AppState>, uri: Uri) -> Response {
    let Some(canonical) = state.legacy_redirects.get(uri.path()) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let target = redirect_target(canonical, uri.query());
    tracing::debug!(from = %uri.path(), to = %target, "Legacy redirect");

    (StatusCode::FOUND, [(header::LOCATION, target)]).into_response()
}

/// Append a raw query string verbatim
pub fn redirect_target(canonical: &str, query: Option<&str>) -> String {
    match query.filter(|q| !q.is_empty()) {
        Some(query) => format!("{canonical}?{query}"),
        None => canonical.to_string(),
    }
}

/// Stripe webhook handler
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<StatusCode, ApiError> {
    let secret = state.webhook_secret.as_deref().ok_or_else(|| {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorResponse::new("Webhooks not configured", "WEBHOOKS_DISABLED")),
        )
    })?;

    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::new("Missing Stripe signature", "MISSING_SIGNATURE")),
            )
        })?;

    let event = state.webhooks.parse_event(&body, signature, secret).map_err(|e| {
        tracing::warn!("Webhook signature failed: {}", e);
        payment_error(&e)
    })?;

    state.webhooks.handle(event).map_err(|e| {
        tracing::error!("Webhook processing error: {}", e);
        payment_error(&e)
    })?;

    Ok(StatusCode::OK)
}

/// Link enrollments bought with an email to a signed-in student
pub async fn claim_enrollments(
    State(state): State<AppState>,
    Json(payload): Json<ClaimRequest>,
) -> Result<Json<ClaimResponse>, ApiError> {
    let user_id = payload.user_id.trim();
    let email = payload.email.trim();
    if user_id.is_empty() || email.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new("userId and email are required", "INVALID_REQUEST")),
        ));
    }

    let claimed = state.enrollments.claim(email, user_id).map_err(|e| {
        tracing::error!(error = %e, "Claim failed");
        payment_error(&e)
    })?;

    tracing::info!(user_id = %user_id, claimed = claimed.len(), "Claimed enrollments");

    Ok(Json(ClaimResponse {
        claimed: claimed.len(),
        enrollments: claimed,
    }))
}

/// Enrollments linked to a student
pub async fn list_enrollments(
    State(state): State<AppState>,
    Query(query): Query<EnrollmentsQuery>,
) -> Result<Json<EnrollmentListResponse>, ApiError> {
    let enrollments = state
        .enrollments
        .list_for_user(query.user_id.trim())
        .map_err(|e| payment_error(&e))?;

    Ok(Json(EnrollmentListResponse {
        count: enrollments.len(),
        enrollments,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redirect_target_keeps_query_verbatim() {
        assert_eq!(
            redirect_target("/checkout", Some("cohort=demo&program=X")),
            "/checkout?cohort=demo&program=X"
        );
        assert_eq!(
            redirect_target("/checkout", Some("b=2&a=%20x&a=1")),
            "/checkout?b=2&a=%20x&a=1"
        );
    }

    #[test]
    fn test_redirect_target_without_query() {
        assert_eq!(redirect_target("/checkout", None), "/checkout");
        assert_eq!(redirect_target("/checkout", Some("")), "/checkout");
    }

    #[test]
    fn test_upstream_error_carries_details() {
        let (status, Json(body)) = payment_error(&PaymentError::Upstream("No such price".into()));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.details.as_deref(), Some("No such price"));
    }
}
