//! Enrollment Records
//!
//! A completed cohort or membership checkout becomes an enrollment. Students
//! often pay before creating an account, so enrollments are keyed by email
//! and claimed by a user id later from the student lounge.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use crate::checkout::Flow;
use crate::error::{PaymentError, Result};

/// Enrollment identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EnrollmentId(String);

impl EnrollmentId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EnrollmentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An enrollment record
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Enrollment {
    pub id: EnrollmentId,

    /// Stripe checkout session that produced it
    pub session_id: String,

    /// Customer email, lowercased
    pub email: String,

    pub flow: Flow,

    pub price_id: Option<String>,

    /// Origin tag from checkout metadata
    pub source: Option<String>,

    /// Stripe subscription, memberships only
    pub subscription_id: Option<String>,

    /// Linked account once claimed
    pub user_id: Option<String>,

    pub active: bool,

    pub created_at: DateTime<Utc>,

    pub claimed_at: Option<DateTime<Utc>>,
}

impl Enrollment {
    pub fn new(session_id: impl Into<String>, email: &str, flow: Flow) -> Self {
        Self {
            id: EnrollmentId::generate(),
            session_id: session_id.into(),
            email: normalize_email(email),
            flow,
            price_id: None,
            source: None,
            subscription_id: None,
            user_id: None,
            active: true,
            created_at: Utc::now(),
            claimed_at: None,
        }
    }

    pub const fn is_claimed(&self) -> bool {
        self.user_id.is_some()
    }

    /// Link to an account
    pub fn claim(&mut self, user_id: &str) {
        self.user_id = Some(user_id.to_string());
        self.claimed_at = Some(Utc::now());
    }

    pub fn deactivate(&mut self) {
        self.active = false;
    }

    pub fn reactivate(&mut self) {
        self.active = true;
    }
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Enrollment storage trait
pub trait EnrollmentStore: Send + Sync {
    /// Insert or replace by id
    fn save(&self, enrollment: &Enrollment) -> Result<()>;

    /// Insert unless an enrollment already exists for the same checkout
    /// session, returning the existing record in that case. Check and insert
    /// happen atomically.
    fn insert_if_absent(&self, enrollment: &Enrollment) -> Result<Option<Enrollment>>;

    /// Lookup by Stripe checkout session
    fn get_by_session(&self, session_id: &str) -> Result<Option<Enrollment>>;

    /// Lookup by Stripe subscription
    fn get_by_subscription(&self, subscription_id: &str) -> Result<Option<Enrollment>>;

    /// All enrollments linked to an account
    fn list_for_user(&self, user_id: &str) -> Result<Vec<Enrollment>>;

    /// Link every unclaimed enrollment for `email` to `user_id`, returning the
    /// newly claimed records
    fn claim(&self, email: &str, user_id: &str) -> Result<Vec<Enrollment>>;
}

#[derive(Default)]
struct Tables {
    enrollments: HashMap<EnrollmentId, Enrollment>,
    by_session: HashMap<String, EnrollmentId>,
    by_subscription: HashMap<String, EnrollmentId>,
}

impl Tables {
    fn insert(&mut self, enrollment: &Enrollment) {
        self.by_session
            .insert(enrollment.session_id.clone(), enrollment.id.clone());
        if let Some(ref subscription_id) = enrollment.subscription_id {
            self.by_subscription
                .insert(subscription_id.clone(), enrollment.id.clone());
        }
        self.enrollments
            .insert(enrollment.id.clone(), enrollment.clone());
    }

    fn by_session(&self, session_id: &str) -> Option<&Enrollment> {
        self.by_session
            .get(session_id)
            .and_then(|id| self.enrollments.get(id))
    }
}

/// In-memory enrollment store (for development)
///
/// Records and both indexes sit behind one lock.
#[derive(Default)]
pub struct MemoryEnrollmentStore {
    tables: RwLock<Tables>,
}

impl MemoryEnrollmentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(_: PoisonError<T>) -> PaymentError {
    PaymentError::Storage("enrollment store lock poisoned".into())
}

impl EnrollmentStore for MemoryEnrollmentStore {
    fn save(&self, enrollment: &Enrollment) -> Result<()> {
        self.tables.write().map_err(poisoned)?.insert(enrollment);
        Ok(())
    }

    fn insert_if_absent(&self, enrollment: &Enrollment) -> Result<Option<Enrollment>> {
        let mut tables = self.tables.write().map_err(poisoned)?;
        if let Some(existing) = tables.by_session(&enrollment.session_id) {
            return Ok(Some(existing.clone()));
        }
        tables.insert(enrollment);
        Ok(None)
    }

    fn get_by_session(&self, session_id: &str) -> Result<Option<Enrollment>> {
        let tables = self.tables.read().map_err(poisoned)?;
        Ok(tables.by_session(session_id).cloned())
    }

    fn get_by_subscription(&self, subscription_id: &str) -> Result<Option<Enrollment>> {
        let tables = self.tables.read().map_err(poisoned)?;
        Ok(tables
            .by_subscription
            .get(subscription_id)
            .and_then(|id| tables.enrollments.get(id))
            .cloned())
    }

    fn list_for_user(&self, user_id: &str) -> Result<Vec<Enrollment>> {
        let tables = self.tables.read().map_err(poisoned)?;
        let mut found: Vec<Enrollment> = tables
            .enrollments
            .values()
            .filter(|e| e.user_id.as_deref() == Some(user_id))
            .cloned()
            .collect();
        found.sort_by_key(|e| e.created_at);
        Ok(found)
    }

    fn claim(&self, email: &str, user_id: &str) -> Result<Vec<Enrollment>> {
        let email = normalize_email(email);
        let mut tables = self.tables.write().map_err(poisoned)?;

        let mut claimed: Vec<Enrollment> = tables
            .enrollments
            .values_mut()
            .filter(|e| !e.is_claimed() && !e.email.is_empty() && e.email == email)
            .map(|e| {
                e.claim(user_id);
                e.clone()
            })
            .collect();
        claimed.sort_by_key(|e| e.created_at);

        Ok(claimed)
    }
}
