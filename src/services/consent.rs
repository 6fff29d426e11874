//! Consent extraction and validation.
//!
//! Pure functions over the checkout session payload. Validation never
//! blocks settlement; its output feeds audit logs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::events::CheckoutSession;
use crate::tracing::presence;

const CONSENT_SOURCE: &str = "checkout_session";
const CONSENT_METHOD: &str = "provider_checkout";

/// Audit-ready consent facts derived from one checkout session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsentRecord {
    pub promotions: bool,
    /// None when the checkout never collected terms acceptance
    pub terms_of_service: Option<bool>,
    pub timestamp: DateTime<Utc>,
    pub source: String,
    pub method: String,
    pub session_id: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Validation outcome. Warnings never invalidate; only errors do.
#[derive(Debug, Clone, Default)]
pub struct ConsentValidation {
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl ConsentValidation {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Derive the consent record from a session. Always succeeds; absent
/// consent data produces a record with everything declined so the
/// downstream audit line still shows what was seen.
pub fn extract(session: &CheckoutSession) -> ConsentRecord {
    let consent = session.consent.as_ref();

    ConsentRecord {
        promotions: consent
            .and_then(|c| c.promotions.as_deref())
            .map(|p| p == "opt_in")
            .unwrap_or(false),
        terms_of_service: consent
            .and_then(|c| c.terms_of_service.as_deref())
            .map(|t| t == "accepted"),
        timestamp: Utc::now(),
        source: CONSENT_SOURCE.to_string(),
        method: CONSENT_METHOD.to_string(),
        session_id: session.id.clone(),
        ip_address: session.meta("clientIp").map(str::to_string),
        user_agent: session.meta("userAgent").map(str::to_string),
    }
}

/// Validate the record against what the checkout page asked for.
pub fn validate(record: &ConsentRecord, session: &CheckoutSession) -> ConsentValidation {
    let mut validation = ConsentValidation::default();
    let collection = session.consent_collection.as_ref();

    if session.consent.is_none() {
        validation
            .warnings
            .push("no consent block on session".to_string());
    }

    let promotions_requested = collection
        .and_then(|c| c.promotions.as_deref())
        .map(|p| p == "auto")
        .unwrap_or(false);
    let promotions_answered = session
        .consent
        .as_ref()
        .is_some_and(|c| c.promotions.is_some());
    if promotions_requested && !promotions_answered {
        validation
            .warnings
            .push("promotions consent requested but not returned".to_string());
    }

    let terms_required = collection
        .and_then(|c| c.terms_of_service.as_deref())
        .map(|t| t == "required")
        .unwrap_or(false);
    if terms_required && record.terms_of_service != Some(true) {
        validation
            .errors
            .push("terms of service required but not accepted".to_string());
    }

    validation
}

/// Emit the audit line for a consent record. PII is reduced to
/// presence flags; the values themselves never reach the logs.
pub fn audit(record: &ConsentRecord, validation: &ConsentValidation) {
    if validation.is_valid() {
        info!(
            session_id = %record.session_id,
            promotions = record.promotions,
            terms_of_service = ?record.terms_of_service,
            source = %record.source,
            method = %record.method,
            has_ip = presence(record.ip_address.as_deref()),
            has_user_agent = presence(record.user_agent.as_deref()),
            warnings = validation.warnings.len(),
            "consent recorded"
        );
    } else {
        warn!(
            session_id = %record.session_id,
            promotions = record.promotions,
            terms_of_service = ?record.terms_of_service,
            errors = ?validation.errors,
            warnings = ?validation.warnings,
            "consent validation failed; settlement continues"
        );
    }
}
