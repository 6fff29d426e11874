use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::ServiceError;

/// Event types the settlement pipeline recognizes.
///
/// Unknown types are carried with their raw tag so the dispatcher can
/// acknowledge and log them without guessing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    CheckoutSessionCompleted,
    CheckoutSessionExpired,
    PaymentIntentSucceeded,
    PaymentIntentFailed,
    ChargeRefunded,
    Unknown(String),
}

impl EventKind {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "checkout.session.completed" => Self::CheckoutSessionCompleted,
            "checkout.session.expired" => Self::CheckoutSessionExpired,
            "payment_intent.succeeded" => Self::PaymentIntentSucceeded,
            "payment_intent.payment_failed" => Self::PaymentIntentFailed,
            "charge.refunded" => Self::ChargeRefunded,
            other => Self::Unknown(other.to_string()),
        }
    }
}

/// Signed webhook envelope as delivered by the payment provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub created: i64,
    #[serde(default)]
    pub livemode: bool,
    pub data: EventData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventData {
    pub object: Value,
}

impl EventEnvelope {
    pub fn parse(body: &[u8]) -> Result<Self, ServiceError> {
        serde_json::from_slice(body)
            .map_err(|e| ServiceError::EventParsing(format!("invalid event envelope: {}", e)))
    }

    pub fn kind(&self) -> EventKind {
        EventKind::parse(&self.event_type)
    }

    /// Deserialize `data.object` as a checkout session.
    pub fn checkout_session(&self) -> Result<CheckoutSession, ServiceError> {
        serde_json::from_value(self.data.object.clone())
            .map_err(|e| ServiceError::EventParsing(format!("invalid checkout session: {}", e)))
    }
}

/// Checkout session payload. Metadata values arrive as strings; typed
/// readers live on the accessors.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    #[serde(default)]
    pub customer: Option<String>,
    #[serde(default)]
    pub customer_details: Option<CustomerDetails>,
    #[serde(default)]
    pub amount_total: Option<i64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub payment_intent: Option<String>,
    #[serde(default)]
    pub payment_status: Option<String>,
    #[serde(default)]
    pub consent: Option<SessionConsent>,
    #[serde(default)]
    pub consent_collection: Option<ConsentCollection>,
    #[serde(default)]
    pub shipping_details: Option<ShippingDetails>,
    #[serde(default)]
    pub created: Option<i64>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl CheckoutSession {
    /// Non-empty metadata value for `key`.
    pub fn meta(&self, key: &str) -> Option<&str> {
        self.metadata
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    pub fn meta_i64(&self, key: &str) -> Option<i64> {
        self.meta(key).and_then(|v| v.trim().parse().ok())
    }

    pub fn meta_flag(&self, key: &str) -> bool {
        matches!(self.meta(key), Some("true") | Some("1"))
    }

    pub fn buyer_email(&self) -> Option<&str> {
        self.customer_details
            .as_ref()
            .and_then(|d| d.email.as_deref())
            .filter(|e| !e.is_empty())
    }

    pub fn buyer_name(&self) -> Option<&str> {
        self.customer_details
            .as_ref()
            .and_then(|d| d.name.as_deref())
            .filter(|n| !n.is_empty())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CustomerDetails {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

/// Consent choices the buyer made during checkout.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionConsent {
    /// "opt_in" or "opt_out"
    #[serde(default)]
    pub promotions: Option<String>,
    /// "accepted" when the buyer ticked the box
    #[serde(default)]
    pub terms_of_service: Option<String>,
}

/// What the checkout page asked for.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConsentCollection {
    /// "auto" or "none"
    #[serde(default)]
    pub promotions: Option<String>,
    /// "required" or "none"
    #[serde(default)]
    pub terms_of_service: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShippingDetails {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub address: Option<Address>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Address {
    #[serde(default)]
    pub line1: Option<String>,
    #[serde(default)]
    pub line2: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub postal_code: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
}

/// Line item as the provider reports it for a session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LineItem {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub quantity: Option<i64>,
    #[serde(default)]
    pub amount_total: Option<i64>,
}
