//! Customer purchase ledger compaction.
//!
//! The payment provider's customer object carries two bounded history
//! fields as stringified JSON metadata: `purchaseHistory` (hard entry
//! cap) and `consentHistory` (serialized character budget). Both are
//! newest-first; merging prepends and truncates.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, instrument, warn};

use crate::errors::ServiceError;
use crate::events::CheckoutSession;
use crate::payment::{CustomerDraft, CustomerRecord, CustomerUpdate, PaymentGateway};
use crate::retry::{self, RetryPolicy};
use crate::services::consent::ConsentRecord;
use crate::tracing::redact_email;

// Metadata keys on provider customer records
pub const META_PURCHASE_HISTORY: &str = "purchaseHistory";
pub const META_CONSENT_HISTORY: &str = "consentHistory";
pub const META_TOTAL_PURCHASES: &str = "totalPurchases";
pub const META_TOTAL_SPENT_CENTS: &str = "totalSpentCents";
pub const META_TOTAL_QUANTITY: &str = "totalQuantity";

/// Compact purchase history entry: session, quantity, amount, unix time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseEntry {
    pub s: String,
    pub q: i64,
    pub a: i64,
    pub t: i64,
}

/// Compact consent history entry: promotions, terms, unix time, method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentEntry {
    pub p: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub t: Option<bool>,
    pub ts: i64,
    pub m: String,
}

/// Parse a stored purchase history, converting any legacy verbose
/// entries (`sessionId`/`quantity`/`amountCents`/`timestamp`) to the
/// compact schema. Garbage parses to an empty history rather than
/// failing the settlement.
pub fn parse_purchase_history(raw: Option<&str>) -> Vec<PurchaseEntry> {
    let Some(raw) = raw else {
        return Vec::new();
    };
    let Ok(values) = serde_json::from_str::<Vec<Value>>(raw) else {
        warn!("unparseable purchase history; starting fresh");
        return Vec::new();
    };

    values
        .into_iter()
        .filter_map(|value| {
            if let Ok(entry) = serde_json::from_value::<PurchaseEntry>(value.clone()) {
                return Some(entry);
            }
            // Legacy verbose schema
            let obj = value.as_object()?;
            Some(PurchaseEntry {
                s: obj.get("sessionId")?.as_str()?.to_string(),
                q: obj.get("quantity").and_then(Value::as_i64).unwrap_or(1),
                a: obj.get("amountCents").and_then(Value::as_i64).unwrap_or(0),
                t: obj.get("timestamp").and_then(Value::as_i64).unwrap_or(0),
            })
        })
        .collect()
}

pub fn parse_consent_history(raw: Option<&str>) -> Vec<ConsentEntry> {
    raw.and_then(|raw| serde_json::from_str(raw).ok())
        .unwrap_or_default()
}

/// Prepend `entry` and hard-truncate to `limit` entries, newest first.
pub fn compact_purchase_history(
    mut history: Vec<PurchaseEntry>,
    entry: PurchaseEntry,
    limit: usize,
) -> Vec<PurchaseEntry> {
    history.insert(0, entry);
    history.truncate(limit.max(1));
    history
}

/// Prepend `entry`, then drop oldest entries until the serialized
/// array fits `budget` characters. The newest entry always survives,
/// even when it alone exceeds the budget.
pub fn compact_consent_history(
    mut history: Vec<ConsentEntry>,
    entry: ConsentEntry,
    budget: usize,
) -> Vec<ConsentEntry> {
    history.insert(0, entry);
    while history.len() > 1 {
        let serialized = serde_json::to_string(&history).unwrap_or_default();
        if serialized.len() <= budget {
            break;
        }
        history.pop();
    }
    history
}

fn parse_aggregate(metadata: &HashMap<String, String>, key: &str) -> i64 {
    metadata
        .get(key)
        .and_then(|raw| raw.trim().parse().ok())
        .unwrap_or(0)
}

/// Merges purchase and consent facts into the provider-held customer
/// record.
///
/// The read-modify-write on customer metadata is a documented benign
/// race: only the same buyer checking out concurrently can collide
/// with itself, and the histories disagree by at most one entry.
#[derive(Clone)]
pub struct CustomerLedger {
    gateway: Arc<dyn PaymentGateway>,
    history_limit: usize,
    consent_budget: usize,
    policy: RetryPolicy,
}

impl CustomerLedger {
    pub fn new(gateway: Arc<dyn PaymentGateway>, history_limit: usize, consent_budget: usize) -> Self {
        Self {
            gateway,
            history_limit,
            consent_budget,
            policy: RetryPolicy::standard(),
        }
    }

    /// Record a settled purchase on the customer, creating the
    /// customer when the session names none and none matches by email.
    #[instrument(skip(self, session, consent), fields(session_id = %session.id))]
    pub async fn record_purchase(
        &self,
        session: &CheckoutSession,
        quantity: i64,
        amount_cents: i64,
        consent: &ConsentRecord,
    ) -> Result<CustomerRecord, ServiceError> {
        let existing = self.locate_customer(session).await?;

        let purchase = PurchaseEntry {
            s: session.id.clone(),
            q: quantity,
            a: amount_cents,
            t: consent.timestamp.timestamp(),
        };
        let consent_entry = ConsentEntry {
            p: consent.promotions,
            t: consent.terms_of_service,
            ts: consent.timestamp.timestamp(),
            m: consent.method.clone(),
        };

        match existing {
            Some(customer) => {
                let metadata = self.merged_metadata(&customer, purchase, consent_entry, quantity, amount_cents)?;
                let updated = retry::execute("customer_update", &self.policy, || {
                    self.gateway
                        .update_customer(&customer.id, CustomerUpdate {
                            metadata: metadata.clone(),
                        })
                })
                .await?;
                info!(customer_id = %updated.id, "customer ledger merged");
                Ok(updated)
            }
            None => {
                let metadata =
                    self.seed_metadata(purchase, consent_entry, quantity, amount_cents)?;
                let draft = CustomerDraft {
                    email: session.buyer_email().map(str::to_string),
                    name: session.buyer_name().map(str::to_string),
                    metadata,
                };
                let created = retry::execute("customer_create", &self.policy, || {
                    self.gateway.create_customer(draft.clone())
                })
                .await?;
                info!(customer_id = %created.id, "customer created with seeded ledger");
                Ok(created)
            }
        }
    }

    async fn locate_customer(
        &self,
        session: &CheckoutSession,
    ) -> Result<Option<CustomerRecord>, ServiceError> {
        if let Some(customer_id) = session.customer.as_deref() {
            let fetched = retry::execute("customer_fetch", &self.policy, || {
                self.gateway.fetch_customer(customer_id)
            })
            .await?;
            return Ok(Some(fetched));
        }

        let Some(email) = session.buyer_email() else {
            return Ok(None);
        };
        let found = retry::execute("customer_lookup", &self.policy, || {
            self.gateway.find_customer_by_email(email)
        })
        .await?;
        if found.is_none() {
            info!(email = %redact_email(email), "no customer matched checkout email");
        }
        Ok(found)
    }

    fn merged_metadata(
        &self,
        customer: &CustomerRecord,
        purchase: PurchaseEntry,
        consent: ConsentEntry,
        quantity: i64,
        amount_cents: i64,
    ) -> Result<HashMap<String, String>, ServiceError> {
        let purchases = compact_purchase_history(
            parse_purchase_history(customer.metadata.get(META_PURCHASE_HISTORY).map(String::as_str)),
            purchase,
            self.history_limit,
        );
        let consents = compact_consent_history(
            parse_consent_history(customer.metadata.get(META_CONSENT_HISTORY).map(String::as_str)),
            consent,
            self.consent_budget,
        );

        let total_purchases = parse_aggregate(&customer.metadata, META_TOTAL_PURCHASES) + 1;
        let total_spent = parse_aggregate(&customer.metadata, META_TOTAL_SPENT_CENTS) + amount_cents;
        let total_quantity = parse_aggregate(&customer.metadata, META_TOTAL_QUANTITY) + quantity;

        self.render_metadata(purchases, consents, total_purchases, total_spent, total_quantity)
    }

    fn seed_metadata(
        &self,
        purchase: PurchaseEntry,
        consent: ConsentEntry,
        quantity: i64,
        amount_cents: i64,
    ) -> Result<HashMap<String, String>, ServiceError> {
        self.render_metadata(vec![purchase], vec![consent], 1, amount_cents, quantity)
    }

    fn render_metadata(
        &self,
        purchases: Vec<PurchaseEntry>,
        consents: Vec<ConsentEntry>,
        total_purchases: i64,
        total_spent: i64,
        total_quantity: i64,
    ) -> Result<HashMap<String, String>, ServiceError> {
        let mut metadata = HashMap::new();
        metadata.insert(
            META_PURCHASE_HISTORY.to_string(),
            serde_json::to_string(&purchases)
                .map_err(|e| ServiceError::Serialization(e.to_string()))?,
        );
        metadata.insert(
            META_CONSENT_HISTORY.to_string(),
            serde_json::to_string(&consents)
                .map_err(|e| ServiceError::Serialization(e.to_string()))?,
        );
        metadata.insert(META_TOTAL_PURCHASES.to_string(), total_purchases.to_string());
        metadata.insert(META_TOTAL_SPENT_CENTS.to_string(), total_spent.to_string());
        metadata.insert(META_TOTAL_QUANTITY.to_string(), total_quantity.to_string());
        Ok(metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn purchase(session: &str, t: i64) -> PurchaseEntry {
        PurchaseEntry {
            s: session.into(),
            q: 1,
            a: 2500,
            t,
        }
    }

    fn consent(t: i64) -> ConsentEntry {
        ConsentEntry {
            p: true,
            t: Some(true),
            ts: t,
            m: "provider_checkout".into(),
        }
    }

    #[test]
    fn purchase_history_caps_at_limit_newest_first() {
        let history = vec![purchase("cs_3", 3), purchase("cs_2", 2), purchase("cs_1", 1)];
        let compacted = compact_purchase_history(history, purchase("cs_4", 4), 3);
        assert_eq!(compacted.len(), 3);
        assert_eq!(compacted[0].s, "cs_4");
        assert_eq!(compacted[2].s, "cs_2");
    }

    #[test]
    fn legacy_verbose_entries_convert_on_read() {
        let raw = r#"[
            {"sessionId": "cs_old", "quantity": 2, "amountCents": 5400, "timestamp": 1700000000},
            {"s": "cs_new", "q": 1, "a": 2500, "t": 1700000100}
        ]"#;
        let parsed = parse_purchase_history(Some(raw));
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].s, "cs_old");
        assert_eq!(parsed[0].q, 2);
        assert_eq!(parsed[0].a, 5400);
        assert_eq!(parsed[1].s, "cs_new");
    }

    #[test]
    fn garbage_history_starts_fresh() {
        assert!(parse_purchase_history(Some("not json")).is_empty());
        assert!(parse_purchase_history(Some("{\"not\":\"an array\"}")).is_empty());
        assert!(parse_purchase_history(None).is_empty());
    }

    #[test]
    fn consent_history_respects_serialized_budget() {
        let mut history = Vec::new();
        for i in 0..20 {
            history = compact_consent_history(history, consent(1_700_000_000 + i), 400);
            let serialized = serde_json::to_string(&history).unwrap();
            assert!(serialized.len() <= 400 || history.len() == 1);
        }
        // Newest entry is always first
        assert_eq!(history[0].ts, 1_700_000_019);
        assert!(history.len() < 20);
    }

    #[test]
    fn newest_consent_entry_survives_tiny_budget() {
        let history = compact_consent_history(vec![consent(1), consent(2)], consent(3), 10);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].ts, 3);
    }

    #[test]
    fn aggregates_treat_garbage_as_zero() {
        let mut metadata = HashMap::new();
        metadata.insert(META_TOTAL_PURCHASES.to_string(), "seven".to_string());
        metadata.insert(META_TOTAL_SPENT_CENTS.to_string(), "10400".to_string());
        assert_eq!(parse_aggregate(&metadata, META_TOTAL_PURCHASES), 0);
        assert_eq!(parse_aggregate(&metadata, META_TOTAL_SPENT_CENTS), 10400);
        assert_eq!(parse_aggregate(&metadata, META_TOTAL_QUANTITY), 0);
    }

    #[test]
    fn consent_entries_skip_absent_terms_in_serialized_form() {
        let entry = ConsentEntry {
            p: false,
            t: None,
            ts: 5,
            m: "provider_checkout".into(),
        };
        let serialized = serde_json::to_string(&entry).unwrap();
        assert!(!serialized.contains("\"t\""));
        assert!(serialized.contains("\"ts\""));
    }
}
