/*!
 * Payment provider gateway.
 *
 * The provider owns product inventory state and customer records; both
 * are stored as stringified metadata on its side. This module defines
 * the typed surface the pipeline works with and the HTTP client that
 * implements it.
 */

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::ServiceError;
use crate::events::LineItem;

pub mod http;

pub use http::HttpPaymentGateway;

// Metadata keys on provider product records
pub const META_INVENTORY_COUNT: &str = "inventoryCount";
pub const META_VERSION: &str = "version";
pub const META_LAST_PURCHASE_SESSION: &str = "lastPurchaseSession";
pub const META_LAST_UPDATED: &str = "lastUpdated";
pub const META_CATEGORY: &str = "category";

/// Product record as the provider returns it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductRecord {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl ProductRecord {
    pub fn category(&self) -> Option<&str> {
        self.metadata
            .get(META_CATEGORY)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    pub fn inventory_state(&self) -> Result<InventoryState, ServiceError> {
        InventoryState::from_metadata(&self.id, &self.metadata)
    }
}

/// Inventory state serialized into product metadata.
///
/// `version` increments on every successful write and is the token the
/// compare-and-swap update checks against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryState {
    pub count: i64,
    pub version: i64,
    pub last_purchase_session: Option<String>,
    pub last_updated: Option<DateTime<Utc>>,
}

impl InventoryState {
    pub fn from_metadata(
        product_id: &str,
        metadata: &HashMap<String, String>,
    ) -> Result<Self, ServiceError> {
        let raw_count = metadata.get(META_INVENTORY_COUNT).ok_or_else(|| {
            ServiceError::InventoryUpdate(format!(
                "product {} carries no {} metadata",
                product_id, META_INVENTORY_COUNT
            ))
        })?;
        let count = raw_count.trim().parse::<i64>().map_err(|_| {
            ServiceError::InventoryUpdate(format!(
                "product {} has unparseable {}: {:?}",
                product_id, META_INVENTORY_COUNT, raw_count
            ))
        })?;

        // A product written before versioning starts at 0
        let version = match metadata.get(META_VERSION) {
            Some(raw) => raw.trim().parse::<i64>().map_err(|_| {
                ServiceError::InventoryUpdate(format!(
                    "product {} has unparseable {}: {:?}",
                    product_id, META_VERSION, raw
                ))
            })?,
            None => 0,
        };

        let last_purchase_session = metadata
            .get(META_LAST_PURCHASE_SESSION)
            .filter(|v| !v.is_empty())
            .cloned();
        let last_updated = metadata
            .get(META_LAST_UPDATED)
            .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
            .map(|dt| dt.with_timezone(&Utc));

        Ok(Self {
            count,
            version,
            last_purchase_session,
            last_updated,
        })
    }

    pub fn to_metadata(&self) -> HashMap<String, String> {
        let mut metadata = HashMap::new();
        metadata.insert(META_INVENTORY_COUNT.to_string(), self.count.to_string());
        metadata.insert(META_VERSION.to_string(), self.version.to_string());
        if let Some(session) = &self.last_purchase_session {
            metadata.insert(META_LAST_PURCHASE_SESSION.to_string(), session.clone());
        }
        if let Some(updated) = &self.last_updated {
            metadata.insert(META_LAST_UPDATED.to_string(), updated.to_rfc3339());
        }
        metadata
    }
}

/// Customer record as the provider returns it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerRecord {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// Fields for creating a customer.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CustomerDraft {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub metadata: HashMap<String, String>,
}

/// Metadata keys to merge onto an existing customer.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CustomerUpdate {
    pub metadata: HashMap<String, String>,
}

/// Typed surface over the payment provider's API.
///
/// `update_inventory` is the compare-and-swap seam: implementations
/// return [`ServiceError::VersionConflict`] when `expected_version` no
/// longer matches the provider-side state.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn fetch_product(&self, product_id: &str) -> Result<ProductRecord, ServiceError>;

    async fn update_inventory(
        &self,
        product_id: &str,
        expected_version: i64,
        state: &InventoryState,
    ) -> Result<(), ServiceError>;

    async fn fetch_customer(&self, customer_id: &str) -> Result<CustomerRecord, ServiceError>;

    async fn find_customer_by_email(
        &self,
        email: &str,
    ) -> Result<Option<CustomerRecord>, ServiceError>;

    async fn create_customer(&self, draft: CustomerDraft) -> Result<CustomerRecord, ServiceError>;

    async fn update_customer(
        &self,
        customer_id: &str,
        update: CustomerUpdate,
    ) -> Result<CustomerRecord, ServiceError>;

    async fn list_line_items(&self, session_id: &str) -> Result<Vec<LineItem>, ServiceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn inventory_state_round_trips_through_metadata() {
        let state = InventoryState {
            count: 37,
            version: 4,
            last_purchase_session: Some("cs_live_9".into()),
            last_updated: Some("2026-02-01T08:00:00Z".parse().unwrap()),
        };
        let parsed = InventoryState::from_metadata("prod_1", &state.to_metadata()).unwrap();
        assert_eq!(parsed, state);
    }

    #[test]
    fn missing_version_defaults_to_zero() {
        let state =
            InventoryState::from_metadata("prod_1", &metadata(&[("inventoryCount", "12")]))
                .unwrap();
        assert_eq!(state.count, 12);
        assert_eq!(state.version, 0);
        assert!(state.last_purchase_session.is_none());
    }

    #[test]
    fn missing_count_is_an_inventory_error() {
        let err =
            InventoryState::from_metadata("prod_1", &metadata(&[("version", "3")])).unwrap_err();
        assert!(matches!(err, ServiceError::InventoryUpdate(_)));
    }

    #[test]
    fn garbage_count_is_rejected() {
        let err = InventoryState::from_metadata(
            "prod_1",
            &metadata(&[("inventoryCount", "plenty"), ("version", "1")]),
        )
        .unwrap_err();
        assert!(matches!(err, ServiceError::InventoryUpdate(_)));
    }

    #[test]
    fn product_category_reads_from_metadata() {
        let product = ProductRecord {
            id: "prod_1".into(),
            name: Some("Meridian No. 4".into()),
            metadata: metadata(&[("category", "limited-edition"), ("inventoryCount", "5")]),
        };
        assert_eq!(product.category(), Some("limited-edition"));
        assert_eq!(product.inventory_state().unwrap().count, 5);
    }
}
