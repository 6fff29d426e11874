use std::sync::Arc;

use chrono::Utc;
use tracing::{info, instrument, warn};

use crate::errors::ServiceError;
use crate::metrics;
use crate::payment::{InventoryState, PaymentGateway};
use crate::retry::{self, RetryPolicy};

/// Decrement with a floor at zero. Payment already succeeded by the
/// time this runs, so an over-sell clamps instead of aborting.
pub fn clamp_decrement(count: i64, quantity: i64) -> i64 {
    (count - quantity.max(0)).max(0)
}

/// Updates provider-held inventory under optimistic concurrency.
///
/// Each attempt re-reads the product, recomputes the decrement, and
/// writes back conditional on the version it observed. Conflicts are
/// expected under concurrent checkout completion and retried under the
/// dedicated inventory policy.
#[derive(Clone)]
pub struct InventoryUpdater {
    gateway: Arc<dyn PaymentGateway>,
    expected_category: String,
    low_stock_threshold: i64,
    policy: RetryPolicy,
}

impl InventoryUpdater {
    pub fn new(
        gateway: Arc<dyn PaymentGateway>,
        expected_category: impl Into<String>,
        low_stock_threshold: i64,
    ) -> Self {
        Self {
            gateway,
            expected_category: expected_category.into(),
            low_stock_threshold,
            policy: RetryPolicy::inventory(),
        }
    }

    /// Settle a purchase of `quantity` units against `product_id`.
    ///
    /// Returns the state written on success. The wrong-category guard
    /// is a critical, non-retryable abort: it means the session
    /// metadata or deployment configuration points at the wrong
    /// catalog entry.
    #[instrument(skip(self), fields(product_id, quantity))]
    pub async fn settle_purchase(
        &self,
        product_id: &str,
        quantity: i64,
        session_id: &str,
    ) -> Result<InventoryState, ServiceError> {
        let written = retry::execute("inventory_cas_update", &self.policy, || {
            self.attempt_update(product_id, quantity, session_id)
        })
        .await?;

        if written.count <= self.low_stock_threshold {
            warn!(
                product_id,
                remaining = written.count,
                threshold = self.low_stock_threshold,
                "low stock after settlement"
            );
        }

        Ok(written)
    }

    async fn attempt_update(
        &self,
        product_id: &str,
        quantity: i64,
        session_id: &str,
    ) -> Result<InventoryState, ServiceError> {
        let product = self.gateway.fetch_product(product_id).await?;

        match product.category() {
            Some(category) if category == self.expected_category => {}
            found => {
                return Err(ServiceError::WrongProductCategory {
                    product_id: product_id.to_string(),
                    expected: self.expected_category.clone(),
                    found: found.unwrap_or("<none>").to_string(),
                });
            }
        }

        let observed = product.inventory_state()?;
        if observed.count < quantity {
            warn!(
                product_id,
                available = observed.count,
                requested = quantity,
                "insufficient inventory; clamping to zero"
            );
        }

        let next = InventoryState {
            count: clamp_decrement(observed.count, quantity),
            version: observed.version + 1,
            last_purchase_session: Some(session_id.to_string()),
            last_updated: Some(Utc::now()),
        };

        match self
            .gateway
            .update_inventory(product_id, observed.version, &next)
            .await
        {
            Ok(()) => {
                info!(
                    product_id,
                    previous = observed.count,
                    remaining = next.count,
                    version = next.version,
                    "inventory settled"
                );
                Ok(next)
            }
            Err(err) => {
                if matches!(err, ServiceError::VersionConflict { .. }) {
                    metrics::increment_counter("settlement_inventory_version_conflicts_total");
                }
                Err(err)
            }
        }
    }
}
