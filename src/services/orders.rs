//! Best-effort order bookkeeping.
//!
//! Every write here is non-blocking by contract: callers wrap them in
//! [`crate::services::attempt_non_critical`], and a failed snapshot or
//! audit row never fails the webhook delivery it belongs to.

use std::sync::Arc;

use chrono::Utc;
use sea_orm::{ActiveModelTrait, ActiveValue::Set};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::db::DbPool;
use crate::entities::{custom_card_order, customer_purchase_log, order_detail};
use crate::errors::ServiceError;
use crate::events::CheckoutSession;

/// Kind tag for the purchase audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurchaseKind {
    Standard,
    Cart,
    Marketplace,
    CustomCard,
}

impl PurchaseKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Cart => "cart",
            Self::Marketplace => "marketplace",
            Self::CustomCard => "custom_card",
        }
    }
}

#[derive(Clone)]
pub struct OrderRecorder {
    db: Arc<DbPool>,
}

impl OrderRecorder {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    /// Denormalized snapshot of a physical-goods checkout. Unique per
    /// session; a redelivered event that slipped past the ledger hits
    /// the unique constraint and the caller logs it as non-critical.
    #[instrument(skip(self, session), fields(session_id = %session.id))]
    pub async fn write_order_detail(
        &self,
        session: &CheckoutSession,
        quantity: i64,
        product_id: Option<&str>,
    ) -> Result<order_detail::Model, ServiceError> {
        let shipping = session
            .shipping_details
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| ServiceError::Serialization(e.to_string()))?;
        let metadata = serde_json::to_string(&session.metadata)
            .map_err(|e| ServiceError::Serialization(e.to_string()))?;

        let row = order_detail::ActiveModel {
            id: Set(Uuid::new_v4()),
            session_id: Set(session.id.clone()),
            payment_intent: Set(session.payment_intent.clone()),
            customer_email: Set(session.buyer_email().map(str::to_string)),
            amount_cents: Set(session.amount_total.unwrap_or(0)),
            currency: Set(session
                .currency
                .clone()
                .unwrap_or_else(|| "usd".to_string())),
            quantity: Set(quantity),
            product_id: Set(product_id.map(str::to_string)),
            shipping: Set(shipping),
            metadata: Set(metadata),
            created_at: Set(Utc::now()),
        };

        let inserted = row.insert(&*self.db).await?;
        info!(order_detail_id = %inserted.id, "order detail snapshot written");
        Ok(inserted)
    }

    /// Record a made-to-order custom card line.
    #[instrument(skip(self))]
    pub async fn write_custom_card_order(
        &self,
        session_id: &str,
        card_id: &str,
        card_name: Option<&str>,
        quantity: i64,
        amount_cents: Option<i64>,
    ) -> Result<custom_card_order::Model, ServiceError> {
        let row = custom_card_order::ActiveModel {
            id: Set(Uuid::new_v4()),
            session_id: Set(session_id.to_string()),
            card_id: Set(card_id.to_string()),
            card_name: Set(card_name.map(str::to_string)),
            quantity: Set(quantity),
            amount_cents: Set(amount_cents),
            status: Set("received".to_string()),
            created_at: Set(Utc::now()),
        };

        let inserted = row.insert(&*self.db).await?;
        info!(custom_card_order_id = %inserted.id, card_id, "custom card order recorded");
        Ok(inserted)
    }

    /// Append one audit row to the customer purchase log.
    #[instrument(skip(self, session), fields(session_id = %session.id))]
    pub async fn log_purchase(
        &self,
        session: &CheckoutSession,
        quantity: i64,
        kind: PurchaseKind,
    ) -> Result<customer_purchase_log::Model, ServiceError> {
        let row = customer_purchase_log::ActiveModel {
            id: Set(Uuid::new_v4()),
            session_id: Set(session.id.clone()),
            customer_id: Set(session.customer.clone()),
            email: Set(session.buyer_email().map(str::to_string)),
            amount_cents: Set(session.amount_total.unwrap_or(0)),
            quantity: Set(quantity),
            kind: Set(kind.as_str().to_string()),
            created_at: Set(Utc::now()),
        };

        Ok(row.insert(&*self.db).await?)
    }
}
