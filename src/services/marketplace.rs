use std::sync::Arc;

use chrono::Utc;
use sea_orm::{ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, QueryFilter};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::db::DbPool;
use crate::entities::marketplace_transaction::{self, TransactionStatus};
use crate::errors::ServiceError;
use crate::events::CheckoutSession;
use crate::tracing::redact_email;

/// One marketplace listing line to settle.
#[derive(Debug, Clone)]
pub struct ListingSale {
    pub listing_id: String,
    pub seller_id: String,
    /// Unit price times quantity, in cents
    pub amount_cents: i64,
}

/// Writes marketplace transaction rows and resolves buyer identity.
///
/// Supply decrement for limited-series listings is the datastore's own
/// trigger; this service only records the transaction.
#[derive(Clone)]
pub struct MarketplaceSettlement {
    db: Arc<DbPool>,
}

impl MarketplaceSettlement {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    /// Resolve the buyer: signed-in user id from session metadata,
    /// else profile lookup by checkout email, else anonymous.
    #[instrument(skip(self, session), fields(session_id = %session.id))]
    pub async fn resolve_buyer(
        &self,
        session: &CheckoutSession,
    ) -> Result<Option<Uuid>, ServiceError> {
        if let Some(raw) = session.meta("userId") {
            match raw.parse::<Uuid>() {
                Ok(user_id) => return Ok(Some(user_id)),
                Err(_) => warn!(session_id = %session.id, "unparseable userId metadata; falling back to email lookup"),
            }
        }

        let Some(email) = session.buyer_email() else {
            return Ok(None);
        };

        let profile = crate::entities::profile::Entity::find()
            .filter(crate::entities::profile::Column::Email.eq(email))
            .one(&*self.db)
            .await?;

        match &profile {
            Some(found) => info!(buyer_id = %found.id, "buyer resolved via profile email"),
            None => info!(email = %redact_email(email), "no profile matched; guest buyer"),
        }
        Ok(profile.map(|p| p.id))
    }

    /// Write one completed transaction row for a listing sale.
    #[instrument(skip(self, session, sale), fields(session_id = %session.id, listing_id = %sale.listing_id))]
    pub async fn record_sale(
        &self,
        session: &CheckoutSession,
        sale: &ListingSale,
        buyer_id: Option<Uuid>,
    ) -> Result<marketplace_transaction::Model, ServiceError> {
        let now = Utc::now();
        let row = marketplace_transaction::ActiveModel {
            id: Set(Uuid::new_v4()),
            listing_id: Set(sale.listing_id.clone()),
            buyer_id: Set(buyer_id),
            seller_id: Set(sale.seller_id.clone()),
            amount_cents: Set(sale.amount_cents),
            currency: Set(session
                .currency
                .clone()
                .unwrap_or_else(|| "usd".to_string())),
            payment_intent: Set(session.payment_intent.clone()),
            session_id: Set(session.id.clone()),
            status: Set(TransactionStatus::Completed),
            created_at: Set(now),
            credited_at: Set(Some(now)),
        };

        let inserted = row.insert(&*self.db).await?;
        info!(
            transaction_id = %inserted.id,
            amount_cents = inserted.amount_cents,
            "marketplace transaction recorded"
        );
        Ok(inserted)
    }

    /// Settle a single-listing session: one transaction for the
    /// listing named in session metadata.
    #[instrument(skip(self, session), fields(session_id = %session.id))]
    pub async fn settle_single_listing(
        &self,
        session: &CheckoutSession,
    ) -> Result<marketplace_transaction::Model, ServiceError> {
        let listing_id = session
            .meta("listingId")
            .ok_or_else(|| {
                ServiceError::WebhookProcessing("marketplace session without listingId".into())
            })?
            .to_string();
        let seller_id = session
            .meta("sellerId")
            .ok_or_else(|| {
                ServiceError::WebhookProcessing(format!(
                    "listing {} has no sellerId metadata",
                    listing_id
                ))
            })?
            .to_string();
        let amount_cents = session
            .meta_i64("priceCents")
            .or(session.amount_total)
            .unwrap_or(0);

        let buyer_id = self.resolve_buyer(session).await?;
        self.record_sale(
            session,
            &ListingSale {
                listing_id,
                seller_id,
                amount_cents,
            },
            buyer_id,
        )
        .await
    }
}
