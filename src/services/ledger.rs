use std::sync::Arc;

use chrono::Utc;
use sea_orm::sea_query::OnConflict;
use sea_orm::{ActiveModelTrait, ActiveValue::Set, ColumnTrait, DbErr, EntityTrait, QueryFilter};
use tracing::{info, instrument, warn};

use crate::db::DbPool;
use crate::entities::processed_event;
use crate::errors::ServiceError;
use crate::events::EventEnvelope;
use crate::metrics;

/// Outcome of an idempotency claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// This delivery owns the event; settlement should run.
    Claimed,
    /// An earlier or concurrent delivery already claimed the event.
    Duplicate,
}

/// Durable record of which event ids have been claimed and settled.
///
/// The claim is a single `INSERT ... ON CONFLICT DO NOTHING`, so two
/// concurrent deliveries of the same id cannot both win it. Ledger
/// failures fail open: a paid event is never dropped because the
/// ledger was unreachable.
#[derive(Clone)]
pub struct IdempotencyLedger {
    db: Arc<DbPool>,
}

impl IdempotencyLedger {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    /// Atomically claim an event id. Exactly one delivery per id gets
    /// [`ClaimOutcome::Claimed`]; the rest see `Duplicate`.
    #[instrument(skip(self, envelope), fields(event_id = %envelope.id))]
    pub async fn claim(
        &self,
        envelope: &EventEnvelope,
        correlation_id: Option<&str>,
    ) -> ClaimOutcome {
        let row = processed_event::ActiveModel {
            event_id: Set(envelope.id.clone()),
            event_type: Set(envelope.event_type.clone()),
            correlation_id: Set(correlation_id.map(str::to_string)),
            received_at: Set(Utc::now()),
            processed_at: Set(None),
        };

        let insert = processed_event::Entity::insert(row)
            .on_conflict(
                OnConflict::column(processed_event::Column::EventId)
                    .do_nothing()
                    .to_owned(),
            )
            .exec(&*self.db)
            .await;

        match insert {
            Ok(_) => ClaimOutcome::Claimed,
            Err(DbErr::RecordNotInserted) => {
                info!(event_id = %envelope.id, "event already claimed; skipping settlement");
                metrics::increment_counter("settlement_events_duplicate_total");
                ClaimOutcome::Duplicate
            }
            Err(err) => {
                // Fail open: a false negative risks a duplicate side
                // effect, a false positive would silently drop a paid
                // event
                let err = ServiceError::Database(err);
                crate::tracing::log_error(&err, "idempotency_claim");
                ClaimOutcome::Claimed
            }
        }
    }

    /// Record that settlement finished. Best-effort: the claim row is
    /// what gates duplicates, so a failed mark is only lost telemetry.
    #[instrument(skip(self))]
    pub async fn mark_processed(&self, event_id: &str) {
        let result = processed_event::Entity::find()
            .filter(processed_event::Column::EventId.eq(event_id))
            .one(&*self.db)
            .await;

        let model = match result {
            Ok(Some(model)) => model,
            Ok(None) => {
                warn!(event_id, "mark_processed found no claim row");
                return;
            }
            Err(err) => {
                crate::tracing::log_error(&ServiceError::Database(err), "mark_processed");
                return;
            }
        };

        let mut active: processed_event::ActiveModel = model.into();
        active.processed_at = Set(Some(Utc::now()));
        if let Err(err) = active.update(&*self.db).await {
            crate::tracing::log_error(&ServiceError::Database(err), "mark_processed");
        }
    }
}
