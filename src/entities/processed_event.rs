use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Idempotency ledger row.
///
/// A row existing for an event id means the event has been claimed by a
/// delivery; a non-NULL `processed_at` means settlement finished.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "processed_events")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub event_id: String,

    pub event_type: String,

    /// Correlation id of the delivery that claimed the event
    pub correlation_id: Option<String>,

    pub received_at: DateTime<Utc>,

    pub processed_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
