use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Transaction status
#[derive(Debug, Clone, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
pub enum TransactionStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "completed")]
    Completed,
    #[sea_orm(string_value = "refunded")]
    Refunded,
}

/// One row per purchased marketplace listing line.
///
/// Quantity is folded into `amount_cents` at write time; the listing's
/// own supply bookkeeping lives in a datastore trigger, not here.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "marketplace_transactions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub listing_id: String,

    /// NULL for guest buyers
    pub buyer_id: Option<Uuid>,

    pub seller_id: String,

    /// Unit price times quantity, in integer cents
    pub amount_cents: i64,

    pub currency: String,

    pub payment_intent: Option<String>,

    /// Checkout session that settled this line
    pub session_id: String,

    pub status: TransactionStatus,

    pub created_at: DateTime<Utc>,

    pub credited_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
