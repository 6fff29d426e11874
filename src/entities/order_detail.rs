use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Denormalized snapshot of a completed physical-goods checkout.
///
/// Written best-effort once per session; a failed write never fails the
/// webhook delivery it belongs to.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "order_details")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    #[sea_orm(unique)]
    pub session_id: String,

    pub payment_intent: Option<String>,

    pub customer_email: Option<String>,

    pub amount_cents: i64,

    pub currency: String,

    pub quantity: i64,

    pub product_id: Option<String>,

    /// Shipping details as JSON text
    pub shipping: Option<String>,

    /// Session metadata as JSON text
    pub metadata: String,

    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
