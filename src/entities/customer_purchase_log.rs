use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Audit row written per settled purchase. Best-effort only.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "customer_purchase_log")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub session_id: String,

    /// Provider-side customer id when the session carried one
    pub customer_id: Option<String>,

    pub email: Option<String>,

    pub amount_cents: i64,

    pub quantity: i64,

    /// `standard` | `cart` | `marketplace` | `custom_card`
    pub kind: String,

    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
