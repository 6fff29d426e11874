//! Database entities for the settlement service.

pub mod custom_card_order;
pub mod customer_purchase_log;
pub mod marketplace_transaction;
pub mod order_detail;
pub mod processed_event;
pub mod profile;
