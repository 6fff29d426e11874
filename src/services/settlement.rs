//! Settlement routing for verified, deduplicated events.
//!
//! A completed checkout session settles in one of three modes: a cart
//! of typed items, a single marketplace listing, or a standard
//! limited-edition purchase. Everything else the provider sends is a
//! logged no-op.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::errors::ServiceError;
use crate::events::{CheckoutSession, EventEnvelope, EventKind, LineItem};
use crate::payment::PaymentGateway;
use crate::retry::{self, RetryPolicy};
use crate::services::consent;
use crate::services::customers::CustomerLedger;
use crate::services::inventory::InventoryUpdater;
use crate::services::marketplace::{ListingSale, MarketplaceSettlement};
use crate::services::orders::{OrderRecorder, PurchaseKind};
use crate::services::{attempt_non_critical, consent::ConsentRecord};

/// One parsed `item{N}_*` group from cart session metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartItem {
    pub index: usize,
    pub kind: String,
    pub quantity: i64,
    pub listing_id: Option<String>,
    pub seller_id: Option<String>,
    pub price_cents: Option<i64>,
    pub title: Option<String>,
    pub card_id: Option<String>,
    pub card_name: Option<String>,
    pub product_id: Option<String>,
}

/// Scan `item0_type`, `item1_type`, ... until the first missing index.
/// The metadata is a flat encoding of a bounded cart, so a gap
/// terminates the scan.
pub fn parse_cart_items(session: &CheckoutSession) -> Vec<CartItem> {
    let mut items = Vec::new();
    for index in 0.. {
        let Some(kind) = session.meta(&format!("item{}_type", index)) else {
            break;
        };
        items.push(CartItem {
            index,
            kind: kind.to_string(),
            quantity: session
                .meta_i64(&format!("item{}_quantity", index))
                .filter(|q| *q > 0)
                .unwrap_or(1),
            listing_id: session
                .meta(&format!("item{}_listingId", index))
                .map(str::to_string),
            seller_id: session
                .meta(&format!("item{}_sellerId", index))
                .map(str::to_string),
            price_cents: session.meta_i64(&format!("item{}_priceCents", index)),
            title: session
                .meta(&format!("item{}_title", index))
                .map(str::to_string),
            card_id: session
                .meta(&format!("item{}_cardId", index))
                .map(str::to_string),
            card_name: session
                .meta(&format!("item{}_cardName", index))
                .map(str::to_string),
            product_id: session
                .meta(&format!("item{}_productId", index))
                .map(str::to_string),
        });
    }
    items
}

/// Find the provider line item backing a cart item, matching by title
/// substring in either direction. Provider descriptions often carry
/// decoration around the listing title.
pub fn match_line_item<'a>(title: &str, line_items: &'a [LineItem]) -> Option<&'a LineItem> {
    let needle = title.trim().to_lowercase();
    if needle.is_empty() {
        return None;
    }
    line_items.iter().find(|item| {
        item.description
            .as_deref()
            .map(|description| {
                let haystack = description.to_lowercase();
                haystack.contains(&needle) || needle.contains(&haystack)
            })
            .unwrap_or(false)
    })
}

/// Routes verified events to their settlement handlers.
#[derive(Clone)]
pub struct SettlementService {
    inventory: InventoryUpdater,
    customers: CustomerLedger,
    marketplace: MarketplaceSettlement,
    orders: OrderRecorder,
    gateway: Arc<dyn PaymentGateway>,
    default_product_id: Option<String>,
    policy: RetryPolicy,
}

impl SettlementService {
    pub fn new(
        inventory: InventoryUpdater,
        customers: CustomerLedger,
        marketplace: MarketplaceSettlement,
        orders: OrderRecorder,
        gateway: Arc<dyn PaymentGateway>,
        default_product_id: Option<String>,
    ) -> Self {
        Self {
            inventory,
            customers,
            marketplace,
            orders,
            gateway,
            default_product_id,
            policy: RetryPolicy::standard(),
        }
    }

    /// Handle one claimed event. Only completed checkouts carry
    /// business effects; the remaining recognized kinds are logged
    /// no-ops, and unknown kinds are acknowledged without guessing.
    #[instrument(skip(self, envelope), fields(event_id = %envelope.id, event_type = %envelope.event_type))]
    pub async fn handle_event(&self, envelope: &EventEnvelope) -> Result<(), ServiceError> {
        match envelope.kind() {
            EventKind::CheckoutSessionCompleted => {
                let session = envelope.checkout_session()?;
                self.settle_checkout(&session).await
            }
            EventKind::CheckoutSessionExpired => {
                info!("checkout session expired; nothing to settle");
                Ok(())
            }
            EventKind::PaymentIntentSucceeded | EventKind::PaymentIntentFailed => {
                info!("payment intent lifecycle event; settlement happens on session completion");
                Ok(())
            }
            EventKind::ChargeRefunded => {
                info!("charge refunded; compensations are recorded manually");
                Ok(())
            }
            EventKind::Unknown(tag) => {
                info!(raw_type = %tag, "unrecognized event type acknowledged");
                Ok(())
            }
        }
    }

    async fn settle_checkout(&self, session: &CheckoutSession) -> Result<(), ServiceError> {
        let record = consent::extract(session);
        let validation = consent::validate(&record, session);
        consent::audit(&record, &validation);

        if session.meta_flag("cart") {
            return self.settle_cart(session, &record).await;
        }
        if session.meta("listingId").is_some() {
            return self.settle_marketplace_single(session).await;
        }
        self.settle_standard(session, &record).await
    }

    /// Standard path: one limited-edition product, quantity from
    /// session metadata.
    async fn settle_standard(
        &self,
        session: &CheckoutSession,
        record: &ConsentRecord,
    ) -> Result<(), ServiceError> {
        let quantity = session.meta_i64("quantity").filter(|q| *q > 0).unwrap_or(1);
        let product_id = session
            .meta("productId")
            .map(str::to_string)
            .or_else(|| self.default_product_id.clone());

        match product_id.as_deref() {
            Some(product_id) => {
                self.inventory
                    .settle_purchase(product_id, quantity, &session.id)
                    .await?;
            }
            None => warn!(
                session_id = %session.id,
                "no product id in metadata and no default configured; skipping inventory"
            ),
        }

        // Inventory is already settled; a customer-side failure must
        // not trigger provider redelivery
        attempt_non_critical("customer_ledger", || {
            self.customers.record_purchase(
                session,
                quantity,
                session.amount_total.unwrap_or(0),
                record,
            )
        })
        .await;

        if session.shipping_details.is_some() {
            attempt_non_critical("order_detail_snapshot", || {
                self.orders
                    .write_order_detail(session, quantity, product_id.as_deref())
            })
            .await;
        }
        attempt_non_critical("purchase_log", || {
            self.orders
                .log_purchase(session, quantity, PurchaseKind::Standard)
        })
        .await;

        Ok(())
    }

    /// Single marketplace listing named directly in session metadata.
    async fn settle_marketplace_single(
        &self,
        session: &CheckoutSession,
    ) -> Result<(), ServiceError> {
        self.marketplace.settle_single_listing(session).await?;
        attempt_non_critical("purchase_log", || {
            self.orders
                .log_purchase(session, 1, PurchaseKind::Marketplace)
        })
        .await;
        Ok(())
    }

    /// Cart path: each typed item settles independently; provider
    /// line items refine quantities and amounts when a title matches.
    async fn settle_cart(
        &self,
        session: &CheckoutSession,
        record: &ConsentRecord,
    ) -> Result<(), ServiceError> {
        let items = parse_cart_items(session);
        if items.is_empty() {
            warn!(session_id = %session.id, "cart session carries no items; nothing to settle");
            return Ok(());
        }

        // One fetch per session; failure falls back to metadata values
        let line_items = attempt_non_critical("cart_line_items", || {
            retry::execute("list_line_items", &self.policy, || {
                self.gateway.list_line_items(&session.id)
            })
        })
        .await
        .unwrap_or_default();

        let buyer_id = self.marketplace.resolve_buyer(session).await?;
        let mut settled_quantity = 0i64;

        for item in &items {
            let matched = item
                .title
                .as_deref()
                .and_then(|title| match_line_item(title, &line_items));
            let quantity = matched
                .and_then(|line| line.quantity)
                .filter(|q| *q > 0)
                .unwrap_or(item.quantity);

            match item.kind.as_str() {
                "limited-edition" => {
                    let product_id = item
                        .product_id
                        .clone()
                        .or_else(|| self.default_product_id.clone());
                    match product_id.as_deref() {
                        Some(product_id) => {
                            self.inventory
                                .settle_purchase(product_id, quantity, &session.id)
                                .await?;
                            settled_quantity += quantity;
                        }
                        None => warn!(
                            index = item.index,
                            "limited-edition cart item without product id; skipped"
                        ),
                    }
                }
                "custom-card" => {
                    let Some(card_id) = item.card_id.as_deref() else {
                        warn!(index = item.index, "custom-card cart item without cardId; skipped");
                        continue;
                    };
                    let amount_cents = matched
                        .and_then(|line| line.amount_total)
                        .or(item.price_cents.map(|unit| unit * quantity));
                    attempt_non_critical("custom_card_order", || {
                        self.orders.write_custom_card_order(
                            &session.id,
                            card_id,
                            item.card_name.as_deref(),
                            quantity,
                            amount_cents,
                        )
                    })
                    .await;
                    settled_quantity += quantity;
                }
                "marketplace" => {
                    let (Some(listing_id), Some(seller_id)) =
                        (item.listing_id.clone(), item.seller_id.clone())
                    else {
                        warn!(
                            index = item.index,
                            "marketplace cart item missing listingId/sellerId; skipped"
                        );
                        continue;
                    };
                    let amount_cents = matched
                        .and_then(|line| line.amount_total)
                        .or(item.price_cents.map(|unit| unit * quantity))
                        .unwrap_or(0);
                    self.marketplace
                        .record_sale(
                            session,
                            &ListingSale {
                                listing_id,
                                seller_id,
                                amount_cents,
                            },
                            buyer_id,
                        )
                        .await?;
                    settled_quantity += quantity;
                }
                other => {
                    warn!(index = item.index, kind = %other, "unknown cart item type; skipped");
                }
            }
        }

        // Nothing settled means nothing to record.
        if settled_quantity == 0 {
            return Ok(());
        }

        attempt_non_critical("customer_ledger", || {
            self.customers.record_purchase(
                session,
                settled_quantity,
                session.amount_total.unwrap_or(0),
                record,
            )
        })
        .await;
        if session.shipping_details.is_some() {
            attempt_non_critical("order_detail_snapshot", || {
                self.orders.write_order_detail(session, settled_quantity, None)
            })
            .await;
        }
        attempt_non_critical("purchase_log", || {
            self.orders
                .log_purchase(session, settled_quantity, PurchaseKind::Cart)
        })
        .await;

        Ok(())
    }
}
