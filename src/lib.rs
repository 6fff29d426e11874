//! Settlement API Library
//!
//! Webhook-driven settlement pipeline: verifies signed payment-provider
//! events, deduplicates them through a durable ledger, and settles
//! their business effects exactly once.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod metrics;
pub mod middleware_helpers;
pub mod migrator;
pub mod openapi;
pub mod payment;
pub mod retry;
pub mod services;
pub mod tracing;

use std::sync::Arc;

use axum::{routing::get, routing::post, Json, Router};
use sea_orm::DatabaseConnection;
use utoipa::OpenApi;

use crate::payment::PaymentGateway;
use crate::services::customers::CustomerLedger;
use crate::services::inventory::InventoryUpdater;
use crate::services::ledger::IdempotencyLedger;
use crate::services::marketplace::MarketplaceSettlement;
use crate::services::orders::OrderRecorder;
use crate::services::settlement::SettlementService;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub ledger: IdempotencyLedger,
    pub settlement: Arc<SettlementService>,
    pub pipeline_metrics: metrics::PipelineMetrics,
}

impl AppState {
    /// Wire the full service graph over a connected pool and gateway.
    pub fn build(
        db: Arc<DatabaseConnection>,
        config: config::AppConfig,
        gateway: Arc<dyn PaymentGateway>,
    ) -> Self {
        let inventory = InventoryUpdater::new(
            gateway.clone(),
            config.expected_product_category.clone(),
            config.low_stock_threshold,
        );
        let customers = CustomerLedger::new(
            gateway.clone(),
            config.purchase_history_limit,
            config.consent_history_budget,
        );
        let marketplace = MarketplaceSettlement::new(db.clone());
        let orders = OrderRecorder::new(db.clone());
        let settlement = Arc::new(SettlementService::new(
            inventory,
            customers,
            marketplace,
            orders,
            gateway,
            config.default_product_id.clone(),
        ));

        Self {
            ledger: IdempotencyLedger::new(db.clone()),
            settlement,
            pipeline_metrics: metrics::PipelineMetrics::new(),
            db,
            config,
        }
    }
}

/// Versioned API surface: the webhook intake and the status snapshot.
pub fn api_v1_routes() -> Router<AppState> {
    Router::new()
        .route("/status", get(handlers::health::api_status))
        .route(
            "/payments/webhook",
            post(handlers::webhooks::payment_webhook),
        )
}

/// Full application router with telemetry layers applied.
pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/metrics", get(handlers::metrics_endpoint::metrics_text))
        .route(
            "/metrics/json",
            get(handlers::metrics_endpoint::metrics_json),
        )
        .route(
            "/api-docs/openapi.json",
            get(|| async { Json(openapi::ApiDoc::openapi()) }),
        )
        .nest("/api/v1", api_v1_routes())
        .layer(tracing::configure_http_tracing())
        .layer(axum::middleware::from_fn(
            middleware_helpers::request_id_middleware,
        ))
        .with_state(state)
}
