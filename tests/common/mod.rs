#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, Response},
    Router,
};
use chrono::Utc;
use serde_json::Value;
use tower::ServiceExt;

use settlement_api::config::AppConfig;
use settlement_api::db;
use settlement_api::errors::ServiceError;
use settlement_api::events::LineItem;
use settlement_api::handlers::webhooks::compute_signature;
use settlement_api::payment::{
    CustomerDraft, CustomerRecord, CustomerUpdate, InventoryState, PaymentGateway, ProductRecord,
    META_CATEGORY, META_INVENTORY_COUNT, META_VERSION,
};
use settlement_api::{app_router, AppState};

pub const TEST_SECRET: &str = "whsec_test_secret";

#[derive(Default)]
struct StubState {
    products: HashMap<String, ProductRecord>,
    customers: HashMap<String, CustomerRecord>,
    line_items: HashMap<String, Vec<LineItem>>,
    customers_created: u32,
    customers_updated: u32,
}

/// In-memory payment gateway with real compare-and-swap semantics and
/// failure injection for conflict scenarios.
pub struct StubGateway {
    inner: Mutex<StubState>,
    fetch_product_calls: AtomicU32,
    update_inventory_calls: AtomicU32,
    conflicts_remaining: AtomicU32,
}

impl StubGateway {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(StubState::default()),
            fetch_product_calls: AtomicU32::new(0),
            update_inventory_calls: AtomicU32::new(0),
            conflicts_remaining: AtomicU32::new(0),
        }
    }

    pub fn seed_product(&self, product_id: &str, count: i64, version: i64, category: &str) {
        let mut metadata = HashMap::new();
        metadata.insert(META_INVENTORY_COUNT.to_string(), count.to_string());
        metadata.insert(META_VERSION.to_string(), version.to_string());
        metadata.insert(META_CATEGORY.to_string(), category.to_string());
        self.inner.lock().unwrap().products.insert(
            product_id.to_string(),
            ProductRecord {
                id: product_id.to_string(),
                name: Some(format!("Product {}", product_id)),
                metadata,
            },
        );
    }

    pub fn seed_line_items(&self, session_id: &str, items: Vec<LineItem>) {
        self.inner
            .lock()
            .unwrap()
            .line_items
            .insert(session_id.to_string(), items);
    }

    /// Next `count` inventory writes fail with a version conflict.
    pub fn inject_version_conflicts(&self, count: u32) {
        self.conflicts_remaining.store(count, Ordering::SeqCst);
    }

    pub fn product_count(&self, product_id: &str) -> i64 {
        self.inner.lock().unwrap().products[product_id].metadata[META_INVENTORY_COUNT]
            .parse()
            .unwrap()
    }

    pub fn product_version(&self, product_id: &str) -> i64 {
        self.inner.lock().unwrap().products[product_id].metadata[META_VERSION]
            .parse()
            .unwrap()
    }

    pub fn fetch_product_calls(&self) -> u32 {
        self.fetch_product_calls.load(Ordering::SeqCst)
    }

    pub fn update_inventory_calls(&self) -> u32 {
        self.update_inventory_calls.load(Ordering::SeqCst)
    }

    pub fn customers_created(&self) -> u32 {
        self.inner.lock().unwrap().customers_created
    }

    pub fn customers_updated(&self) -> u32 {
        self.inner.lock().unwrap().customers_updated
    }

    pub fn customer(&self, customer_id: &str) -> Option<CustomerRecord> {
        self.inner.lock().unwrap().customers.get(customer_id).cloned()
    }

    pub fn seed_customer(&self, record: CustomerRecord) {
        self.inner
            .lock()
            .unwrap()
            .customers
            .insert(record.id.clone(), record);
    }
}

#[async_trait]
impl PaymentGateway for StubGateway {
    async fn fetch_product(&self, product_id: &str) -> Result<ProductRecord, ServiceError> {
        self.fetch_product_calls.fetch_add(1, Ordering::SeqCst);
        self.inner
            .lock()
            .unwrap()
            .products
            .get(product_id)
            .cloned()
            .ok_or_else(|| ServiceError::ExternalApi {
                status: Some(404),
                detail: format!("no such product: {}", product_id),
            })
    }

    async fn update_inventory(
        &self,
        product_id: &str,
        expected_version: i64,
        state: &InventoryState,
    ) -> Result<(), ServiceError> {
        self.update_inventory_calls.fetch_add(1, Ordering::SeqCst);
        if self.conflicts_remaining.load(Ordering::SeqCst) > 0 {
            self.conflicts_remaining.fetch_sub(1, Ordering::SeqCst);
            return Err(ServiceError::VersionConflict {
                product_id: product_id.to_string(),
            });
        }

        let mut inner = self.inner.lock().unwrap();
        let product = inner
            .products
            .get_mut(product_id)
            .ok_or_else(|| ServiceError::ExternalApi {
                status: Some(404),
                detail: format!("no such product: {}", product_id),
            })?;
        let current: i64 = product.metadata[META_VERSION].parse().unwrap_or(0);
        if current != expected_version {
            return Err(ServiceError::VersionConflict {
                product_id: product_id.to_string(),
            });
        }
        for (key, value) in state.to_metadata() {
            product.metadata.insert(key, value);
        }
        Ok(())
    }

    async fn fetch_customer(&self, customer_id: &str) -> Result<CustomerRecord, ServiceError> {
        self.inner
            .lock()
            .unwrap()
            .customers
            .get(customer_id)
            .cloned()
            .ok_or_else(|| ServiceError::ExternalApi {
                status: Some(404),
                detail: format!("no such customer: {}", customer_id),
            })
    }

    async fn find_customer_by_email(
        &self,
        email: &str,
    ) -> Result<Option<CustomerRecord>, ServiceError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .customers
            .values()
            .find(|c| c.email.as_deref() == Some(email))
            .cloned())
    }

    async fn create_customer(&self, draft: CustomerDraft) -> Result<CustomerRecord, ServiceError> {
        let mut inner = self.inner.lock().unwrap();
        inner.customers_created += 1;
        let id = format!("cus_test_{}", inner.customers_created);
        let record = CustomerRecord {
            id: id.clone(),
            email: draft.email,
            name: draft.name,
            metadata: draft.metadata,
        };
        inner.customers.insert(id, record.clone());
        Ok(record)
    }

    async fn update_customer(
        &self,
        customer_id: &str,
        update: CustomerUpdate,
    ) -> Result<CustomerRecord, ServiceError> {
        let mut inner = self.inner.lock().unwrap();
        inner.customers_updated += 1;
        let record = inner
            .customers
            .get_mut(customer_id)
            .ok_or_else(|| ServiceError::ExternalApi {
                status: Some(404),
                detail: format!("no such customer: {}", customer_id),
            })?;
        for (key, value) in update.metadata {
            record.metadata.insert(key, value);
        }
        Ok(record.clone())
    }

    async fn list_line_items(&self, session_id: &str) -> Result<Vec<LineItem>, ServiceError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .line_items
            .get(session_id)
            .cloned()
            .unwrap_or_default())
    }
}

/// Test harness: tempfile-backed SQLite, migrated schema, stub gateway,
/// and the full router with telemetry layers.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub gateway: Arc<StubGateway>,
    _db_dir: tempfile::TempDir,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Build a harness with configuration tweaks applied before wiring.
    pub async fn with_config(tweak: impl FnOnce(&mut AppConfig)) -> Self {
        let db_dir = tempfile::tempdir().expect("tempdir");
        let db_path = db_dir.path().join("settlement_test.db");

        let mut cfg = AppConfig::new(
            format!("sqlite://{}?mode=rwc", db_path.display()),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        cfg.webhook_secret = Some(TEST_SECRET.to_string());
        cfg.default_product_id = Some("prod_default".to_string());
        cfg.db_max_connections = 1;
        tweak(&mut cfg);

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let gateway = Arc::new(StubGateway::new());
        gateway.seed_product("prod_default", 25, 1, "limited-edition");

        let state = AppState::build(Arc::new(pool), cfg, gateway.clone());
        let router = app_router(state.clone());

        Self {
            router,
            state,
            gateway,
            _db_dir: db_dir,
        }
    }

    /// POST the body to the webhook endpoint with a valid signature.
    pub async fn post_webhook(&self, body: &str) -> Response<Body> {
        let timestamp = Utc::now().timestamp().to_string();
        let signature = compute_signature(TEST_SECRET, &timestamp, body.as_bytes());
        self.dispatch(
            Request::builder()
                .method(Method::POST)
                .uri("/api/v1/payments/webhook")
                .header("content-type", "application/json")
                .header(
                    "webhook-signature",
                    format!("t={},v1={}", timestamp, signature),
                )
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    /// POST without any signature header.
    pub async fn post_webhook_unsigned(&self, body: &str) -> Response<Body> {
        self.dispatch(
            Request::builder()
                .method(Method::POST)
                .uri("/api/v1/payments/webhook")
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    pub async fn dispatch(&self, request: Request<Body>) -> Response<Body> {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router dispatch")
    }
}

pub async fn response_json(response: Response<Body>) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}

/// Signed event envelope body for a `checkout.session.completed` event.
pub fn checkout_event(event_id: &str, session: Value) -> String {
    serde_json::json!({
        "id": event_id,
        "type": "checkout.session.completed",
        "created": Utc::now().timestamp(),
        "livemode": false,
        "data": {"object": session}
    })
    .to_string()
}
