//! Compare-and-swap contention: version conflicts retry with a fresh
//! read each attempt and never double-apply a decrement.

mod common;

use axum::http::StatusCode;
use sea_orm::{EntityTrait, PaginatorTrait};
use serde_json::json;

use settlement_api::entities::processed_event;

use common::{checkout_event, response_json, TestApp};

fn session(session_id: &str) -> serde_json::Value {
    json!({
        "id": session_id,
        "customer_details": {"email": "buyer@example.com"},
        "amount_total": 5_400,
        "currency": "usd",
        "metadata": {"quantity": "1", "productId": "prod_contested"}
    })
}

#[tokio::test]
async fn version_conflicts_retry_and_apply_exactly_once() {
    let app = TestApp::new().await;
    app.gateway
        .seed_product("prod_contested", 5, 7, "limited-edition");
    app.gateway.inject_version_conflicts(2);

    let body = checkout_event("evt_cas_1", session("cs_cas_1"));
    let ack = response_json(app.post_webhook(&body).await).await;
    assert_eq!(ack["status"], "processed");

    // Two conflicted attempts plus the successful third, each preceded
    // by its own product read
    assert_eq!(app.gateway.update_inventory_calls(), 3);
    assert_eq!(app.gateway.fetch_product_calls(), 3);

    // The decrement landed exactly once
    assert_eq!(app.gateway.product_count("prod_contested"), 4);
    assert_eq!(app.gateway.product_version("prod_contested"), 8);
}

#[tokio::test]
async fn exhausted_conflicts_acknowledge_with_error_status() {
    let app = TestApp::new().await;
    app.gateway
        .seed_product("prod_contested", 5, 7, "limited-edition");
    app.gateway.inject_version_conflicts(50);

    let body = checkout_event("evt_cas_exhausted", session("cs_cas_2"));
    let response = app.post_webhook(&body).await;

    // Still a 200: the event is claimed and the failure is repaired
    // operationally, not through provider redelivery
    assert_eq!(response.status(), StatusCode::OK);
    let ack = response_json(response).await;
    assert_eq!(ack["status"], "error");

    // Full inventory schedule, no outer re-run on a version conflict
    assert_eq!(app.gateway.update_inventory_calls(), 5);
    assert_eq!(app.gateway.product_count("prod_contested"), 5);

    // Claimed but never marked processed
    let row = processed_event::Entity::find_by_id("evt_cas_exhausted")
        .one(&*app.state.db)
        .await
        .unwrap()
        .expect("claimed row");
    assert!(row.processed_at.is_none());
}

#[tokio::test]
async fn wrong_category_fails_without_retry_or_decrement() {
    let app = TestApp::new().await;
    app.gateway.seed_product("prod_poster", 40, 2, "poster");

    let body = checkout_event(
        "evt_cas_category",
        json!({
            "id": "cs_cas_3",
            "customer_details": {"email": "buyer@example.com"},
            "amount_total": 900,
            "metadata": {"quantity": "1", "productId": "prod_poster"}
        }),
    );
    let ack = response_json(app.post_webhook(&body).await).await;
    assert_eq!(ack["status"], "error");

    // Category mismatch is terminal: one read, zero writes
    assert_eq!(app.gateway.fetch_product_calls(), 1);
    assert_eq!(app.gateway.update_inventory_calls(), 0);
    assert_eq!(app.gateway.product_count("prod_poster"), 40);
}

#[tokio::test]
async fn oversell_clamps_at_zero() {
    let app = TestApp::new().await;
    app.gateway
        .seed_product("prod_last_one", 2, 1, "limited-edition");

    let body = checkout_event(
        "evt_cas_clamp",
        json!({
            "id": "cs_cas_4",
            "customer_details": {"email": "buyer@example.com"},
            "amount_total": 27_000,
            "metadata": {"quantity": "5", "productId": "prod_last_one"}
        }),
    );
    let ack = response_json(app.post_webhook(&body).await).await;
    assert_eq!(ack["status"], "processed");

    assert_eq!(app.gateway.product_count("prod_last_one"), 0);
    assert_eq!(app.gateway.product_version("prod_last_one"), 2);

    let claimed = processed_event::Entity::find()
        .count(&*app.state.db)
        .await
        .unwrap();
    assert_eq!(claimed, 1);
}
