//! Webhook behavior: signature verification, event-id idempotency, and the
//! PENDING -> PAID transition touching only the matching order.

mod common;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use common::*;

use atelier::handlers::webhooks::{handle_stripe_webhook, process_order_paid, process_topup};

// ============ Signature Verification ============

fn test_client() -> StripeClient {
    StripeClient::new("sk_test_xxx", TEST_WEBHOOK_SECRET)
}

fn now_ts() -> i64 {
    chrono::Utc::now().timestamp()
}

#[test]
fn test_valid_signature_accepted() {
    let client = test_client();
    let payload = b"{\"type\":\"checkout.session.completed\"}";
    let header = stripe_signature_header(payload, TEST_WEBHOOK_SECRET, now_ts());

    assert!(client.verify_webhook_signature(payload, &header).unwrap());
}

#[test]
fn test_wrong_secret_rejected() {
    let client = test_client();
    let payload = b"{\"type\":\"checkout.session.completed\"}";
    let header = stripe_signature_header(payload, "whsec_wrong", now_ts());

    assert!(!client.verify_webhook_signature(payload, &header).unwrap());
}

#[test]
fn test_modified_payload_rejected() {
    let client = test_client();
    let payload = b"{\"type\":\"checkout.session.completed\"}";
    let header = stripe_signature_header(payload, TEST_WEBHOOK_SECRET, now_ts());
    let tampered = b"{\"type\":\"checkout.session.completed\",\"extra\":true}";

    assert!(!client.verify_webhook_signature(tampered, &header).unwrap());
}

#[test]
fn test_old_timestamp_rejected() {
    let client = test_client();
    let payload = b"{}";
    // 10 minutes ago, beyond the 5-minute tolerance.
    let header = stripe_signature_header(payload, TEST_WEBHOOK_SECRET, now_ts() - 600);

    assert!(!client.verify_webhook_signature(payload, &header).unwrap());
}

#[test]
fn test_future_timestamp_rejected() {
    let client = test_client();
    let payload = b"{}";
    let header = stripe_signature_header(payload, TEST_WEBHOOK_SECRET, now_ts() + 600);

    assert!(!client.verify_webhook_signature(payload, &header).unwrap());
}

#[test]
fn test_malformed_signature_header_errors() {
    let client = test_client();
    assert!(client
        .verify_webhook_signature(b"{}", "v1=missing-timestamp")
        .is_err());
    assert!(client
        .verify_webhook_signature(b"{}", "t=123,v2=wrong-version")
        .is_err());
    assert!(client
        .verify_webhook_signature(b"{}", "t=notanumber,v1=abc")
        .is_err());
}

// ============ Top-up Processing ============

#[test]
fn test_topup_applies_pack_once() {
    let pool = setup_test_pool();
    let mut conn = pool.get().unwrap();
    let user = create_test_user(&conn, "pack@example.com");

    let result = process_topup(&mut conn, "evt_topup_1", &user.id);
    assert_eq!(result.0, StatusCode::OK);

    let balance = queries::get_credit_balance(&conn, &user.id)
        .unwrap()
        .unwrap();
    assert_eq!(
        balance.measurement_credits,
        STARTER_MEASUREMENT_CREDITS + TOPUP_MEASUREMENT_CREDITS
    );
    assert_eq!(
        balance.generation_credits,
        STARTER_GENERATION_CREDITS + TOPUP_GENERATION_CREDITS
    );

    // Redelivery of the same event id must not double-increment.
    let replay = process_topup(&mut conn, "evt_topup_1", &user.id);
    assert_eq!(replay.0, StatusCode::OK);
    assert_eq!(replay.1, "Already processed");

    let after_replay = queries::get_credit_balance(&conn, &user.id)
        .unwrap()
        .unwrap();
    assert_eq!(
        after_replay.measurement_credits,
        balance.measurement_credits
    );
    assert_eq!(after_replay.generation_credits, balance.generation_credits);

    // A genuinely new event applies again.
    let next = process_topup(&mut conn, "evt_topup_2", &user.id);
    assert_eq!(next.0, StatusCode::OK);
    let after_next = queries::get_credit_balance(&conn, &user.id)
        .unwrap()
        .unwrap();
    assert_eq!(
        after_next.measurement_credits,
        balance.measurement_credits + TOPUP_MEASUREMENT_CREDITS
    );
}

#[test]
fn test_topup_for_unknown_user_acks_without_effect() {
    let pool = setup_test_pool();
    let mut conn = pool.get().unwrap();

    let result = process_topup(&mut conn, "evt_ghost", "at_usr_missing");
    assert_eq!(result.0, StatusCode::OK);

    // The dedup row rolled back with the transaction.
    let recorded: i64 = conn
        .query_row("SELECT COUNT(*) FROM webhook_events", [], |row| row.get(0))
        .unwrap();
    assert_eq!(recorded, 0);
}

// ============ Order Completion ============

#[test]
fn test_order_paid_flips_only_matching_order() {
    let pool = setup_test_pool();
    let mut conn = pool.get().unwrap();
    let user = create_test_user(&conn, "paying@example.com");
    let measurement = create_test_measurement(&mut conn, &user.id);
    let paid = create_test_order(&mut conn, &user.id, &measurement.id, "cs_paid");
    let untouched = create_test_order(&mut conn, &user.id, &measurement.id, "cs_untouched");

    let result = process_order_paid(&mut conn, "evt_order_1", "cs_paid");
    assert_eq!(result.0, StatusCode::OK);

    let orders = queries::list_orders_for_user(&conn, &user.id).unwrap();
    let get = |id: &str| {
        orders
            .iter()
            .find(|o| o.order.id == id)
            .map(|o| o.order.status)
            .unwrap()
    };
    assert_eq!(get(&paid.id), OrderStatus::Paid);
    assert_eq!(get(&untouched.id), OrderStatus::Pending);
}

#[test]
fn test_order_paid_replay_is_noop() {
    let pool = setup_test_pool();
    let mut conn = pool.get().unwrap();
    let user = create_test_user(&conn, "replay@example.com");
    let measurement = create_test_measurement(&mut conn, &user.id);
    create_test_order(&mut conn, &user.id, &measurement.id, "cs_replay");

    assert_eq!(
        process_order_paid(&mut conn, "evt_replay", "cs_replay").1,
        "OK"
    );
    assert_eq!(
        process_order_paid(&mut conn, "evt_replay", "cs_replay").1,
        "Already processed"
    );

    let order = queries::get_order_by_session(&conn, "cs_replay")
        .unwrap()
        .unwrap();
    assert_eq!(order.status, OrderStatus::Paid);
}

#[test]
fn test_orphaned_session_is_tolerated() {
    let pool = setup_test_pool();
    let mut conn = pool.get().unwrap();

    let result = process_order_paid(&mut conn, "evt_orphan", "cs_never_persisted");
    assert_eq!(result.0, StatusCode::OK);
    assert_eq!(result.1, "No matching order");
}

// ============ End-to-end Handler ============

fn webhook_body(event_id: &str, session_id: &str, user_id: &str, kind: Option<&str>) -> Vec<u8> {
    let mut metadata = serde_json::json!({ "user_id": user_id });
    if let Some(kind) = kind {
        metadata["type"] = serde_json::Value::String(kind.to_string());
    }
    serde_json::json!({
        "id": event_id,
        "type": "checkout.session.completed",
        "data": {
            "object": {
                "id": session_id,
                "payment_status": "paid",
                "metadata": metadata,
            }
        }
    })
    .to_string()
    .into_bytes()
}

fn signed_headers(body: &[u8]) -> HeaderMap {
    let mut headers = HeaderMap::new();
    let header = stripe_signature_header(body, TEST_WEBHOOK_SECRET, chrono::Utc::now().timestamp());
    headers.insert("stripe-signature", header.parse().unwrap());
    headers
}

#[tokio::test]
async fn test_handler_rejects_bad_signature_without_mutation() {
    let state = setup_test_state();
    let user = {
        let conn = state.db.get().unwrap();
        create_test_user(&conn, "sig@example.com")
    };

    let body = webhook_body("evt_sig", "cs_sig", &user.id, Some(TOPUP_METADATA_TYPE));
    let mut headers = HeaderMap::new();
    let forged = stripe_signature_header(&body, "whsec_wrong", chrono::Utc::now().timestamp());
    headers.insert("stripe-signature", forged.parse().unwrap());

    let (status, _) =
        handle_stripe_webhook(State(state.clone()), headers, Bytes::from(body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // No balances moved.
    let conn = state.db.get().unwrap();
    let balance = queries::get_credit_balance(&conn, &user.id)
        .unwrap()
        .unwrap();
    assert_eq!(balance.measurement_credits, STARTER_MEASUREMENT_CREDITS);
    assert_eq!(balance.generation_credits, STARTER_GENERATION_CREDITS);
}

#[tokio::test]
async fn test_handler_missing_signature_is_client_error() {
    let state = setup_test_state();
    let body = webhook_body("evt_nosig", "cs_nosig", "at_usr_x", None);

    let (status, _) =
        handle_stripe_webhook(State(state), HeaderMap::new(), Bytes::from(body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_handler_ignores_unrelated_events() {
    let state = setup_test_state();
    let body = serde_json::json!({
        "id": "evt_other",
        "type": "invoice.paid",
        "data": { "object": {} }
    })
    .to_string()
    .into_bytes();
    let headers = signed_headers(&body);

    let (status, detail) =
        handle_stripe_webhook(State(state), headers, Bytes::from(body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail, "Event ignored");
}

#[tokio::test]
async fn test_handler_ignores_unpaid_sessions() {
    let state = setup_test_state();
    let body = serde_json::json!({
        "id": "evt_unpaid",
        "type": "checkout.session.completed",
        "data": {
            "object": {
                "id": "cs_unpaid",
                "payment_status": "unpaid",
                "metadata": { "user_id": "at_usr_x" }
            }
        }
    })
    .to_string()
    .into_bytes();
    let headers = signed_headers(&body);

    let (status, detail) =
        handle_stripe_webhook(State(state), headers, Bytes::from(body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail, "Event ignored");
}

#[tokio::test]
async fn test_handler_routes_topup_and_order_events() {
    let state = setup_test_state();
    let user = {
        let mut conn = state.db.get().unwrap();
        let user = create_test_user(&conn, "routes@example.com");
        let measurement = create_test_measurement(&mut conn, &user.id);
        create_test_order(&mut conn, &user.id, &measurement.id, "cs_route_order");
        user
    };

    // Top-up event reaches the ledger.
    let body = webhook_body(
        "evt_route_topup",
        "cs_route_topup",
        &user.id,
        Some(TOPUP_METADATA_TYPE),
    );
    let headers = signed_headers(&body);
    let (status, _) =
        handle_stripe_webhook(State(state.clone()), headers, Bytes::from(body)).await;
    assert_eq!(status, StatusCode::OK);

    // Garment event reaches the order.
    let body = webhook_body("evt_route_order", "cs_route_order", &user.id, None);
    let headers = signed_headers(&body);
    let (status, _) =
        handle_stripe_webhook(State(state.clone()), headers, Bytes::from(body)).await;
    assert_eq!(status, StatusCode::OK);

    let conn = state.db.get().unwrap();
    let balance = queries::get_credit_balance(&conn, &user.id)
        .unwrap()
        .unwrap();
    assert_eq!(
        balance.measurement_credits,
        STARTER_MEASUREMENT_CREDITS + TOPUP_MEASUREMENT_CREDITS
    );
    let orders = queries::list_orders_for_user(&conn, &user.id).unwrap();
    assert_eq!(orders[0].order.status, OrderStatus::Paid);
}
