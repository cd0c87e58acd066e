//! Stripe webhook ingestion.
//!
//! The HTTP status code is the contract with Stripe's retry loop: 2xx
//! acknowledges (including ignored events), 4xx means do not retry
//! (signature failures), 5xx asks for redelivery (persistence failures).
//! Effects are applied inside a transaction that also records the event id,
//! so a redelivered event is a no-op and a failed apply leaves no dedup row
//! behind to block the retry.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
    Router,
};
use rusqlite::Connection;

use crate::credits::{
    TOPUP_GENERATION_CREDITS, TOPUP_MEASUREMENT_CREDITS, TOPUP_METADATA_TYPE,
};
use crate::db::{queries, AppState};
use crate::payments::{StripeCheckoutSession, StripeWebhookEvent};

/// Status + static detail, rendered as the webhook response.
pub type WebhookResult = (StatusCode, &'static str);

const PROVIDER: &str = "stripe";

pub fn router() -> Router<AppState> {
    Router::new().route("/webhook/stripe", post(handle_stripe_webhook))
}

pub async fn handle_stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> WebhookResult {
    let Some(signature) = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
    else {
        return (StatusCode::BAD_REQUEST, "Missing stripe-signature header");
    };

    match state.stripe.verify_webhook_signature(&body, signature) {
        Ok(true) => {}
        Ok(false) => return (StatusCode::BAD_REQUEST, "Invalid signature"),
        Err(e) => {
            tracing::warn!("Webhook signature verification failed: {}", e);
            return (StatusCode::BAD_REQUEST, "Invalid signature");
        }
    }

    let event: StripeWebhookEvent = match serde_json::from_slice(&body) {
        Ok(event) => event,
        Err(e) => {
            tracing::error!("Failed to parse Stripe webhook: {}", e);
            return (StatusCode::BAD_REQUEST, "Invalid JSON");
        }
    };

    // Only completed checkouts carry effects; everything else is acked so
    // the gateway stops redelivering.
    if event.event_type != "checkout.session.completed" {
        return (StatusCode::OK, "Event ignored");
    }

    let session: StripeCheckoutSession = match serde_json::from_value(event.data.object.clone()) {
        Ok(session) => session,
        Err(e) => {
            tracing::error!("Failed to parse checkout session: {}", e);
            return (StatusCode::BAD_REQUEST, "Invalid checkout session");
        }
    };

    if session.payment_status != "paid" {
        return (StatusCode::OK, "Event ignored");
    }

    let mut conn = match state.db.get() {
        Ok(conn) => conn,
        Err(e) => {
            tracing::error!("DB connection error: {}", e);
            return (StatusCode::INTERNAL_SERVER_ERROR, "Database error");
        }
    };

    if session.metadata.kind.as_deref() == Some(TOPUP_METADATA_TYPE) {
        let Some(user_id) = session.metadata.user_id.as_deref() else {
            tracing::warn!("Top-up session {} has no user_id metadata", session.id);
            return (StatusCode::OK, "No user metadata");
        };
        process_topup(&mut conn, &event.id, user_id)
    } else {
        process_order_paid(&mut conn, &event.id, &session.id)
    }
}

/// Apply a credit-pack purchase exactly once per gateway event.
pub fn process_topup(conn: &mut Connection, event_id: &str, user_id: &str) -> WebhookResult {
    let tx = match conn.transaction() {
        Ok(tx) => tx,
        Err(e) => {
            tracing::error!("Failed to start transaction: {}", e);
            return (StatusCode::INTERNAL_SERVER_ERROR, "Database error");
        }
    };

    match queries::try_record_webhook_event(&tx, PROVIDER, event_id) {
        Ok(true) => {}
        Ok(false) => return (StatusCode::OK, "Already processed"),
        Err(e) => {
            tracing::error!("Failed to record webhook event: {}", e);
            return (StatusCode::INTERNAL_SERVER_ERROR, "Database error");
        }
    }

    match queries::grant_credits(
        &tx,
        user_id,
        TOPUP_MEASUREMENT_CREDITS,
        TOPUP_GENERATION_CREDITS,
    ) {
        Ok(true) => {}
        Ok(false) => {
            // Unknown user: redelivery cannot succeed either, so ack.
            tracing::warn!("Credit top-up for unknown user {}", user_id);
            return (StatusCode::OK, "User not found");
        }
        Err(e) => {
            tracing::error!("Failed to grant credits: {}", e);
            return (StatusCode::INTERNAL_SERVER_ERROR, "Database error");
        }
    }

    if let Err(e) = tx.commit() {
        tracing::error!("Failed to commit top-up: {}", e);
        return (StatusCode::INTERNAL_SERVER_ERROR, "Database error");
    }

    tracing::info!("Credit top-up applied for user {}", user_id);
    (StatusCode::OK, "OK")
}

/// Flip the matching order PENDING -> PAID exactly once per gateway event.
pub fn process_order_paid(
    conn: &mut Connection,
    event_id: &str,
    stripe_session_id: &str,
) -> WebhookResult {
    let tx = match conn.transaction() {
        Ok(tx) => tx,
        Err(e) => {
            tracing::error!("Failed to start transaction: {}", e);
            return (StatusCode::INTERNAL_SERVER_ERROR, "Database error");
        }
    };

    match queries::try_record_webhook_event(&tx, PROVIDER, event_id) {
        Ok(true) => {}
        Ok(false) => return (StatusCode::OK, "Already processed"),
        Err(e) => {
            tracing::error!("Failed to record webhook event: {}", e);
            return (StatusCode::INTERNAL_SERVER_ERROR, "Database error");
        }
    }

    match queries::mark_order_paid_by_session(&tx, stripe_session_id) {
        Ok(true) => {}
        Ok(false) => {
            // Orphaned session (order insert failed at checkout time) or an
            // already-paid order reached through a second gateway event.
            tracing::warn!("No pending order for session {}", stripe_session_id);
            return (StatusCode::OK, "No matching order");
        }
        Err(e) => {
            tracing::error!("Failed to update order: {}", e);
            return (StatusCode::INTERNAL_SERVER_ERROR, "Database error");
        }
    }

    if let Err(e) = tx.commit() {
        tracing::error!("Failed to commit order update: {}", e);
        return (StatusCode::INTERNAL_SERVER_ERROR, "Database error");
    }

    tracing::info!("Order for session {} marked paid", stripe_session_id);
    (StatusCode::OK, "OK")
}
