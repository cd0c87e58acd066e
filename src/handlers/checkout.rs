use std::collections::HashSet;

use axum::extract::State;
use rusqlite::Connection;

use super::CheckoutUrlResponse;
use crate::db::{queries, AppState};
use crate::error::{msg, AppError, Result};
use crate::extractors::{CurrentUser, Json};
use crate::models::{CheckoutItem, CheckoutRequest, NewOrder, NewOrderItem, OrderWithItems};
use crate::payments::{CheckoutLineItem, CheckoutSessionParams};

/// Server-side price authority: one bespoke garment, in minor units.
/// Client-supplied amounts never enter the total.
pub const GARMENT_UNIT_AMOUNT: i64 = 49_900;
pub const GARMENT_CURRENCY: &str = "usd";

/// Validate the item list shape and measurement ownership.
///
/// The distinct-count comparison rejects duplicated measurement ids, which
/// would otherwise let one owned measurement vouch for several items.
pub fn validate_items(conn: &Connection, user_id: &str, items: &[CheckoutItem]) -> Result<()> {
    if items.is_empty() {
        return Err(AppError::BadRequest(msg::ORDER_EMPTY.into()));
    }

    for item in items {
        if item.quantity < 1 {
            return Err(AppError::BadRequest(
                "Item quantity must be at least 1".into(),
            ));
        }
    }

    let measurement_ids: Vec<String> = items.iter().map(|i| i.measurement_id.clone()).collect();
    let distinct: HashSet<&String> = measurement_ids.iter().collect();
    if distinct.len() != items.len() {
        return Err(AppError::BadRequest(msg::INVALID_MEASUREMENT_SET.into()));
    }

    let owned = queries::count_measurements_owned(conn, user_id, &measurement_ids)?;
    if owned as usize != items.len() {
        return Err(AppError::BadRequest(msg::INVALID_MEASUREMENT_SET.into()));
    }

    Ok(())
}

/// Order total, computed purely from the server unit price.
pub fn order_total(items: &[CheckoutItem]) -> i64 {
    items
        .iter()
        .map(|item| GARMENT_UNIT_AMOUNT * item.quantity)
        .sum()
}

/// Create a hosted checkout and the matching PENDING order.
///
/// The gateway call comes first: if Stripe rejects the session, no order row
/// exists. If the order insert fails afterwards, the orphaned session is
/// tolerated by the webhook handler (no matching order -> ack and log).
pub async fn create_checkout(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(request): Json<CheckoutRequest>,
) -> Result<Json<CheckoutUrlResponse>> {
    {
        let conn = state.db.get()?;
        validate_items(&conn, &user.id, &request.items)?;
    }

    let line_items = request
        .items
        .iter()
        .map(|item| CheckoutLineItem {
            name: format!("Bespoke Thoub - {}", item.config.style),
            description: format!(
                "Tailored in {}. Pattern: {}.",
                item.config.fabric, item.config.pattern
            ),
            currency: GARMENT_CURRENCY,
            unit_amount: GARMENT_UNIT_AMOUNT,
            quantity: item.quantity,
            image_url: item.image_url.clone(),
        })
        .collect();

    let total = order_total(&request.items);

    let params = CheckoutSessionParams {
        line_items,
        success_url: format!(
            "{}/checkout/success?session_id={{CHECKOUT_SESSION_ID}}",
            state.base_url
        ),
        cancel_url: format!("{}/checkout", state.base_url),
        customer_email: user.email.clone(),
        // The pending order row is the webhook's source of truth; metadata
        // carries only the routing key.
        metadata: vec![("user_id", user.id.clone())],
    };

    let (session_id, url) = state.stripe.create_checkout_session(&params).await?;

    let order = NewOrder {
        shipping_details: request.shipping_details,
        total,
        stripe_session_id: session_id.clone(),
        items: request
            .items
            .into_iter()
            .map(|item| NewOrderItem {
                measurement_id: item.measurement_id,
                config: item.config,
                quantity: item.quantity,
                unit_amount: GARMENT_UNIT_AMOUNT,
            })
            .collect(),
    };

    let mut conn = state.db.get()?;
    queries::create_order_with_items(&mut conn, &user.id, &order).inspect_err(|e| {
        tracing::error!(
            "Order insert failed after creating Stripe session {}: {}",
            session_id,
            e
        );
    })?;

    Ok(Json(CheckoutUrlResponse { url }))
}

/// The caller's order history, newest first, items and measurements included.
pub async fn list_orders(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<Vec<OrderWithItems>>> {
    let conn = state.db.get()?;
    Ok(Json(queries::list_orders_for_user(&conn, &user.id)?))
}
