use axum::extract::State;

use super::CheckoutUrlResponse;
use crate::credits::{
    CreditBalance, TOPUP_CURRENCY, TOPUP_GENERATION_CREDITS, TOPUP_MEASUREMENT_CREDITS,
    TOPUP_METADATA_TYPE, TOPUP_PRICE_MINOR,
};
use crate::db::{queries, AppState};
use crate::error::{msg, OptionExt, Result};
use crate::extractors::{CurrentUser, Json};
use crate::payments::{CheckoutLineItem, CheckoutSessionParams};

pub async fn balance(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<CreditBalance>> {
    let conn = state.db.get()?;
    let balance =
        queries::get_credit_balance(&conn, &user.id)?.or_not_found(msg::USER_NOT_FOUND)?;
    Ok(Json(balance))
}

/// Create a hosted checkout for the credit pack.
///
/// No local row is written: a completed top-up is a one-shot ledger increment
/// applied by the webhook, routed via the `credit_topup` metadata type.
pub async fn create_topup(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<CheckoutUrlResponse>> {
    let params = CheckoutSessionParams {
        line_items: vec![CheckoutLineItem {
            name: "Thoub AI Credit Pack".into(),
            description: format!(
                "{} Measurement Credits + {} Generation Credits",
                TOPUP_MEASUREMENT_CREDITS, TOPUP_GENERATION_CREDITS
            ),
            currency: TOPUP_CURRENCY,
            unit_amount: TOPUP_PRICE_MINOR,
            quantity: 1,
            image_url: None,
        }],
        success_url: format!("{}/dashboard?status=success", state.base_url),
        cancel_url: format!("{}/dashboard?status=cancelled", state.base_url),
        customer_email: user.email.clone(),
        metadata: vec![
            ("user_id", user.id.clone()),
            ("type", TOPUP_METADATA_TYPE.into()),
        ],
    };

    let (_, url) = state.stripe.create_checkout_session(&params).await?;
    Ok(Json(CheckoutUrlResponse { url }))
}
