pub mod account;
pub mod checkout;
pub mod credits;
pub mod generations;
pub mod measurements;
pub mod webhooks;

use std::sync::Arc;
use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::Serialize;
use tower_governor::governor::GovernorConfigBuilder;
use tower_governor::GovernorLayer;

use crate::config::RateLimitConfig;
use crate::db::AppState;

/// Body limit for multipart measurement uploads (three photos).
const UPLOAD_BODY_LIMIT: usize = 25 * 1024 * 1024;

#[derive(Debug, Serialize)]
pub struct OkResponse {
    pub ok: bool,
}

#[derive(Debug, Serialize)]
pub struct CheckoutUrlResponse {
    pub url: String,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Build the application router.
///
/// Rate limit tiers: strict on endpoints that hash passwords or call external
/// APIs, standard on reads, relaxed on health. The webhook route lives in
/// [`webhooks::router`] with no limiter - gateway retries must not be shed.
pub fn router(rate_limit: &RateLimitConfig) -> Router<AppState> {
    // Per-IP limiter; each call builds an independent window.
    let governor = |rpm: u32| {
        let period_secs = (60 / rpm.max(1) as u64).max(1);
        GovernorLayer::new(Arc::new(
            GovernorConfigBuilder::default()
                .period(Duration::from_secs(period_secs))
                .burst_size(rpm)
                .finish()
                .expect("Failed to build rate limiter config"),
        ))
    };
    let strict = rate_limit.strict_rpm;
    let standard = rate_limit.standard_rpm;
    let relaxed = rate_limit.relaxed_rpm;

    Router::new()
        .route("/health", get(health).layer(governor(relaxed)))
        // Account + password reset
        .route(
            "/account/register",
            post(account::register).layer(governor(strict)),
        )
        .route(
            "/account/login",
            post(account::login).layer(governor(strict)),
        )
        .route(
            "/account/password-reset/request",
            post(account::request_password_reset).layer(governor(strict)),
        )
        .route(
            "/account/password-reset/confirm",
            post(account::confirm_password_reset).layer(governor(strict)),
        )
        .route(
            "/account",
            get(account::profile).layer(governor(standard)),
        )
        .route(
            "/account/profile-image",
            put(account::update_profile_image).layer(governor(standard)),
        )
        // Credit ledger
        .route("/credits", get(credits::balance).layer(governor(standard)))
        .route(
            "/credits/topup",
            post(credits::create_topup).layer(governor(strict)),
        )
        // Measurements (capture calls the vision service)
        .route(
            "/measurements",
            get(measurements::list)
                .post(measurements::capture)
                .layer(DefaultBodyLimit::max(UPLOAD_BODY_LIMIT))
                .layer(governor(strict)),
        )
        .route(
            "/measurements/{id}",
            get(measurements::get_one).layer(governor(standard)),
        )
        .route(
            "/measurements/{id}/profile-image",
            put(measurements::update_profile_image).layer(governor(standard)),
        )
        // Generations (create calls the vision service)
        .route(
            "/generations",
            get(generations::list)
                .post(generations::create)
                .layer(governor(strict)),
        )
        .route(
            "/generations/{id}",
            get(generations::get_one)
                .delete(generations::delete_one)
                .layer(governor(standard)),
        )
        // Checkout + order history
        .route(
            "/checkout",
            post(checkout::create_checkout).layer(governor(strict)),
        )
        .route("/orders", get(checkout::list_orders).layer(governor(standard)))
}
