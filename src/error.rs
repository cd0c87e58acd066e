use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::credits::CreditKind;

/// Stable user-facing message fragments shared between handlers and tests.
pub mod msg {
    pub const USER_NOT_FOUND: &str = "User profile not found";
    pub const MEASUREMENT_NOT_FOUND: &str = "Measurement not found";
    pub const GENERATION_NOT_FOUND: &str = "Generation not found";
    pub const ORDER_EMPTY: &str = "No items in order";
    pub const INVALID_MEASUREMENT_SET: &str = "Invalid measurements detected";
    pub const EMAIL_TAKEN: &str = "An account with this email already exists";
    pub const WEAK_PASSWORD: &str = "Password must be at least 8 characters";
    pub const INVALID_RESET_TOKEN: &str = "Invalid or expired reset link";
    pub const RESET_TOKEN_EXPIRED: &str = "Reset link has expired";
    pub const EMAIL_EMPTY: &str = "Email must not be empty";
    pub const INVALID_EMAIL_FORMAT: &str = "Invalid email format";
    pub const NAME_EMPTY: &str = "Name must not be empty";
    pub const STRIPE_NOT_CONFIGURED: &str = "Payment processing is not configured";
    pub const INVALID_SIGNATURE_FORMAT: &str = "Invalid signature format";
    pub const INVALID_TIMESTAMP_IN_SIGNATURE: &str = "Invalid timestamp in signature";
    pub const INVALID_WEBHOOK_SECRET: &str = "Invalid webhook secret";
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Insufficient {0} credits")]
    InsufficientCredits(CreditKind),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
    /// Present only on insufficient-credit failures so the client can route
    /// to a top-up prompt instead of a dead-end error.
    #[serde(skip_serializing_if = "Option::is_none")]
    credit_kind: Option<CreditKind>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, details, credit_kind) = match &self {
            AppError::NotFound(msg) => {
                (StatusCode::NOT_FOUND, "Not found", Some(msg.clone()), None)
            }
            AppError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                "Bad request",
                Some(msg.clone()),
                None,
            ),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized", None, None),
            AppError::Forbidden(msg) => {
                (StatusCode::FORBIDDEN, "Forbidden", Some(msg.clone()), None)
            }
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "Conflict", Some(msg.clone()), None),
            AppError::InsufficientCredits(kind) => (
                StatusCode::PAYMENT_REQUIRED,
                "Insufficient credits",
                None,
                Some(*kind),
            ),
            AppError::Upstream(msg) => {
                tracing::error!("Upstream error: {}", msg);
                (StatusCode::BAD_GATEWAY, "Upstream error", Some(msg.clone()), None)
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error",
                    None,
                    None,
                )
            }
            AppError::Pool(e) => {
                tracing::error!("Pool error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error",
                    None,
                    None,
                )
            }
            AppError::Json(e) => {
                tracing::error!("JSON error: {}", e);
                (
                    StatusCode::BAD_REQUEST,
                    "Invalid JSON",
                    Some(e.to_string()),
                    None,
                )
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error",
                    None,
                    None,
                )
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            details,
            credit_kind,
        };

        (status, Json(body)).into_response()
    }
}

impl From<axum::extract::rejection::JsonRejection> for AppError {
    fn from(rejection: axum::extract::rejection::JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<axum::extract::rejection::QueryRejection> for AppError {
    fn from(rejection: axum::extract::rejection::QueryRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<axum::extract::rejection::PathRejection> for AppError {
    fn from(rejection: axum::extract::rejection::PathRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

/// Shorthand for the common "missing row means not found" pattern.
pub trait OptionExt<T> {
    fn or_not_found(self, msg: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn or_not_found(self, msg: &str) -> Result<T> {
        self.ok_or_else(|| AppError::NotFound(msg.into()))
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
