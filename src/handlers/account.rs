use axum::extract::State;
use serde::{Deserialize, Serialize};

use super::OkResponse;
use crate::crypto::{self, MIN_PASSWORD_LEN};
use crate::db::{queries, AppState};
use crate::error::{msg, AppError, OptionExt, Result};
use crate::extractors::{CurrentUser, Json};
use crate::models::{LoginRequest, NewUser, RegisterRequest, User};

/// Reset links die after one hour.
const RESET_TOKEN_TTL_SECS: i64 = 3600;

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: User,
}

/// Create an account with starter credits and log it in.
pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> Result<Json<AuthResponse>> {
    request.validate()?;
    let email = request.email.trim();

    let conn = state.db.get()?;
    if queries::get_user_by_email(&conn, email)?.is_some() {
        return Err(AppError::Conflict(msg::EMAIL_TAKEN.into()));
    }

    let password_hash = crypto::hash_password(&request.password)?;
    let user = queries::create_user(
        &conn,
        &NewUser {
            name: request.name.clone(),
            email: email.to_string(),
            password_hash: Some(password_hash),
        },
    )?;

    let token = state.sessions.issue(&user.id, &user.email)?;
    Ok(Json(AuthResponse { token, user }))
}

/// Verify credentials and issue a session token. Unknown email, wrong
/// password, and passwordless accounts all collapse to `Unauthorized`.
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<AuthResponse>> {
    let conn = state.db.get()?;

    let user = queries::get_user_by_email(&conn, &request.email)?.ok_or(AppError::Unauthorized)?;
    let stored = user.password_hash.as_deref().ok_or(AppError::Unauthorized)?;
    if !crypto::verify_password(&request.password, stored) {
        return Err(AppError::Unauthorized);
    }

    let token = state.sessions.issue(&user.id, &user.email)?;
    Ok(Json(AuthResponse { token, user }))
}

pub async fn profile(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<User>> {
    let conn = state.db.get()?;
    let user = queries::get_user_by_id(&conn, &user.id)?.or_not_found(msg::USER_NOT_FOUND)?;
    Ok(Json(user))
}

#[derive(Debug, Deserialize)]
pub struct ProfileImageRequest {
    pub filename: String,
}

pub async fn update_profile_image(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(request): Json<ProfileImageRequest>,
) -> Result<Json<OkResponse>> {
    let conn = state.db.get()?;
    if !queries::set_user_profile_image(&conn, &user.id, &request.filename)? {
        return Err(AppError::NotFound(msg::USER_NOT_FOUND.into()));
    }
    Ok(Json(OkResponse { ok: true }))
}

// ============ Password Reset ============

#[derive(Debug, Deserialize)]
pub struct ResetRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetConfirmRequest {
    pub token: String,
    pub new_password: String,
}

/// Request a reset link.
///
/// Always acks with the same response whether or not the account exists, and
/// email dispatch is spawned so response timing does not reveal which.
/// Internal failures are logged, not surfaced.
pub async fn request_password_reset(
    State(state): State<AppState>,
    Json(request): Json<ResetRequest>,
) -> Result<Json<OkResponse>> {
    if let Err(e) = issue_reset_token(&state, &request.email) {
        tracing::error!("Password reset request failed internally: {}", e);
    }
    Ok(Json(OkResponse { ok: true }))
}

fn issue_reset_token(state: &AppState, email: &str) -> Result<()> {
    let mut conn = state.db.get()?;

    let Some(user) = queries::get_user_by_email(&conn, email)? else {
        return Ok(());
    };

    let token = crypto::generate_reset_token();
    let token_hash = crypto::hash_secret(&token);
    let expires_at = chrono::Utc::now().timestamp() + RESET_TOKEN_TTL_SECS;
    queries::replace_reset_token(&mut conn, &user.email, &token_hash, expires_at)?;

    let reset_url = format!("{}/auth/reset-password?token={}", state.base_url, token);
    let email_service = state.email.clone();
    let to = user.email.clone();
    tokio::spawn(async move {
        if let Err(e) = email_service.send_password_reset(&to, &reset_url).await {
            tracing::error!("Failed to send password reset email: {}", e);
        }
    });

    Ok(())
}

/// Redeem a reset token.
///
/// Expiry consumes the token; a weak replacement password does not, so the
/// user can retry with the same link.
pub async fn confirm_password_reset(
    State(state): State<AppState>,
    Json(request): Json<ResetConfirmRequest>,
) -> Result<Json<OkResponse>> {
    let conn = state.db.get()?;

    let token_hash = crypto::hash_secret(&request.token);
    let reset = queries::get_reset_token(&conn, &token_hash)?
        .ok_or_else(|| AppError::BadRequest(msg::INVALID_RESET_TOKEN.into()))?;

    if reset.expires_at < chrono::Utc::now().timestamp() {
        queries::delete_reset_token(&conn, &token_hash)?;
        return Err(AppError::BadRequest(msg::RESET_TOKEN_EXPIRED.into()));
    }

    if request.new_password.len() < MIN_PASSWORD_LEN {
        return Err(AppError::BadRequest(msg::WEAK_PASSWORD.into()));
    }

    let password_hash = crypto::hash_password(&request.new_password)?;
    queries::update_user_password(&conn, &reset.email, &password_hash)?;
    queries::delete_reset_token(&conn, &token_hash)?;

    Ok(Json(OkResponse { ok: true }))
}
