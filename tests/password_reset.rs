//! Password reset flow: anti-enumeration acks, single-use time-limited
//! tokens, and redemption edge cases.

mod common;

use axum::extract::State;
use common::*;

use atelier::crypto;
use atelier::extractors::Json;
use atelier::handlers::account::{
    confirm_password_reset, request_password_reset, ResetConfirmRequest, ResetRequest,
};

fn request(email: &str) -> Json<ResetRequest> {
    Json(ResetRequest {
        email: email.to_string(),
    })
}

fn confirm(token: &str, new_password: &str) -> Json<ResetConfirmRequest> {
    Json(ResetConfirmRequest {
        token: token.to_string(),
        new_password: new_password.to_string(),
    })
}

/// Pull the single stored token row for an email, if any.
fn token_count(state: &AppState, email: &str) -> i64 {
    let conn = state.db.get().unwrap();
    queries::count_reset_tokens_for_email(&conn, email).unwrap()
}

#[tokio::test]
async fn test_request_acks_for_unknown_email_without_token() {
    let state = setup_test_state();

    let response = request_password_reset(State(state.clone()), request("ghost@example.com"))
        .await
        .unwrap();
    assert!(response.0.ok);
    assert_eq!(token_count(&state, "ghost@example.com"), 0);
}

#[tokio::test]
async fn test_request_creates_single_token_for_known_email() {
    let state = setup_test_state();
    {
        let conn = state.db.get().unwrap();
        create_test_user(&conn, "known@example.com");
    }

    let response = request_password_reset(State(state.clone()), request("known@example.com"))
        .await
        .unwrap();
    assert!(response.0.ok);
    assert_eq!(token_count(&state, "known@example.com"), 1);

    // A second request displaces the first token instead of stacking.
    request_password_reset(State(state.clone()), request("known@example.com"))
        .await
        .unwrap();
    assert_eq!(token_count(&state, "known@example.com"), 1);
}

#[tokio::test]
async fn test_redeem_unknown_token_fails() {
    let state = setup_test_state();
    let result = confirm_password_reset(
        State(state),
        confirm("deadbeef", "brand new password"),
    )
    .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_redeem_rewrites_password_and_consumes_token() {
    let state = setup_test_state();
    let user = {
        let conn = state.db.get().unwrap();
        create_test_user(&conn, "reset-me@example.com")
    };

    // Issue a token through the query layer so the raw value is known.
    let token = crypto::generate_reset_token();
    {
        let mut conn = state.db.get().unwrap();
        queries::replace_reset_token(
            &mut conn,
            &user.email,
            &crypto::hash_secret(&token),
            chrono::Utc::now().timestamp() + 3600,
        )
        .unwrap();
    }

    let response = confirm_password_reset(
        State(state.clone()),
        confirm(&token, "my new password"),
    )
    .await
    .unwrap();
    assert!(response.0.ok);

    let conn = state.db.get().unwrap();
    let updated = queries::get_user_by_email(&conn, &user.email)
        .unwrap()
        .unwrap();
    assert!(crypto::verify_password(
        "my new password",
        updated.password_hash.as_deref().unwrap()
    ));
    assert_eq!(token_count(&state, &user.email), 0);

    // Single-use: the same token cannot be redeemed twice.
    let replay = confirm_password_reset(
        State(state.clone()),
        confirm(&token, "another password"),
    )
    .await;
    assert!(replay.is_err());
    let after_replay = queries::get_user_by_email(&conn, &user.email)
        .unwrap()
        .unwrap();
    assert!(crypto::verify_password(
        "my new password",
        after_replay.password_hash.as_deref().unwrap()
    ));
}

#[tokio::test]
async fn test_expired_token_is_deleted_and_rejected() {
    let state = setup_test_state();
    let user = {
        let conn = state.db.get().unwrap();
        create_test_user(&conn, "late@example.com")
    };

    let token = crypto::generate_reset_token();
    {
        let mut conn = state.db.get().unwrap();
        queries::replace_reset_token(
            &mut conn,
            &user.email,
            &crypto::hash_secret(&token),
            chrono::Utc::now().timestamp() - 10,
        )
        .unwrap();
    }

    let result = confirm_password_reset(
        State(state.clone()),
        confirm(&token, "perfectly fine password"),
    )
    .await;
    assert!(result.is_err());

    // Expiry detection consumed the row, and the password is untouched.
    assert_eq!(token_count(&state, &user.email), 0);
    let conn = state.db.get().unwrap();
    let unchanged = queries::get_user_by_email(&conn, &user.email)
        .unwrap()
        .unwrap();
    assert_eq!(unchanged.password_hash, user.password_hash);
}

#[tokio::test]
async fn test_weak_password_does_not_consume_token() {
    let state = setup_test_state();
    let user = {
        let conn = state.db.get().unwrap();
        create_test_user(&conn, "weak@example.com")
    };

    let token = crypto::generate_reset_token();
    {
        let mut conn = state.db.get().unwrap();
        queries::replace_reset_token(
            &mut conn,
            &user.email,
            &crypto::hash_secret(&token),
            chrono::Utc::now().timestamp() + 3600,
        )
        .unwrap();
    }

    let result =
        confirm_password_reset(State(state.clone()), confirm(&token, "short")).await;
    assert!(result.is_err());

    // The token survives a weak-password attempt; a good retry succeeds.
    assert_eq!(token_count(&state, &user.email), 1);
    let retry = confirm_password_reset(
        State(state.clone()),
        confirm(&token, "long enough now"),
    )
    .await;
    assert!(retry.is_ok());
}

#[test]
fn test_expired_tokens_are_purged() {
    let mut conn = setup_test_db();
    queries::replace_reset_token(&mut conn, "a@example.com", "hash-a", 1).unwrap();
    queries::replace_reset_token(
        &mut conn,
        "b@example.com",
        "hash-b",
        chrono::Utc::now().timestamp() + 3600,
    )
    .unwrap();

    let purged = queries::purge_expired_reset_tokens(&conn).unwrap();
    assert_eq!(purged, 1);
    assert!(queries::get_reset_token(&conn, "hash-a").unwrap().is_none());
    assert!(queries::get_reset_token(&conn, "hash-b").unwrap().is_some());
}
