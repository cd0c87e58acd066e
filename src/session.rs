//! Session token issuance and verification.
//!
//! Sessions are stateless HS256 tokens: `sub` carries the user id, a custom
//! claim carries the email. Every mutating endpoint resolves the caller
//! through [`SessionKeys::verify`]; failures collapse to `Unauthorized`
//! without detail.

use axum::http::HeaderMap;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use jwt_simple::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

const ISSUER: &str = "atelier";
const SESSION_TTL_HOURS: u64 = 24 * 7;

/// Custom claims carried alongside the standard JWT fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    pub email: String,
}

/// Authenticated caller resolved from a session token.
#[derive(Debug, Clone)]
pub struct SessionUser {
    pub id: String,
    pub email: String,
}

#[derive(Clone)]
pub struct SessionKeys {
    key: HS256Key,
}

impl SessionKeys {
    /// Create session keys from a base64-encoded secret (>= 32 bytes decoded).
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let bytes = BASE64
            .decode(encoded.trim())
            .map_err(|e| AppError::Internal(format!("Invalid session secret encoding: {}", e)))?;
        if bytes.len() < 32 {
            return Err(AppError::Internal(
                "Session secret must decode to at least 32 bytes".into(),
            ));
        }
        Ok(Self {
            key: HS256Key::from_bytes(&bytes),
        })
    }

    /// Generate a random key. Sessions signed with it die with the process.
    pub fn generate() -> Self {
        Self {
            key: HS256Key::generate(),
        }
    }

    pub fn issue(&self, user_id: &str, email: &str) -> Result<String> {
        let claims = Claims::with_custom_claims(
            SessionClaims {
                email: email.to_string(),
            },
            Duration::from_hours(SESSION_TTL_HOURS),
        )
        .with_issuer(ISSUER)
        .with_subject(user_id);

        self.key
            .authenticate(claims)
            .map_err(|e| AppError::Internal(format!("Failed to sign session token: {}", e)))
    }

    pub fn verify(&self, token: &str) -> Result<SessionUser> {
        let options = VerificationOptions {
            allowed_issuers: Some(HashSet::from_strings(&[ISSUER])),
            ..Default::default()
        };
        let claims = self
            .key
            .verify_token::<SessionClaims>(token, Some(options))
            .map_err(|_| AppError::Unauthorized)?;

        let id = claims.subject.ok_or(AppError::Unauthorized)?;
        Ok(SessionUser {
            id,
            email: claims.custom.email,
        })
    }
}

/// Extract a Bearer token from the Authorization header.
///
/// Returns the token string without the "Bearer " prefix, or None if the
/// header is missing, malformed, or empty after the prefix.
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
}
