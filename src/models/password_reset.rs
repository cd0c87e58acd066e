use serde::Serialize;

/// A pending password reset. Only the token digest is stored; the raw token
/// exists solely in the email sent to the account holder.
///
/// Lifecycle: issued -> redeemed | expired, both terminal, both delete the row.
#[derive(Debug, Clone, Serialize)]
pub struct PasswordResetToken {
    #[serde(skip_serializing)]
    pub token_hash: String,
    pub email: String,
    pub expires_at: i64,
    pub created_at: i64,
}
