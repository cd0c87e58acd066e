//! Password-reset email delivery via the Resend API.
//!
//! Falls back to log-only when no API key is configured, so dev environments
//! work without external credentials. Delivery failures never bubble up to
//! the reset-request endpoint; callers spawn sends in the background.

use std::time::Duration;

use reqwest::Client;
use serde::Serialize;

use crate::error::{AppError, Result};

const RESEND_API_URL: &str = "https://api.resend.com/emails";

/// Retry delays in seconds (exponential backoff).
const RETRY_DELAYS: &[u64] = &[1, 4, 16];

/// Result of attempting to send an email.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailSendResult {
    Sent,
    /// No API key configured; the send was logged and skipped.
    Disabled,
}

#[derive(Clone)]
pub struct EmailService {
    client: Client,
    api_key: Option<String>,
    from: String,
}

#[derive(Serialize)]
struct ResendRequest<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    html: &'a str,
}

impl EmailService {
    pub fn new(api_key: Option<String>, from: &str) -> Self {
        Self {
            client: Client::new(),
            api_key,
            from: from.to_string(),
        }
    }

    pub async fn send_password_reset(
        &self,
        to_email: &str,
        reset_url: &str,
    ) -> Result<EmailSendResult> {
        let Some(api_key) = &self.api_key else {
            tracing::warn!(
                "RESEND_API_KEY not configured; password reset email to {} skipped",
                to_email
            );
            return Ok(EmailSendResult::Disabled);
        };

        let html = render_reset_email(reset_url);
        let request = ResendRequest {
            from: &self.from,
            to: [to_email],
            subject: "Reset your Thoub AI password",
            html: &html,
        };

        for (attempt, delay) in std::iter::once(&0u64).chain(RETRY_DELAYS.iter()).enumerate() {
            if attempt > 0 {
                tokio::time::sleep(Duration::from_secs(*delay)).await;
            }

            match self
                .client
                .post(RESEND_API_URL)
                .bearer_auth(api_key)
                .json(&request)
                .timeout(Duration::from_secs(10))
                .send()
                .await
            {
                Ok(resp) if resp.status().is_success() => {
                    if attempt > 0 {
                        tracing::debug!("Resend delivery succeeded after {} retries", attempt);
                    }
                    return Ok(EmailSendResult::Sent);
                }
                Ok(resp) => {
                    tracing::warn!("Resend API returned {}", resp.status());
                }
                Err(e) => {
                    tracing::warn!("Resend API request failed: {}", e);
                }
            }
        }

        Err(AppError::Internal(
            "Failed to send password reset email".into(),
        ))
    }
}

fn render_reset_email(reset_url: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<body style="margin: 0; padding: 40px 20px; background-color: #000000; font-family: -apple-system, sans-serif;">
  <div style="max-width: 500px; margin: 0 auto;">
    <h1 style="color: #ffffff; font-size: 24px; letter-spacing: 0.4em; text-transform: uppercase; text-align: center;">THOUB AI</h1>
    <div style="background: rgba(255, 255, 255, 0.05); border: 1px solid rgba(255, 255, 255, 0.1); border-radius: 24px; padding: 40px;">
      <h2 style="color: #D4AF37; font-size: 20px; text-transform: uppercase; text-align: center;">Password Reset</h2>
      <p style="color: rgba(255, 255, 255, 0.6); font-size: 14px; text-align: center;">
        We received a request to reset your password. Click the button below to create a new password.
      </p>
      <p style="text-align: center;">
        <a href="{reset_url}" style="display: inline-block; background: #D4AF37; color: #000000; text-decoration: none; padding: 16px 40px; border-radius: 12px; font-size: 12px; text-transform: uppercase;">Reset Password</a>
      </p>
      <p style="color: rgba(255, 255, 255, 0.3); font-size: 11px; text-align: center; text-transform: uppercase;">This link expires in 1 hour</p>
    </div>
    <p style="color: rgba(255, 255, 255, 0.2); font-size: 10px; text-align: center; text-transform: uppercase;">
      If you didn't request this, please ignore this email.
    </p>
  </div>
</body>
</html>"#
    )
}
