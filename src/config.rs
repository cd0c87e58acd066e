use std::env;

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub strict_rpm: u32,
    pub standard_rpm: u32,
    pub relaxed_rpm: u32,
}

#[derive(Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_path: String,
    pub base_url: String,
    pub dev_mode: bool,
    /// Base64-encoded HS256 secret. Absent = ephemeral key (dev only).
    pub session_secret: Option<String>,
    pub stripe_secret_key: String,
    pub stripe_webhook_secret: String,
    pub resend_api_key: Option<String>,
    pub email_from: String,
    pub vision_url: String,
    pub vision_api_key: String,
    pub rate_limit: RateLimitConfig,
}

fn env_u32(name: &str, default: u32) -> u32 {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let dev_mode = env::var("ATELIER_ENV")
            .map(|v| v == "dev" || v == "development")
            .unwrap_or(false);

        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port: u16 = env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(3000);

        let base_url =
            env::var("BASE_URL").unwrap_or_else(|_| format!("http://{}:{}", host, port));

        Self {
            host,
            port,
            database_path: env::var("DATABASE_PATH").unwrap_or_else(|_| "atelier.db".to_string()),
            base_url,
            dev_mode,
            session_secret: env::var("SESSION_SECRET").ok(),
            stripe_secret_key: env::var("STRIPE_SECRET_KEY").unwrap_or_default(),
            stripe_webhook_secret: env::var("STRIPE_WEBHOOK_SECRET").unwrap_or_default(),
            resend_api_key: env::var("RESEND_API_KEY").ok(),
            email_from: env::var("EMAIL_FROM")
                .unwrap_or_else(|_| "Thoub AI <onboarding@resend.dev>".to_string()),
            vision_url: env::var("VISION_API_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:8000".to_string()),
            vision_api_key: env::var("VISION_API_KEY").unwrap_or_default(),
            rate_limit: RateLimitConfig {
                strict_rpm: env_u32("RATE_LIMIT_STRICT_RPM", 10),
                standard_rpm: env_u32("RATE_LIMIT_STANDARD_RPM", 60),
                relaxed_rpm: env_u32("RATE_LIMIT_RELAXED_RPM", 120),
            },
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
