use std::net::SocketAddr;

use axum::Router;
use clap::Parser;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use atelier::config::Config;
use atelier::crypto;
use atelier::db::{create_pool, init_db, queries, AppState};
use atelier::email::EmailService;
use atelier::handlers;
use atelier::models::NewUser;
use atelier::payments::StripeClient;
use atelier::session::SessionKeys;
use atelier::vision::VisionClient;

/// Webhook dedup rows are only needed while Stripe still retries.
const WEBHOOK_EVENT_RETENTION_DAYS: i64 = 30;

#[derive(Parser, Debug)]
#[command(name = "atelier")]
#[command(about = "Backend for the Thoub AI bespoke-garment atelier")]
struct Cli {
    /// Seed the database with a demo account (dev mode only)
    #[arg(long)]
    seed: bool,

    /// Delete the database on exit (dev mode only, useful for fresh starts)
    #[arg(long)]
    ephemeral: bool,
}

fn seed_dev_data(state: &AppState) {
    let conn = state
        .db
        .get()
        .expect("Failed to get db connection for seeding");

    if queries::get_user_by_email(&conn, "admin@thoub-ai.tech")
        .expect("Failed to query users")
        .is_some()
    {
        tracing::info!("Demo account already exists, skipping seed");
        return;
    }

    let password_hash =
        crypto::hash_password("thoub123").expect("Failed to hash demo password");
    let user = queries::create_user(
        &conn,
        &NewUser {
            name: "Artisan Admin".to_string(),
            email: "admin@thoub-ai.tech".to_string(),
            password_hash: Some(password_hash),
        },
    )
    .expect("Failed to create demo user");

    tracing::info!("============================================");
    tracing::info!("DEMO ACCOUNT CREATED");
    tracing::info!("Email: {}", user.email);
    tracing::info!("Password: thoub123");
    tracing::info!(
        "Credits: {} measurement / {} generation",
        user.measurement_credits,
        user.generation_credits
    );
    tracing::info!("============================================");
}

/// Hourly sweep of expired reset tokens and old webhook dedup rows.
fn spawn_maintenance_task(state: AppState) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(3600));
        loop {
            interval.tick().await;
            match state.db.get() {
                Ok(conn) => {
                    match queries::purge_expired_reset_tokens(&conn) {
                        Ok(count) if count > 0 => {
                            tracing::info!("Purged {} expired reset tokens", count);
                        }
                        Ok(_) => {}
                        Err(e) => tracing::warn!("Failed to purge reset tokens: {}", e),
                    }
                    match queries::purge_old_webhook_events(&conn, WEBHOOK_EVENT_RETENTION_DAYS) {
                        Ok(count) if count > 0 => {
                            tracing::info!("Purged {} old webhook events", count);
                        }
                        Ok(_) => {}
                        Err(e) => tracing::warn!("Failed to purge webhook events: {}", e),
                    }
                }
                Err(e) => tracing::warn!("Maintenance task could not get a connection: {}", e),
            }
        }
    });
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "atelier=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();

    if config.dev_mode {
        tracing::info!("Running in DEVELOPMENT mode");
    }

    let db_pool = create_pool(&config.database_path).expect("Failed to create database pool");
    {
        let conn = db_pool.get().expect("Failed to get connection");
        init_db(&conn).expect("Failed to initialize database");
    }

    let sessions = match &config.session_secret {
        Some(secret) => SessionKeys::from_base64(secret).expect("Invalid SESSION_SECRET"),
        None => {
            tracing::warn!(
                "SESSION_SECRET not set; using an ephemeral key (sessions reset on restart)"
            );
            SessionKeys::generate()
        }
    };

    if config.stripe_secret_key.is_empty() {
        tracing::warn!("STRIPE_SECRET_KEY not set; checkout endpoints will fail");
    }

    let state = AppState {
        db: db_pool,
        base_url: config.base_url.clone(),
        sessions,
        stripe: StripeClient::new(&config.stripe_secret_key, &config.stripe_webhook_secret),
        vision: VisionClient::new(&config.vision_url, &config.vision_api_key),
        email: EmailService::new(config.resend_api_key.clone(), &config.email_from),
    };

    // Startup sweep; the background task repeats it hourly.
    {
        let conn = state.db.get().expect("Failed to get connection");
        match queries::purge_expired_reset_tokens(&conn) {
            Ok(count) if count > 0 => tracing::info!("Purged {} expired reset tokens", count),
            Ok(_) => {}
            Err(e) => tracing::warn!("Failed to purge reset tokens: {}", e),
        }
    }

    if cli.seed {
        if !config.dev_mode {
            tracing::warn!("--seed flag ignored: not in dev mode (set ATELIER_ENV=dev)");
        } else {
            seed_dev_data(&state);
        }
    }

    spawn_maintenance_task(state.clone());

    let app = Router::new()
        .merge(handlers::router(&config.rate_limit))
        .merge(handlers::webhooks::router())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");
    tracing::info!("Listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .expect("Server error");

    if cli.ephemeral && config.dev_mode {
        tracing::info!("Ephemeral mode: removing {}", config.database_path);
        let _ = std::fs::remove_file(&config.database_path);
    }
}
