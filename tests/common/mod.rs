//! Test utilities and fixtures for atelier integration tests

#![allow(dead_code)]

use rusqlite::Connection;

pub use atelier::credits::*;
pub use atelier::db::{create_pool, init_db, queries, AppState, DbPool};
pub use atelier::email::EmailService;
pub use atelier::models::*;
pub use atelier::payments::StripeClient;
pub use atelier::session::SessionKeys;
pub use atelier::vision::VisionClient;

pub const TEST_WEBHOOK_SECRET: &str = "whsec_test_secret";

/// Create an in-memory test database with schema initialized
pub fn setup_test_db() -> Connection {
    let conn = Connection::open_in_memory().expect("Failed to create in-memory database");
    init_db(&conn).expect("Failed to initialize schema");
    conn
}

/// File-backed pool for tests that need concurrent connections or an
/// AppState. The file lands in the OS temp dir under a unique name.
pub fn setup_test_pool() -> DbPool {
    let path = std::env::temp_dir().join(format!(
        "atelier-test-{}.db",
        uuid::Uuid::new_v4().as_simple()
    ));
    let pool = create_pool(path.to_str().expect("temp path is valid UTF-8"))
        .expect("Failed to create test pool");
    {
        let conn = pool.get().expect("Failed to get connection");
        init_db(&conn).expect("Failed to initialize schema");
    }
    pool
}

/// Full application state backed by a file-backed pool. External
/// collaborators get test credentials; nothing reaches the network unless a
/// test drives a collaborator call directly.
pub fn setup_test_state() -> AppState {
    AppState {
        db: setup_test_pool(),
        base_url: "http://127.0.0.1:3000".to_string(),
        sessions: SessionKeys::generate(),
        stripe: StripeClient::new("sk_test_xxx", TEST_WEBHOOK_SECRET),
        vision: VisionClient::new("http://127.0.0.1:9", "test-key"),
        email: EmailService::new(None, "Test <test@example.com>"),
    }
}

/// Create a test user. Starter credits (1 measurement / 3 generation) are
/// applied by the query layer.
pub fn create_test_user(conn: &Connection, email: &str) -> User {
    queries::create_user(
        conn,
        &NewUser {
            name: format!("Test User {}", email),
            email: email.to_string(),
            password_hash: Some("$argon2id$v=19$m=19456,t=2,p=1$dGVzdA$dGVzdGhhc2g".to_string()),
        },
    )
    .expect("Failed to create test user")
}

pub fn test_measurement_input() -> NewMeasurement {
    NewMeasurement {
        thobe_length: 140.0,
        chest: 102.5,
        sleeve: 58.0,
        shoulder: 44.5,
        height_cm: 175.0,
        front_image: "front.jpg".to_string(),
        side_image: Some("side.jpg".to_string()),
        profile_image: Some("profile.jpg".to_string()),
    }
}

/// Create a measurement for a user without consuming their starter credits.
pub fn create_test_measurement(conn: &mut Connection, user_id: &str) -> Measurement {
    queries::grant_credits(conn, user_id, 1, 0).expect("Failed to grant credit");
    queries::create_measurement_with_debit(conn, user_id, &test_measurement_input())
        .expect("Failed to create test measurement")
}

pub fn test_style_config() -> StyleConfig {
    StyleConfig {
        fabric: "Premium White".to_string(),
        pattern: "solid".to_string(),
        style: "Emirati".to_string(),
        closure: "buttons".to_string(),
        pocket: true,
    }
}

pub fn test_shipping_details() -> ShippingDetails {
    ShippingDetails {
        name: "Amira K".to_string(),
        address: "12 Souk Lane".to_string(),
        city: "Dubai".to_string(),
        phone: "+971-50-0000000".to_string(),
    }
}

/// Create a pending order with one item for the given measurement.
pub fn create_test_order(
    conn: &mut Connection,
    user_id: &str,
    measurement_id: &str,
    session_id: &str,
) -> Order {
    queries::create_order_with_items(
        conn,
        user_id,
        &NewOrder {
            shipping_details: test_shipping_details(),
            total: 49_900,
            stripe_session_id: session_id.to_string(),
            items: vec![NewOrderItem {
                measurement_id: measurement_id.to_string(),
                config: test_style_config(),
                quantity: 1,
                unit_amount: 49_900,
            }],
        },
    )
    .expect("Failed to create test order")
}

/// Compute a Stripe-format webhook signature header for a payload.
pub fn stripe_signature_header(payload: &[u8], secret: &str, timestamp: i64) -> String {
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    type HmacSha256 = Hmac<Sha256>;

    let signed_payload = format!("{}.{}", timestamp, String::from_utf8_lossy(payload));
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(signed_payload.as_bytes());
    let signature = hex::encode(mac.finalize().into_bytes());

    format!("t={},v1={}", timestamp, signature)
}
