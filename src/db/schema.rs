use rusqlite::Connection;

/// Initialize the application schema.
pub fn init_db(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        -- Users (identity + credit balances)
        -- The CHECK constraints back up the conditional ledger updates:
        -- a balance can never be driven below zero.
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            email TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            password_hash TEXT,
            profile_image TEXT,
            measurement_credits INTEGER NOT NULL DEFAULT 0 CHECK (measurement_credits >= 0),
            generation_credits INTEGER NOT NULL DEFAULT 0 CHECK (generation_credits >= 0),
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_users_email ON users(email);

        -- Body measurements (immutable after insert except profile_image)
        CREATE TABLE IF NOT EXISTS measurements (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            thobe_length REAL NOT NULL,
            chest REAL NOT NULL,
            sleeve REAL NOT NULL,
            shoulder REAL NOT NULL,
            height_cm REAL NOT NULL,
            front_image TEXT NOT NULL,
            side_image TEXT,
            profile_image TEXT,
            created_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_measurements_user ON measurements(user_id);

        -- Try-on renders, each anchored to the measurement it was generated from
        CREATE TABLE IF NOT EXISTS generations (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            measurement_id TEXT NOT NULL REFERENCES measurements(id) ON DELETE CASCADE,
            image_url TEXT NOT NULL,
            config TEXT NOT NULL,
            created_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_generations_user_time ON generations(user_id, created_at DESC);

        -- Orders (status flips to 'paid' only via the Stripe webhook)
        CREATE TABLE IF NOT EXISTS orders (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            shipping_details TEXT NOT NULL,
            total INTEGER NOT NULL,
            status TEXT NOT NULL CHECK (status IN ('pending', 'paid')),
            stripe_session_id TEXT NOT NULL UNIQUE,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_orders_user_time ON orders(user_id, created_at DESC);

        CREATE TABLE IF NOT EXISTS order_items (
            id TEXT PRIMARY KEY,
            order_id TEXT NOT NULL REFERENCES orders(id) ON DELETE CASCADE,
            measurement_id TEXT NOT NULL REFERENCES measurements(id),
            config TEXT NOT NULL,
            quantity INTEGER NOT NULL CHECK (quantity > 0),
            unit_amount INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_order_items_order ON order_items(order_id);

        -- Password reset tokens (stored hashed; at most one live row per email)
        CREATE TABLE IF NOT EXISTS password_reset_tokens (
            token_hash TEXT PRIMARY KEY,
            email TEXT NOT NULL,
            expires_at INTEGER NOT NULL,
            created_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_reset_tokens_email ON password_reset_tokens(email);

        -- Webhook events (duplicate-delivery prevention)
        CREATE TABLE IF NOT EXISTS webhook_events (
            provider TEXT NOT NULL,
            event_id TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            PRIMARY KEY (provider, event_id)
        );
        "#,
    )?;
    Ok(())
}
