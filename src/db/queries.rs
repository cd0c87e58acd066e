use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use crate::credits::{
    CreditBalance, CreditKind, STARTER_GENERATION_CREDITS, STARTER_MEASUREMENT_CREDITS,
};
use crate::error::{msg, AppError, Result};
use crate::id::EntityType;
use crate::models::*;

use super::from_row::{
    query_all, query_one, GENERATION_WITH_MEASUREMENT_COLS, MEASUREMENT_COLS, ORDER_COLS,
    ORDER_ITEM_WITH_MEASUREMENT_COLS, RESET_TOKEN_COLS, USER_COLS,
};

fn now() -> i64 {
    Utc::now().timestamp()
}

// ============ Users ============

/// Create a user with starter credits.
pub fn create_user(conn: &Connection, input: &NewUser) -> Result<User> {
    let id = EntityType::User.gen_id();
    let now = now();

    conn.execute(
        "INSERT INTO users (id, email, name, password_hash, profile_image,
                            measurement_credits, generation_credits, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, NULL, ?5, ?6, ?7, ?7)",
        params![
            &id,
            &input.email,
            &input.name,
            &input.password_hash,
            STARTER_MEASUREMENT_CREDITS,
            STARTER_GENERATION_CREDITS,
            now
        ],
    )
    .map_err(|e| match e {
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            AppError::Conflict(msg::EMAIL_TAKEN.into())
        }
        e => e.into(),
    })?;

    Ok(User {
        id,
        email: input.email.clone(),
        name: input.name.clone(),
        password_hash: input.password_hash.clone(),
        profile_image: None,
        measurement_credits: STARTER_MEASUREMENT_CREDITS,
        generation_credits: STARTER_GENERATION_CREDITS,
        created_at: now,
        updated_at: now,
    })
}

pub fn get_user_by_id(conn: &Connection, id: &str) -> Result<Option<User>> {
    query_one(
        conn,
        &format!("SELECT {} FROM users WHERE id = ?1", USER_COLS),
        &[&id],
    )
}

pub fn get_user_by_email(conn: &Connection, email: &str) -> Result<Option<User>> {
    query_one(
        conn,
        &format!("SELECT {} FROM users WHERE email = ?1", USER_COLS),
        &[&email],
    )
}

pub fn update_user_password(conn: &Connection, email: &str, password_hash: &str) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE users SET password_hash = ?2, updated_at = ?3 WHERE email = ?1",
        params![email, password_hash, now()],
    )?;
    Ok(affected > 0)
}

pub fn set_user_profile_image(conn: &Connection, user_id: &str, filename: &str) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE users SET profile_image = ?2, updated_at = ?3 WHERE id = ?1",
        params![user_id, filename, now()],
    )?;
    Ok(affected > 0)
}

// ============ Credit Ledger ============

pub fn get_credit_balance(conn: &Connection, user_id: &str) -> Result<Option<CreditBalance>> {
    conn.query_row(
        "SELECT measurement_credits, generation_credits FROM users WHERE id = ?1",
        params![user_id],
        |row| {
            Ok(CreditBalance {
                measurement_credits: row.get(0)?,
                generation_credits: row.get(1)?,
            })
        },
    )
    .optional()
    .map_err(Into::into)
}

/// Cheap pre-check used before kicking off an expensive vision call.
/// The authoritative check is the conditional update in [`try_spend_credit`].
pub fn has_credits(conn: &Connection, user_id: &str, kind: CreditKind) -> Result<bool> {
    let sql = format!("SELECT {} > 0 FROM users WHERE id = ?1", kind.column());
    conn.query_row(&sql, params![user_id], |row| row.get(0))
        .optional()
        .map(|v| v.unwrap_or(false))
        .map_err(Into::into)
}

/// Spend one credit of the given kind.
///
/// The decrement is a single conditional UPDATE; the affected-row count is
/// the success signal. Two concurrent spends against a balance of one cannot
/// both succeed, and the balance can never go negative.
pub fn try_spend_credit(conn: &Connection, user_id: &str, kind: CreditKind) -> Result<bool> {
    let col = kind.column();
    let sql = format!(
        "UPDATE users SET {col} = {col} - 1, updated_at = ?2 WHERE id = ?1 AND {col} > 0"
    );
    let affected = conn.execute(&sql, params![user_id, now()])?;
    Ok(affected > 0)
}

/// Increment both balances. Used only by the payment webhook (top-up pack)
/// and account bootstrap. Returns false if the user does not exist.
pub fn grant_credits(
    conn: &Connection,
    user_id: &str,
    measurement_delta: i64,
    generation_delta: i64,
) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE users SET measurement_credits = measurement_credits + ?2,
                          generation_credits = generation_credits + ?3,
                          updated_at = ?4
         WHERE id = ?1",
        params![user_id, measurement_delta, generation_delta, now()],
    )?;
    Ok(affected > 0)
}

// ============ Measurements ============

/// Persist a measurement and debit one measurement credit as a single unit.
///
/// Uses an IMMEDIATE transaction so the conditional debit and the insert
/// cannot interleave with a concurrent capture for the same user. The debit
/// runs first: zero affected rows means the balance is exhausted and the
/// whole operation rolls back without persisting anything.
pub fn create_measurement_with_debit(
    conn: &mut Connection,
    user_id: &str,
    input: &NewMeasurement,
) -> Result<Measurement> {
    let tx = conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;

    if !try_spend_credit(&tx, user_id, CreditKind::Measurement)? {
        return Err(AppError::InsufficientCredits(CreditKind::Measurement));
    }

    let id = EntityType::Measurement.gen_id();
    let now = now();
    tx.execute(
        "INSERT INTO measurements (id, user_id, thobe_length, chest, sleeve, shoulder,
                                   height_cm, front_image, side_image, profile_image, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            &id,
            user_id,
            input.thobe_length,
            input.chest,
            input.sleeve,
            input.shoulder,
            input.height_cm,
            &input.front_image,
            &input.side_image,
            &input.profile_image,
            now
        ],
    )?;
    tx.commit()?;

    Ok(Measurement {
        id,
        user_id: user_id.to_string(),
        thobe_length: input.thobe_length,
        chest: input.chest,
        sleeve: input.sleeve,
        shoulder: input.shoulder,
        height_cm: input.height_cm,
        front_image: input.front_image.clone(),
        side_image: input.side_image.clone(),
        profile_image: input.profile_image.clone(),
        created_at: now,
    })
}

/// Load-and-authorize: a row that exists but belongs to someone else is
/// indistinguishable from a missing one.
pub fn get_measurement_for_user(
    conn: &Connection,
    id: &str,
    user_id: &str,
) -> Result<Option<Measurement>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM measurements WHERE id = ?1 AND user_id = ?2",
            MEASUREMENT_COLS
        ),
        &[&id, &user_id],
    )
}

pub fn list_measurements_for_user(conn: &Connection, user_id: &str) -> Result<Vec<Measurement>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM measurements WHERE user_id = ?1 ORDER BY created_at DESC",
            MEASUREMENT_COLS
        ),
        &[&user_id],
    )
}

/// Attach a profile image to a measurement. The only permitted mutation
/// after capture.
pub fn set_measurement_profile_image(
    conn: &Connection,
    id: &str,
    user_id: &str,
    profile_image: &str,
) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE measurements SET profile_image = ?3 WHERE id = ?1 AND user_id = ?2",
        params![id, user_id, profile_image],
    )?;
    Ok(affected > 0)
}

/// Count how many of the given measurement ids exist AND belong to the user.
/// Checkout validation compares this against the distinct request count.
pub fn count_measurements_owned(
    conn: &Connection,
    user_id: &str,
    ids: &[String],
) -> Result<i64> {
    if ids.is_empty() {
        return Ok(0);
    }

    let placeholders = vec!["?"; ids.len()].join(", ");
    let sql = format!(
        "SELECT COUNT(*) FROM measurements WHERE user_id = ? AND id IN ({})",
        placeholders
    );

    let mut values: Vec<rusqlite::types::Value> = Vec::with_capacity(ids.len() + 1);
    values.push(user_id.to_string().into());
    for id in ids {
        values.push(id.clone().into());
    }

    conn.query_row(&sql, rusqlite::params_from_iter(values), |row| row.get(0))
        .map_err(Into::into)
}

// ============ Generations ============

/// Persist a try-on render and debit one generation credit as a single unit.
/// Same transaction discipline as [`create_measurement_with_debit`].
pub fn create_generation_with_debit(
    conn: &mut Connection,
    user_id: &str,
    input: &NewGeneration,
) -> Result<Generation> {
    let tx = conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;

    if !try_spend_credit(&tx, user_id, CreditKind::Generation)? {
        return Err(AppError::InsufficientCredits(CreditKind::Generation));
    }

    let id = EntityType::Generation.gen_id();
    let now = now();
    let config = serde_json::to_string(&input.config)?;
    tx.execute(
        "INSERT INTO generations (id, user_id, measurement_id, image_url, config, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![&id, user_id, &input.measurement_id, &input.image_url, &config, now],
    )?;
    tx.commit()?;

    Ok(Generation {
        id,
        user_id: user_id.to_string(),
        measurement_id: input.measurement_id.clone(),
        image_url: input.image_url.clone(),
        config: input.config.clone(),
        created_at: now,
    })
}

pub fn get_generation_for_user(
    conn: &Connection,
    id: &str,
    user_id: &str,
) -> Result<Option<GenerationWithMeasurement>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM generations g JOIN measurements m ON g.measurement_id = m.id
             WHERE g.id = ?1 AND g.user_id = ?2",
            GENERATION_WITH_MEASUREMENT_COLS
        ),
        &[&id, &user_id],
    )
}

pub fn list_generations_for_user(
    conn: &Connection,
    user_id: &str,
) -> Result<Vec<GenerationWithMeasurement>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM generations g JOIN measurements m ON g.measurement_id = m.id
             WHERE g.user_id = ?1 ORDER BY g.created_at DESC",
            GENERATION_WITH_MEASUREMENT_COLS
        ),
        &[&user_id],
    )
}

pub fn delete_generation_for_user(conn: &Connection, id: &str, user_id: &str) -> Result<bool> {
    let deleted = conn.execute(
        "DELETE FROM generations WHERE id = ?1 AND user_id = ?2",
        params![id, user_id],
    )?;
    Ok(deleted > 0)
}

// ============ Orders ============

/// Persist a pending order and its items atomically, keyed by the gateway
/// session id. Called only after the gateway accepted the session, so a
/// gateway failure leaves no order row behind.
pub fn create_order_with_items(
    conn: &mut Connection,
    user_id: &str,
    input: &NewOrder,
) -> Result<Order> {
    let tx = conn.transaction()?;

    let id = EntityType::Order.gen_id();
    let now = now();
    let shipping = serde_json::to_string(&input.shipping_details)?;
    tx.execute(
        "INSERT INTO orders (id, user_id, shipping_details, total, status,
                             stripe_session_id, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
        params![
            &id,
            user_id,
            &shipping,
            input.total,
            OrderStatus::Pending.as_str(),
            &input.stripe_session_id,
            now
        ],
    )?;

    for item in &input.items {
        let item_id = EntityType::OrderItem.gen_id();
        let config = serde_json::to_string(&item.config)?;
        tx.execute(
            "INSERT INTO order_items (id, order_id, measurement_id, config, quantity, unit_amount)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                &item_id,
                &id,
                &item.measurement_id,
                &config,
                item.quantity,
                item.unit_amount
            ],
        )?;
    }

    tx.commit()?;

    Ok(Order {
        id,
        user_id: user_id.to_string(),
        shipping_details: input.shipping_details.clone(),
        total: input.total,
        status: OrderStatus::Pending,
        stripe_session_id: input.stripe_session_id.clone(),
        created_at: now,
        updated_at: now,
    })
}

pub fn list_orders_for_user(conn: &Connection, user_id: &str) -> Result<Vec<OrderWithItems>> {
    let orders: Vec<Order> = query_all(
        conn,
        &format!(
            "SELECT {} FROM orders WHERE user_id = ?1 ORDER BY created_at DESC",
            ORDER_COLS
        ),
        &[&user_id],
    )?;

    orders
        .into_iter()
        .map(|order| {
            let items = query_all(
                conn,
                &format!(
                    "SELECT {} FROM order_items i JOIN measurements m ON i.measurement_id = m.id
                     WHERE i.order_id = ?1",
                    ORDER_ITEM_WITH_MEASUREMENT_COLS
                ),
                &[&order.id],
            )?;
            Ok(OrderWithItems { order, items })
        })
        .collect()
}

/// PENDING -> PAID, keyed by the gateway session id. The status condition
/// makes the transition one-way; anything other than a pending match is a
/// no-op reported through the affected-row count.
pub fn mark_order_paid_by_session(conn: &Connection, stripe_session_id: &str) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE orders SET status = 'paid', updated_at = ?2
         WHERE stripe_session_id = ?1 AND status = 'pending'",
        params![stripe_session_id, now()],
    )?;
    Ok(affected > 0)
}

pub fn get_order_by_session(
    conn: &Connection,
    stripe_session_id: &str,
) -> Result<Option<Order>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM orders WHERE stripe_session_id = ?1",
            ORDER_COLS
        ),
        &[&stripe_session_id],
    )
}

// ============ Password Reset Tokens ============

/// Issue a token for an email, displacing any prior one. The delete+insert
/// pair is transactional so a request can never leave two live tokens.
pub fn replace_reset_token(
    conn: &mut Connection,
    email: &str,
    token_hash: &str,
    expires_at: i64,
) -> Result<()> {
    let tx = conn.transaction()?;
    tx.execute(
        "DELETE FROM password_reset_tokens WHERE email = ?1",
        params![email],
    )?;
    tx.execute(
        "INSERT INTO password_reset_tokens (token_hash, email, expires_at, created_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![token_hash, email, expires_at, now()],
    )?;
    tx.commit()?;
    Ok(())
}

pub fn get_reset_token(
    conn: &Connection,
    token_hash: &str,
) -> Result<Option<PasswordResetToken>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM password_reset_tokens WHERE token_hash = ?1",
            RESET_TOKEN_COLS
        ),
        &[&token_hash],
    )
}

pub fn delete_reset_token(conn: &Connection, token_hash: &str) -> Result<bool> {
    let deleted = conn.execute(
        "DELETE FROM password_reset_tokens WHERE token_hash = ?1",
        params![token_hash],
    )?;
    Ok(deleted > 0)
}

pub fn count_reset_tokens_for_email(conn: &Connection, email: &str) -> Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM password_reset_tokens WHERE email = ?1",
        params![email],
        |row| row.get(0),
    )
    .map_err(Into::into)
}

/// Purge tokens past their expiry. Returns the number of deleted records.
pub fn purge_expired_reset_tokens(conn: &Connection) -> Result<usize> {
    let deleted = conn.execute(
        "DELETE FROM password_reset_tokens WHERE expires_at < ?1",
        params![now()],
    )?;
    Ok(deleted)
}

// ============ Webhook Event Deduplication ============

/// Atomically record a webhook event, returning true if this is a new event.
/// Returns false if the event was already processed (duplicate delivery).
///
/// Uses INSERT OR IGNORE for atomicity - if the (provider, event_id) pair
/// already exists, the insert is silently ignored and we return false.
pub fn try_record_webhook_event(conn: &Connection, provider: &str, event_id: &str) -> Result<bool> {
    let affected = conn.execute(
        "INSERT OR IGNORE INTO webhook_events (provider, event_id, created_at) VALUES (?1, ?2, ?3)",
        params![provider, event_id, now()],
    )?;
    Ok(affected > 0)
}

/// Purge old webhook events beyond the retention period. They only exist for
/// duplicate-delivery prevention and Stripe stops retrying after a few days.
pub fn purge_old_webhook_events(conn: &Connection, retention_days: i64) -> Result<usize> {
    let cutoff = now() - (retention_days * 86400);
    let deleted = conn.execute(
        "DELETE FROM webhook_events WHERE created_at < ?1",
        params![cutoff],
    )?;
    Ok(deleted)
}
