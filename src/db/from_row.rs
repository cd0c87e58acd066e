//! Row mapping trait and helpers for reducing boilerplate in queries.

use rusqlite::{Connection, OptionalExtension, Row, ToSql};

use crate::models::*;

/// Parse a string column into an enum type, converting parse errors to
/// rusqlite errors instead of panicking on corrupt data.
fn parse_enum<T: std::str::FromStr>(row: &Row, col: usize, col_name: &str) -> rusqlite::Result<T> {
    row.get::<_, String>(col)?.parse::<T>().map_err(|_| {
        rusqlite::Error::InvalidColumnType(col, col_name.to_string(), rusqlite::types::Type::Text)
    })
}

/// Parse a JSON TEXT column into a typed value.
fn parse_json<T: serde::de::DeserializeOwned>(
    row: &Row,
    col: usize,
    col_name: &str,
) -> rusqlite::Result<T> {
    let raw: String = row.get(col)?;
    serde_json::from_str(&raw).map_err(|_| {
        rusqlite::Error::InvalidColumnType(col, col_name.to_string(), rusqlite::types::Type::Text)
    })
}

/// Trait for constructing a type from a database row.
pub trait FromRow: Sized {
    fn from_row(row: &Row) -> rusqlite::Result<Self>;
}

/// Query for a single optional result.
pub fn query_one<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Option<T>> {
    conn.query_row(sql, params, T::from_row)
        .optional()
        .map_err(Into::into)
}

/// Query for multiple results.
pub fn query_all<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, T::from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ============ SQL SELECT Constants ============

pub const USER_COLS: &str = "id, email, name, password_hash, profile_image, measurement_credits, generation_credits, created_at, updated_at";

pub const MEASUREMENT_COLS: &str = "id, user_id, thobe_length, chest, sleeve, shoulder, height_cm, front_image, side_image, profile_image, created_at";

/// Generation joined with its measurement (aliases g and m).
pub const GENERATION_WITH_MEASUREMENT_COLS: &str = "g.id, g.user_id, g.measurement_id, g.image_url, g.config, g.created_at, \
     m.id, m.user_id, m.thobe_length, m.chest, m.sleeve, m.shoulder, m.height_cm, m.front_image, m.side_image, m.profile_image, m.created_at";

pub const ORDER_COLS: &str =
    "id, user_id, shipping_details, total, status, stripe_session_id, created_at, updated_at";

/// Order item joined with its measurement (aliases i and m).
pub const ORDER_ITEM_WITH_MEASUREMENT_COLS: &str = "i.id, i.order_id, i.measurement_id, i.config, i.quantity, i.unit_amount, \
     m.id, m.user_id, m.thobe_length, m.chest, m.sleeve, m.shoulder, m.height_cm, m.front_image, m.side_image, m.profile_image, m.created_at";

pub const RESET_TOKEN_COLS: &str = "token_hash, email, expires_at, created_at";

// ============ FromRow Implementations ============

impl FromRow for User {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(User {
            id: row.get(0)?,
            email: row.get(1)?,
            name: row.get(2)?,
            password_hash: row.get(3)?,
            profile_image: row.get(4)?,
            measurement_credits: row.get(5)?,
            generation_credits: row.get(6)?,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }
}

impl FromRow for Measurement {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        measurement_at(row, 0)
    }
}

/// Read a measurement starting at a column offset, for joined selects.
fn measurement_at(row: &Row, base: usize) -> rusqlite::Result<Measurement> {
    Ok(Measurement {
        id: row.get(base)?,
        user_id: row.get(base + 1)?,
        thobe_length: row.get(base + 2)?,
        chest: row.get(base + 3)?,
        sleeve: row.get(base + 4)?,
        shoulder: row.get(base + 5)?,
        height_cm: row.get(base + 6)?,
        front_image: row.get(base + 7)?,
        side_image: row.get(base + 8)?,
        profile_image: row.get(base + 9)?,
        created_at: row.get(base + 10)?,
    })
}

impl FromRow for Generation {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Generation {
            id: row.get(0)?,
            user_id: row.get(1)?,
            measurement_id: row.get(2)?,
            image_url: row.get(3)?,
            config: parse_json(row, 4, "config")?,
            created_at: row.get(5)?,
        })
    }
}

impl FromRow for GenerationWithMeasurement {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(GenerationWithMeasurement {
            generation: Generation::from_row(row)?,
            measurement: measurement_at(row, 6)?,
        })
    }
}

impl FromRow for Order {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Order {
            id: row.get(0)?,
            user_id: row.get(1)?,
            shipping_details: parse_json(row, 2, "shipping_details")?,
            total: row.get(3)?,
            status: parse_enum(row, 4, "status")?,
            stripe_session_id: row.get(5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
        })
    }
}

impl FromRow for OrderItemDetail {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(OrderItemDetail {
            item: OrderItem {
                id: row.get(0)?,
                order_id: row.get(1)?,
                measurement_id: row.get(2)?,
                config: parse_json(row, 3, "config")?,
                quantity: row.get(4)?,
                unit_amount: row.get(5)?,
            },
            measurement: measurement_at(row, 6)?,
        })
    }
}

impl FromRow for PasswordResetToken {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(PasswordResetToken {
            token_hash: row.get(0)?,
            email: row.get(1)?,
            expires_at: row.get(2)?,
            created_at: row.get(3)?,
        })
    }
}
