//! Prefixed ID generation for Atelier entities.
//!
//! All IDs use an `at_` brand prefix to guarantee collision avoidance with
//! payment provider IDs (Stripe's `cs_`, `cus_`, `pi_`, etc.).
//!
//! Format: `at_{entity}_{uuid_simple}` (32 hex chars, no hyphens)

use uuid::Uuid;

/// All known entity prefixes for validation.
const ALL_PREFIXES: &[&str] = &["at_usr_", "at_msr_", "at_gen_", "at_ord_", "at_itm_"];

/// Validate that a string is a valid Atelier prefixed ID.
///
/// This is a cheap check to reject garbage before hitting the database.
/// Validates format: `at_{entity}_{32_hex_chars}`
pub fn is_valid_prefixed_id(s: &str) -> bool {
    let Some(prefix) = ALL_PREFIXES.iter().find(|p| s.starts_with(*p)) else {
        return false;
    };

    let hex_part = &s[prefix.len()..];
    hex_part.len() == 32 && hex_part.chars().all(|c| c.is_ascii_hexdigit())
}

/// Entity types that have prefixed IDs in Atelier.
#[derive(Debug, Clone, Copy)]
pub enum EntityType {
    User,
    Measurement,
    Generation,
    Order,
    OrderItem,
}

impl EntityType {
    /// Returns the prefix for this entity type.
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::User => "at_usr",
            Self::Measurement => "at_msr",
            Self::Generation => "at_gen",
            Self::Order => "at_ord",
            Self::OrderItem => "at_itm",
        }
    }

    /// Generates a new prefixed ID for this entity type.
    pub fn gen_id(&self) -> String {
        format!("{}_{}", self.prefix(), Uuid::new_v4().as_simple())
    }
}
