//! Credit metering for the paid vision operations.
//!
//! Every user carries two independent balances: measurement credits gate body
//! captures, generation credits gate try-on renders. Balances only move
//! through the ledger operations in `db::queries` (conditional decrement on
//! use, increment from the payment webhook or account bootstrap).

use std::fmt;

use serde::Serialize;

/// Credits granted to every new account.
pub const STARTER_MEASUREMENT_CREDITS: i64 = 1;
pub const STARTER_GENERATION_CREDITS: i64 = 3;

/// Contents of the purchasable credit pack.
pub const TOPUP_MEASUREMENT_CREDITS: i64 = 2;
pub const TOPUP_GENERATION_CREDITS: i64 = 10;

/// Credit pack price: £2.00 in minor units.
pub const TOPUP_PRICE_MINOR: i64 = 200;
pub const TOPUP_CURRENCY: &str = "gbp";

/// Stripe session metadata value that routes a webhook to the credit ledger
/// instead of the order table.
pub const TOPUP_METADATA_TYPE: &str = "credit_topup";

/// The two kinds of metered credit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CreditKind {
    Measurement,
    Generation,
}

impl CreditKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Measurement => "measurement",
            Self::Generation => "generation",
        }
    }

    /// Column holding this balance on the users table.
    pub(crate) fn column(&self) -> &'static str {
        match self {
            Self::Measurement => "measurement_credits",
            Self::Generation => "generation_credits",
        }
    }
}

impl fmt::Display for CreditKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A user's current balances.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct CreditBalance {
    pub measurement_credits: i64,
    pub generation_credits: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_columns_are_distinct() {
        assert_ne!(
            CreditKind::Measurement.column(),
            CreditKind::Generation.column()
        );
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        let json = serde_json::to_string(&CreditKind::Measurement).unwrap();
        assert_eq!(json, "\"measurement\"");
    }

    #[test]
    fn test_pack_is_worth_buying() {
        assert!(TOPUP_MEASUREMENT_CREDITS > 0);
        assert!(TOPUP_GENERATION_CREDITS > 0);
        assert!(TOPUP_PRICE_MINOR > 0);
    }
}
