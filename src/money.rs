//! Monetary amount handling.
//!
//! All ledger arithmetic in this service operates on decimal major-currency
//! units (`12.50` means $12.50), stored as NUMERIC(12, 2) in PostgreSQL and
//! as [`rust_decimal::Decimal`] in Rust. The single place amounts become
//! integer minor units (cents) is the payment gateway adapter, which calls
//! [`to_minor_units`] immediately before talking to the processor.

use rust_decimal::{Decimal, RoundingStrategy, prelude::ToPrimitive};

use crate::error::AppError;

/// The system-wide currency. The data model is single-currency.
pub const CURRENCY: &str = "usd";

/// Convert a major-unit amount to integer minor units (cents).
///
/// Rounds to the nearest cent, away from zero on midpoints, so `10.005`
/// becomes `1001`. Only the gateway adapter should call this.
///
/// # Errors
///
/// Returns `Validation` if the amount does not fit in an `i64` after
/// conversion (never the case for NUMERIC(12, 2) column values).
pub fn to_minor_units(amount: Decimal) -> Result<i64, AppError> {
    let cents = (amount * Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);

    cents
        .to_i64()
        .ok_or_else(|| AppError::Validation(format!("Amount out of range: {amount}")))
}

/// Convert integer minor units (cents) back to a major-unit amount.
pub fn from_minor_units(cents: i64) -> Decimal {
    Decimal::new(cents, 2)
}

/// Format an amount for user-facing messages, e.g. `$12.50`.
pub fn format_usd(amount: Decimal) -> String {
    format!("${amount:.2}")
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn converts_major_units_to_cents() {
        assert_eq!(to_minor_units(dec!(12.50)).unwrap(), 1250);
        assert_eq!(to_minor_units(dec!(0.50)).unwrap(), 50);
        assert_eq!(to_minor_units(dec!(100)).unwrap(), 10000);
    }

    #[test]
    fn rounds_to_nearest_cent() {
        assert_eq!(to_minor_units(dec!(10.005)).unwrap(), 1001);
        assert_eq!(to_minor_units(dec!(10.004)).unwrap(), 1000);
        assert_eq!(to_minor_units(dec!(0.999)).unwrap(), 100);
    }

    #[test]
    fn round_trips_cents() {
        assert_eq!(from_minor_units(1250), dec!(12.50));
        assert_eq!(to_minor_units(from_minor_units(9999)).unwrap(), 9999);
    }

    #[test]
    fn formats_with_two_decimal_places() {
        assert_eq!(format_usd(dec!(50)), "$50.00");
        assert_eq!(format_usd(dec!(12.5)), "$12.50");
        assert_eq!(format_usd(dec!(0.05)), "$0.05");
    }
}
