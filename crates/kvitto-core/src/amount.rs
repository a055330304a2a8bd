//! Currency amount conversion between decimal major units and integer
//! minor units.
//!
//! All amount comparison in the engine happens in integer minor units.
//! Conversion from a decimal major-unit amount is done exactly once, at
//! the system boundary, by [`to_minor_units`] — never ad hoc with floats.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AmountError {
    #[error("amount {amount} out of range for currency {currency}")]
    OutOfRange { amount: Decimal, currency: String },
}

/// Number of decimal places for a currency's minor unit.
///
/// Defaults to 2 (öre, cents). Zero-decimal currencies must be listed
/// explicitly or amounts would be scaled 100× off.
fn currency_exponent(currency: &str) -> u32 {
    match currency.to_ascii_uppercase().as_str() {
        "JPY" | "KRW" | "ISK" | "VND" => 0,
        _ => 2,
    }
}

/// Converts a decimal major-unit amount to integer minor units,
/// rounding half away from zero.
///
/// `to_minor_units(65.50, "SEK")` → `6550`.
///
/// # Errors
///
/// Returns [`AmountError::OutOfRange`] if the scaled amount does not fit
/// in an `i64`.
pub fn to_minor_units(amount: Decimal, currency: &str) -> Result<i64, AmountError> {
    let exponent = currency_exponent(currency);
    let scaled = amount * Decimal::from(10i64.pow(exponent));
    scaled
        .round()
        .to_i64()
        .ok_or_else(|| AmountError::OutOfRange {
            amount,
            currency: currency.to_owned(),
        })
}

/// Converts integer minor units back to a decimal major-unit amount.
#[must_use]
pub fn from_minor_units(minor: i64, currency: &str) -> Decimal {
    let exponent = currency_exponent(currency);
    Decimal::new(minor, exponent)
}
