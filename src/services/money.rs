//! Integer minor-unit arithmetic for prices and totals.
//!
//! Amounts are stored as `Decimal` but compared, summed and sent to the
//! payment processor as whole cents (paise), so `0.1 + 0.2` and `0.3` agree.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

use crate::errors::ServiceError;
use validator::ValidationError;

const MINOR_UNITS_PER_MAJOR: i64 = 100;

/// Converts `amount` to minor units, rounding half away from zero.
///
/// Returns `None` when the result does not fit in an `i64`.
pub fn to_minor_units(amount: Decimal) -> Option<i64> {
    amount
        .checked_mul(Decimal::from(MINOR_UNITS_PER_MAJOR))?
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
}

pub fn from_minor_units(minor: i64) -> Decimal {
    Decimal::new(minor, 2)
}

/// Like [`to_minor_units`], but as a service error naming the offending field.
pub fn minor_units_of(amount: Decimal, field: &str) -> Result<i64, ServiceError> {
    to_minor_units(amount)
        .ok_or_else(|| ServiceError::InvalidInput(format!("{} is out of range: {}", field, amount)))
}

/// `unit × quantity` in minor units, failing on overflow.
pub fn line_total(unit_minor: i64, quantity: i32) -> Result<i64, ServiceError> {
    unit_minor
        .checked_mul(i64::from(quantity))
        .ok_or_else(|| ServiceError::InvalidInput("Line total overflows".to_string()))
}

/// `validator` rule: strictly greater than zero.
pub fn validate_positive(value: &Decimal) -> Result<(), ValidationError> {
    if value.is_sign_positive() && !value.is_zero() {
        Ok(())
    } else {
        Err(ValidationError::new("must_be_positive"))
    }
}
