//! Conversion between API rupee amounts and stored paise.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use service_core::error::AppError;

/// Rupees to paise. Rejects negative amounts and fractions of a paisa.
pub fn to_paise(amount: Decimal) -> Result<i64, AppError> {
    if amount.is_sign_negative() {
        return Err(AppError::bad_request("Amount must not be negative"));
    }
    let paise = amount
        .checked_mul(Decimal::ONE_HUNDRED)
        .ok_or_else(out_of_range)?;
    if !paise.fract().is_zero() {
        return Err(AppError::bad_request(
            "Amount must have at most two decimal places",
        ));
    }
    paise.to_i64().ok_or_else(out_of_range)
}

pub fn out_of_range() -> AppError {
    AppError::bad_request("Amount is out of range")
}

/// Sum of two paise amounts, rejecting overflow.
pub fn checked_total(a: i64, b: i64) -> Result<i64, AppError> {
    a.checked_add(b).ok_or_else(out_of_range)
}

/// Like [`to_paise`] but also rejects zero.
pub fn to_positive_paise(amount: Decimal) -> Result<i64, AppError> {
    let paise = to_paise(amount)?;
    if paise == 0 {
        return Err(AppError::bad_request("Amount must be greater than zero"));
    }
    Ok(paise)
}

/// Paise to rupees with exactly two decimal places.
pub fn from_paise(paise: i64) -> Decimal {
    Decimal::new(paise, 2)
}
