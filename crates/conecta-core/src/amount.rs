//! Exact decimal arithmetic for wire amounts.
//!
//! Amounts travel as decimal strings and are compared as exact decimals,
//! never as binary floats. "600.00" + "399.99" against "1000.00" is a
//! mismatch, not a rounding question.

use crate::error::GatewayError;
use rust_decimal::Decimal;
use std::str::FromStr;

/// Parse a wire amount exactly as received.
pub fn parse_amount(
    operation: &'static str,
    field: &'static str,
    value: &str,
) -> Result<Decimal, GatewayError> {
    Decimal::from_str(value.trim()).map_err(|_| GatewayError::MalformedOperation {
        operation,
        detail: format!("field '{}' is not a decimal amount: '{}'", field, value),
    })
}

/// Check that the beneficiary parts of a dispersion sum exactly to the
/// declared total.
pub fn check_dispersion_total<'a>(
    operation: &'static str,
    declared: &str,
    parts: impl IntoIterator<Item = &'a str>,
) -> Result<(), GatewayError> {
    let total = parse_amount(operation, "monto", declared)?;

    let mut sum = Decimal::ZERO;
    for part in parts {
        sum += parse_amount(operation, "montoPart", part)?;
    }

    if sum != total {
        return Err(GatewayError::AmountMismatch {
            declared: declared.trim().to_string(),
            parts: sum.to_string(),
        });
    }

    Ok(())
}
