//! The `divide_numbers` tool
//!
//! Divides two numbers and renders the rounded quotient as text. Invalid
//! operands are reported as `Error: ...` text results rather than protocol
//! errors.

use async_trait::async_trait;
use rust_mcp_sdk::{macros, schema::Tool};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::registry::{McpTool, ToolFailure, ToolOutcome};

pub const DEFAULT_PRECISION: f64 = 10.0;
pub const MAX_PRECISION: f64 = 20.0;

#[macros::mcp_tool(
    name = "divide_numbers",
    title = "Divide Numbers",
    description = "Divide two numbers with proper error handling for edge cases",
    destructive_hint = false,
    open_world_hint = false
)]
#[derive(Debug, Deserialize, Serialize, macros::JsonSchema)]
pub struct DivideNumbersTool {
    /// The number to be divided (dividend)
    pub dividend: f64,
    /// The number to divide by (divisor)
    pub divisor: f64,
    /// Number of decimal places for the result (optional, default: 10)
    pub precision: Option<f64>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DivisionError {
    #[error("Division by zero is not allowed")]
    DivisionByZero,
    #[error("Dividend must be a finite number")]
    NonFiniteDividend,
    #[error("Divisor must be a finite number")]
    NonFiniteDivisor,
    #[error("Precision must be between 0 and 20")]
    PrecisionOutOfRange,
    #[error("Division resulted in an invalid number")]
    InvalidQuotient,
}

pub struct DivideNumbers;

#[async_trait]
impl McpTool for DivideNumbers {
    type Args = DivideNumbersTool;

    fn definition(&self) -> Tool {
        DivideNumbersTool::tool()
    }

    async fn run(&self, args: Self::Args) -> ToolOutcome {
        divide(
            args.dividend,
            args.divisor,
            args.precision.unwrap_or(DEFAULT_PRECISION),
        )
        .map_err(ToolFailure::error)
    }
}

/// Returns `Result: <quotient> (<dividend> ÷ <divisor>)` with the quotient
/// rounded to `precision` decimal places.
pub fn divide(dividend: f64, divisor: f64, precision: f64) -> Result<String, DivisionError> {
    if divisor == 0.0 {
        return Err(DivisionError::DivisionByZero);
    }

    if !dividend.is_finite() {
        return Err(DivisionError::NonFiniteDividend);
    }

    if !divisor.is_finite() {
        return Err(DivisionError::NonFiniteDivisor);
    }

    // NaN precision passes this check and rounds to zero places.
    if precision < 0.0 || precision > MAX_PRECISION {
        return Err(DivisionError::PrecisionOutOfRange);
    }

    let quotient = dividend / divisor;
    if !quotient.is_finite() {
        return Err(DivisionError::InvalidQuotient);
    }

    let rounded = round_to_places(quotient, precision as usize)?;

    Ok(format!(
        "Result: {} ({} ÷ {})",
        format_number(rounded),
        format_number(dividend),
        format_number(divisor)
    ))
}

/// Every finite `f64` has a terminating decimal expansion within this many
/// fractional digits.
const EXACT_FRACTION_DIGITS: usize = 1074;

/// Rounds the exact decimal value of `value` to `places` fractional digits,
/// with ties going away from zero.
fn round_to_places(value: f64, places: usize) -> Result<f64, DivisionError> {
    let exact = format!("{:.*}", EXACT_FRACTION_DIGITS, value.abs());
    let (whole, fraction) = exact.split_once('.').unwrap_or((exact.as_str(), ""));

    let mut digits: Vec<u8> = whole
        .bytes()
        .chain(fraction.bytes().take(places))
        .collect();

    if fraction
        .as_bytes()
        .get(places)
        .is_some_and(|digit| *digit >= b'5')
    {
        match digits.iter().rposition(|digit| *digit != b'9') {
            Some(index) => {
                digits[index] += 1;
                digits[index + 1..].fill(b'0');
            }
            None => {
                digits.fill(b'0');
                digits.insert(0, b'1');
            }
        }
    }

    let mut rounded = String::from_utf8(digits).map_err(|_| DivisionError::InvalidQuotient)?;
    if places > 0 {
        rounded.insert(rounded.len() - places, '.');
    }

    let magnitude = rounded
        .parse::<f64>()
        .map_err(|_| DivisionError::InvalidQuotient)?;
    Ok(if value.is_sign_negative() {
        -magnitude
    } else {
        magnitude
    })
}

/// Shortest round-trip decimal rendering, switching to exponent notation for
/// magnitudes outside `[1e-6, 1e21)`.
pub fn format_number(value: f64) -> String {
    if value == 0.0 {
        return "0".to_string();
    }

    let magnitude = value.abs();
    if magnitude >= 1e21 || magnitude < 1e-6 {
        let formatted = format!("{value:e}");
        return match formatted.split_once('e') {
            Some((mantissa, exponent)) if !exponent.starts_with('-') => {
                format!("{mantissa}e+{exponent}")
            }
            _ => formatted,
        };
    }

    value.to_string()
}
