//! Money Module
//!
//! Fixed-point amounts for balances and ledger records. All client amounts
//! MUST enter the system through [`parse_amount`].
//!
//! ## Representation
//! - `rust_decimal::Decimal`, never `f64`
//! - At most [`AMOUNT_SCALE`] fractional digits (matches `NUMERIC(20,2)`)
//! - Serialized as JSON strings to preserve precision
//!
//! ## Usage
//! ```rust
//! use wallet_ledger::money::{format_amount, parse_amount};
//!
//! let amount = parse_amount("50.5").unwrap();
//! assert_eq!(format_amount(amount), "50.50");
//! ```

use rust_decimal::prelude::*;
use thiserror::Error;

/// Fractional digits carried by every amount and balance
pub const AMOUNT_SCALE: u32 = 2;

/// Largest accepted amount (fits NUMERIC(20,2))
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(1_661_992_959, 1_808_227_885, 5, false, 2);

// ============================================================================
// Error Types
// ============================================================================

/// Money conversion errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MoneyError {
    #[error("Precision overflow: provided {provided} decimals, max allowed {max}")]
    PrecisionOverflow { provided: u32, max: u32 },

    #[error("Amount must be greater than zero")]
    InvalidAmount,

    #[error("Amount too large")]
    Overflow,

    #[error("Invalid format: {0}")]
    InvalidFormat(String),
}

// ============================================================================
// Parse: Client -> Decimal
// ============================================================================

/// Parse a client-supplied amount string
///
/// # Errors
/// * `InvalidFormat` - empty, `.5`, `5.`, signs, exponents, non-numeric
/// * `PrecisionOverflow` - more than [`AMOUNT_SCALE`] fractional digits
/// * `InvalidAmount` - zero
/// * `Overflow` - above [`MAX_AMOUNT`]
pub fn parse_amount(amount_str: &str) -> Result<Decimal, MoneyError> {
    let s = amount_str.trim();
    if s.is_empty() {
        return Err(MoneyError::InvalidFormat("empty string".into()));
    }

    if s.starts_with('-') {
        return Err(MoneyError::InvalidAmount);
    }
    if s.starts_with('+') {
        return Err(MoneyError::InvalidFormat("+ prefix not allowed".into()));
    }
    if s.contains('e') || s.contains('E') {
        return Err(MoneyError::InvalidFormat(
            "scientific notation not allowed".into(),
        ));
    }
    if s.starts_with('.') {
        return Err(MoneyError::InvalidFormat(
            "missing leading zero (e.g., use 0.5 instead of .5)".into(),
        ));
    }
    if s.ends_with('.') {
        return Err(MoneyError::InvalidFormat(
            "missing fractional part (e.g., use 5.0 instead of 5.)".into(),
        ));
    }
    if !s.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return Err(MoneyError::InvalidFormat(format!("not a number: {}", s)));
    }

    let d = Decimal::from_str(s).map_err(|e| MoneyError::InvalidFormat(e.to_string()))?;
    validate_amount(d)
}

/// Check an already-typed amount against the same rules as [`parse_amount`]
pub fn validate_amount(d: Decimal) -> Result<Decimal, MoneyError> {
    if d.is_sign_negative() && !d.is_zero() {
        return Err(MoneyError::InvalidAmount);
    }

    let provided = d.scale();
    if provided > AMOUNT_SCALE && d.normalize().scale() > AMOUNT_SCALE {
        return Err(MoneyError::PrecisionOverflow {
            provided,
            max: AMOUNT_SCALE,
        });
    }

    if d.is_zero() {
        return Err(MoneyError::InvalidAmount);
    }
    if d > MAX_AMOUNT {
        return Err(MoneyError::Overflow);
    }

    Ok(normalize_amount(d))
}

/// Rescale to exactly [`AMOUNT_SCALE`] digits (`50` -> `50.00`)
///
/// Only lossless for values that already passed [`parse_amount`] or came out
/// of storage.
pub fn normalize_amount(d: Decimal) -> Decimal {
    let mut out = d;
    out.rescale(AMOUNT_SCALE);
    out
}

// ============================================================================
// Format: Decimal -> Client
// ============================================================================

/// Format an amount with exactly [`AMOUNT_SCALE`] fractional digits
pub fn format_amount(d: Decimal) -> String {
    normalize_amount(d).to_string()
}

/// Serde adapter: amounts as fixed-scale strings (`"150.00"`)
pub mod serde_amount {
    use rust_decimal::Decimal;
    use serde::{Deserialize, Deserializer, Serializer};
    use std::str::FromStr;

    pub fn serialize<S>(value: &Decimal, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&super::format_amount(*value))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Decimal, D::Error>
    where
        D: Deserializer<'de>,
    {
        use serde::de::Error;
        let s = String::deserialize(deserializer)?;
        Decimal::from_str(&s)
            .map(super::normalize_amount)
            .map_err(|e| D::Error::custom(format!("Invalid decimal: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_parse_amount_normal_cases() {
        assert_eq!(parse_amount("50").unwrap(), dec("50.00"));
        assert_eq!(parse_amount("50.5").unwrap(), dec("50.50"));
        assert_eq!(parse_amount("0.01").unwrap(), dec("0.01"));
        assert_eq!(parse_amount(" 100.00 ").unwrap(), dec("100.00"));
    }

    #[test]
    fn test_parse_amount_keeps_scale() {
        assert_eq!(parse_amount("150").unwrap().scale(), AMOUNT_SCALE);
        assert_eq!(format_amount(parse_amount("150").unwrap()), "150.00");
    }

    #[test]
    fn test_parse_amount_trailing_zeros_allowed() {
        // 1.500 is still representable with 2 decimals
        assert_eq!(parse_amount("1.500").unwrap(), dec("1.50"));
    }

    #[test]
    fn test_parse_amount_rejects_precision_overflow() {
        assert_eq!(
            parse_amount("1.001"),
            Err(MoneyError::PrecisionOverflow {
                provided: 3,
                max: AMOUNT_SCALE
            })
        );
    }

    #[test]
    fn test_validate_amount_typed() {
        assert_eq!(validate_amount(dec("30")).unwrap(), dec("30.00"));
        assert_eq!(validate_amount(dec("-1")), Err(MoneyError::InvalidAmount));
        assert_eq!(validate_amount(Decimal::ZERO), Err(MoneyError::InvalidAmount));
        assert!(matches!(
            validate_amount(dec("0.125")),
            Err(MoneyError::PrecisionOverflow { .. })
        ));
    }

    #[test]
    fn test_parse_amount_rejects_zero_and_negative() {
        assert_eq!(parse_amount("0"), Err(MoneyError::InvalidAmount));
        assert_eq!(parse_amount("0.00"), Err(MoneyError::InvalidAmount));
        assert_eq!(parse_amount("-5"), Err(MoneyError::InvalidAmount));
    }

    #[test]
    fn test_parse_amount_rejects_bad_format() {
        for bad in ["", ".5", "5.", "1e5", "+5", "abc", "1.2.3", "NaN"] {
            assert!(
                matches!(parse_amount(bad), Err(MoneyError::InvalidFormat(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_parse_amount_overflow() {
        assert_eq!(
            parse_amount("1000000000000000000"),
            Err(MoneyError::Overflow)
        );
    }

    #[test]
    fn test_format_amount() {
        assert_eq!(format_amount(dec("0")), "0.00");
        assert_eq!(format_amount(dec("70")), "70.00");
        assert_eq!(format_amount(dec("30.5")), "30.50");
    }
}
