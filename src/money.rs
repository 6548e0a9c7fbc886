//! Credit Parsing and Formatting
//!
//! The ledger reports credits either as JSON numbers or as decimal strings,
//! sometimes with thousands separators. Everything is normalized to
//! `rust_decimal::Decimal` here; no float ever touches a balance.
//!
//! ```rust
//! use sweep_recon::money::{parse_credit, format_credit};
//!
//! let credit = parse_credit("1,250.50").unwrap();
//! assert_eq!(format_credit(credit), "1250.50");
//! ```

use std::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Deserializer};
use thiserror::Error;

/// Display precision used in reports and log lines
pub const DISPLAY_DECIMALS: u32 = 2;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MoneyError {
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    #[error("Amount must be positive")]
    InvalidAmount,

    #[error("Credit must not be negative: {0}")]
    NegativeCredit(Decimal),
}

/// Parse a ledger-reported credit (zero allowed, negative rejected)
pub fn parse_credit(raw: &str) -> Result<Decimal, MoneyError> {
    let cleaned: String = raw.trim().chars().filter(|c| *c != ',').collect();
    if cleaned.is_empty() {
        return Err(MoneyError::InvalidFormat("empty string".into()));
    }

    let value = Decimal::from_str(&cleaned)
        .map_err(|e| MoneyError::InvalidFormat(format!("{}: {}", raw.trim(), e)))?;

    if value.is_sign_negative() && !value.is_zero() {
        return Err(MoneyError::NegativeCredit(value));
    }

    Ok(value.normalize())
}

/// Parse a configured transfer amount (must be strictly positive)
pub fn parse_amount(raw: &str) -> Result<Decimal, MoneyError> {
    let value = parse_credit(raw).map_err(|e| match e {
        MoneyError::NegativeCredit(_) => MoneyError::InvalidAmount,
        other => other,
    })?;
    if value.is_zero() {
        return Err(MoneyError::InvalidAmount);
    }
    Ok(value)
}

/// Render a credit with fixed display precision
pub fn format_credit(value: Decimal) -> String {
    let rounded = value.round_dp_with_strategy(DISPLAY_DECIMALS, RoundingStrategy::MidpointAwayFromZero);
    format!("{:.prec$}", rounded, prec = DISPLAY_DECIMALS as usize)
}

/// Serde helper: accept a credit as JSON number or string
pub fn deserialize_credit<'de, D>(deserializer: D) -> Result<Decimal, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = serde_json::Value::deserialize(deserializer)?;
    credit_from_value(&raw).map_err(serde::de::Error::custom)
}

/// Serde helper: like [`deserialize_credit`] but tolerates `null`/missing
pub fn deserialize_credit_opt<'de, D>(deserializer: D) -> Result<Decimal, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    match raw {
        None | Some(serde_json::Value::Null) => Ok(Decimal::ZERO),
        Some(v) => credit_from_value(&v).map_err(serde::de::Error::custom),
    }
}

fn credit_from_value(raw: &serde_json::Value) -> Result<Decimal, MoneyError> {
    match raw {
        serde_json::Value::String(s) => parse_credit(s),
        // Numbers go through their textual form to avoid f64 rounding
        serde_json::Value::Number(n) => parse_credit(&n.to_string()),
        other => Err(MoneyError::InvalidFormat(format!(
            "expected number or string, got {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[test]
    fn test_parse_credit_variants() {
        assert_eq!(parse_credit("0").unwrap(), Decimal::ZERO);
        assert_eq!(parse_credit(" 2.50 ").unwrap(), Decimal::new(25, 1));
        assert_eq!(parse_credit("1,000.00").unwrap(), Decimal::from(1000));
    }

    #[test]
    fn test_parse_credit_rejects_garbage() {
        assert!(matches!(
            parse_credit(""),
            Err(MoneyError::InvalidFormat(_))
        ));
        assert!(matches!(
            parse_credit("abc"),
            Err(MoneyError::InvalidFormat(_))
        ));
        assert!(matches!(
            parse_credit("-3"),
            Err(MoneyError::NegativeCredit(_))
        ));
    }

    #[test]
    fn test_parse_amount_requires_positive() {
        assert_eq!(parse_amount("2.0").unwrap(), Decimal::TWO);
        assert_eq!(parse_amount("0"), Err(MoneyError::InvalidAmount));
        assert_eq!(parse_amount("-1"), Err(MoneyError::InvalidAmount));
    }

    #[test]
    fn test_format_credit() {
        assert_eq!(format_credit(Decimal::TWO), "2.00");
        assert_eq!(format_credit(Decimal::new(12345, 3)), "12.35");
        assert_eq!(format_credit(Decimal::ZERO), "0.00");
    }

    #[derive(Deserialize)]
    struct Row {
        #[serde(deserialize_with = "deserialize_credit")]
        credit: Decimal,
        #[serde(default, deserialize_with = "deserialize_credit_opt")]
        bonus: Decimal,
    }

    #[test]
    fn test_deserialize_number_or_string() {
        let a: Row = serde_json::from_str(r#"{"credit": 2.5}"#).unwrap();
        let b: Row = serde_json::from_str(r#"{"credit": "2.5", "bonus": null}"#).unwrap();
        assert_eq!(a.credit, b.credit);
        assert_eq!(a.bonus, Decimal::ZERO);

        let bad: Result<Row, _> = serde_json::from_str(r#"{"credit": true}"#);
        assert!(bad.is_err());
    }
}
